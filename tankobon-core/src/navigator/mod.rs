//! Reading navigator
//!
//! [`ReadingNavigator`] drives a [`ReadingSession`]: commands go through the
//! pure transition function and the resulting [`Effect`]s are carried out
//! here. Commands are serialized by one async lock, so a page change can never
//! interleave with a chapter switch.
//!
//! The sibling list is fetched in the background and tagged with the session
//! generation; results for a chapter that is no longer open are dropped.

mod session;

pub use session::{Command, Effect, EndReason, NavState, ReadingSession, SessionEnd, Step};

use crate::error::{Result, TankobonError};
use crate::source::{ChapterFilter, ContentSource};
use crate::types::{ChapterDetail, ChapterId, ChapterNumber, ReadingDirection, WorkId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 100;

/// Notifications for observers of a navigator
#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    ChapterOpened {
        generation: u64,
        chapter_id: ChapterId,
        page_index: i64,
    },
    PageChanged {
        chapter_id: ChapterId,
        page_index: i64,
    },
    SiblingsLoaded {
        generation: u64,
        count: usize,
    },
    ChromeVisible(bool),
    Ended(SessionEnd),
}

/// What a command left behind
#[derive(Debug, Clone, PartialEq)]
pub struct NavOutcome {
    pub state: NavState,

    /// Chrome effects for the presentation layer, in order
    pub presentation: Vec<Effect>,
}

impl NavOutcome {
    pub fn session(&self) -> Option<&ReadingSession> {
        self.state.session()
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.state, NavState::Reading(_))
    }
}

#[derive(Default)]
struct Slot {
    state: Option<NavState>,
    sibling_task: Option<JoinHandle<()>>,
    prefetch: Vec<(ChapterId, JoinHandle<()>)>,
}

struct Inner {
    source: Arc<dyn ContentSource>,
    prefetch_ahead: usize,
    slot: tokio::sync::Mutex<Slot>,
    generation: AtomicU64,
    resident: Mutex<HashMap<(ChapterId, usize), Arc<Vec<u8>>>>,
    siblings_tx: watch::Sender<u64>,
    events: broadcast::Sender<NavEvent>,
}

/// Async driver for one reader view
#[derive(Clone)]
pub struct ReadingNavigator {
    inner: Arc<Inner>,
}

impl ReadingNavigator {
    pub fn new(source: Arc<dyn ContentSource>, prefetch_ahead: usize) -> Self {
        let (siblings_tx, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                source,
                prefetch_ahead,
                slot: tokio::sync::Mutex::new(Slot::default()),
                generation: AtomicU64::new(0),
                resident: Mutex::new(HashMap::new()),
                siblings_tx,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavEvent> {
        self.inner.events.subscribe()
    }

    /// Open a chapter by id at its first page
    pub async fn open(&self, chapter_id: &ChapterId, direction: ReadingDirection) -> Result<NavOutcome> {
        let detail = self.inner.source.fetch_detail(chapter_id).await?;
        self.open_chapter(detail, false, direction).await
    }

    /// Open an already fetched chapter, replacing whatever session was active
    pub async fn open_chapter(
        &self,
        detail: ChapterDetail,
        start_at_last_page: bool,
        direction: ReadingDirection,
    ) -> Result<NavOutcome> {
        if let Some(url) = &detail.external_url {
            return Err(TankobonError::NotReadable {
                id: detail.id.to_string(),
                url: url.clone(),
            });
        }

        let mut slot = self.inner.slot.lock().await;
        if let Some(task) = slot.sibling_task.take() {
            task.abort();
        }
        let before = slot.state.clone();

        let mut step = ReadingSession::open(
            self.inner.next_generation(),
            detail,
            start_at_last_page,
            direction,
            None,
            self.inner.prefetch_ahead,
        );
        if let Some(NavState::Reading(previous)) = &before {
            step.effects.insert(
                0,
                Effect::ReleasePages {
                    chapter_id: previous.current_chapter().id.clone(),
                },
            );
        }
        self.apply(&mut slot, before, step).await
    }

    pub async fn change_page(&self, display_index: i64) -> Result<NavOutcome> {
        self.dispatch(Command::ChangePage(display_index)).await
    }

    pub async fn next_chapter(&self) -> Result<NavOutcome> {
        self.dispatch(Command::NextChapter).await
    }

    pub async fn previous_chapter(&self) -> Result<NavOutcome> {
        self.dispatch(Command::PreviousChapter).await
    }

    pub async fn jump_to_chapter(&self, number: ChapterNumber) -> Result<NavOutcome> {
        self.dispatch(Command::JumpToChapter(number)).await
    }

    pub async fn close(&self) -> Result<NavOutcome> {
        self.dispatch(Command::Close).await
    }

    /// Current state, `None` before the first chapter is opened
    pub async fn snapshot(&self) -> Option<NavState> {
        self.inner.slot.lock().await.state.clone()
    }

    /// Wait until the sibling list of the open chapter has loaded.
    ///
    /// Fails with `NotFound` if there is no session or it ends first.
    pub async fn siblings_ready(&self) -> Result<()> {
        let mut changes = self.inner.siblings_tx.subscribe();
        loop {
            {
                let slot = self.inner.slot.lock().await;
                match &slot.state {
                    Some(NavState::Reading(session)) if session.siblings_loaded() => return Ok(()),
                    Some(NavState::Reading(_)) => {}
                    Some(NavState::Ended(end)) => {
                        return Err(TankobonError::NotFound(format!(
                            "session ended: {}",
                            end.reason
                        )))
                    }
                    None => return Err(no_session()),
                }
            }
            changes
                .changed()
                .await
                .map_err(|_| TankobonError::NotFound("navigator dropped".to_string()))?;
        }
    }

    /// Image bytes of a page of the open chapter, by display index
    pub async fn page(&self, display_index: i64) -> Result<Arc<Vec<u8>>> {
        let (detail, logical) = {
            let slot = self.inner.slot.lock().await;
            let session = match &slot.state {
                Some(NavState::Reading(session)) => session,
                _ => return Err(no_session()),
            };
            let logical = session.logical_page(display_index).ok_or_else(|| {
                TankobonError::NotFound(format!(
                    "page {} of chapter {}",
                    display_index,
                    session.current_chapter().id
                ))
            })?;
            (session.current_chapter().clone(), logical)
        };

        let resident_key = (detail.id.clone(), logical);
        let resident = self.inner.resident.lock().get(&resident_key).cloned();
        if let Some(bytes) = resident {
            return Ok(bytes);
        }

        // Fetched without holding the session lock so navigation stays responsive
        let bytes = Arc::new(self.inner.source.fetch_page(&detail, logical).await?);
        let slot = self.inner.slot.lock().await;
        if let Some(NavState::Reading(session)) = &slot.state {
            if session.current_chapter().id == detail.id {
                self.inner
                    .resident
                    .lock()
                    .insert(resident_key, Arc::clone(&bytes));
            }
        }
        Ok(bytes)
    }

    async fn dispatch(&self, command: Command) -> Result<NavOutcome> {
        let mut slot = self.inner.slot.lock().await;
        let session = match &slot.state {
            Some(NavState::Reading(session)) => session.clone(),
            Some(ended @ NavState::Ended(_)) => {
                tracing::debug!(?command, "Ignoring command after session end");
                return Ok(NavOutcome {
                    state: ended.clone(),
                    presentation: Vec::new(),
                });
            }
            None => return Err(no_session()),
        };

        let step = session.transition(command)?;
        let before = slot.state.clone();
        self.apply(&mut slot, before, step).await
    }

    async fn apply(
        &self,
        slot: &mut Slot,
        before: Option<NavState>,
        step: Step,
    ) -> Result<NavOutcome> {
        let mut state = step.state;
        let mut queue: VecDeque<Effect> = step.effects.into();
        let mut presentation = Vec::new();

        while let Some(effect) = queue.pop_front() {
            let (chapter_id, start_at_last_page) = match effect {
                Effect::LoadChapter {
                    chapter_id,
                    start_at_last_page,
                } => (chapter_id, start_at_last_page),
                other => {
                    self.inner.perform(slot, &state, other, &mut presentation);
                    continue;
                }
            };

            let NavState::Reading(session) = &state else {
                continue;
            };
            let command = match self.inner.source.fetch_detail(&chapter_id).await {
                Ok(detail) => Command::ChapterLoaded {
                    generation: self.inner.next_generation(),
                    detail,
                    start_at_last_page,
                },
                Err(e) => {
                    tracing::warn!(chapter = %chapter_id, "Failed to load chapter: {}", e);
                    Command::ChapterLoadFailed {
                        reason: e.to_string(),
                    }
                }
            };
            let next = session.transition(command)?;
            state = next.state;
            queue.extend(next.effects);
        }

        self.inner.commit(slot, before.as_ref(), state.clone());
        Ok(NavOutcome {
            state,
            presentation,
        })
    }
}

impl Inner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Carry out an effect that needs no awaiting
    fn perform(
        self: &Arc<Self>,
        slot: &mut Slot,
        state: &NavState,
        effect: Effect,
        presentation: &mut Vec<Effect>,
    ) {
        match effect {
            Effect::LoadChapter { chapter_id, .. } => {
                tracing::warn!(chapter = %chapter_id, "Chapter load requested outside a command");
            }
            Effect::FetchSiblings {
                generation,
                work_id,
                filter,
            } => {
                if let Some(task) = slot.sibling_task.take() {
                    task.abort();
                }
                slot.sibling_task = Some(self.spawn_siblings(generation, work_id, filter));
            }
            Effect::PrefetchPages { chapter_id, pages } => {
                let Some(session) = state.session() else { return };
                if session.current_chapter().id != chapter_id {
                    return;
                }
                let pages: Vec<usize> = {
                    let resident = self.resident.lock();
                    pages
                        .into_iter()
                        .filter(|page| !resident.contains_key(&(chapter_id.clone(), *page)))
                        .collect()
                };
                if pages.is_empty() {
                    return;
                }
                slot.prefetch.retain(|(_, task)| !task.is_finished());
                let task = self.spawn_prefetch(session.current_chapter().clone(), pages);
                slot.prefetch.push((chapter_id, task));
            }
            Effect::ReleasePages { chapter_id } => {
                slot.prefetch.retain(|(owner, task)| {
                    if *owner == chapter_id {
                        task.abort();
                        false
                    } else {
                        true
                    }
                });
                self.resident.lock().retain(|(owner, _), _| *owner != chapter_id);
                tracing::debug!(chapter = %chapter_id, "Released pages");
            }
            Effect::HideChrome => {
                let _ = self.events.send(NavEvent::ChromeVisible(false));
                presentation.push(effect);
            }
            Effect::ShowChrome => {
                let _ = self.events.send(NavEvent::ChromeVisible(true));
                presentation.push(effect);
            }
        }
    }

    /// Store the new state and tell observers what changed
    fn commit(&self, slot: &mut Slot, before: Option<&NavState>, after: NavState) {
        match &after {
            NavState::Reading(session) => {
                let chapter_id = session.current_chapter().id.clone();
                let page_index = session.current_page_index();
                match before.and_then(NavState::session) {
                    Some(previous) if previous.generation() == session.generation() => {
                        if previous.current_page_index() != page_index {
                            let _ = self.events.send(NavEvent::PageChanged {
                                chapter_id,
                                page_index,
                            });
                        }
                        if !previous.siblings_loaded() && session.siblings_loaded() {
                            let _ = self.events.send(NavEvent::SiblingsLoaded {
                                generation: session.generation(),
                                count: session.sibling_chapters().map_or(0, |s| s.len()),
                            });
                        }
                    }
                    _ => {
                        let _ = self.events.send(NavEvent::ChapterOpened {
                            generation: session.generation(),
                            chapter_id,
                            page_index,
                        });
                    }
                }
            }
            NavState::Ended(end) => {
                if let Some(task) = slot.sibling_task.take() {
                    task.abort();
                }
                for (_, task) in slot.prefetch.drain(..) {
                    task.abort();
                }
                self.resident.lock().clear();
                tracing::info!(chapter = %end.chapter_id, reason = %end.reason, "Reading session ended");
                let _ = self.events.send(NavEvent::Ended(end.clone()));
            }
        }

        let generation = match &after {
            NavState::Reading(session) => session.generation(),
            NavState::Ended(end) => end.generation,
        };
        slot.state = Some(after);
        self.siblings_tx.send_replace(generation);
    }

    fn spawn_siblings(
        self: &Arc<Self>,
        generation: u64,
        work_id: WorkId,
        filter: ChapterFilter,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let command = match inner.source.fetch_siblings(&work_id, &filter).await {
                Ok(siblings) => Command::SiblingsLoaded {
                    generation,
                    siblings,
                },
                Err(e) => {
                    tracing::warn!(work = %work_id, "Failed to fetch sibling chapters: {}", e);
                    Command::SiblingsFailed {
                        generation,
                        reason: e.to_string(),
                    }
                }
            };

            let mut slot = inner.slot.lock().await;
            let session = match &slot.state {
                Some(NavState::Reading(session)) if session.generation() == generation => {
                    session.clone()
                }
                _ => {
                    tracing::debug!(generation, "Dropping siblings for a closed chapter");
                    return;
                }
            };
            // This task finishes on its own; don't let a state change abort it
            slot.sibling_task = None;
            match session.transition(command) {
                Ok(step) => {
                    let before = slot.state.clone();
                    let mut presentation = Vec::new();
                    for effect in step.effects {
                        inner.perform(&mut slot, &step.state, effect, &mut presentation);
                    }
                    inner.commit(&mut slot, before.as_ref(), step.state);
                }
                Err(e) => tracing::warn!(generation, "Sibling update rejected: {}", e),
            }
        })
    }

    fn spawn_prefetch(self: &Arc<Self>, chapter: ChapterDetail, pages: Vec<usize>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            for page in pages {
                match inner.source.fetch_page(&chapter, page).await {
                    Ok(bytes) => {
                        inner
                            .resident
                            .lock()
                            .insert((chapter.id.clone(), page), Arc::new(bytes));
                    }
                    Err(e) => {
                        tracing::debug!(chapter = %chapter.id, page, "Prefetch failed: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

fn no_session() -> TankobonError {
    TankobonError::NotFound("no open reading session".to_string())
}
