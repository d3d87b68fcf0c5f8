//! Reading session state machine
//!
//! [`ReadingSession::transition`] is pure: it never performs I/O and never
//! mutates the session it is called on. It returns the next state plus the
//! [`Effect`]s the driver has to carry out.
//!
//! Page indices are in display order. For right-to-left reading the first
//! page of the chapter sits at the right end (index `page_count - 1`) and the
//! "before first" sentinel `-1` is the left edge, which leads to the *next*
//! chapter.

use crate::error::{Result, TankobonError};
use crate::source::ChapterFilter;
use crate::types::{
    cmp_asc_absent_first, ChapterDetail, ChapterId, ChapterNumber, ReadingDirection, WorkId,
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    /// No later chapter in the translator group
    LastChapterInGroup,

    /// No earlier chapter in the translator group
    FirstChapterInGroup,

    /// The target chapter can only be read on an external site
    ExternalChapter { url: String },

    /// The user closed the reader
    Closed,

    /// A lookup failed; the session is not retried
    InternalError(String),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::LastChapterInGroup => write!(f, "last chapter in group"),
            EndReason::FirstChapterInGroup => write!(f, "first chapter in group"),
            EndReason::ExternalChapter { url } => write!(f, "chapter hosted at {}", url),
            EndReason::Closed => write!(f, "closed"),
            EndReason::InternalError(message) => write!(f, "internal error: {}", message),
        }
    }
}

/// Terminal state of a reading session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnd {
    pub reason: EndReason,

    /// Chapter that was open when the session ended
    pub chapter_id: ChapterId,

    pub generation: u64,
}

impl SessionEnd {
    /// Whether the end was caused by a failure rather than a boundary or the user
    pub fn is_error(&self) -> bool {
        matches!(self.reason, EndReason::InternalError(_))
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Move to a display page; `-1` and `page_count` cross the chapter boundary
    ChangePage(i64),
    NextChapter,
    PreviousChapter,
    JumpToChapter(ChapterNumber),
    /// The detail requested by [`Effect::LoadChapter`] arrived
    ChapterLoaded {
        generation: u64,
        detail: ChapterDetail,
        start_at_last_page: bool,
    },
    /// The detail requested by [`Effect::LoadChapter`] could not be fetched
    ChapterLoadFailed { reason: String },
    SiblingsLoaded {
        generation: u64,
        siblings: Vec<ChapterDetail>,
    },
    SiblingsFailed { generation: u64, reason: String },
    Close,
}

/// Work the driver performs on behalf of a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch this chapter's detail and answer with `ChapterLoaded`/`ChapterLoadFailed`
    LoadChapter {
        chapter_id: ChapterId,
        start_at_last_page: bool,
    },
    /// Fetch the sibling list in the background, tagged with `generation`
    FetchSiblings {
        generation: u64,
        work_id: WorkId,
        filter: ChapterFilter,
    },
    /// Warm pages (reading-order indices) of a chapter
    PrefetchPages {
        chapter_id: ChapterId,
        pages: Vec<usize>,
    },
    /// Drop in-memory page data of a chapter and cancel its prefetches
    ReleasePages { chapter_id: ChapterId },
    /// Presentation: hide navigation chrome while reading
    HideChrome,
    /// Presentation: restore navigation chrome
    ShowChrome,
}

impl Effect {
    /// Whether the presentation layer, not the driver, handles this effect
    pub fn is_presentation(&self) -> bool {
        matches!(self, Effect::HideChrome | Effect::ShowChrome)
    }
}

/// Navigator state: reading, or ended for good
#[derive(Debug, Clone, PartialEq)]
pub enum NavState {
    Reading(ReadingSession),
    Ended(SessionEnd),
}

impl NavState {
    pub fn session(&self) -> Option<&ReadingSession> {
        match self {
            NavState::Reading(session) => Some(session),
            NavState::Ended(_) => None,
        }
    }

    pub fn end(&self) -> Option<&SessionEnd> {
        match self {
            NavState::Reading(_) => None,
            NavState::Ended(end) => Some(end),
        }
    }
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: NavState,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(session: &ReadingSession) -> Self {
        Self {
            state: NavState::Reading(session.clone()),
            effects: Vec::new(),
        }
    }
}

/// One open chapter and everything derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSession {
    generation: u64,
    work_id: WorkId,
    current_chapter: ChapterDetail,
    current_page_index: i64,
    direction: ReadingDirection,
    sibling_chapters: Option<Arc<[ChapterDetail]>>,
    prefetch_ahead: usize,
}

impl ReadingSession {
    /// Open a chapter.
    ///
    /// `siblings` is reused as-is when given; otherwise a fetch is requested
    /// and chapter-to-chapter moves are no-ops until it lands.
    pub fn open(
        generation: u64,
        detail: ChapterDetail,
        start_at_last_page: bool,
        direction: ReadingDirection,
        siblings: Option<Arc<[ChapterDetail]>>,
        prefetch_ahead: usize,
    ) -> Step {
        let session = Self {
            generation,
            work_id: detail.work_id.clone(),
            current_page_index: initial_index(detail.page_count, direction, start_at_last_page),
            current_chapter: detail,
            direction,
            sibling_chapters: siblings,
            prefetch_ahead,
        };
        tracing::debug!(
            generation,
            chapter = %session.current_chapter.id,
            page = session.current_page_index,
            "Opened chapter"
        );

        let mut effects = vec![Effect::HideChrome];
        if session.sibling_chapters.is_none() {
            effects.push(Effect::FetchSiblings {
                generation,
                work_id: session.work_id.clone(),
                filter: ChapterFilter::same_translation(&session.current_chapter),
            });
        }
        effects.extend(session.prefetch_effect());
        Step {
            state: NavState::Reading(session),
            effects,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn work_id(&self) -> &WorkId {
        &self.work_id
    }

    pub fn current_chapter(&self) -> &ChapterDetail {
        &self.current_chapter
    }

    /// Display index of the current page
    pub fn current_page_index(&self) -> i64 {
        self.current_page_index
    }

    pub fn direction(&self) -> ReadingDirection {
        self.direction
    }

    /// Siblings sorted ascending by number, or `None` while loading
    pub fn sibling_chapters(&self) -> Option<&[ChapterDetail]> {
        self.sibling_chapters.as_deref()
    }

    pub fn siblings_loaded(&self) -> bool {
        self.sibling_chapters.is_some()
    }

    pub fn page_count(&self) -> u32 {
        self.current_chapter.page_count
    }

    /// Reading-order index of a display index
    pub fn logical_page(&self, display_index: i64) -> Option<usize> {
        let count = i64::from(self.page_count());
        if !(0..count).contains(&display_index) {
            return None;
        }
        let logical = if self.direction.is_reversed() {
            count - 1 - display_index
        } else {
            display_index
        };
        usize::try_from(logical).ok()
    }

    /// Apply a command, producing the next state
    pub fn transition(&self, command: Command) -> Result<Step> {
        match command {
            Command::ChangePage(index) => self.change_page(index),
            Command::NextChapter => Ok(self.next_chapter()),
            Command::PreviousChapter => Ok(self.previous_chapter()),
            Command::JumpToChapter(number) => self.jump_to(number),
            Command::ChapterLoaded {
                generation,
                detail,
                start_at_last_page,
            } => Ok(self.chapter_loaded(generation, detail, start_at_last_page)),
            Command::ChapterLoadFailed { reason } => {
                Ok(self.end(EndReason::InternalError(reason)))
            }
            Command::SiblingsLoaded {
                generation,
                siblings,
            } => Ok(self.siblings_loaded_step(generation, siblings)),
            Command::SiblingsFailed { generation, reason } => {
                if generation != self.generation {
                    tracing::debug!(generation, "Ignoring stale sibling failure");
                    return Ok(Step::stay(self));
                }
                Ok(self.end(EndReason::InternalError(reason)))
            }
            Command::Close => Ok(self.end(EndReason::Closed)),
        }
    }

    fn change_page(&self, index: i64) -> Result<Step> {
        let count = i64::from(self.page_count());
        let reversed = self.direction.is_reversed();

        if index == -1 {
            // Left/top edge: behind the first page, unless reading right-to-left
            return Ok(if reversed {
                self.next_chapter()
            } else {
                self.previous_chapter()
            });
        }
        if index == count {
            return Ok(if reversed {
                self.previous_chapter()
            } else {
                self.next_chapter()
            });
        }
        if !(0..count).contains(&index) {
            return Err(TankobonError::NotFound(format!(
                "page {} of chapter {} ({} pages)",
                index, self.current_chapter.id, count
            )));
        }

        let session = Self {
            current_page_index: index,
            ..self.clone()
        };
        let effects = session.prefetch_effect().into_iter().collect();
        Ok(Step {
            state: NavState::Reading(session),
            effects,
        })
    }

    fn next_chapter(&self) -> Step {
        let Some(siblings) = &self.sibling_chapters else {
            return Step::stay(self);
        };
        let current = self.current_chapter.number;
        let target = siblings.iter().find(|s| {
            s.is_readable() && cmp_asc_absent_first(s.number, current) == Ordering::Greater
        });
        match target {
            Some(target) => self.load(&target.id, false),
            None => self.end(EndReason::LastChapterInGroup),
        }
    }

    fn previous_chapter(&self) -> Step {
        let Some(siblings) = &self.sibling_chapters else {
            return Step::stay(self);
        };
        let current = self.current_chapter.number;
        let target = siblings.iter().rev().find(|s| {
            s.is_readable() && cmp_asc_absent_first(s.number, current) == Ordering::Less
        });
        match target {
            Some(target) => self.load(&target.id, true),
            None => self.end(EndReason::FirstChapterInGroup),
        }
    }

    fn jump_to(&self, number: ChapterNumber) -> Result<Step> {
        let siblings = self.sibling_chapters.as_ref().ok_or_else(|| {
            TankobonError::NotFound("sibling chapters are still loading".to_string())
        })?;
        let mut matching = siblings.iter().filter(|s| s.number == Some(number)).peekable();
        let first = matching
            .peek()
            .cloned()
            .ok_or_else(|| TankobonError::NotFound(format!("chapter {} in this group", number)))?;

        match matching.find(|s| s.is_readable()) {
            Some(target) => Ok(self.load(&target.id, false)),
            None => Err(TankobonError::NotReadable {
                id: first.id.to_string(),
                url: first.external_url.clone().unwrap_or_default(),
            }),
        }
    }

    fn chapter_loaded(
        &self,
        generation: u64,
        detail: ChapterDetail,
        start_at_last_page: bool,
    ) -> Step {
        if let Some(url) = &detail.external_url {
            return self.end(EndReason::ExternalChapter { url: url.clone() });
        }

        // Siblings stay valid only while the translation is the same
        let same_translation = detail.work_id == self.work_id
            && detail.translator_group_id == self.current_chapter.translator_group_id
            && detail.language == self.current_chapter.language;
        let siblings = if same_translation {
            self.sibling_chapters.clone()
        } else {
            None
        };

        let mut effects = Vec::new();
        if detail.id != self.current_chapter.id {
            effects.push(Effect::ReleasePages {
                chapter_id: self.current_chapter.id.clone(),
            });
        }
        let opened = Self::open(
            generation,
            detail,
            start_at_last_page,
            self.direction,
            siblings,
            self.prefetch_ahead,
        );
        effects.extend(opened.effects);
        Step {
            state: opened.state,
            effects,
        }
    }

    fn siblings_loaded_step(&self, generation: u64, siblings: Vec<ChapterDetail>) -> Step {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "Ignoring stale siblings");
            return Step::stay(self);
        }

        let current = &self.current_chapter;
        let mut siblings: Vec<ChapterDetail> = siblings
            .into_iter()
            .filter(|s| {
                s.translator_group_id == current.translator_group_id
                    && s.language == current.language
            })
            .collect();
        siblings.sort_by(|a, b| {
            cmp_asc_absent_first(a.number, b.number).then_with(|| a.id.cmp(&b.id))
        });
        tracing::debug!(generation, count = siblings.len(), "Sibling chapters loaded");

        Step {
            state: NavState::Reading(Self {
                sibling_chapters: Some(siblings.into()),
                ..self.clone()
            }),
            effects: Vec::new(),
        }
    }

    fn load(&self, chapter_id: &ChapterId, start_at_last_page: bool) -> Step {
        Step {
            state: NavState::Reading(self.clone()),
            effects: vec![Effect::LoadChapter {
                chapter_id: chapter_id.clone(),
                start_at_last_page,
            }],
        }
    }

    fn end(&self, reason: EndReason) -> Step {
        tracing::debug!(generation = self.generation, %reason, "Session ended");
        Step {
            state: NavState::Ended(SessionEnd {
                reason,
                chapter_id: self.current_chapter.id.clone(),
                generation: self.generation,
            }),
            effects: vec![
                Effect::ReleasePages {
                    chapter_id: self.current_chapter.id.clone(),
                },
                Effect::ShowChrome,
            ],
        }
    }

    fn prefetch_effect(&self) -> Option<Effect> {
        let current = self.logical_page(self.current_page_index)?;
        let end = current
            .saturating_add(self.prefetch_ahead)
            .min(self.page_count() as usize - 1);
        Some(Effect::PrefetchPages {
            chapter_id: self.current_chapter.id.clone(),
            pages: (current..=end).collect(),
        })
    }
}

/// Display index a freshly opened chapter starts at
fn initial_index(page_count: u32, direction: ReadingDirection, start_at_last_page: bool) -> i64 {
    let last = i64::from(page_count.saturating_sub(1));
    // Right-to-left displays pages reversed, so the logical start is the right end
    if direction.is_reversed() != start_at_last_page {
        last
    } else {
        0
    }
}
