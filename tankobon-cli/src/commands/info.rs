//! Info command implementation

use crate::dump::WorkDump;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tankobon_core::ChapterIndex;

/// Work info output
#[derive(Serialize)]
struct WorkInfo {
    work_id: String,
    volumes: usize,
    chapters: usize,
    translations: usize,
    unnumbered: usize,
    groups: Vec<String>,
    languages: Vec<String>,
    external: usize,
}

/// Display information about a work dump
pub fn info(input: &Path, json: bool) -> Result<()> {
    let dump = WorkDump::load(input)?;
    let volumes = ChapterIndex::normalize_volumes(&dump.volumes);

    let groups: BTreeSet<String> = dump
        .chapters
        .iter()
        .filter_map(|c| c.translator_group_id.as_ref().map(|g| g.to_string()))
        .collect();
    let languages: BTreeSet<String> = dump.chapters.iter().map(|c| c.language.clone()).collect();

    let info = WorkInfo {
        work_id: dump.work_id.to_string(),
        volumes: volumes.iter().filter(|v| v.number.is_some()).count(),
        chapters: volumes.iter().map(|v| v.chapters.len()).sum(),
        translations: volumes
            .iter()
            .flat_map(|v| v.chapters.iter())
            .map(|c| c.ids().count())
            .sum(),
        unnumbered: volumes
            .iter()
            .flat_map(|v| v.chapters.iter())
            .filter(|c| c.number.is_none())
            .count(),
        groups: groups.into_iter().collect(),
        languages: languages.into_iter().collect(),
        external: dump.chapters.iter().filter(|c| !c.is_readable()).count(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Work:         {}", info.work_id);
        println!("Volumes:      {}", info.volumes);
        println!("Chapters:     {}", info.chapters);
        println!("Translations: {}", info.translations);
        if info.unnumbered > 0 {
            println!("Unnumbered:   {}", info.unnumbered);
        }
        if !info.groups.is_empty() {
            println!("Groups:       {}", info.groups.join(", "));
        }
        if !info.languages.is_empty() {
            println!("Languages:    {}", info.languages.join(", "));
        }
        if info.external > 0 {
            println!("External:     {}", info.external);
        }
    }

    Ok(())
}
