//! Integration tests for the Tankobon CLI

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn tankobon() -> Command {
    let mut cmd = Command::cargo_bin("tankobon").unwrap();
    for var in [
        "TANKOBON_CACHE_DIR",
        "TANKOBON_CHAPTERS_PER_PAGE",
        "TANKOBON_PREFETCH_AHEAD",
        "TANKOBON_MAX_CACHE_BYTES",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Chapters 1-6 in volume 1 and chapter 7 without a volume, all by group `g`.
/// Chapters 1-3 have two image files each under `pages/`.
fn create_dump(dir: &TempDir) -> PathBuf {
    let chapters: Vec<Value> = (1..=7)
        .map(|n| {
            json!({
                "id": format!("c{}", n),
                "work_id": "w1",
                "number": n as f64,
                "volume_number": if n < 7 { Some(1.0) } else { None },
                "translator_group_id": "g",
                "page_count": 2,
            })
        })
        .collect();
    let dump = json!({
        "work_id": "w1",
        "pages_dir": "pages",
        "volumes": [
            {
                "number": "1",
                "chapters": (1..=6)
                    .map(|n| json!({ "id": format!("c{}", n), "number": n.to_string() }))
                    .collect::<Vec<_>>(),
            },
            {
                "number": null,
                "chapters": [{ "id": "c7", "number": "7" }],
            }
        ],
        "chapters": chapters,
    });

    for n in 1..=3 {
        let chapter_dir = dir.path().join("pages").join(format!("c{}", n));
        fs::create_dir_all(&chapter_dir).unwrap();
        for page in 0..2 {
            fs::write(chapter_dir.join(page.to_string()), format!("c{} page {}", n, page)).unwrap();
        }
    }
    fs::write(dir.path().join("pages").join("cover"), b"cover").unwrap();

    let path = dir.path().join("work.json");
    fs::write(&path, serde_json::to_string_pretty(&dump).unwrap()).expect("Failed to write dump");
    path
}

#[test]
fn test_help() {
    tankobon()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("paginate"))
        .stdout(predicate::str::contains("read"))
        .stdout(predicate::str::contains("prefetch"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_version() {
    tankobon()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tankobon"));
}

#[test]
fn test_paginate_help() {
    tankobon()
        .args(["paginate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--per-page"))
        .stdout(predicate::str::contains("--no-volume"));
}

#[test]
fn test_info_nonexistent_file() {
    tankobon()
        .args(["info", "/nonexistent/work.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read work dump"));
}

#[test]
fn test_info_json() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);

    let output = tankobon()
        .args(["info", dump.to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["work_id"], "w1");
    assert_eq!(info["volumes"], 1);
    assert_eq!(info["chapters"], 7);
    assert_eq!(info["groups"], json!(["g"]));
}

#[test]
fn test_paginate_no_volume_first() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);

    let output = tankobon()
        .args(["paginate", dump.to_str().unwrap(), "--per-page", "3", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let pages: Value = serde_json::from_slice(&output.stdout).unwrap();
    let pages = pages.as_array().unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0]["volumes"][0]["number"], Value::Null);
    assert_eq!(pages[0]["volumes"][0]["chapters"][0]["primary_id"], "c7");
    assert_eq!(pages[2]["volumes"][0]["chapters"][0]["primary_id"], "c1");
}

#[test]
fn test_paginate_no_volume_last() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);

    tankobon()
        .args([
            "paginate",
            dump.to_str().unwrap(),
            "--per-page",
            "3",
            "--no-volume",
            "last",
            "--page",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Page 3/3"))
        .stdout(predicate::str::contains("No volume"))
        .stdout(predicate::str::contains("c7"))
        .stdout(predicate::str::contains("c1").not());
}

#[test]
fn test_paginate_rejects_zero_per_page() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);

    tankobon()
        .args(["paginate", dump.to_str().unwrap(), "--per-page", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn test_paginate_page_out_of_range() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);

    tankobon()
        .args(["paginate", dump.to_str().unwrap(), "--page", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_read_to_last_chapter() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);
    let cache_dir = dir.path().join("cache");

    tankobon()
        .args([
            "read",
            dump.to_str().unwrap(),
            "--chapter",
            "c5",
            "--cache-dir",
            cache_dir.to_str().unwrap(),
            "--steps",
            "page:1,next,next,next",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("open     c5 (ch. 5) page 1/2"))
        .stdout(predicate::str::contains("page:1   c5 (ch. 5) page 2/2"))
        .stdout(predicate::str::contains("next     c6 (ch. 6) page 1/2"))
        .stdout(predicate::str::contains("ended: last chapter in group"));
}

#[test]
fn test_read_rtl_left_edge_goes_forward() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);
    let cache_dir = dir.path().join("cache");

    tankobon()
        .args([
            "read",
            dump.to_str().unwrap(),
            "--chapter",
            "c2",
            "--direction",
            "rtl",
            "--cache-dir",
            cache_dir.to_str().unwrap(),
            "--steps",
            "page:-1,jump:9",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("page:-1  c3 (ch. 3) page 1/2"))
        .stdout(predicate::str::contains("jump:9   error:"));
}

#[test]
fn test_prefetch_then_read_offline() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);
    let cache_dir = dir.path().join("cache");
    let cache_arg = cache_dir.to_str().unwrap();

    tankobon()
        .args(["prefetch", dump.to_str().unwrap(), "--chapter", "c1", "--cache-dir", cache_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cached 2 pages of chapter c1"));

    tankobon()
        .args(["cache", "--cache-dir", cache_arg, "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c1-0"))
        .stdout(predicate::str::contains("c1-1"))
        .stdout(predicate::str::contains("cover-w1"));

    tankobon()
        .args([
            "read",
            dump.to_str().unwrap(),
            "--chapter",
            "c1",
            "--offline",
            "--cache-dir",
            cache_arg,
            "--steps",
            "page:1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("page:1   c1 (ch. 1) page 2/2"));
}

#[test]
fn test_cache_maintenance() {
    let dir = TempDir::new().unwrap();
    let dump = create_dump(&dir);
    let cache_dir = dir.path().join("cache");
    let cache_arg = cache_dir.to_str().unwrap();

    for chapter in ["c1", "c2"] {
        tankobon()
            .args(["prefetch", dump.to_str().unwrap(), "--chapter", chapter, "--cache-dir", cache_arg])
            .assert()
            .success();
    }

    let output = tankobon()
        .args(["cache", "--cache-dir", cache_arg, "stats", "--json"])
        .output()
        .unwrap();
    let stats: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["entries"], 5);

    tankobon()
        .args(["cache", "--cache-dir", cache_arg, "evict-chapter", "c1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Evicted 2 pages of chapter c1"));

    tankobon()
        .args(["cache", "--cache-dir", cache_arg, "evict", "c1-0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not cached: c1-0"));

    tankobon()
        .args(["cache", "--cache-dir", cache_arg, "prune", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruned 3 entries"));

    tankobon()
        .args(["cache", "--cache-dir", cache_arg, "prune"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No size limit"));
}
