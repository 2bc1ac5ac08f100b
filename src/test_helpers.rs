//! Shared test utilities for the quire test suite.
//!
//! Provides fixture setup, content-file writers, and lookup helpers that
//! panic with a useful message on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let site = build_site(tmp.path()).unwrap();
//!
//! let doc = find_document(&site.publication, "gdb-internals");
//! assert_eq!(doc.title, "GDB internals");
//! ```

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tempfile::TempDir;

use crate::naming::parse_entry_name;
use crate::publish::PublicationSet;
use crate::types::Document;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/content/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write a YAML-headed content file at `rel` under `root`, creating parent
/// directories.
pub fn write_post(root: &Path, rel: &str, header: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, format!("---\n{header}\n---\n\n{body}")).unwrap();
}

// =========================================================================
// In-memory documents
// =========================================================================

/// A minimal valid document, as if loaded from `<identifier>.md`.
///
/// `date` is `YYYY-MM-DD`. The body is empty and starts on line 5.
pub fn make_document(identifier: &str, date: &str, draft: bool) -> Document {
    let (section, stem) = identifier.rsplit_once('/').unwrap_or(("", identifier));
    let slug = parse_entry_name(stem).slug;
    let permalink = if section.is_empty() {
        format!("/{slug}/")
    } else {
        format!("/{section}/{slug}/")
    };

    Document {
        identifier: identifier.to_string(),
        source_path: format!("{identifier}.md"),
        title: stem.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        draft,
        tags: BTreeSet::new(),
        slug,
        permalink,
        extra: BTreeMap::new(),
        body: String::new(),
        body_line: 5,
        content_hash: format!("hash-of-{identifier}"),
    }
}

// =========================================================================
// Lookups: panic with a clear message on miss
// =========================================================================

/// Find a published document by slug. Panics if not found.
pub fn find_document<'a>(set: &'a PublicationSet, slug: &str) -> &'a Document {
    set.iter().find(|d| d.slug == slug).unwrap_or_else(|| {
        let slugs: Vec<&str> = set.iter().map(|d| d.slug.as_str()).collect();
        panic!("document '{slug}' not found. Available: {slugs:?}")
    })
}
