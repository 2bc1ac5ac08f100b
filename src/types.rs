//! Shared types passed between pipeline stages and handed to the renderer.

use crate::loader::RawDocument;
use crate::metadata::Frontmatter;
use crate::naming::{parse_entry_name, sanitize_slug};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Length of the content-hash prefix used as a slug when the file name has
/// nothing usable.
const HASH_SLUG_LEN: usize = 12;

/// A validated content document.
///
/// Identity comes from the content path, so the same file always produces the
/// same `identifier` and `permalink` across rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Content path relative to the root, extension removed (`posts/2016-01-01-gdb`).
    pub identifier: String,
    /// Source file relative to the content root.
    pub source_path: String,
    pub title: String,
    pub date: NaiveDate,
    pub draft: bool,
    pub tags: BTreeSet<String>,
    /// URL slug: header `slug` if given, else the file stem minus its date
    /// prefix, else a prefix of the content hash.
    pub slug: String,
    /// Site-relative URL, always `/`-delimited (`/posts/gdb/`).
    pub permalink: String,
    /// Header fields this crate doesn't interpret.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
    /// Raw markdown, handed to the renderer untouched.
    pub body: String,
    /// 1-based line in the source file where the body starts.
    #[serde(skip)]
    pub body_line: usize,
    /// SHA-256 of the source file.
    pub content_hash: String,
}

impl Document {
    /// Combine a loaded file with its validated header.
    pub fn new(raw: RawDocument, front: Frontmatter) -> Self {
        let stem = raw
            .identifier
            .rsplit('/')
            .next()
            .unwrap_or(&raw.identifier)
            .to_string();
        let slug = match &front.slug {
            Some(slug) => sanitize_slug(slug),
            None => sanitize_slug(&parse_entry_name(&stem).slug),
        };
        let slug = if slug.is_empty() { sanitize_slug(&stem) } else { slug };
        // Stems with no ASCII letters or digits sanitize to nothing.
        let slug = if slug.is_empty() {
            raw.content_hash.chars().take(HASH_SLUG_LEN).collect()
        } else {
            slug
        };
        let permalink = match section_of(&raw.identifier) {
            "" => format!("/{slug}/"),
            section => format!("/{section}/{slug}/"),
        };

        Self {
            identifier: raw.identifier,
            source_path: raw.source_path,
            title: front.title,
            date: front.date,
            draft: front.draft,
            tags: front.tags,
            slug,
            permalink,
            extra: front.extra,
            body: raw.body,
            body_line: raw.body_line,
            content_hash: raw.content_hash,
        }
    }

    /// Directory of the source file relative to the content root
    /// (`posts` for `posts/2016-01-01-gdb`, empty for top-level files).
    pub fn section(&self) -> &str {
        section_of(&self.identifier)
    }
}

fn section_of(identifier: &str) -> &str {
    identifier.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}
