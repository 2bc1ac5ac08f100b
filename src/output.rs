//! CLI output formatting for build results and failures.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. The primary display
//! for every entity (post, draft, talk) is its semantic identity, a
//! positional index and title, with source paths shown as secondary context
//! via indented `Source:` lines.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Published
//! 001 Memory-mapped I/O (2016-03-12)
//!     Source: posts/2016-03-12-mmap-io.md
//!     URL: /posts/mmap-io/
//!     Tags: io, linux
//!
//! Drafts
//!     posts/2016-06-01-simd-line-count
//!
//! Talks
//! 2016
//!     001 Debugging with GDB (slides, video)
//!
//! Links
//!     7 resolved
//!
//! Config
//!     config.toml
//! ```
//!
//! ## Errors
//!
//! ```text
//! posts/a.md: missing required field `title`
//! posts/x:3: reference to undefined link label `foo`
//!
//! build failed with 2 errors
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout or stderr.
//! Format functions are pure: no I/O, no side effects.

use crate::config::CONFIG_FILENAME;
use crate::pipeline::{BuildFailure, Site};
use crate::types::Document;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Header line plus context lines for one document.
///
/// ```text
/// 001 GDB internals (2016-01-01)
///     Source: posts/2016-01-01-gdb-internals.md
///     URL: /posts/gdb-internals/
/// ```
fn document_lines(index: usize, doc: &Document) -> Vec<String> {
    let mut lines = vec![
        format!("{} {} ({})", format_index(index), truncate(&doc.title, 60), doc.date),
        format!("{}Source: {}", indent(1), doc.source_path),
        format!("{}URL: {}", indent(1), doc.permalink),
    ];
    if !doc.tags.is_empty() {
        let tags: Vec<&str> = doc.tags.iter().map(String::as_str).collect();
        lines.push(format!("{}Tags: {}", indent(1), tags.join(", ")));
    }
    lines
}

// ============================================================================
// Check
// ============================================================================

/// Format the content inventory of a successful build.
pub fn format_check_output(site: &Site, source_root: &Path) -> Vec<String> {
    let mut lines = vec!["Published".to_string()];
    for (i, doc) in site.publication.iter().enumerate() {
        lines.extend(document_lines(i + 1, doc));
    }
    if site.publication.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }

    if !site.drafts.is_empty() {
        lines.push(String::new());
        lines.push("Drafts".to_string());
        for id in &site.drafts {
            lines.push(format!("{}{}", indent(1), id));
        }
    }

    if let Some(talks) = &site.talks {
        lines.push(String::new());
        lines.push("Talks".to_string());
        for year in &talks.years {
            lines.push(year.year.to_string());
            for (i, talk) in year.talks.iter().enumerate() {
                let labels: Vec<&str> = talk.links.iter().map(|l| l.label.as_str()).collect();
                let title = truncate(&talk.title, 60);
                if labels.is_empty() {
                    lines.push(format!("{}{} {}", indent(1), format_index(i + 1), title));
                } else {
                    lines.push(format!(
                        "{}{} {} ({})",
                        indent(1),
                        format_index(i + 1),
                        title,
                        labels.join(", ")
                    ));
                }
            }
        }
    }

    lines.push(String::new());
    lines.push("Links".to_string());
    lines.push(format!("{}{} resolved", indent(1), site.links.len()));

    lines.push(String::new());
    lines.push("Config".to_string());
    if source_root.join(CONFIG_FILENAME).exists() {
        lines.push(format!("{}{}", indent(1), CONFIG_FILENAME));
    } else {
        lines.push(format!("{}(defaults)", indent(1)));
    }
    lines.push(format!("{}base_url: {}", indent(1), site.config.base_url));

    lines
}

/// Print the inventory to stdout.
pub fn print_check_output(site: &Site, source_root: &Path) {
    for line in format_check_output(site, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

/// Summary line after `publication.json` has been written.
pub fn format_build_output(site: &Site, written: &Path) -> Vec<String> {
    let talks = site.talks.as_ref().map_or(0, |t| t.len());
    vec![
        format!(
            "Published {} document{}, {} draft{} held back, {} talk{}",
            site.publication.len(),
            plural(site.publication.len()),
            site.drafts.len(),
            plural(site.drafts.len()),
            talks,
            plural(talks),
        ),
        format!("Fingerprint {}", site.publication.fingerprint()),
        format!("Wrote {}", written.display()),
    ]
}

pub fn print_build_output(site: &Site, written: &Path) {
    for line in format_build_output(site, written) {
        println!("{}", line);
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

// ============================================================================
// Errors
// ============================================================================

/// One line per error, then the failure summary.
pub fn format_errors(failure: &BuildFailure) -> Vec<String> {
    let mut lines: Vec<String> = failure.errors.iter().map(|e| e.to_string()).collect();
    lines.push(String::new());
    lines.push(failure.to_string());
    lines
}

/// Print every error to stderr.
pub fn print_errors(failure: &BuildFailure) {
    for line in format_errors(failure) {
        eprintln!("{}", line);
    }
}
