//! Content discovery and header/body splitting.
//!
//! Stage 1 of the pipeline. Walks the content root, picks out content
//! documents, and splits each one into its raw header text and body text.
//! Nothing here interprets header fields; that is [`crate::metadata`]'s job.
//!
//! ## Directory Structure
//!
//! ```text
//! content/
//! ├── config.toml                        # Site configuration (optional)
//! ├── talks.md                           # Talks index (optional, see `talks`)
//! ├── about.md                           # → identifier "about"
//! └── posts/
//!     ├── 2016-01-01-gdb-internals.md    # → identifier "posts/2016-01-01-gdb-internals"
//!     └── slides/
//!         └── gdb.pdf                    # Not content, only a link target
//! ```
//!
//! ## Header Blocks
//!
//! A document starts with a fenced header. The fence picks the format:
//!
//! ```text
//! ---                      +++
//! title: Hello             title = "Hello"
//! date: 2016-01-01         date = 2016-01-01
//! ---                      +++
//!
//! Body text...             Body text...
//! ```
//!
//! One blank line between the closing fence and the body is consumed.

use crate::config::SiteConfig;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document {path}: {reason}")]
    MalformedDocument { path: PathBuf, reason: String },
}

impl LoadError {
    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        LoadError::MalformedDocument {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unreadable(path: &Path, source: std::io::Error) -> Self {
        LoadError::UnreadableSource {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The file the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            LoadError::UnreadableSource { path, .. } | LoadError::MalformedDocument { path, .. } => {
                path
            }
        }
    }
}

/// Syntax of a header block, chosen by its fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFormat {
    /// `---` fences
    Yaml,
    /// `+++` fences
    Toml,
}

impl HeaderFormat {
    fn from_fence(line: &str) -> Option<Self> {
        match line.trim_end() {
            "---" => Some(HeaderFormat::Yaml),
            "+++" => Some(HeaderFormat::Toml),
            _ => None,
        }
    }

    fn fence(self) -> &'static str {
        match self {
            HeaderFormat::Yaml => "---",
            HeaderFormat::Toml => "+++",
        }
    }
}

/// A content file split into header and body, not yet validated.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Content path relative to the root, extension removed, `/`-separated.
    pub identifier: String,
    /// Path relative to the content root, `/`-separated.
    pub source_path: String,
    pub format: HeaderFormat,
    /// Header text between the fences.
    pub header: String,
    pub body: String,
    /// 1-based line in the source file where the body starts.
    pub body_line: usize,
    /// SHA-256 of the file bytes, hex encoded.
    pub content_hash: String,
}

/// Header and body of a document, as split from its text.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDocument<'a> {
    pub format: HeaderFormat,
    pub header: &'a str,
    pub body: &'a str,
    pub body_line: usize,
}

/// Split a document's text into header and body.
///
/// Returns `Ok(None)` when the text doesn't start with a fence at all, and
/// an error when a fence is opened but never closed.
pub fn split_header<'a>(content: &'a str, path: &Path) -> Result<Option<SplitDocument<'a>>, LoadError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let first_end = content.find('\n').unwrap_or(content.len());
    let Some(format) = HeaderFormat::from_fence(content[..first_end].trim_end_matches('\r')) else {
        return Ok(None);
    };

    let header_start = (first_end + 1).min(content.len());
    let mut offset = header_start;
    let mut line_no = 1;
    for line in content[header_start..].split_inclusive('\n') {
        line_no += 1;
        let bare = line.trim_end_matches(['\n', '\r']);
        if bare.trim_end() == format.fence() {
            let header = &content[header_start..offset];
            let mut body_start = offset + line.len();
            let mut body_line = line_no + 1;
            // Consume the blank separator line, if any.
            let rest = &content[body_start..];
            let first_rest_end = rest.find('\n');
            if let Some(end) = first_rest_end
                && rest[..end].trim().is_empty()
            {
                body_start += end + 1;
                body_line += 1;
            }
            return Ok(Some(SplitDocument {
                format,
                header,
                body: &content[body_start..],
                body_line,
            }));
        }
        offset += line.len();
    }

    Err(LoadError::malformed(
        path,
        format!("header opened with `{}` is never closed", format.fence()),
    ))
}

/// Find every content document under `root`, sorted by path.
///
/// Hidden entries and the talks index are skipped. Walk failures are
/// collected rather than aborting, so one unreadable directory doesn't hide
/// problems elsewhere.
pub fn discover(root: &Path, config: &SiteConfig) -> (Vec<PathBuf>, Vec<LoadError>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();

    if !root.is_dir() {
        errors.push(LoadError::unreadable(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "content root is not a directory"),
        ));
        return (files, errors);
    }

    let talks_index = root.join(&config.talks_index);

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                errors.push(LoadError::unreadable(&path, std::io::Error::from(err)));
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path == talks_index {
            continue;
        }
        let is_content = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| config.is_content_extension(e));
        if is_content {
            files.push(path.to_path_buf());
        }
    }

    (files, errors)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Identifier for a content file: relative path, extension removed,
/// `/`-separated regardless of platform.
pub fn identifier_for(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = rel.with_extension("");
    to_slash(&rel)
}

/// Relative `/`-separated path for display and link resolution.
pub fn relative_source(root: &Path, path: &Path) -> String {
    to_slash(path.strip_prefix(root).unwrap_or(path))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read one content file and split it.
///
/// Returns `Ok(None)` for a header-less file when `strict` is off.
pub fn load_document(root: &Path, path: &Path, strict: bool) -> Result<Option<RawDocument>, LoadError> {
    let bytes = fs::read(path).map_err(|e| LoadError::unreadable(path, e))?;
    let content_hash = format!("{:x}", Sha256::digest(&bytes));
    let content = String::from_utf8(bytes)
        .map_err(|_| LoadError::malformed(path, "file is not valid UTF-8"))?;

    let Some(split) = split_header(&content, path)? else {
        if strict {
            return Err(LoadError::malformed(
                path,
                "missing header block (expected `---` or `+++` on the first line)",
            ));
        }
        tracing::warn!(path = %path.display(), "skipping file without header block");
        return Ok(None);
    };

    Ok(Some(RawDocument {
        identifier: identifier_for(root, path),
        source_path: relative_source(root, path),
        format: split.format,
        header: split.header.to_string(),
        body: split.body.to_string(),
        body_line: split.body_line,
        content_hash,
    }))
}
