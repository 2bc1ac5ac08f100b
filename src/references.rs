//! Link resolution for document bodies.
//!
//! Stage 3 of the pipeline. Runs only after every document has been
//! validated, because cross-post links need the full set of identifiers.
//!
//! ## Reference Labels
//!
//! Markdown reference links (`[text][label]`, `[label][]`, `[label]`) must
//! have a matching definition (`[label]: target`) in the same scope. A
//! scope is one document body, or one year section of the talks index. A
//! use without a definition is a [`ReferenceError::DanglingReference`]; the
//! build fails rather than publishing a dead link.
//!
//! Markdown reads `x[0]` in prose as a shortcut reference to label `0`, so
//! it fails as a dangling reference. Put code in backticks.
//!
//! A label defined twice in one scope with two different targets is a
//! [`ReferenceError::DuplicateDefinition`]. Markdown would silently keep the
//! first one, which is rarely what the author meant.
//!
//! ## Targets
//!
//! | Target                  | Resolves to                                  |
//! |-------------------------|----------------------------------------------|
//! | `https://…`, `mailto:…` | unchanged                                    |
//! | `//cdn.example/x`       | unchanged                                    |
//! | `#section`              | unchanged                                    |
//! | `/slides/gdb.pdf`       | `base_url` + `slides/gdb.pdf`                |
//! | `slides/gdb.pdf`        | `base_url` + source directory + `slides/gdb.pdf` |
//! | `post:posts/2016-01-01-gdb` | published URL of that document           |

use crate::types::Document;
use pulldown_cmark::{BrokenLink, CowStr, Event, LinkType, Options, Parser, Tag};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::ops::Range;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

/// Scheme of cross-post short links: `post:<identifier>`.
pub const POST_SCHEME: &str = "post:";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("{document}:{line}: reference to undefined link label `{label}`")]
    DanglingReference {
        label: String,
        document: String,
        line: usize,
    },
    #[error(
        "{scope}:{line}: link label `{label}` already defined on line {first_line} with a different target"
    )]
    DuplicateDefinition {
        label: String,
        scope: String,
        line: usize,
        first_line: usize,
    },
    #[error("{document}:{line}: `{target}` points to a draft that won't be published")]
    UnpublishedTarget {
        target: String,
        document: String,
        line: usize,
    },
    #[error("{document}:{line}: cannot resolve link target `{target}`: {reason}")]
    InvalidTarget {
        target: String,
        document: String,
        line: usize,
        reason: String,
    },
}

/// Whether a resolved link came from a link or an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Link,
    Image,
}

/// One resolved link: where it appears and where it ends up pointing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLink {
    /// Document identifier (or talks scope) containing the link.
    pub source: String,
    /// 1-based line in the source file.
    pub line: usize,
    pub kind: LinkKind,
    /// Reference label, for reference-style links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Target as written (after label lookup).
    pub target: String,
    pub url: String,
}

/// Where a piece of markdown lives, for resolving relative targets and
/// reporting errors.
#[derive(Debug, Clone, Copy)]
pub struct LinkSource<'a> {
    /// Name used in diagnostics and [`ResolvedLink::source`].
    pub name: &'a str,
    /// Source directory relative to the content root, empty for top level.
    pub dir: &'a str,
    /// Drafts may link to other drafts.
    pub draft: bool,
    /// 1-based line of the text's first line in its file.
    pub first_line: usize,
}

impl<'a> LinkSource<'a> {
    pub fn for_document(doc: &'a Document) -> Self {
        Self {
            name: &doc.identifier,
            dir: doc.section(),
            draft: doc.draft,
            first_line: doc.body_line,
        }
    }

    /// File line of a byte offset into the scoped text.
    pub fn line_at(&self, text: &str, offset: usize) -> usize {
        let offset = offset.min(text.len());
        self.first_line + text.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count()
    }
}

#[derive(Debug, Clone)]
struct PostTarget {
    permalink: String,
    draft: bool,
}

/// Resolves link targets to final URLs.
///
/// Built once from the full document collection and then shared read-only
/// across all resolution work.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    base: Url,
    posts: HashMap<String, PostTarget>,
    /// Documents that exist but failed validation. Their own errors already
    /// fail the build, so short links to them are not reported again.
    unvalidated: HashSet<String>,
}

impl LinkResolver {
    pub fn new(base: Url, documents: &[Document]) -> Self {
        let posts = documents
            .iter()
            .map(|d| {
                (
                    d.identifier.clone(),
                    PostTarget {
                        permalink: d.permalink.clone(),
                        draft: d.draft,
                    },
                )
            })
            .collect();
        Self {
            base,
            posts,
            unvalidated: HashSet::new(),
        }
    }

    /// Mark identifiers of documents that exist on disk but failed to load
    /// or validate.
    pub fn with_unvalidated(mut self, identifiers: impl IntoIterator<Item = String>) -> Self {
        self.unvalidated.extend(identifiers);
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL of a site-relative permalink.
    pub fn absolute(&self, permalink: &str) -> Result<Url, url::ParseError> {
        self.base.join(permalink.trim_start_matches('/'))
    }

    /// Resolve one link target as written in `source`.
    pub fn resolve(
        &self,
        target: &str,
        source: &LinkSource<'_>,
        line: usize,
    ) -> Result<String, ReferenceError> {
        let target = target.trim();
        if target.is_empty() || target.starts_with('#') || target.starts_with("//") {
            return Ok(target.to_string());
        }

        let invalid = |reason: String| ReferenceError::InvalidTarget {
            target: target.to_string(),
            document: source.name.to_string(),
            line,
            reason,
        };

        if let Some(rest) = target.strip_prefix(POST_SCHEME) {
            let (id, fragment) = match rest.split_once('#') {
                Some((id, frag)) => (id, Some(frag)),
                None => (rest, None),
            };
            let id = id.trim_matches('/');
            if self.unvalidated.contains(id) {
                return Ok(target.to_string());
            }
            let post = self.posts.get(id).ok_or_else(|| {
                ReferenceError::DanglingReference {
                    label: target.to_string(),
                    document: source.name.to_string(),
                    line,
                }
            })?;
            if post.draft && !source.draft {
                return Err(ReferenceError::UnpublishedTarget {
                    target: target.to_string(),
                    document: source.name.to_string(),
                    line,
                });
            }
            let mut url = self
                .absolute(&post.permalink)
                .map_err(|e| invalid(e.to_string()))?;
            url.set_fragment(fragment);
            return Ok(url.to_string());
        }

        if Url::parse(target).is_ok() {
            return Ok(target.to_string());
        }

        let resolved = match target.strip_prefix('/') {
            Some(site_path) => self.base.join(site_path),
            None if source.dir.is_empty() => self.base.join(target),
            None => self
                .base
                .join(&format!("{}/", source.dir))
                .and_then(|dir| dir.join(target)),
        };
        resolved
            .map(|url| url.to_string())
            .map_err(|e| invalid(e.to_string()))
    }
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES | Options::ENABLE_STRIKETHROUGH
}

/// Parse markdown, collecting events with their offsets and every reference
/// to an undefined label (label text, offset range).
pub fn parse_scope<'a>(
    text: &'a str,
) -> (Vec<(Event<'a>, Range<usize>)>, Vec<(String, Range<usize>)>) {
    let mut broken = Vec::new();
    let events = {
        let callback = |link: BrokenLink<'a>| -> Option<(CowStr<'a>, CowStr<'a>)> {
            broken.push((link.reference.to_string(), link.span.clone()));
            None
        };
        Parser::new_with_broken_link_callback(text, markdown_options(), Some(callback))
            .into_offset_iter()
            .collect::<Vec<_>>()
    };
    (events, broken)
}

/// Whether a link type went through a reference label.
fn is_reference(link_type: LinkType) -> bool {
    matches!(
        link_type,
        LinkType::Reference
            | LinkType::ReferenceUnknown
            | LinkType::Collapsed
            | LinkType::CollapsedUnknown
            | LinkType::Shortcut
            | LinkType::ShortcutUnknown
    )
}

/// Resolve a link or image start tag into a [`ResolvedLink`].
///
/// Returns `None` for events that aren't links.
pub fn resolve_event(
    event: &Event<'_>,
    offset: usize,
    text: &str,
    source: &LinkSource<'_>,
    resolver: &LinkResolver,
) -> Option<Result<ResolvedLink, ReferenceError>> {
    let (kind, link_type, dest_url, id) = match event {
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            id,
            ..
        }) => (LinkKind::Link, *link_type, dest_url, id),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            id,
            ..
        }) => (LinkKind::Image, *link_type, dest_url, id),
        _ => return None,
    };

    let line = source.line_at(text, offset);
    let label = is_reference(link_type).then(|| id.to_string());
    let url = match link_type {
        LinkType::Email => Ok(format!("mailto:{dest_url}")),
        _ => resolver.resolve(dest_url, source, line),
    };
    Some(url.map(|url| ResolvedLink {
        source: source.name.to_string(),
        line,
        kind,
        label,
        target: dest_url.to_string(),
        url,
    }))
}

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}\[((?:[^\]\\]|\\.)+)\]:[ \t]*(?:<([^>]*)>|(\S+))")
        .expect("definition pattern is valid")
});

/// Normalize a label the way markdown matches them: case-insensitive,
/// inner whitespace collapsed.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Byte ranges of every code block (fenced or indented) in `text`.
fn code_block_ranges(text: &str) -> Vec<Range<usize>> {
    Parser::new_ext(text, markdown_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) => Some(range),
            _ => None,
        })
        .collect()
}

/// Find labels defined more than once in one scope with different targets.
///
/// Definitions inside code blocks and footnote definitions are ignored.
pub fn duplicate_definitions(text: &str, source: &LinkSource<'_>) -> Vec<ReferenceError> {
    let code = code_block_ranges(text);
    let mut seen: HashMap<String, (String, usize)> = HashMap::new();
    let mut errors = Vec::new();
    let mut offset = 0;

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += line.len();
        if code.iter().any(|r| r.start < offset && line_start < r.end) {
            continue;
        }
        let Some(caps) = DEFINITION.captures(line.trim_end_matches(['\n', '\r'])) else {
            continue;
        };
        let raw_label = &caps[1];
        if raw_label.starts_with('^') {
            continue;
        }
        let target = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let line_no = source.first_line + idx;
        match seen.entry(normalize_label(raw_label)) {
            Entry::Vacant(slot) => {
                slot.insert((target, line_no));
            }
            Entry::Occupied(slot) => {
                let (first_target, first_line) = slot.get();
                if *first_target != target {
                    errors.push(ReferenceError::DuplicateDefinition {
                        label: raw_label.to_string(),
                        scope: source.name.to_string(),
                        line: line_no,
                        first_line: *first_line,
                    });
                }
            }
        }
    }
    errors
}

/// Resolve every link in a markdown scope, collecting all problems.
pub fn resolve_markdown(
    text: &str,
    source: &LinkSource<'_>,
    resolver: &LinkResolver,
) -> Result<Vec<ResolvedLink>, Vec<ReferenceError>> {
    let mut errors = duplicate_definitions(text, source);
    let (events, broken) = parse_scope(text);

    for (label, span) in broken {
        errors.push(ReferenceError::DanglingReference {
            label,
            document: source.name.to_string(),
            line: source.line_at(text, span.start),
        });
    }

    let mut links = Vec::new();
    for (event, range) in &events {
        match resolve_event(event, range.start, text, source, resolver) {
            Some(Ok(link)) => links.push(link),
            Some(Err(err)) => errors.push(err),
            None => {}
        }
    }

    if errors.is_empty() {
        Ok(links)
    } else {
        errors.sort_by_key(error_line);
        Err(errors)
    }
}

fn error_line(err: &ReferenceError) -> usize {
    match err {
        ReferenceError::DanglingReference { line, .. }
        | ReferenceError::DuplicateDefinition { line, .. }
        | ReferenceError::UnpublishedTarget { line, .. }
        | ReferenceError::InvalidTarget { line, .. } => *line,
    }
}

/// Resolve every link in a document body.
pub fn resolve_document(
    doc: &Document,
    resolver: &LinkResolver,
) -> Result<Vec<ResolvedLink>, Vec<ReferenceError>> {
    resolve_markdown(&doc.body, &LinkSource::for_document(doc), resolver)
}
