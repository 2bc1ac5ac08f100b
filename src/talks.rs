//! Talks index parsing.
//!
//! The talks archive is one markdown document grouped by year headings. Each
//! top-level list item under a year is one talk: the text before its first
//! link is the title, and its links are the talk's resources, keyed by link
//! text.
//!
//! ```markdown
//! ## 2016
//!
//! - Inside gdb: how breakpoints work — [slides][gdb], [video](https://youtu.be/abc)
//! - Memory-mapped I/O in practice ([slides](slides/mmap.pdf))
//!
//! [gdb]: slides/gdb.pdf
//!
//! ## 2015
//!
//! - Counting lines with SIMD — [slides][simd]
//!
//! [simd]: slides/simd.pdf
//! ```
//!
//! Reference labels are scoped to their year section: `[slides][gdb]` in
//! 2016 cannot use a definition from 2015, and each section may reuse a label
//! name freely. Years are listed newest first; talks within a year keep
//! their order in the file.

use crate::references::{
    LinkResolver, LinkSource, ReferenceError, duplicate_definitions, parse_scope, resolve_event,
};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TalksError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// A labelled resource of a talk (slides, video, code...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalkLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalkEntry {
    pub title: String,
    pub year: i32,
    /// Resources in the order they appear in the entry.
    pub links: Vec<TalkLink>,
}

impl TalkEntry {
    /// Look up a resource by label, case-insensitively.
    pub fn link(&self, label: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.label.eq_ignore_ascii_case(label))
            .map(|l| l.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalkYear {
    pub year: i32,
    pub talks: Vec<TalkEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalksIndex {
    /// Source file relative to the content root.
    pub source_path: String,
    /// Newest year first.
    pub years: Vec<TalkYear>,
}

impl TalksIndex {
    /// All talks, newest year first.
    pub fn entries(&self) -> impl Iterator<Item = &TalkEntry> {
        self.years.iter().flat_map(|y| y.talks.iter())
    }

    pub fn len(&self) -> usize {
        self.years.iter().map(|y| y.talks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}$").expect("year pattern is valid"));

/// One chunk of the index: the text under a year heading, or the preamble.
struct Section<'a> {
    year: Option<i32>,
    /// Text of a non-year heading that ended the previous year section.
    heading: Option<String>,
    text: &'a str,
    first_line: usize,
}

/// A heading that starts a new section.
struct Boundary {
    range: Range<usize>,
    year: Option<i32>,
    title: String,
}

/// Split the index at its year headings.
///
/// Headings come from the markdown parser, so a `## 2015` line inside a code
/// block is not a boundary and setext headings are. A non-year heading at
/// the level of the year headings (or above) closes the current year; any
/// talk listed under it is malformed. Deeper headings (`### Keynotes` under
/// `## 2016`) stay inside their year.
fn split_sections(text: &str, first_line: usize) -> Vec<Section<'_>> {
    let mut boundaries: Vec<Boundary> = Vec::new();
    let mut year_level: Option<usize> = None;
    let mut open: Option<(usize, Range<usize>, String)> = None;

    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                open = Some((level as usize, range, String::new()));
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, _, title)) = open.as_mut() {
                    title.push_str(&t);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                let Some((level, range, title)) = open.take() else {
                    continue;
                };
                let title = title.trim().to_string();
                let year = YEAR
                    .is_match(&title)
                    .then(|| title.parse::<i32>().ok())
                    .flatten();
                if year.is_some() {
                    year_level = Some(level);
                    boundaries.push(Boundary { range, year, title });
                } else if year_level.is_some_and(|l| level <= l) {
                    boundaries.push(Boundary { range, year, title });
                }
            }
            _ => {}
        }
    }

    let line_of = |offset: usize| first_line + text[..offset].matches('\n').count();
    let mut sections = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    let mut year = None;
    let mut heading = None;
    for boundary in boundaries {
        sections.push(Section {
            year,
            heading: heading.take(),
            text: &text[start..boundary.range.start],
            first_line: line_of(start),
        });
        start = boundary.range.end;
        year = boundary.year;
        heading = boundary.year.is_none().then_some(boundary.title);
    }
    sections.push(Section {
        year,
        heading,
        text: &text[start..],
        first_line: line_of(start),
    });
    sections
}

/// Characters trimmed from the ends of a talk title.
const TITLE_SEPARATORS: &[char] = &['-', '–', '—', ':', '|', '·', ',', '(', '['];

fn clean_title(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || TITLE_SEPARATORS.contains(&c))
        .to_string()
}

#[derive(Default)]
struct EntryBuilder {
    line: usize,
    title: String,
    title_done: bool,
    links: Vec<TalkLink>,
}

/// Parse a talks index.
///
/// `text` is the document body (header already removed), starting at file
/// line `first_line`. `dir` is the index's directory relative to the content
/// root, used for relative link targets.
pub fn parse_talks(
    text: &str,
    source_path: &str,
    dir: &str,
    first_line: usize,
    resolver: &LinkResolver,
) -> Result<TalksIndex, Vec<TalksError>> {
    let mut errors: Vec<TalksError> = Vec::new();
    let mut years: Vec<TalkYear> = Vec::new();

    for section in split_sections(text, first_line) {
        let scope = match section.year {
            Some(year) => format!("{source_path} ({year})"),
            None => source_path.to_string(),
        };
        let source = LinkSource {
            name: &scope,
            dir,
            draft: false,
            first_line: section.first_line,
        };

        errors.extend(
            duplicate_definitions(section.text, &source)
                .into_iter()
                .map(TalksError::from),
        );
        let (events, broken) = parse_scope(section.text);
        errors.extend(broken.into_iter().map(|(label, span)| {
            TalksError::Reference(ReferenceError::DanglingReference {
                label,
                document: scope.clone(),
                line: source.line_at(section.text, span.start),
            })
        }));

        let mut talks = Vec::new();
        let mut list_depth = 0usize;
        let mut entry: Option<EntryBuilder> = None;
        let mut link_label: Option<String> = None;
        let mut link_url: Option<String> = None;

        for (event, range) in &events {
            match event {
                Event::Start(Tag::List(_)) => list_depth += 1,
                Event::End(TagEnd::List(_)) => list_depth = list_depth.saturating_sub(1),
                Event::Start(Tag::Item) if list_depth == 1 => {
                    let line = source.line_at(section.text, range.start);
                    if section.year.is_none() {
                        let reason = match &section.heading {
                            Some(heading) => {
                                format!("talk listed under `{heading}`, which is not a year")
                            }
                            None => "talk listed before any year heading".to_string(),
                        };
                        errors.push(TalksError::Malformed { line, reason });
                    }
                    entry = Some(EntryBuilder {
                        line,
                        ..EntryBuilder::default()
                    });
                }
                Event::End(TagEnd::Item) if list_depth == 1 => {
                    let (Some(built), Some(year)) = (entry.take(), section.year) else {
                        continue;
                    };
                    let mut title = clean_title(&built.title);
                    if title.is_empty()
                        && let Some(first) = built.links.first()
                    {
                        title = clean_title(&first.label);
                    }
                    if title.is_empty() {
                        errors.push(TalksError::Malformed {
                            line: built.line,
                            reason: "talk entry has no title".into(),
                        });
                        continue;
                    }
                    talks.push(TalkEntry {
                        title,
                        year,
                        links: built.links,
                    });
                }
                Event::Start(Tag::Link { .. }) | Event::Start(Tag::Image { .. })
                    if entry.is_some() =>
                {
                    if let Some(built) = entry.as_mut() {
                        built.title_done = true;
                    }
                    if matches!(event, Event::Start(Tag::Image { .. })) {
                        // Images inside an entry are decoration; still resolve them.
                        if let Some(Err(err)) =
                            resolve_event(event, range.start, section.text, &source, resolver)
                        {
                            errors.push(err.into());
                        }
                        continue;
                    }
                    link_label = Some(String::new());
                    link_url = match resolve_event(event, range.start, section.text, &source, resolver)
                    {
                        Some(Ok(link)) => Some(link.url),
                        Some(Err(err)) => {
                            errors.push(err.into());
                            None
                        }
                        None => None,
                    };
                }
                Event::End(TagEnd::Link) => {
                    if let (Some(label), Some(url), Some(built)) =
                        (link_label.take(), link_url.take(), entry.as_mut())
                    {
                        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
                        let label = if label.is_empty() { "link".to_string() } else { label };
                        built.links.push(TalkLink { label, url });
                    }
                }
                Event::Text(t) | Event::Code(t) => {
                    if let Some(label) = link_label.as_mut() {
                        label.push_str(t);
                    } else if list_depth == 1
                        && let Some(built) = entry.as_mut()
                        && !built.title_done
                    {
                        built.title.push_str(t);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if let Some(label) = link_label.as_mut() {
                        label.push(' ');
                    } else if let Some(built) = entry.as_mut()
                        && !built.title_done
                    {
                        built.title.push(' ');
                    }
                }
                Event::Start(Tag::Link { .. } | Tag::Image { .. }) => {
                    // Links outside any entry (prose) are still checked.
                    if let Some(Err(err)) =
                        resolve_event(event, range.start, section.text, &source, resolver)
                    {
                        errors.push(err.into());
                    }
                }
                _ => {}
            }
        }

        if let Some(year) = section.year
            && !talks.is_empty()
        {
            match years.iter_mut().find(|y| y.year == year) {
                Some(existing) => existing.talks.extend(talks),
                None => years.push(TalkYear { year, talks }),
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    years.sort_by(|a, b| b.year.cmp(&a.year));
    Ok(TalksIndex {
        source_path: source_path.to_string(),
        years,
    })
}
