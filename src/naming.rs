//! Filename conventions for content documents.
//!
//! Posts are commonly named with a leading date, `YYYY-MM-DD-title.md`. The
//! date prefix keeps files sorted in editors and listings but is noise in a
//! URL, so it is stripped when deriving the slug:
//!
//! - `2016-01-01-gdb-internals` → slug "gdb-internals"
//! - `about` → slug "about"
//! - `2016-01-01` → slug "2016-01-01" (nothing left after the prefix)
//!
//! The filename date is never used as the publication date; that always
//! comes from the header.

use chrono::NaiveDate;

/// Result of parsing a content file stem like `2016-01-01-gdb-internals`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Date prefix if present and a valid calendar date.
    pub date: Option<NaiveDate>,
    /// Stem with the date prefix removed. Falls back to the full stem when
    /// nothing follows the prefix.
    pub slug: String,
}

/// Length of a `YYYY-MM-DD` prefix.
const DATE_PREFIX_LEN: usize = 10;

/// Parse a file stem following the optional `YYYY-MM-DD-name` convention.
pub fn parse_entry_name(stem: &str) -> ParsedName {
    if let Some(prefix) = stem.get(..DATE_PREFIX_LEN)
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        let rest = stem[DATE_PREFIX_LEN..].trim_start_matches('-');
        let slug = if rest.is_empty() { stem } else { rest };
        return ParsedName {
            date: Some(date),
            slug: slug.to_string(),
        };
    }
    ParsedName {
        date: None,
        slug: stem.to_string(),
    }
}

const MAX_SLUG_LEN: usize = 80;

/// Sanitize a string for use as a URL path segment.
///
/// - Lowercases ASCII letters
/// - Replaces anything other than ASCII alphanumerics, `-` and `_` with dashes
/// - Collapses consecutive dashes and strips leading/trailing ones
/// - Truncates to `MAX_SLUG_LEN` characters (breaks at last dash before limit)
pub fn sanitize_slug(title: &str) -> String {
    let mut collapsed = String::with_capacity(title.len());
    let mut prev_dash = false;
    for c in title.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if c == '-' {
            if !prev_dash {
                collapsed.push('-');
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    if trimmed.len() <= MAX_SLUG_LEN {
        return trimmed.to_string();
    }

    let truncated = &trimmed[..MAX_SLUG_LEN];
    match truncated.rfind('-') {
        Some(pos) if pos > 0 => truncated[..pos].to_string(),
        _ => truncated.to_string(),
    }
}
