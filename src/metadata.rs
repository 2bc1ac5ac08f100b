//! Header validation: raw header text → typed [`Frontmatter`].
//!
//! Stage 2 of the pipeline. A header is parsed into a generic value first
//! (YAML or TOML, depending on its fence) and then checked field by field, so
//! that one header with several problems reports all of them at once.
//!
//! ## Fields
//!
//! | Field   | Type            | Required | Default |
//! |---------|-----------------|----------|---------|
//! | `title` | string          | yes      | —       |
//! | `date`  | date            | yes      | —       |
//! | `draft` | bool            | no       | `false` |
//! | `tags`  | list of strings | no       | empty   |
//! | `slug`  | string          | no       | from filename |
//!
//! Any other key is kept verbatim in [`Frontmatter::extra`] so themes can use
//! fields this crate knows nothing about.
//!
//! ## Dates
//!
//! Accepted forms, all reduced to a calendar date:
//!
//! - `2016-01-01`
//! - `2016-01-01T10:30:00Z`, `2016-01-01T10:30:00+02:00` (RFC 3339)
//! - `2016-01-01T10:30:00`, `2016-01-01 10:30:00`

use crate::loader::HeaderFormat;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("header is not valid {format}: {reason}")]
    Syntax { format: &'static str, reason: String },
    #[error("header must be a key/value mapping")]
    NotAMapping,
    #[error("missing required field `{0}`")]
    MissingRequiredField(&'static str),
    #[error("invalid date `{0}` (expected YYYY-MM-DD or an RFC 3339 timestamp)")]
    InvalidDateFormat(String),
    #[error("field `{field}` must be {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
    },
}

impl MetadataError {
    /// Whether the header couldn't be read at all, as opposed to a field
    /// problem in a readable header.
    pub fn is_malformed(&self) -> bool {
        matches!(self, MetadataError::Syntax { .. } | MetadataError::NotAMapping)
    }
}

/// Validated header fields of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frontmatter {
    pub title: String,
    pub date: NaiveDate,
    pub draft: bool,
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Frontmatter {
    /// Serialize back to a YAML header (without fences).
    ///
    /// Parsing the result with [`parse_header`] yields an equal value.
    pub fn to_yaml(&self) -> Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(&self.to_map())
    }

    fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map.insert("title".into(), Value::String(self.title.clone()));
        map.insert(
            "date".into(),
            Value::String(self.date.format("%Y-%m-%d").to_string()),
        );
        if self.draft {
            map.insert("draft".into(), Value::Bool(true));
        }
        if !self.tags.is_empty() {
            map.insert(
                "tags".into(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(slug) = &self.slug {
            map.insert("slug".into(), Value::String(slug.clone()));
        }
        map
    }
}

/// Parse and validate a header block.
///
/// Returns every problem found, not just the first. Syntax errors stop
/// validation early since there are no fields to check.
pub fn parse_header(format: HeaderFormat, text: &str) -> Result<Frontmatter, Vec<MetadataError>> {
    let fields = parse_fields(format, text).map_err(|e| vec![e])?;
    validate_fields(fields)
}

fn parse_fields(format: HeaderFormat, text: &str) -> Result<Map<String, Value>, MetadataError> {
    let value = match format {
        HeaderFormat::Yaml => {
            if text.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_yaml_ng::from_str::<Value>(text).map_err(|e| MetadataError::Syntax {
                    format: "YAML",
                    reason: e.to_string(),
                })?
            }
        }
        HeaderFormat::Toml => {
            let table = toml::from_str::<toml::Table>(text).map_err(|e| MetadataError::Syntax {
                format: "TOML",
                reason: e.message().to_string(),
            })?;
            toml_to_json(toml::Value::Table(table))
        }
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(MetadataError::NotAMapping),
    }
}

/// Convert TOML to JSON, rendering datetimes as their TOML text so they go
/// through the same date parsing as YAML strings.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn validate_fields(mut fields: Map<String, Value>) -> Result<Frontmatter, Vec<MetadataError>> {
    let mut errors = Vec::new();

    let title = match fields.remove("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            errors.push(MetadataError::MissingRequiredField("title"));
            None
        }
        Some(_) => {
            errors.push(MetadataError::InvalidFieldType {
                field: "title",
                expected: "a string",
            });
            None
        }
    };

    let date = match fields.remove("date") {
        Some(Value::String(s)) => match parse_date(&s) {
            Some(date) => Some(date),
            None => {
                errors.push(MetadataError::InvalidDateFormat(s));
                None
            }
        },
        Some(Value::Null) | None => {
            errors.push(MetadataError::MissingRequiredField("date"));
            None
        }
        Some(other) => {
            errors.push(MetadataError::InvalidDateFormat(other.to_string()));
            None
        }
    };

    let draft = match fields.remove("draft") {
        Some(Value::Bool(b)) => b,
        Some(Value::Null) | None => false,
        Some(_) => {
            errors.push(MetadataError::InvalidFieldType {
                field: "draft",
                expected: "true or false",
            });
            false
        }
    };

    let tags = match fields.remove("tags") {
        Some(Value::Array(items)) => {
            let mut tags = BTreeSet::new();
            let mut ok = true;
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        tags.insert(s.trim().to_string());
                    }
                    _ => ok = false,
                }
            }
            if !ok {
                errors.push(MetadataError::InvalidFieldType {
                    field: "tags",
                    expected: "a list of non-empty strings",
                });
            }
            tags
        }
        Some(Value::Null) | None => BTreeSet::new(),
        Some(_) => {
            errors.push(MetadataError::InvalidFieldType {
                field: "tags",
                expected: "a list of non-empty strings",
            });
            BTreeSet::new()
        }
    };

    let slug = match fields.remove("slug") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(MetadataError::InvalidFieldType {
                field: "slug",
                expected: "a non-empty string",
            });
            None
        }
    };

    let extra: BTreeMap<String, Value> = fields.into_iter().collect();

    match (title, date) {
        (Some(title), Some(date)) if errors.is_empty() => Ok(Frontmatter {
            title,
            date,
            draft,
            tags,
            slug,
            extra,
        }),
        _ => Err(errors),
    }
}

/// Parse a header date into a calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}
