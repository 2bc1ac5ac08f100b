//! # Quire
//!
//! Content ingestion for a personal blog and talks page. Your filesystem is
//! the data source: every markdown file under the content root is a post or
//! page with a small header block, and a single talks index lists
//! presentations by year. Quire validates all of it, resolves every link and
//! hands a single immutable publication set to the renderer.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! ```text
//! 1. Load      content/   →  RawDocument     (split header from body)
//! 2. Validate  header     →  Document        (required fields, types, defaults)
//! 3. Resolve   bodies     →  ResolvedLink    (labels, short links, relative paths)
//! 4. Publish   documents  →  PublicationSet  (drop drafts, order by date)
//! ```
//!
//! Stages 1 and 2 are independent per document and run in parallel. Stage 3
//! needs every document's permalink, so it starts only after stage 2 is done
//! for the whole corpus. Stage 4 is a pure function.
//!
//! Errors accumulate across stages: a build reports every broken document at
//! once, and any error blocks publication.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`loader`] | Stage 1: discovers content files and splits `---`/`+++` header blocks |
//! | [`metadata`] | Stage 2: validates header fields into a [`metadata::Frontmatter`] |
//! | [`references`] | Stage 3: link-reference definitions and link target resolution |
//! | [`talks`] | Stage 3: the talks index, year sections and their entries |
//! | [`publish`] | Stage 4: the ordered, draft-free [`publish::PublicationSet`] |
//! | [`pipeline`] | Runs the stages and collects every error into one failure |
//! | [`config`] | `config.toml` loading, validation and stock defaults |
//! | [`types`] | [`types::Document`], shared by stages 2 to 4 |
//! | [`naming`] | `YYYY-MM-DD-slug` filename convention and slug cleanup |
//! | [`output`] | CLI output formatting for inventories and errors |
//!
//! # Design Decisions
//!
//! ## Identity From Paths
//!
//! A document's identifier is its path under the content root without the
//! extension. Permalinks derive from the directory and the slug, so the same
//! file keeps the same URL across rebuilds, and `post:<identifier>` short
//! links keep working when a title changes.
//!
//! ## Rebuild, Never Patch
//!
//! The publication set is rebuilt from source on every run. Each document
//! carries a SHA-256 of its source bytes and the set carries a fingerprint
//! over them, so unchanged input is detectable without any cache state.

pub mod config;
pub mod loader;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod references;
pub mod talks;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
