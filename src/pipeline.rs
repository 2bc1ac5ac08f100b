//! Build orchestration: content root in, [`Site`] out.
//!
//! ```text
//! discover → load + validate (parallel) → join → permalinks
//!          → resolve references (documents, talks) → publication set
//! ```
//!
//! Every stage that can run does run, and every error it finds is collected.
//! A build either returns a complete [`Site`] or a [`BuildFailure`] listing
//! all problems, so an author fixes a batch of broken documents in one pass
//! instead of one rebuild per error.
//!
//! Loading and validation are independent per document and run on the rayon
//! pool. Reference resolution needs the whole document set, so it only
//! starts once every document is validated. `par_iter().collect()` keeps
//! discovery order, which makes the output independent of scheduling.

use crate::config::{self, ConfigError, SiteConfig};
use crate::loader::{self, LoadError, split_header};
use crate::metadata::{self, MetadataError};
use crate::publish::PublicationSet;
use crate::references::{LinkResolver, ReferenceError, ResolvedLink, resolve_document};
use crate::talks::{TalksError, TalksIndex, parse_talks};
use crate::types::Document;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One problem found during a build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("{}: {source}", path.display())]
    Talks {
        path: PathBuf,
        #[source]
        source: TalksError,
    },
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("permalink {permalink} is claimed by both {first} and {second}")]
    PermalinkCollision {
        permalink: String,
        first: String,
        second: String,
    },
}

/// Every error of a failed build, in discovery order.
#[derive(Debug)]
pub struct BuildFailure {
    pub errors: Vec<BuildError>,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.errors.len();
        write!(f, "build failed with {n} error{}", if n == 1 { "" } else { "s" })
    }
}

impl std::error::Error for BuildFailure {}

impl From<BuildError> for BuildFailure {
    fn from(err: BuildError) -> Self {
        Self { errors: vec![err] }
    }
}

impl From<ConfigError> for BuildFailure {
    fn from(err: ConfigError) -> Self {
        BuildError::from(err).into()
    }
}

/// Result of a successful build, handed to the renderer as JSON.
#[derive(Debug, Serialize)]
pub struct Site {
    pub publication: PublicationSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talks: Option<TalksIndex>,
    /// Every link and image of the published documents, in discovery order.
    pub links: Vec<ResolvedLink>,
    /// Identifiers of drafts that were validated but left out.
    pub drafts: Vec<String>,
    pub config: SiteConfig,
}

/// Load the config from `root` and build.
pub fn build_site(root: &Path) -> Result<Site, BuildFailure> {
    let config = config::load_config(root)?;
    build(root, &config)
}

/// Build the site from the content under `root`.
pub fn build(root: &Path, config: &SiteConfig) -> Result<Site, BuildFailure> {
    let base = config.base()?;
    let mut errors: Vec<BuildError> = Vec::new();

    let (paths, walk_errors) = loader::discover(root, config);
    errors.extend(walk_errors.into_iter().map(BuildError::from));
    tracing::info!(files = paths.len(), root = %root.display(), "discovered content");

    let loaded: Vec<Result<Option<Document>, Vec<BuildError>>> = paths
        .par_iter()
        .map(|path| load_and_validate(root, path, config.strict))
        .collect();

    let mut documents = Vec::with_capacity(loaded.len());
    let mut unvalidated = Vec::new();
    for (path, result) in paths.iter().zip(loaded) {
        match result {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => {}
            Err(errs) => {
                unvalidated.push(loader::identifier_for(root, path));
                errors.extend(errs);
            }
        }
    }
    tracing::info!(documents = documents.len(), "validated headers");

    errors.extend(permalink_collisions(&documents));

    let resolver = LinkResolver::new(base, &documents).with_unvalidated(unvalidated);
    let resolved: Vec<_> = documents
        .par_iter()
        .map(|doc| resolve_document(doc, &resolver))
        .collect();

    let mut links = Vec::new();
    for (doc, result) in documents.iter().zip(resolved) {
        match result {
            Ok(found) => {
                if !doc.draft {
                    links.extend(found);
                }
            }
            Err(errs) => errors.extend(errs.into_iter().map(BuildError::from)),
        }
    }

    let talks = match load_talks(root, config, &resolver) {
        Ok(talks) => talks,
        Err(errs) => {
            errors.extend(errs);
            None
        }
    };

    if !errors.is_empty() {
        tracing::warn!(errors = errors.len(), "build failed");
        return Err(BuildFailure { errors });
    }

    let drafts = documents
        .iter()
        .filter(|d| d.draft)
        .map(|d| d.identifier.clone())
        .collect();
    let publication = PublicationSet::build(documents);
    tracing::info!(
        published = publication.len(),
        fingerprint = publication.fingerprint(),
        "publication set built"
    );

    Ok(Site {
        publication,
        talks,
        links,
        drafts,
        config: config.clone(),
    })
}

fn load_and_validate(
    root: &Path,
    path: &Path,
    strict: bool,
) -> Result<Option<Document>, Vec<BuildError>> {
    let Some(raw) = loader::load_document(root, path, strict).map_err(|e| vec![e.into()])? else {
        return Ok(None);
    };
    match metadata::parse_header(raw.format, &raw.header) {
        Ok(front) => {
            tracing::debug!(identifier = %raw.identifier, "validated");
            Ok(Some(Document::new(raw, front)))
        }
        Err(errs) => Err(errs
            .into_iter()
            .map(|source| {
                if source.is_malformed() {
                    LoadError::malformed(path, source.to_string()).into()
                } else {
                    BuildError::Metadata {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })
            .collect()),
    }
}

/// Two documents may not publish to the same URL.
fn permalink_collisions(documents: &[Document]) -> Vec<BuildError> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    let mut errors = Vec::new();
    for doc in documents {
        match seen.entry(doc.permalink.as_str()) {
            Entry::Vacant(slot) => {
                slot.insert(doc.identifier.as_str());
            }
            Entry::Occupied(first) => errors.push(BuildError::PermalinkCollision {
                permalink: doc.permalink.clone(),
                first: first.get().to_string(),
                second: doc.identifier.clone(),
            }),
        }
    }
    errors
}

/// Parse the talks index if the site has one.
///
/// The index may carry a header block like any other document; it is
/// stripped and ignored.
fn load_talks(
    root: &Path,
    config: &SiteConfig,
    resolver: &LinkResolver,
) -> Result<Option<TalksIndex>, Vec<BuildError>> {
    let path = root.join(&config.talks_index);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no talks index");
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| vec![BuildError::Load(LoadError::unreadable(&path, e))])?;
    let (body, first_line) = match split_header(&content, &path).map_err(|e| vec![e.into()])? {
        Some(split) => (split.body, split.body_line),
        None => (content.as_str(), 1),
    };

    let source_path = loader::relative_source(root, &path);
    let dir = source_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");

    parse_talks(body, &source_path, dir, first_line, resolver)
        .map(|index| {
            tracing::info!(talks = index.len(), "parsed talks index");
            Some(index)
        })
        .map_err(|errs| {
            errs.into_iter()
                .map(|source| BuildError::Talks {
                    path: path.clone(),
                    source,
                })
                .collect()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{find_document, setup_fixtures, write_post};
    use tempfile::TempDir;

    #[test]
    fn fixtures_build() {
        let tmp = setup_fixtures();
        let site = build_site(tmp.path()).unwrap();

        assert_eq!(
            site.publication.identifiers(),
            vec![
                "posts/2016-03-12-mmap-io",
                "posts/2016-01-01-gdb-internals",
                "about"
            ]
        );
        assert_eq!(site.drafts, vec!["posts/2016-06-01-simd-line-count"]);
        let talks = site.talks.as_ref().unwrap();
        assert_eq!(talks.years[0].year, 2016);
    }

    #[test]
    fn draft_scenario() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "posts/a.md", "title: A\ndate: 2016-01-01", "");
        write_post(tmp.path(), "posts/b.md", "title: B\ndate: 2016-06-01\ndraft: true", "");

        let site = build(tmp.path(), &SiteConfig::default()).unwrap();
        assert_eq!(site.publication.identifiers(), vec!["posts/a"]);
        assert_eq!(site.drafts, vec!["posts/b"]);
    }

    #[test]
    fn dangling_reference_scenario() {
        let tmp = TempDir::new().unwrap();
        write_post(
            tmp.path(),
            "posts/x.md",
            "title: X\ndate: 2016-01-01",
            "see [foo]\n",
        );

        let failure = build(tmp.path(), &SiteConfig::default()).unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        match &failure.errors[0] {
            BuildError::Reference(ReferenceError::DanglingReference { label, document, .. }) => {
                assert_eq!(label, "foo");
                assert_eq!(document, "posts/x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn all_broken_documents_reported_together() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "posts/a.md", "date: 2016-01-01", "");
        write_post(tmp.path(), "posts/b.md", "title: B\ndate: 01/02/2016", "");
        write_post(tmp.path(), "posts/c.md", "title: C\ndate: 2016-01-03", "");

        let failure = build(tmp.path(), &SiteConfig::default()).unwrap_err();
        assert_eq!(failure.errors.len(), 2);
        assert!(matches!(
            &failure.errors[0],
            BuildError::Metadata { source: MetadataError::MissingRequiredField("title"), path }
                if path.ends_with("a.md")
        ));
        assert!(matches!(
            &failure.errors[1],
            BuildError::Metadata { source: MetadataError::InvalidDateFormat(_), path }
                if path.ends_with("b.md")
        ));
        assert_eq!(failure.to_string(), "build failed with 2 errors");
    }

    #[test]
    fn non_strict_skips_headerless_files() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "a.md", "title: A\ndate: 2016-01-01", "");
        fs::write(tmp.path().join("README.md"), "just notes\n").unwrap();

        assert!(build(tmp.path(), &SiteConfig::default()).is_err());

        let config = SiteConfig {
            strict: false,
            ..SiteConfig::default()
        };
        let site = build(tmp.path(), &config).unwrap();
        assert_eq!(site.publication.identifiers(), vec!["a"]);
    }

    #[test]
    fn permalink_collision_reported() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "posts/2016-01-01-intro.md", "title: A\ndate: 2016-01-01", "");
        write_post(tmp.path(), "posts/2017-01-01-intro.md", "title: B\ndate: 2017-01-01", "");

        let failure = build(tmp.path(), &SiteConfig::default()).unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [BuildError::PermalinkCollision { permalink, .. }] if permalink == "/posts/intro/"
        ));
    }

    #[test]
    fn short_links_resolve_to_permalinks() {
        let tmp = TempDir::new().unwrap();
        write_post(
            tmp.path(),
            "posts/2016-01-01-a.md",
            "title: A\ndate: 2016-01-01",
            "",
        );
        write_post(
            tmp.path(),
            "posts/2016-02-01-b.md",
            "title: B\ndate: 2016-02-01",
            "Follow-up to [part one](post:posts/2016-01-01-a).\n",
        );

        let site = build(tmp.path(), &SiteConfig::default()).unwrap();
        assert_eq!(site.links.len(), 1);
        assert_eq!(site.links[0].url, "https://example.org/posts/a/");
        assert_eq!(find_document(&site.publication, "b").title, "B");
    }

    #[test]
    fn talks_errors_carry_the_index_path() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("talks.md"), "## 2016\n\n- A talk [slides]\n").unwrap();

        let failure = build(tmp.path(), &SiteConfig::default()).unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [BuildError::Talks { source: TalksError::Reference(ReferenceError::DanglingReference { .. }), .. }]
        ));
    }

    #[test]
    fn unparseable_header_is_malformed_document() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "posts/a.md", "title: [unclosed", "");
        write_post(tmp.path(), "posts/b.md", "- just\n- a list", "");

        let failure = build(tmp.path(), &SiteConfig::default()).unwrap_err();
        assert_eq!(failure.errors.len(), 2);
        assert!(matches!(
            &failure.errors[0],
            BuildError::Load(LoadError::MalformedDocument { path, .. }) if path.ends_with("a.md")
        ));
        assert!(matches!(
            &failure.errors[1],
            BuildError::Load(LoadError::MalformedDocument { path, .. }) if path.ends_with("b.md")
        ));
    }

    #[test]
    fn short_link_to_invalid_document_reports_only_the_invalid_one() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "posts/a.md", "date: 2016-01-01", "");
        write_post(
            tmp.path(),
            "posts/b.md",
            "title: B\ndate: 2016-02-01",
            "See [a](post:posts/a).\n",
        );

        let failure = build(tmp.path(), &SiteConfig::default()).unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [BuildError::Metadata { source: MetadataError::MissingRequiredField("title"), .. }]
        ));
    }

    #[test]
    fn non_ascii_file_names_get_distinct_permalinks() {
        let tmp = TempDir::new().unwrap();
        write_post(tmp.path(), "posts/日本.md", "title: Nihon\ndate: 2016-01-01", "");
        write_post(tmp.path(), "posts/中文.md", "title: Zhongwen\ndate: 2016-01-02", "");

        let site = build(tmp.path(), &SiteConfig::default()).unwrap();
        assert_eq!(site.publication.len(), 2);
        for doc in site.publication.iter() {
            assert_eq!(doc.slug.len(), 12);
            assert_eq!(doc.permalink, format!("/posts/{}/", doc.slug));
        }
    }

    #[test]
    fn missing_root_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let failure = build(&tmp.path().join("nope"), &SiteConfig::default()).unwrap_err();
        assert!(matches!(
            &failure.errors[..],
            [BuildError::Load(LoadError::UnreadableSource { .. })]
        ));
    }

    #[test]
    fn rebuilds_are_identical() {
        let tmp = setup_fixtures();
        let first = build_site(tmp.path()).unwrap();
        let second = build_site(tmp.path()).unwrap();
        assert_eq!(first.publication, second.publication);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
