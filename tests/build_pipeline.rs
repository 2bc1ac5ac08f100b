//! End-to-end builds through the public API, against the fixture content tree.

use quire::config::{SiteConfig, load_config};
use quire::metadata::MetadataError;
use quire::pipeline::{BuildError, build, build_site};
use quire::references::{LinkKind, ReferenceError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content");
    copy_dir(&src, tmp.path());
    tmp
}

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

#[test]
fn fixture_site_publishes_in_date_order() {
    let tmp = fixtures();
    let site = build_site(tmp.path()).unwrap();

    let titles: Vec<&str> = site.publication.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["Memory-mapped I/O", "GDB internals", "About"]);
    assert!(site.publication.iter().all(|d| !d.draft));
    assert_eq!(site.drafts, vec!["posts/2016-06-01-simd-line-count"]);
}

#[test]
fn unknown_header_fields_survive() {
    let tmp = fixtures();
    let site = build_site(tmp.path()).unwrap();
    let gdb = site
        .publication
        .get("posts/2016-01-01-gdb-internals")
        .unwrap();
    assert_eq!(
        gdb.extra.get("summary").and_then(|v| v.as_str()),
        Some("How breakpoints actually work.")
    );
    assert_eq!(gdb.permalink, "/posts/gdb-internals/");
}

#[test]
fn links_resolve_against_base_url() {
    let tmp = fixtures();
    let site = build_site(tmp.path()).unwrap();

    let url_of = |source: &str, target: &str| {
        site.links
            .iter()
            .find(|l| l.source == source && l.target == target)
            .map(|l| l.url.clone())
            .unwrap_or_else(|| panic!("no link {target} in {source}"))
    };

    assert_eq!(
        url_of("posts/2016-01-01-gdb-internals", "post:posts/2016-03-12-mmap-io"),
        "https://blog.example.org/posts/mmap-io/"
    );
    assert_eq!(
        url_of("posts/2016-03-12-mmap-io", "/slides/mmap.pdf"),
        "https://blog.example.org/slides/mmap.pdf"
    );
    assert_eq!(
        url_of("posts/2016-01-01-gdb-internals", "img/int3.png"),
        "https://blog.example.org/posts/img/int3.png"
    );

    let image = site
        .links
        .iter()
        .find(|l| l.kind == LinkKind::Image)
        .unwrap();
    assert_eq!(image.source, "posts/2016-01-01-gdb-internals");

    // Drafts are validated, but their links are not handed on.
    assert!(
        site.links
            .iter()
            .all(|l| l.source != "posts/2016-06-01-simd-line-count")
    );
}

#[test]
fn talks_index_is_parsed() {
    let tmp = fixtures();
    let site = build_site(tmp.path()).unwrap();
    let talks = site.talks.unwrap();

    let years: Vec<i32> = talks.years.iter().map(|y| y.year).collect();
    assert_eq!(years, vec![2016, 2015]);

    let gdb = &talks.years[0].talks[0];
    assert_eq!(gdb.title, "Inside gdb: how breakpoints work");
    assert_eq!(gdb.link("slides"), Some("https://blog.example.org/slides/gdb.pdf"));

    let simd = &talks.years[1].talks[0];
    assert_eq!(
        simd.link("code"),
        Some("https://github.com/example/linecount")
    );
}

#[test]
fn two_runs_are_identical() {
    let tmp = fixtures();
    let first = build_site(tmp.path()).unwrap();
    let second = build_site(tmp.path()).unwrap();
    assert_eq!(first.publication.fingerprint(), second.publication.fingerprint());
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[test]
fn editing_a_post_changes_the_fingerprint() {
    let tmp = fixtures();
    let before = build_site(tmp.path()).unwrap();

    let about = tmp.path().join("about.md");
    let mut text = fs::read_to_string(&about).unwrap();
    text.push_str("\nOne more line.\n");
    fs::write(&about, text).unwrap();

    let after = build_site(tmp.path()).unwrap();
    assert_ne!(before.publication.fingerprint(), after.publication.fingerprint());
}

#[test]
fn publishing_a_draft_with_a_broken_link_fails() {
    let tmp = fixtures();
    fs::write(
        tmp.path().join("posts/2016-07-01-broken.md"),
        "---\ntitle: Broken\ndate: 2016-07-01\n---\n\nSee [foo] and [the draft](post:posts/2016-06-01-simd-line-count).\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("posts/2016-08-01-untitled.md"),
        "---\ndate: 2016-08-01\n---\n\nNo title.\n",
    )
    .unwrap();

    let failure = build_site(tmp.path()).unwrap_err();
    let messages: Vec<String> = failure.errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(failure.errors.len(), 3, "{messages:#?}");

    assert!(failure.errors.iter().any(|e| matches!(
        e,
        BuildError::Metadata { source: MetadataError::MissingRequiredField("title"), .. }
    )));
    assert!(failure.errors.iter().any(|e| matches!(
        e,
        BuildError::Reference(ReferenceError::DanglingReference { label, document, .. })
            if label == "foo" && document == "posts/2016-07-01-broken"
    )));
    assert!(failure.errors.iter().any(|e| matches!(
        e,
        BuildError::Reference(ReferenceError::UnpublishedTarget { .. })
    )));
}

#[test]
fn config_file_is_honoured() {
    let tmp = fixtures();
    let config = load_config(tmp.path()).unwrap();
    assert_eq!(config.base_url, "https://blog.example.org/");

    let site = build(tmp.path(), &SiteConfig::default()).unwrap();
    let link = site
        .links
        .iter()
        .find(|l| l.target == "/slides/mmap.pdf")
        .unwrap();
    assert_eq!(link.url, "https://example.org/slides/mmap.pdf");
}

#[test]
fn unknown_config_key_is_rejected() {
    let tmp = fixtures();
    fs::write(tmp.path().join("config.toml"), "base_urll = \"x\"\n").unwrap();
    let failure = build_site(tmp.path()).unwrap_err();
    assert!(matches!(&failure.errors[..], [BuildError::Config(_)]));
}
