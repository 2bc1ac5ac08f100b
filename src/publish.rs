//! Publication set: the ordered list of documents handed to the renderer.
//!
//! Stage 4 of the pipeline, and a pure function of its input: drafts are
//! dropped, the rest is sorted newest first with the identifier breaking
//! ties. The same documents always produce the same set in the same order,
//! regardless of how they were discovered or which thread parsed them.
//!
//! The set is never edited in place. Every build constructs a new one from
//! source, and [`PublicationSet::fingerprint`] summarizes it so two builds
//! can be compared without diffing every document.

use crate::types::Document;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Ordered, draft-free, immutable collection of documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationSet {
    documents: Vec<Document>,
    fingerprint: String,
}

/// Publication order: newest first, then identifier ascending.
pub fn publication_order(a: &Document, b: &Document) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.identifier.cmp(&b.identifier))
}

impl PublicationSet {
    /// Build the set from every validated document, drafts included.
    pub fn build(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut documents: Vec<Document> = documents.into_iter().filter(|d| !d.draft).collect();
        documents.sort_by(publication_order);

        let mut hasher = Sha256::new();
        for doc in &documents {
            hasher.update(doc.identifier.as_bytes());
            hasher.update([0]);
            hasher.update(doc.content_hash.as_bytes());
            hasher.update([0]);
        }
        let fingerprint = format!("{:x}", hasher.finalize());

        Self {
            documents,
            fingerprint,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.identifier == identifier)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.identifier.as_str()).collect()
    }

    /// SHA-256 over identifiers and content hashes, in publication order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Documents grouped by tag, each group in publication order.
    pub fn by_tag(&self) -> BTreeMap<&str, Vec<&Document>> {
        let mut tags: BTreeMap<&str, Vec<&Document>> = BTreeMap::new();
        for doc in &self.documents {
            for tag in &doc.tags {
                tags.entry(tag.as_str()).or_default().push(doc);
            }
        }
        tags
    }
}

impl<'a> IntoIterator for &'a PublicationSet {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_document;
    use proptest::prelude::*;

    #[test]
    fn draft_excluded() {
        let set = PublicationSet::build(vec![
            make_document("posts/a", "2016-01-01", false),
            make_document("posts/b", "2016-06-01", true),
        ]);
        assert_eq!(set.identifiers(), vec!["posts/a"]);
    }

    #[test]
    fn newest_first_with_identifier_tiebreak() {
        let set = PublicationSet::build(vec![
            make_document("posts/c", "2015-05-05", false),
            make_document("posts/b", "2016-01-01", false),
            make_document("posts/a", "2016-01-01", false),
        ]);
        assert_eq!(set.identifiers(), vec!["posts/a", "posts/b", "posts/c"]);
    }

    #[test]
    fn empty_input_gives_empty_set() {
        let set = PublicationSet::build(Vec::new());
        assert!(set.is_empty());
        assert_eq!(set.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = make_document("posts/a", "2016-01-01", false);
        let mut a2 = a.clone();
        a2.content_hash = "changed".into();

        let first = PublicationSet::build(vec![a.clone()]);
        let same = PublicationSet::build(vec![a]);
        let changed = PublicationSet::build(vec![a2]);
        assert_eq!(first.fingerprint(), same.fingerprint());
        assert_ne!(first.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn by_tag_keeps_publication_order() {
        let mut old = make_document("posts/old", "2015-01-01", false);
        old.tags.insert("gdb".into());
        let mut new = make_document("posts/new", "2016-01-01", false);
        new.tags.insert("gdb".into());
        new.tags.insert("linux".into());

        let set = PublicationSet::build(vec![old, new]);
        let tags = set.by_tag();
        let gdb: Vec<&str> = tags["gdb"].iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(gdb, vec!["posts/new", "posts/old"]);
        assert_eq!(tags["linux"].len(), 1);
    }

    #[test]
    fn get_by_identifier() {
        let set = PublicationSet::build(vec![make_document("about", "2014-01-01", false)]);
        assert!(set.get("about").is_some());
        assert!(set.get("missing").is_none());
    }

    fn arb_document() -> impl Strategy<Value = Document> {
        ("[a-e]{1,3}", 2010i32..2020, 1u32..=12, 1u32..=28, any::<bool>()).prop_map(
            |(name, y, m, d, draft)| {
                make_document(&format!("posts/{name}"), &format!("{y:04}-{m:02}-{d:02}"), draft)
            },
        )
    }

    proptest! {
        #[test]
        fn never_contains_drafts(docs in prop::collection::vec(arb_document(), 0..30)) {
            let set = PublicationSet::build(docs.clone());
            prop_assert!(set.iter().all(|d| !d.draft));
            prop_assert_eq!(set.len(), docs.iter().filter(|d| !d.draft).count());
        }

        #[test]
        fn dates_non_increasing(docs in prop::collection::vec(arb_document(), 0..30)) {
            let set = PublicationSet::build(docs);
            for pair in set.documents().windows(2) {
                prop_assert!(pair[0].date >= pair[1].date);
                if pair[0].date == pair[1].date {
                    prop_assert!(pair[0].identifier <= pair[1].identifier);
                }
            }
        }

        #[test]
        fn input_order_irrelevant(docs in prop::collection::vec(arb_document(), 0..30)) {
            let mut reversed = docs.clone();
            reversed.reverse();
            let a = PublicationSet::build(docs);
            let b = PublicationSet::build(reversed);
            prop_assert_eq!(a.identifiers(), b.identifiers());
        }
    }
}
