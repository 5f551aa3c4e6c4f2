//! Index of transcodes by the original they were produced from.
//!
//! A transcode carries a link tag `<namespace>:<hash of original>` on the
//! configured tag service. The index maps each original hash to the
//! transcodes pointing at it.

use std::collections::HashMap;
use log::{debug, warn};
use crate::store::{FileHash, FileMetadata};

/// A transcode that carried more than one distinct link tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAmbiguity {
    pub derivative: FileHash,
    /// The original that was used (first link tag in store order)
    pub chosen: FileHash,
    /// Originals named by the remaining link tags
    pub ignored: Vec<FileHash>,
}

/// Link between one transcode and its original
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeRecord {
    pub derivative: FileHash,
    pub original: Option<FileHash>,
}

/// Reads link tags in one namespace on one tag service
#[derive(Debug, Clone)]
pub struct LinkReader {
    prefix: String,
    tag_service: String,
}

impl LinkReader {
    pub fn new(namespace: &str, tag_service: &str) -> Self {
        Self {
            prefix: format!("{}:", namespace),
            tag_service: tag_service.to_string(),
        }
    }

    /// Parse a single tag, returning the original hash it links to
    pub fn parse_tag(&self, tag: &str) -> Option<FileHash> {
        let hash = tag.strip_prefix(&self.prefix)?.trim();
        if hash.is_empty() {
            None
        } else {
            Some(hash.to_lowercase())
        }
    }

    /// All distinct originals linked from a transcode, in tag order
    pub fn originals_in(&self, meta: &FileMetadata) -> Vec<FileHash> {
        let mut originals: Vec<FileHash> = Vec::new();
        for hash in meta.tags(&self.tag_service).iter().filter_map(|t| self.parse_tag(t)) {
            if !originals.contains(&hash) {
                originals.push(hash);
            }
        }
        originals
    }

    /// The original a transcode links to; the first link tag wins
    pub fn lookup_original_for(&self, meta: &FileMetadata) -> Option<FileHash> {
        meta.tags(&self.tag_service)
            .iter()
            .find_map(|t| self.parse_tag(t))
    }

    /// Resolve a transcode into a record, plus an ambiguity if it carries several links
    pub fn resolve(&self, meta: &FileMetadata) -> (DerivativeRecord, Option<LinkAmbiguity>) {
        let mut originals = self.originals_in(meta).into_iter();
        let chosen = originals.next();
        let ignored: Vec<FileHash> = originals.collect();

        let ambiguity = match (&chosen, ignored.is_empty()) {
            (Some(chosen), false) => {
                warn!(
                    "⚠️  Transcode {} links to several originals, using {} and ignoring {:?}",
                    meta.hash, chosen, ignored
                );
                Some(LinkAmbiguity {
                    derivative: meta.hash.clone(),
                    chosen: chosen.clone(),
                    ignored,
                })
            }
            _ => None,
        };

        let record = DerivativeRecord {
            derivative: meta.hash.clone(),
            original: chosen,
        };
        (record, ambiguity)
    }
}

/// Map from original hash to the transcodes produced from it
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    by_original: HashMap<FileHash, Vec<FileHash>>,
    unlinked: Vec<FileHash>,
    ambiguities: Vec<LinkAmbiguity>,
}

impl LinkIndex {
    /// Build the index from transcode metadata
    pub fn build(reader: &LinkReader, metadata: &[FileMetadata]) -> Self {
        let mut index = LinkIndex::default();

        for meta in metadata {
            let (record, ambiguity) = reader.resolve(meta);
            if let Some(ambiguity) = ambiguity {
                index.ambiguities.push(ambiguity);
            }
            match record.original {
                Some(original) => {
                    let derivatives = index.by_original.entry(original).or_default();
                    if !derivatives.contains(&record.derivative) {
                        derivatives.push(record.derivative);
                    }
                }
                None => {
                    debug!("Transcode {} has no link tag", record.derivative);
                    index.unlinked.push(record.derivative);
                }
            }
        }

        index
    }

    pub fn has_derivative(&self, original: &str) -> bool {
        self.by_original.contains_key(original)
    }

    /// Transcodes linked to `original`, empty if none
    pub fn derivatives_of(&self, original: &str) -> &[FileHash] {
        self.by_original
            .get(original)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of originals that have at least one transcode
    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }

    /// Transcodes without any link tag
    pub fn unlinked(&self) -> &[FileHash] {
        &self.unlinked
    }

    pub fn ambiguities(&self) -> &[LinkAmbiguity] {
        &self.ambiguities
    }

    pub fn into_ambiguities(self) -> Vec<LinkAmbiguity> {
        self.ambiguities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SERVICE: &str = "Imported Tags";

    fn meta(hash: &str, tags: &[&str]) -> FileMetadata {
        FileMetadata {
            hash: hash.to_string(),
            service_tags: HashMap::from([(
                SERVICE.to_string(),
                tags.iter().map(|t| t.to_string()).collect(),
            )]),
        }
    }

    fn reader() -> LinkReader {
        LinkReader::new("original", SERVICE)
    }

    #[test]
    fn test_parse_tag() {
        let r = reader();
        assert_eq!(r.parse_tag("original:ABcd"), Some("abcd".to_string()));
        assert_eq!(r.parse_tag("original:"), None);
        assert_eq!(r.parse_tag("creator:someone"), None);
        // substring matches are not link tags
        assert_eq!(r.parse_tag("not-original:abcd"), None);
    }

    #[test]
    fn test_tags_on_other_services_are_ignored() {
        let mut m = meta("d1", &[]);
        m.service_tags
            .insert("my tags".to_string(), vec!["original:o1".to_string()]);
        assert_eq!(reader().lookup_original_for(&m), None);
    }

    #[test]
    fn test_build_maps_originals_to_derivatives() {
        let metadata = vec![
            meta("d1", &["creator:x", "original:o1"]),
            meta("d2", &["original:o2"]),
            meta("d3", &["original:o1"]),
            meta("d4", &["title:no link"]),
        ];
        let index = LinkIndex::build(&reader(), &metadata);

        assert_eq!(index.len(), 2);
        assert!(index.has_derivative("o1"));
        assert!(!index.has_derivative("o3"));
        assert_eq!(index.derivatives_of("o1"), &["d1".to_string(), "d3".to_string()]);
        assert!(index.derivatives_of("o3").is_empty());
        assert_eq!(index.unlinked(), &["d4".to_string()]);
        assert!(index.ambiguities().is_empty());
    }

    #[test]
    fn test_first_link_tag_wins_and_ambiguity_is_recorded() {
        let metadata = vec![meta("d1", &["original:o1", "original:o2", "original:o1"])];
        let index = LinkIndex::build(&reader(), &metadata);

        assert!(index.has_derivative("o1"));
        assert!(!index.has_derivative("o2"));
        assert_eq!(
            index.ambiguities(),
            &[LinkAmbiguity {
                derivative: "d1".to_string(),
                chosen: "o1".to_string(),
                ignored: vec!["o2".to_string()],
            }]
        );
    }

    #[test]
    fn test_repeated_identical_link_is_not_ambiguous() {
        let (record, ambiguity) = reader().resolve(&meta("d1", &["original:o1", "original:O1"]));
        assert_eq!(record.original.as_deref(), Some("o1"));
        assert!(ambiguity.is_none());
    }

    proptest! {
        /// Every linked transcode is listed under exactly the original its first link names
        #[test]
        fn test_index_agrees_with_lookup(
            links in prop::collection::vec(prop::option::of(0u8..6), 0..40),
        ) {
            let r = reader();
            let metadata: Vec<FileMetadata> = links
                .iter()
                .enumerate()
                .map(|(i, link)| match link {
                    Some(o) => meta(&format!("d{}", i), &[format!("original:o{}", o).as_str()]),
                    None => meta(&format!("d{}", i), &["meta:unlinked"]),
                })
                .collect();
            let index = LinkIndex::build(&r, &metadata);

            let mut linked = 0;
            for m in &metadata {
                match r.lookup_original_for(m) {
                    Some(original) => {
                        linked += 1;
                        prop_assert!(index.derivatives_of(&original).contains(&m.hash));
                    }
                    None => prop_assert!(index.unlinked().contains(&m.hash)),
                }
            }
            let indexed: usize = (0u8..6)
                .map(|o| index.derivatives_of(&format!("o{}", o)).len())
                .sum();
            prop_assert_eq!(indexed, linked);
        }
    }
}
