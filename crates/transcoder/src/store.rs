use std::collections::HashMap;
use std::fmt;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Content hash identifying a file in the store
pub type FileHash = String;

/// A file search against the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Tags or system predicates, all of which must match
    pub tags: Vec<String>,
    /// Restrict to this file service
    pub file_service: Option<String>,
    /// Match tags against this tag service only
    pub tag_service: Option<String>,
}

impl SearchQuery {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Search for a file by its exact hash across all files
    pub fn by_hash(hash: &str) -> Self {
        Self::new([format!("system:hash = {}", hash)])
    }

    pub fn in_file_service(mut self, service: impl Into<String>) -> Self {
        self.file_service = Some(service.into());
        self
    }

    pub fn in_tag_service(mut self, service: impl Into<String>) -> Self {
        self.tag_service = Some(service.into());
        self
    }
}

/// Metadata of one file: its hash and current display tags per tag service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub hash: FileHash,
    pub service_tags: HashMap<String, Vec<String>>,
}

impl FileMetadata {
    /// Current display tags on the given tag service, empty if the service has none
    pub fn tags(&self, tag_service: &str) -> &[String] {
        self.service_tags
            .get(tag_service)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A named store service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub service_key: String,
}

/// Local tag and file services known to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Services {
    pub tag_services: Vec<ServiceInfo>,
    pub file_services: Vec<ServiceInfo>,
}

impl Services {
    pub fn has_tag_service(&self, name: &str) -> bool {
        self.tag_services.iter().any(|s| s.name == name)
    }

    pub fn has_file_service(&self, name: &str) -> bool {
        self.file_services.iter().any(|s| s.name == name)
    }
}

impl fmt::Display for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tag services:")?;
        for s in &self.tag_services {
            writeln!(f, "  {}:{}", s.name, s.service_key)?;
        }
        writeln!(f, "File services:")?;
        for s in &self.file_services {
            writeln!(f, "  {}:{}", s.name, s.service_key)?;
        }
        Ok(())
    }
}

/// Client of the tagged file store
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    /// Return hashes of all files matching the query
    async fn search(&self, query: &SearchQuery) -> Result<Vec<FileHash>>;

    /// Fetch metadata for the given hashes in one logical batch
    async fn get_metadata(&self, hashes: &[FileHash]) -> Result<Vec<FileMetadata>>;

    /// Delete files from a file service, recording `reason`
    async fn delete(&self, hashes: &[FileHash], file_service: &str, reason: &str) -> Result<()>;

    /// List the local tag and file services
    async fn list_services(&self) -> Result<Services>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builders() {
        let q = SearchQuery::new(["original:*"])
            .in_file_service("web-transcodes")
            .in_tag_service("Imported Tags");
        assert_eq!(q.tags, vec!["original:*".to_string()]);
        assert_eq!(q.file_service.as_deref(), Some("web-transcodes"));
        assert_eq!(q.tag_service.as_deref(), Some("Imported Tags"));

        let q = SearchQuery::by_hash("abc");
        assert_eq!(q.tags, vec!["system:hash = abc".to_string()]);
        assert!(q.file_service.is_none());
    }

    #[test]
    fn test_metadata_tags_for_unknown_service_is_empty() {
        let meta = FileMetadata {
            hash: "h".to_string(),
            service_tags: HashMap::from([("my tags".to_string(), vec!["a".to_string()])]),
        };
        assert_eq!(meta.tags("my tags"), &["a".to_string()]);
        assert!(meta.tags("other").is_empty());
    }

    #[test]
    fn test_services_lookup_and_display() {
        let services = Services {
            tag_services: vec![ServiceInfo {
                name: "Imported Tags".to_string(),
                service_key: "6c".to_string(),
            }],
            file_services: vec![ServiceInfo {
                name: "web-transcodes".to_string(),
                service_key: "7f".to_string(),
            }],
        };
        assert!(services.has_tag_service("Imported Tags"));
        assert!(!services.has_tag_service("web-transcodes"));
        assert!(services.has_file_service("web-transcodes"));
        assert!(services.to_string().contains("  web-transcodes:7f"));
    }
}
