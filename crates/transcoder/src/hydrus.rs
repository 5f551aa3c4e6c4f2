use std::collections::HashMap;
use std::time::Duration;
use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::config::TranscodeConfig;
use crate::store::{FileHash, FileMetadata, SearchQuery, ServiceInfo, Services, StoreClient};

const API_KEY_HEADER: &str = "Hydrus-Client-API-Access-Key";

/// Request timeout for Hydrus API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of hashes per metadata request, keeps the query string bounded
const METADATA_CHUNK: usize = 256;

/// Tag status for tags currently applied to a file
const CURRENT_STATUS: &str = "0";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hashes: Vec<FileHash>,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    metadata: Vec<MetadataEntry>,
}

/// Per-service tag block in the keyed `tags` layout
#[derive(Debug, Deserialize)]
struct ServiceTags {
    name: String,
    #[serde(default)]
    display_tags: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    hash: FileHash,
    /// Older layout: service name -> status -> tags
    #[serde(default)]
    service_names_to_statuses_to_display_tags: HashMap<String, HashMap<String, Vec<String>>>,
    /// Newer layout: service key -> { name, display_tags: status -> tags }
    #[serde(default)]
    tags: HashMap<String, ServiceTags>,
}

impl MetadataEntry {
    fn into_metadata(self) -> FileMetadata {
        let mut service_tags: HashMap<String, Vec<String>> = HashMap::new();

        for (service, mut statuses) in self.service_names_to_statuses_to_display_tags {
            if let Some(current) = statuses.remove(CURRENT_STATUS) {
                service_tags.insert(service, current);
            }
        }
        for (_, mut block) in self.tags {
            if let Some(current) = block.display_tags.remove(CURRENT_STATUS) {
                service_tags.entry(block.name).or_insert(current);
            }
        }

        FileMetadata {
            hash: self.hash,
            service_tags,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServicesResponse {
    #[serde(default)]
    local_tags: Vec<ServiceInfo>,
    #[serde(default)]
    local_files: Vec<ServiceInfo>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    hashes: &'a [FileHash],
    file_service_name: &'a str,
    reason: &'a str,
}

/// Client for the Hydrus client API
pub struct HydrusClient {
    client: Client,
    base_url: String,
    access_key: String,
}

impl HydrusClient {
    pub fn new(base_url: &str, access_key: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_key: access_key.to_string(),
        }
    }

    pub fn from_config(cfg: &TranscodeConfig) -> Self {
        Self::new(&cfg.api_url, &cfg.access_key)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {} {:?}", path, query);
        let response = self
            .client
            .get(self.url(path))
            .header(API_KEY_HEADER, &self.access_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned {}: {}", path, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response of {}", path))
    }
}

#[async_trait::async_trait]
impl StoreClient for HydrusClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<FileHash>> {
        let mut params = vec![
            ("tags", serde_json::to_string(&query.tags)?),
            ("return_hashes", "true".to_string()),
            ("return_file_ids", "false".to_string()),
        ];
        if let Some(service) = &query.file_service {
            params.push(("file_service_name", service.clone()));
        }
        if let Some(service) = &query.tag_service {
            params.push(("tag_service_name", service.clone()));
        }

        let response: SearchResponse = self.get_json("/get_files/search_files", &params).await?;
        Ok(response.hashes)
    }

    async fn get_metadata(&self, hashes: &[FileHash]) -> Result<Vec<FileMetadata>> {
        let mut metadata = Vec::with_capacity(hashes.len());
        for chunk in hashes.chunks(METADATA_CHUNK) {
            let params = [("hashes", serde_json::to_string(chunk)?)];
            let response: MetadataResponse =
                self.get_json("/get_files/file_metadata", &params).await?;
            metadata.extend(response.metadata.into_iter().map(MetadataEntry::into_metadata));
        }
        Ok(metadata)
    }

    async fn delete(&self, hashes: &[FileHash], file_service: &str, reason: &str) -> Result<()> {
        let request = DeleteRequest {
            hashes,
            file_service_name: file_service,
            reason,
        };
        let response = self
            .client
            .post(self.url("/add_files/delete_files"))
            .header(API_KEY_HEADER, &self.access_key)
            .json(&request)
            .send()
            .await
            .context("Failed to POST /add_files/delete_files")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("delete_files returned {}: {}", status, body);
        }
        Ok(())
    }

    async fn list_services(&self) -> Result<Services> {
        let response: ServicesResponse = self.get_json("/get_services", &[]).await?;
        Ok(Services {
            tag_services: response.local_tags,
            file_services: response.local_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_named_layout_keeps_current_tags_only() {
        let json = r#"{"metadata": [{
            "hash": "aa11",
            "service_names_to_statuses_to_display_tags": {
                "Imported Tags": {"0": ["original:bb22", "creator:x"], "2": ["pending:tag"]},
                "my tags": {"1": ["deleted:tag"]}
            }
        }]}"#;
        let response: MetadataResponse = serde_json::from_str(json).unwrap();
        let meta = response.metadata.into_iter().next().unwrap().into_metadata();

        assert_eq!(meta.hash, "aa11");
        assert_eq!(meta.tags("Imported Tags"), &["original:bb22".to_string(), "creator:x".to_string()]);
        assert!(meta.tags("my tags").is_empty());
    }

    #[test]
    fn test_metadata_keyed_layout() {
        let json = r#"{"metadata": [{
            "hash": "cc33",
            "tags": {
                "6c6f63616c2074616773": {
                    "name": "Imported Tags",
                    "display_tags": {"0": ["original:dd44"]}
                }
            }
        }]}"#;
        let response: MetadataResponse = serde_json::from_str(json).unwrap();
        let meta = response.metadata.into_iter().next().unwrap().into_metadata();

        assert_eq!(meta.tags("Imported Tags"), &["original:dd44".to_string()]);
    }

    #[test]
    fn test_services_response() {
        let json = r#"{
            "local_tags": [{"name": "my tags", "service_key": "6c"}],
            "local_files": [{"name": "my files", "service_key": "7f"}, {"name": "web-transcodes", "service_key": "8a"}],
            "all_known_files": [{"name": "all known files", "service_key": "9b"}]
        }"#;
        let response: ServicesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.local_tags.len(), 1);
        assert_eq!(response.local_files[1].name, "web-transcodes");
    }

    #[test]
    fn test_delete_request_body() {
        let hashes = vec!["ee55".to_string()];
        let body = serde_json::to_value(DeleteRequest {
            hashes: &hashes,
            file_service_name: "web-transcodes",
            reason: "[cleanup] deleted original file",
        })
        .unwrap();
        assert_eq!(body["hashes"][0], "ee55");
        assert_eq!(body["file_service_name"], "web-transcodes");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HydrusClient::new("http://127.0.0.1:45869/", "key");
        assert_eq!(client.url("/get_services"), "http://127.0.0.1:45869/get_services");
    }
}
