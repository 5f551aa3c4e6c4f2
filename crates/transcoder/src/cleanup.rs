//! Removal of transcodes whose original is gone from the store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;
use crate::config::TranscodeConfig;
use crate::error::{ItemError, TranscodeError};
use crate::link::{LinkAmbiguity, LinkReader};
use crate::store::{FileHash, SearchQuery, StoreClient};

/// Reason recorded by the store for every cleanup deletion
pub const CLEANUP_REASON: &str = "[cleanup] deleted original file";

/// Outcome of one cleanup pass
#[derive(Debug)]
pub struct CleanupReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Transcodes examined
    pub checked: usize,
    /// Transcodes deleted because their original is gone
    pub deleted: usize,
    /// Transcodes whose original was confirmed
    pub kept: usize,
    /// Transcodes with no usable link tag
    pub unlinked: usize,
    /// Transcodes whose original matched several files, deleted unless configured otherwise
    pub ambiguous: Vec<ItemError>,
    pub failures: Vec<ItemError>,
    pub link_ambiguities: Vec<LinkAmbiguity>,
}

impl CleanupReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            checked: 0,
            deleted: 0,
            kept: 0,
            unlinked: 0,
            ambiguous: Vec::new(),
            failures: Vec::new(),
            link_ambiguities: Vec::new(),
        }
    }
}

enum OriginalStatus {
    Present,
    Missing,
    Ambiguous(Vec<FileHash>),
}

async fn original_status(store: &dyn StoreClient, original: &str) -> crate::error::Result<OriginalStatus> {
    let matches = store
        .search(&SearchQuery::by_hash(original))
        .await
        .map_err(TranscodeError::store)?;

    Ok(match matches.len() {
        0 => OriginalStatus::Missing,
        1 => OriginalStatus::Present,
        _ => OriginalStatus::Ambiguous(matches),
    })
}

/// Delete transcodes whose linked original no longer exists
pub struct ReconciliationPass<'a> {
    store: &'a dyn StoreClient,
    cfg: &'a TranscodeConfig,
}

impl<'a> ReconciliationPass<'a> {
    pub fn new(store: &'a dyn StoreClient, cfg: &'a TranscodeConfig) -> Self {
        Self { store, cfg }
    }

    async fn delete_derivative(&self, hash: &FileHash, report: &mut CleanupReport) {
        info!("🗑️  Deleting transcode {}", hash);
        match self
            .store
            .delete(std::slice::from_ref(hash), &self.cfg.derivative_file_service, CLEANUP_REASON)
            .await
        {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                warn!("Failed to delete transcode {}: {:#}", hash, e);
                report
                    .failures
                    .push(ItemError::new(hash.clone(), TranscodeError::deletion(hash.clone(), format!("{:#}", e))));
            }
        }
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::new();
        let cfg = self.cfg;

        let query = SearchQuery::new([cfg.link_wildcard()])
            .in_file_service(&cfg.derivative_file_service)
            .in_tag_service(&cfg.tag_service);
        let derivatives = self
            .store
            .search(&query)
            .await
            .context("Failed to search for transcodes")?;
        let metadata = self
            .store
            .get_metadata(&derivatives)
            .await
            .context("Failed to fetch transcode metadata")?;
        info!("Found {} transcodes to check", metadata.len());

        let reader = LinkReader::new(&cfg.link_namespace, &cfg.tag_service);
        let total = metadata.len();

        for (position, meta) in metadata.iter().enumerate() {
            report.checked += 1;
            debug!("Processing transcode {} ({}/{})", meta.hash, position + 1, total);

            let (record, ambiguity) = reader.resolve(meta);
            report.link_ambiguities.extend(ambiguity);

            let Some(original) = record.original else {
                report.unlinked += 1;
                continue;
            };

            match original_status(self.store, &original).await {
                Ok(OriginalStatus::Present) => report.kept += 1,
                Ok(OriginalStatus::Missing) => {
                    debug!("Original {} of {} is gone", original, meta.hash);
                    self.delete_derivative(&meta.hash, &mut report).await;
                }
                Ok(OriginalStatus::Ambiguous(matches)) => {
                    warn!(
                        "⚠️  Original {} of transcode {} matched {} files",
                        original,
                        meta.hash,
                        matches.len()
                    );
                    report.ambiguous.push(ItemError::new(
                        meta.hash.clone(),
                        TranscodeError::LookupAmbiguity {
                            hash: original,
                            matches,
                        },
                    ));
                    if !cfg.keep_on_ambiguous_original {
                        self.delete_derivative(&meta.hash, &mut report).await;
                    }
                }
                Err(e) => {
                    warn!("Failed to look up original {} of {}: {}", original, meta.hash, e);
                    report.failures.push(ItemError::new(meta.hash.clone(), e));
                }
            }
        }

        report.finished_at = Some(Utc::now());
        info!(
            "Cleanup finished: {} checked, {} deleted, {} kept, {} unlinked, {} ambiguous, {} failures",
            report.checked,
            report.deleted,
            report.kept,
            report.unlinked,
            report.ambiguous.len(),
            report.failures.len()
        );
        Ok(report)
    }
}
