//! Search-and-convert: transcoding of originals that lack a transcode.

use std::collections::HashSet;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;
use crate::config::TranscodeConfig;
use crate::decision::{Action, DecisionEngine, DecisionInput, EncodePlan, MediaCategory, SkipReason};
use crate::encoder::MediaTools;
use crate::error::{ItemError, TranscodeError};
use crate::link::{LinkAmbiguity, LinkIndex, LinkReader};
use crate::locator::FileLocator;
use crate::store::{FileHash, SearchQuery, StoreClient};

/// Reason recorded by the store when a transcode is replaced
pub const OVERWRITE_REASON: &str = "[transcode] replaced by a new transcode";

/// Running totals of one conversion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    bytes_saved: i64,
}

impl RunState {
    /// Account one image conversion; growth counts as a negative saving
    pub fn record(&mut self, original_bytes: u64, output_bytes: u64) -> i64 {
        let delta = original_bytes as i64 - output_bytes as i64;
        self.bytes_saved += delta;
        delta
    }

    pub fn bytes_saved(&self) -> i64 {
        self.bytes_saved
    }
}

/// Which encoder produced a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Image,
    Video,
    /// An image routed through the video encoder
    VideoFallback,
}

#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub hash: FileHash,
    pub source: PathBuf,
    pub output: PathBuf,
    pub encoder: EncoderKind,
    pub original_bytes: u64,
    pub output_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub hash: FileHash,
    pub reason: SkipReason,
}

/// Outcome of one conversion pass
#[derive(Debug)]
pub struct ConversionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub converted: Vec<ConvertedFile>,
    pub skipped: Vec<SkippedFile>,
    pub errors: Vec<ItemError>,
    /// Transcodes deleted to make room for a new one
    pub replaced: Vec<FileHash>,
    pub link_ambiguities: Vec<LinkAmbiguity>,
    pub run_state: RunState,
}

impl ConversionReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            converted: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            replaced: Vec::new(),
            link_ambiguities: Vec::new(),
            run_state: RunState::default(),
        }
    }

    fn skip(&mut self, hash: &str, reason: SkipReason) {
        info!("Skipping {}: {}", hash, reason);
        self.skipped.push(SkippedFile {
            hash: hash.to_string(),
            reason,
        });
    }
}

/// Converts candidate originals that do not have a transcode yet
pub struct ConversionPass<'a> {
    store: &'a dyn StoreClient,
    locator: &'a FileLocator,
    tools: &'a dyn MediaTools,
    cfg: &'a TranscodeConfig,
    engine: DecisionEngine,
}

impl<'a> ConversionPass<'a> {
    pub fn new(
        store: &'a dyn StoreClient,
        locator: &'a FileLocator,
        tools: &'a dyn MediaTools,
        cfg: &'a TranscodeConfig,
    ) -> Self {
        Self {
            store,
            locator,
            tools,
            cfg,
            engine: DecisionEngine::from_config(cfg),
        }
    }

    /// Index every current transcode by its original
    pub async fn build_index(&self) -> Result<LinkIndex> {
        let cfg = self.cfg;
        let query = SearchQuery::new([cfg.link_wildcard()])
            .in_file_service(&cfg.derivative_file_service)
            .in_tag_service(&cfg.tag_service);
        let derivatives = self
            .store
            .search(&query)
            .await
            .context("Failed to search for existing transcodes")?;
        let metadata = self
            .store
            .get_metadata(&derivatives)
            .await
            .context("Failed to fetch metadata of existing transcodes")?;

        let reader = LinkReader::new(&cfg.link_namespace, &cfg.tag_service);
        let index = LinkIndex::build(&reader, &metadata);
        info!(
            "Found {} transcodes covering {} originals",
            metadata.len(),
            index.len()
        );
        Ok(index)
    }

    pub async fn run(&self, candidates: &[FileHash], overwrite: bool) -> Result<ConversionReport> {
        let mut report = ConversionReport::new();

        tokio::fs::create_dir_all(&self.cfg.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", self.cfg.output_dir.display()))?;

        let index = self.build_index().await?;
        report.link_ambiguities = index.ambiguities().to_vec();

        let mut seen = HashSet::new();
        let total = candidates.len();

        for (position, candidate) in candidates.iter().enumerate() {
            let hash = candidate.trim().to_lowercase();
            if !seen.insert(hash.clone()) {
                debug!("Candidate {} listed more than once", hash);
                continue;
            }

            let existing = index.derivatives_of(&hash);
            if !existing.is_empty() {
                if !overwrite {
                    debug!("{} already has transcode(s) {:?}", hash, existing);
                    report.skip(&hash, SkipReason::AlreadyTranscoded);
                    continue;
                }
                self.delete_existing(&hash, existing, &mut report).await;
            }

            if let Err(e) = self.convert_one(&hash, &mut report).await {
                warn!("❌ Conversion of {} failed: {}", hash, e);
                report.errors.push(ItemError::new(hash.clone(), e));
            }
            info!("Done with file {}/{}", position + 1, total);
        }

        report.finished_at = Some(Utc::now());
        info!(
            "Conversion finished: {} converted, {} skipped, {} errors",
            report.converted.len(),
            report.skipped.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Best-effort removal of the transcodes being replaced
    async fn delete_existing(&self, hash: &str, existing: &[FileHash], report: &mut ConversionReport) {
        for derivative in existing {
            info!("🗑️  Deleting transcode {} of {} before re-encoding", derivative, hash);
            match self
                .store
                .delete(
                    std::slice::from_ref(derivative),
                    &self.cfg.derivative_file_service,
                    OVERWRITE_REASON,
                )
                .await
            {
                Ok(()) => report.replaced.push(derivative.clone()),
                Err(e) => {
                    warn!("Failed to delete transcode {}: {:#}", derivative, e);
                    report.errors.push(ItemError::new(
                        derivative.clone(),
                        TranscodeError::deletion(derivative.clone(), format!("{:#}", e)),
                    ));
                }
            }
        }
    }

    async fn convert_one(&self, hash: &str, report: &mut ConversionReport) -> crate::error::Result<()> {
        let source = self.locator.locate(hash)?;
        let original_bytes = tokio::fs::metadata(&source).await?.len();
        let category = MediaCategory::from_path(&source);

        let probe = if self.engine.needs_probe(category, original_bytes) {
            Some(self.tools.probe(&source).await?)
        } else {
            None
        };

        let action = self.engine.decide(DecisionInput {
            category,
            byte_size: original_bytes,
            probe: probe.as_ref(),
        });

        let (encoder, output) = match action {
            Action::Skip(reason) => {
                report.skip(hash, reason);
                return Ok(());
            }
            Action::ConvertWithProfile(EncodePlan::Image(profile)) => {
                let output = self.cfg.output_path(hash, &profile.format);
                encode_into(&output, self.tools.encode_image(&source, &output, &profile)).await?;
                (EncoderKind::Image, output)
            }
            Action::ConvertWithProfile(EncodePlan::Video(plan)) => {
                let output = self.cfg.output_path(hash, &plan.profile.format);
                encode_into(&output, self.tools.encode_video(&source, &output, &plan)).await?;
                (EncoderKind::Video, output)
            }
            Action::ConvertViaFallback(plan) => {
                info!(
                    "{} is larger than {} bytes, using the video encoder",
                    source.display(),
                    self.cfg.large_gif_threshold
                );
                let output = self.cfg.output_path(hash, &plan.profile.format);
                encode_into(&output, self.tools.encode_video(&source, &output, &plan)).await?;
                (EncoderKind::VideoFallback, output)
            }
        };

        let output_bytes = output_size(&output).await?;
        if encoder == EncoderKind::Image {
            let delta = report.run_state.record(original_bytes, output_bytes);
            info!("File smaller by {:.1}KB", delta as f64 / 1024.0);
        }

        info!("✅ Converted {} -> {}", source.display(), output.display());
        report.converted.push(ConvertedFile {
            hash: hash.to_string(),
            source,
            output,
            encoder,
            original_bytes,
            output_bytes,
        });
        Ok(())
    }
}

/// Await `encode`, leaving nothing at `output` unless it succeeds
async fn encode_into<F>(output: &Path, encode: F) -> crate::error::Result<()>
where
    F: Future<Output = crate::error::Result<()>>,
{
    if tokio::fs::try_exists(output).await? {
        info!("🗑️  Deleting stale output {}", output.display());
        tokio::fs::remove_file(output).await?;
    }

    if let Err(e) = encode.await {
        match tokio::fs::remove_file(output).await {
            Ok(()) => info!("🗑️  Deleted abandoned output {}", output.display()),
            Err(io) if io.kind() == ErrorKind::NotFound => {}
            Err(io) => warn!("Failed to delete abandoned output {}: {}", output.display(), io),
        }
        return Err(e);
    }
    Ok(())
}

async fn output_size(output: &Path) -> crate::error::Result<u64> {
    Ok(tokio::fs::metadata(output).await?.len())
}
