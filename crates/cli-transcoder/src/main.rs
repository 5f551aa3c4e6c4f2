use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use humansize::{format_size, DECIMAL};
use log::{error, info, warn};
use std::path::PathBuf;
use transcoder::{
    preflight, CleanupReport, ConversionPass, ConversionReport, ExternalTools, FileLocator,
    HydrusClient, ReconciliationPass, SearchQuery, StoreClient, TranscodeConfig,
};

/// Transcode Hydrus files into smaller web formats and clean up stale transcodes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Delete transcodes whose original no longer exists
    #[arg(long)]
    cleanup: bool,

    /// Search the store and convert every match, e.g. --search "creator:someone" "system:filetype = image"
    #[arg(long, num_args = 0..)]
    search: Vec<String>,

    /// Replace files that already have a transcode
    #[arg(long)]
    overwrite: bool,

    /// Never run the video encoder
    #[arg(long, alias = "skip-movies")]
    skip_video: bool,
}

/// Signed human readable size, e.g. "-1.2 MB"
fn format_saved(bytes: i64) -> String {
    let size = format_size(bytes.unsigned_abs(), DECIMAL);
    if bytes < 0 {
        format!("-{}", size)
    } else {
        size
    }
}

fn print_cleanup_summary(report: &CleanupReport) {
    println!("Cleanup {}:", report.run_id);
    println!(
        "  {} checked, {} deleted, {} kept, {} unlinked",
        report.checked, report.deleted, report.kept, report.unlinked
    );
    for ambiguity in &report.ambiguous {
        println!("  ⚠️  {}", ambiguity);
    }
    for failure in &report.failures {
        println!("  ❌ {}", failure);
    }
    for ambiguity in &report.link_ambiguities {
        println!(
            "  ⚠️  {} links to {} (ignored: {})",
            ambiguity.derivative,
            ambiguity.chosen,
            ambiguity.ignored.join(", ")
        );
    }
}

fn print_conversion_summary(report: &ConversionReport, output_dir: &std::path::Path) {
    println!("Conversion {}:", report.run_id);
    println!(
        "  {} converted, {} skipped, {} errors, {} replaced",
        report.converted.len(),
        report.skipped.len(),
        report.errors.len(),
        report.replaced.len()
    );
    for error in &report.errors {
        println!("  ❌ {}", error);
    }
    for ambiguity in &report.link_ambiguities {
        println!(
            "  ⚠️  {} links to {} (ignored: {})",
            ambiguity.derivative,
            ambiguity.chosen,
            ambiguity.ignored.join(", ")
        );
    }
    println!("Total size saved: {}", format_saved(report.run_state.bytes_saved()));
    if !report.converted.is_empty() {
        println!(
            "Converted files are in {}; import them into the store (e.g. via an import folder) to finish.",
            output_dir.display()
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins when set, otherwise info (or debug with --verbose)
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    if !args.cleanup && args.search.is_empty() {
        Args::command().print_help()?;
        println!();
        return Ok(());
    }

    let mut cfg = TranscodeConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if args.overwrite {
        cfg.overwrite_existing = true;
    }
    if args.skip_video {
        info!("Skipping videos");
        cfg.skip_video = true;
    }

    info!("Configuration loaded:");
    info!("  API: {}", cfg.api_url);
    info!("  Link namespace: {}", cfg.link_namespace);
    info!("  Transcode file service: {}", cfg.derivative_file_service);
    info!("  Tag service: {}", cfg.tag_service);
    info!("  Data path: {}", cfg.data_path.display());
    info!("  Output dir: {}", cfg.output_dir.display());

    let store = HydrusClient::from_config(&cfg);
    let tools = ExternalTools::from_config(&cfg);

    if let Err(e) = preflight::run(&cfg, &store, &tools).await {
        error!("There was an error with the configuration, aborting");
        return Err(e).context("Preflight checks failed");
    }

    if args.cleanup {
        info!("🔧 Starting cleanup pass");
        let report = ReconciliationPass::new(&store, &cfg)
            .run()
            .await
            .context("Cleanup pass failed")?;
        print_cleanup_summary(&report);
    }

    if !args.search.is_empty() {
        info!("🔧 Searching for {:?}", args.search);
        let results = store
            .search(&SearchQuery::new(args.search.iter()))
            .await
            .context("Failed to search for files to convert")?;
        info!("Found {} files, starting transcoding", results.len());
        if results.is_empty() {
            warn!("Search matched nothing");
        }

        let locator = FileLocator::new(&cfg.data_path);
        let report = ConversionPass::new(&store, &locator, &tools, &cfg)
            .run(&results, cfg.overwrite_existing)
            .await
            .context("Conversion pass failed")?;
        print_conversion_summary(&report, &cfg.output_dir);
    }

    Ok(())
}
