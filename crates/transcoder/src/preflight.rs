//! Checks run before any pass; every problem is fatal.

use log::{error, info, warn};
use crate::config::TranscodeConfig;
use crate::encoder::ExternalTools;
use crate::error::{Result, TranscodeError};
use crate::locator::FileLocator;
use crate::store::{Services, StoreClient};

/// Problems with the configuration values themselves
pub fn check_config(cfg: &TranscodeConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if cfg.link_namespace.is_empty() || cfg.link_namespace.contains(':') {
        problems.push(format!("invalid link namespace {:?}", cfg.link_namespace));
    }
    if cfg.derivative_file_service.is_empty() {
        problems.push("derivative file service is not set".to_string());
    }
    if cfg.tag_service.is_empty() {
        problems.push("tag service is not set".to_string());
    }
    if cfg.data_path.as_os_str().is_empty() {
        problems.push("data path is not set".to_string());
    }
    for (name, profile) in [("video", &cfg.profiles.video), ("gif_video", &cfg.profiles.gif_video)] {
        if profile.min_duration > profile.max_duration {
            problems.push(format!(
                "{} profile has min_duration {} above max_duration {}",
                name, profile.min_duration, profile.max_duration
            ));
        }
    }
    if cfg.access_key.is_empty() {
        warn!("No API access key configured, the store will likely refuse requests");
    }

    problems
}

/// Problems with the services the store reports
pub fn check_services(cfg: &TranscodeConfig, services: &Services) -> Vec<String> {
    let mut problems = Vec::new();
    if !services.has_file_service(&cfg.derivative_file_service) {
        problems.push(format!("file service {:?} does not exist", cfg.derivative_file_service));
    }
    if !services.has_tag_service(&cfg.tag_service) {
        problems.push(format!("tag service {:?} does not exist", cfg.tag_service));
    }
    problems
}

/// Problems with the data folder and output folder; creates the output folder if missing
pub fn check_paths(cfg: &TranscodeConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = FileLocator::new(&cfg.data_path).verify_layout() {
        problems.push(e.to_string());
    }

    if !cfg.output_dir.exists() {
        info!("Output folder {} doesn't exist, creating it", cfg.output_dir.display());
        if let Err(e) = std::fs::create_dir_all(&cfg.output_dir) {
            problems.push(format!("cannot create output folder {}: {}", cfg.output_dir.display(), e));
        }
    } else if !cfg.output_dir.is_dir() {
        problems.push(format!("output path {} is not a directory", cfg.output_dir.display()));
    }

    problems
}

/// Validate everything a pass depends on, returning the store's services
pub async fn run(cfg: &TranscodeConfig, store: &dyn StoreClient, tools: &ExternalTools) -> Result<Services> {
    let mut problems = check_config(cfg);

    let services = match store.list_services().await {
        Ok(services) => {
            problems.extend(check_services(cfg, &services));
            services
        }
        Err(e) => {
            problems.push(format!("cannot list services: {:#}", e));
            Services::default()
        }
    };

    problems.extend(check_paths(cfg));

    if let Err(e) = tools.verify(!cfg.skip_video).await {
        problems.push(e.to_string());
    }

    if problems.is_empty() {
        info!("✅ Configuration checks passed");
        Ok(services)
    } else {
        for problem in &problems {
            error!("❌ {}", problem);
        }
        Err(TranscodeError::config(problems.join("; ")))
    }
}
