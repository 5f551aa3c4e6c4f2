use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Encoding parameters for the image encoder (ImageMagick)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProfile {
    /// Quality passed to `-quality` (50-75 is a good size/quality ratio for webp)
    pub quality: u32,
    /// Output file type, also used as the output file extension
    pub format: String,
    /// Whether output should be shrunk to fit `max_width` x `max_height`
    pub resize: bool,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ImageProfile {
    fn default() -> Self {
        Self {
            quality: 50,
            format: "webp".to_string(),
            resize: true,
            max_width: 1920,
            max_height: 1920,
        }
    }
}

/// Encoding parameters for the video encoder (ffmpeg)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoProfile {
    /// Constant quality factor passed as `-crf` (30-36 keeps 1080p looking good)
    pub quality: u32,
    pub format: String,
    pub codec: String,
    pub resize: bool,
    pub max_width: u32,
    pub max_height: u32,
    /// Files shorter than this (seconds) are not converted
    pub min_duration: f64,
    /// Files longer than this (seconds) are not converted
    pub max_duration: f64,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            quality: 35,
            format: "webm".to_string(),
            codec: "libvpx-vp9".to_string(),
            resize: true,
            max_width: 1280,
            max_height: 1280,
            min_duration: 0.0,
            max_duration: 60.0,
        }
    }
}

/// Per-category encoding profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profiles {
    pub jpg: ImageProfile,
    pub png: ImageProfile,
    pub gif: ImageProfile,
    /// Used for GIFs above the large-file threshold, routed through ffmpeg
    pub gif_video: VideoProfile,
    pub video: VideoProfile,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            jpg: ImageProfile::default(),
            png: ImageProfile::default(),
            gif: ImageProfile::default(),
            gif_video: VideoProfile {
                quality: 50,
                format: "webp".to_string(),
                codec: "libwebp_anim".to_string(),
                ..VideoProfile::default()
            },
            video: VideoProfile::default(),
        }
    }
}

/// Configuration for the transcoder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Base URL of the Hydrus client API
    pub api_url: String,
    /// Hydrus client API access key
    pub access_key: String,
    /// Namespace of the link tag, stored as `<namespace>:<hash of original>`
    pub link_namespace: String,
    /// File service holding the transcoded files
    pub derivative_file_service: String,
    /// Tag service holding the link tags
    pub tag_service: String,
    /// Folder where Hydrus stores its files (the one containing `f00`..`fff`)
    pub data_path: PathBuf,
    /// Where converted files are written; add it as an import folder in Hydrus
    pub output_dir: PathBuf,
    /// Re-encode and replace files that already have a transcode
    pub overwrite_existing: bool,
    /// Never invoke the video encoder
    pub skip_video: bool,
    /// GIFs larger than this many bytes go through ffmpeg instead of magick
    pub large_gif_threshold: u64,
    /// Keep a transcode during cleanup when its original matches more than one file
    pub keep_on_ambiguous_original: bool,
    pub magick_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub profiles: Profiles,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl TranscodeConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            api_url: "http://127.0.0.1:45869".to_string(),
            access_key: String::new(),
            link_namespace: "original".to_string(),
            derivative_file_service: "web-transcodes".to_string(),
            tag_service: "Imported Tags".to_string(),
            data_path: PathBuf::new(),
            output_dir: PathBuf::from("./converted"),
            overwrite_existing: false,
            skip_video: false,
            large_gif_threshold: 50 * 1024 * 1024, // 50 MiB
            keep_on_ambiguous_original: false,
            magick_bin: PathBuf::from("magick"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            profiles: Profiles::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// The search tag matching every link tag, e.g. `original:*`
    pub fn link_wildcard(&self) -> String {
        format!("{}:*", self.link_namespace)
    }

    /// Output path for the transcode of `hash` with the given extension
    pub fn output_path(&self, hash: &str, format: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", hash, format))
    }
}
