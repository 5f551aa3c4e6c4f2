use std::fmt;
use std::path::Path;
use log::debug;
use crate::config::{ImageProfile, Profiles, TranscodeConfig, VideoProfile};
use crate::probe::MediaProbe;

/// Media category, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Jpeg,
    Png,
    Gif,
    Video,
    Unknown,
}

/// Container extensions handled by the video encoder
const VIDEO_EXTENSIONS: &[&str] = &["webm", "mp4", "avi", "mkv"];

impl MediaCategory {
    /// Classify an extension (without the dot), case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => MediaCategory::Jpeg,
            "png" => MediaCategory::Png,
            "gif" => MediaCategory::Gif,
            e if VIDEO_EXTENSIONS.contains(&e) => MediaCategory::Video,
            _ => MediaCategory::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|s| s.to_str())
            .map(Self::from_extension)
            .unwrap_or(MediaCategory::Unknown)
    }
}

/// Video resize filter keeping the aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    /// Scale to this width, height follows
    Width(u32),
    /// Scale to this height, width follows
    Height(u32),
}

impl fmt::Display for ScaleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleFilter::Width(w) => write!(f, "scale={}:-1", w),
            ScaleFilter::Height(h) => write!(f, "scale=-1:{}", h),
        }
    }
}

/// Resize filter for a source of the probed size, if it needs shrinking
///
/// Landscape and square sources are constrained by width, portrait ones by height.
pub fn scale_filter(profile: &VideoProfile, probe: &MediaProbe) -> Option<ScaleFilter> {
    if !profile.resize {
        return None;
    }
    if probe.width >= probe.height {
        (probe.width > profile.max_width).then_some(ScaleFilter::Width(profile.max_width))
    } else {
        (probe.height > profile.max_height).then_some(ScaleFilter::Height(profile.max_height))
    }
}

/// What the video encoder should run with
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPlan {
    pub profile: VideoProfile,
    pub scale: Option<ScaleFilter>,
}

/// Encoder and parameters chosen for one file
#[derive(Debug, Clone, PartialEq)]
pub enum EncodePlan {
    Image(ImageProfile),
    Video(VideoPlan),
}

impl EncodePlan {
    /// Output file extension
    pub fn format(&self) -> &str {
        match self {
            EncodePlan::Image(profile) => &profile.format,
            EncodePlan::Video(plan) => &plan.profile.format,
        }
    }
}

/// Why a file is not converted
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnsupportedType,
    DurationOutOfBounds { duration: f64, min: f64, max: f64 },
    ProbeUnavailable,
    VideoDisabled,
    AlreadyTranscoded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedType => write!(f, "unsupported type"),
            SkipReason::DurationOutOfBounds { duration, min, max } => write!(
                f,
                "duration out of bounds ({:.1}s not in {:.1}s..={:.1}s)",
                duration, min, max
            ),
            SkipReason::ProbeUnavailable => write!(f, "probe unavailable"),
            SkipReason::VideoDisabled => write!(f, "video processing disabled"),
            SkipReason::AlreadyTranscoded => write!(f, "already transcoded"),
        }
    }
}

/// Outcome of a decision
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Skip(SkipReason),
    /// Convert with the encoder native to the category
    ConvertWithProfile(EncodePlan),
    /// Convert an image through the video encoder
    ConvertViaFallback(VideoPlan),
}

/// Inputs for one decision
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub category: MediaCategory,
    pub byte_size: u64,
    pub probe: Option<&'a MediaProbe>,
}

/// Chooses whether and how a file gets transcoded
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    profiles: Profiles,
    large_gif_threshold: u64,
    skip_video: bool,
}

impl DecisionEngine {
    pub fn new(profiles: Profiles, large_gif_threshold: u64, skip_video: bool) -> Self {
        Self {
            profiles,
            large_gif_threshold,
            skip_video,
        }
    }

    pub fn from_config(cfg: &TranscodeConfig) -> Self {
        Self::new(cfg.profiles.clone(), cfg.large_gif_threshold, cfg.skip_video)
    }

    fn is_large_gif(&self, byte_size: u64) -> bool {
        byte_size > self.large_gif_threshold
    }

    /// Whether `decide` wants a probe for a file of this category and size
    pub fn needs_probe(&self, category: MediaCategory, byte_size: u64) -> bool {
        if self.skip_video {
            return false;
        }
        match category {
            MediaCategory::Video => true,
            MediaCategory::Gif => self.is_large_gif(byte_size),
            _ => false,
        }
    }

    pub fn decide(&self, input: DecisionInput<'_>) -> Action {
        let action = match input.category {
            MediaCategory::Jpeg => {
                Action::ConvertWithProfile(EncodePlan::Image(self.profiles.jpg.clone()))
            }
            MediaCategory::Png => {
                Action::ConvertWithProfile(EncodePlan::Image(self.profiles.png.clone()))
            }
            MediaCategory::Gif if self.is_large_gif(input.byte_size) => {
                if self.skip_video {
                    Action::Skip(SkipReason::VideoDisabled)
                } else {
                    let profile = &self.profiles.gif_video;
                    match input.probe {
                        Some(probe) => match self.video_plan(profile, probe) {
                            Ok(plan) => Action::ConvertViaFallback(plan),
                            Err(reason) => Action::Skip(reason),
                        },
                        None => Action::ConvertViaFallback(VideoPlan {
                            profile: profile.clone(),
                            scale: None,
                        }),
                    }
                }
            }
            MediaCategory::Gif => {
                Action::ConvertWithProfile(EncodePlan::Image(self.profiles.gif.clone()))
            }
            MediaCategory::Video => {
                if self.skip_video {
                    Action::Skip(SkipReason::VideoDisabled)
                } else {
                    match input.probe {
                        Some(probe) => match self.video_plan(&self.profiles.video, probe) {
                            Ok(plan) => Action::ConvertWithProfile(EncodePlan::Video(plan)),
                            Err(reason) => Action::Skip(reason),
                        },
                        None => Action::Skip(SkipReason::ProbeUnavailable),
                    }
                }
            }
            MediaCategory::Unknown => Action::Skip(SkipReason::UnsupportedType),
        };

        debug!("Decision for {:?} ({} bytes): {:?}", input.category, input.byte_size, action);
        action
    }

    fn video_plan(&self, profile: &VideoProfile, probe: &MediaProbe) -> Result<VideoPlan, SkipReason> {
        let duration = probe.duration_secs;
        if duration < profile.min_duration || duration > profile.max_duration {
            return Err(SkipReason::DurationOutOfBounds {
                duration,
                min: profile.min_duration,
                max: profile.max_duration,
            });
        }

        Ok(VideoPlan {
            profile: profile.clone(),
            scale: scale_filter(profile, probe),
        })
    }
}
