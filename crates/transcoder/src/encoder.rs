use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use tokio::process::Command;
use crate::config::{ImageProfile, TranscodeConfig};
use crate::decision::VideoPlan;
use crate::error::{Result, TranscodeError};
use crate::probe::{self, MediaProbe};

/// Captured result of a finished external tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `bin args...` to completion, failing on a nonzero exit status
pub async fn run_tool(bin: &Path, args: &[String], subject: &Path) -> Result<ToolOutput> {
    let tool = bin.display().to_string();
    debug!("Executing: {} {}", tool, args.join(" "));

    let output = Command::new(bin)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| TranscodeError::EncoderFailure {
            tool: tool.clone(),
            path: subject.to_path_buf(),
            exit_code: -1,
            stderr: format!("failed to start: {}", e),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(TranscodeError::EncoderFailure {
            tool,
            path: subject.to_path_buf(),
            exit_code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(ToolOutput {
        stdout,
        stderr,
    })
}

/// Encoders exit 0 on many recoverable problems and only say so on stderr
fn log_tool_warnings(bin: &Path, input: &Path, output: &ToolOutput) {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        warn!("⚠️  {} reported on {}: {}", bin.display(), input.display(), stderr);
    }
}

/// Command builder for encoder command lines
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder
    }

    /// ImageMagick arguments converting `input` into `output`
    ///
    /// The output is prefixed with the profile format so the encoder does
    /// not depend on the file extension. `>` only ever shrinks.
    pub fn build_image_command(&self, input: &Path, output: &Path, profile: &ImageProfile) -> Vec<String> {
        let mut args = vec![
            input.to_string_lossy().to_string(),
            "-quality".to_string(),
            profile.quality.to_string(),
        ];

        if profile.resize {
            args.push("-resize".to_string());
            args.push(format!("{}x{}>", profile.max_width, profile.max_height));
        }

        args.push(format!("{}:{}", profile.format, output.to_string_lossy()));
        args
    }

    /// ffmpeg arguments converting `input` into `output`
    pub fn build_video_command(&self, input: &Path, output: &Path, plan: &VideoPlan) -> Vec<String> {
        let profile = &plan.profile;
        let mut args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            profile.codec.clone(),
        ];

        if profile.codec.starts_with("libvpx") {
            // constant quality mode needs the bitrate cap disabled
            args.extend(["-b:v".to_string(), "0".to_string()]);
            args.extend(["-crf".to_string(), profile.quality.to_string()]);
            args.extend(["-row-mt".to_string(), "1".to_string()]);
        } else if profile.codec.starts_with("libwebp") {
            args.extend(["-quality".to_string(), profile.quality.to_string()]);
            args.extend(["-loop".to_string(), "0".to_string()]);
        } else {
            args.extend(["-crf".to_string(), profile.quality.to_string()]);
        }

        if let Some(scale) = plan.scale {
            args.push("-vf".to_string());
            args.push(scale.to_string());
        }

        args.push(output.to_string_lossy().to_string());
        args
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The external prober and encoders
#[async_trait::async_trait]
pub trait MediaTools: Send + Sync {
    /// Measure the first video stream of `path`
    async fn probe(&self, path: &Path) -> Result<MediaProbe>;

    /// Encode an image with the image encoder
    async fn encode_image(&self, input: &Path, output: &Path, profile: &ImageProfile) -> Result<()>;

    /// Encode a video (or large animation) with the video encoder
    async fn encode_video(&self, input: &Path, output: &Path, plan: &VideoPlan) -> Result<()>;
}

/// `magick`, `ffprobe` and `ffmpeg` run as child processes
#[derive(Debug, Clone)]
pub struct ExternalTools {
    pub magick_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

impl ExternalTools {
    pub fn from_config(cfg: &TranscodeConfig) -> Self {
        Self {
            magick_bin: cfg.magick_bin.clone(),
            ffmpeg_bin: cfg.ffmpeg_bin.clone(),
            ffprobe_bin: cfg.ffprobe_bin.clone(),
        }
    }

    /// First line of `<bin> -version`, proving the tool can be called
    pub async fn detect_version(bin: &Path) -> Result<String> {
        let output = run_tool(bin, &["-version".to_string()], bin)
            .await
            .map_err(|e| TranscodeError::config(format!("{} is not callable: {}", bin.display(), e)))?;

        output
            .stdout
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .ok_or_else(|| TranscodeError::config(format!("{} printed no version", bin.display())))
    }

    /// Check the tools needed for this run; ffmpeg and ffprobe only when video is enabled
    pub async fn verify(&self, video_enabled: bool) -> Result<()> {
        let mut bins = vec![&self.magick_bin];
        if video_enabled {
            bins.push(&self.ffmpeg_bin);
            bins.push(&self.ffprobe_bin);
        }

        for bin in bins {
            let version = Self::detect_version(bin).await?;
            info!("🔧 Found {}: {}", bin.display(), version);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaTools for ExternalTools {
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let output = run_tool(&self.ffprobe_bin, &probe::ffprobe_args(path), path).await?;
        let probe = probe::parse_ffprobe_output(path, &output.stdout)?;
        debug!(
            "Probed {}: {}x{}, {:.2}s",
            path.display(),
            probe.width,
            probe.height,
            probe.duration_secs
        );
        Ok(probe)
    }

    async fn encode_image(&self, input: &Path, output: &Path, profile: &ImageProfile) -> Result<()> {
        let args = CommandBuilder::new().build_image_command(input, output, profile);
        let result = run_tool(&self.magick_bin, &args, input).await?;
        log_tool_warnings(&self.magick_bin, input, &result);
        Ok(())
    }

    async fn encode_video(&self, input: &Path, output: &Path, plan: &VideoPlan) -> Result<()> {
        if let Some(scale) = plan.scale {
            info!("Desired resolution lower than original size, applying {}", scale);
        }
        let args = CommandBuilder::new().build_video_command(input, output, plan);
        let result = run_tool(&self.ffmpeg_bin, &args, input).await?;
        log_tool_warnings(&self.ffmpeg_bin, input, &result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoProfile;
    use crate::decision::ScaleFilter;
    use proptest::prelude::*;

    #[test]
    fn test_image_command() {
        let args = CommandBuilder::new().build_image_command(
            Path::new("/data/fab/ab12.png"),
            Path::new("/out/ab12.webp"),
            &ImageProfile::default(),
        );
        assert_eq!(
            args,
            vec!["/data/fab/ab12.png", "-quality", "50", "-resize", "1920x1920>", "webp:/out/ab12.webp"]
        );
    }

    #[test]
    fn test_image_command_without_resize() {
        let profile = ImageProfile { resize: false, quality: 70, ..ImageProfile::default() };
        let args = CommandBuilder::new().build_image_command(Path::new("a.jpg"), Path::new("a.webp"), &profile);
        assert!(!args.contains(&"-resize".to_string()));
        assert_eq!(args[2], "70");
    }

    #[test]
    fn test_vp9_command_with_scale() {
        let plan = VideoPlan {
            profile: VideoProfile::default(),
            scale: Some(ScaleFilter::Height(1280)),
        };
        let args = CommandBuilder::new().build_video_command(Path::new("in.mp4"), Path::new("out.webm"), &plan);
        assert_eq!(
            args,
            vec![
                "-v", "error", "-y", "-i", "in.mp4", "-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "35",
                "-row-mt", "1", "-vf", "scale=-1:1280", "out.webm",
            ]
        );
    }

    #[test]
    fn test_animated_webp_command() {
        let plan = VideoPlan {
            profile: VideoProfile {
                codec: "libwebp_anim".to_string(),
                format: "webp".to_string(),
                quality: 50,
                ..VideoProfile::default()
            },
            scale: None,
        };
        let args = CommandBuilder::new().build_video_command(Path::new("in.gif"), Path::new("out.webp"), &plan);
        assert!(args.windows(2).any(|w| w == ["-quality", "50"]));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
    }

    proptest! {
        /// The scale filter, when present, directly precedes the output path
        #[test]
        fn test_scale_filter_placement(
            by_width in prop::bool::ANY,
            size in 1u32..4000,
            with_scale in prop::bool::ANY,
        ) {
            let scale = with_scale.then(|| if by_width { ScaleFilter::Width(size) } else { ScaleFilter::Height(size) });
            let plan = VideoPlan { profile: VideoProfile::default(), scale };
            let args = CommandBuilder::new().build_video_command(Path::new("i.mkv"), Path::new("o.webm"), &plan);

            prop_assert_eq!(args.last().unwrap(), "o.webm");
            match scale {
                Some(s) => {
                    prop_assert_eq!(&args[args.len() - 3], "-vf");
                    prop_assert_eq!(args[args.len() - 2].clone(), s.to_string());
                }
                None => prop_assert!(!args.contains(&"-vf".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_encoder_failure() {
        let err = run_tool(Path::new("/nonexistent/bin/magick"), &[], Path::new("x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::EncoderFailure { exit_code: -1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_captures_output_and_exit_status() {
        let sh = Path::new("sh");
        let ok = run_tool(sh, &["-c".to_string(), "echo done; echo careful >&2".to_string()], Path::new("x.png"))
            .await
            .unwrap();
        assert_eq!(ok.stdout.trim(), "done");
        assert_eq!(ok.stderr.trim(), "careful");

        let err = run_tool(sh, &["-c".to_string(), "echo broken >&2; exit 3".to_string()], Path::new("x.png"))
            .await
            .unwrap_err();
        match err {
            TranscodeError::EncoderFailure { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected encoder failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_verification() {
        let tools = ExternalTools {
            magick_bin: PathBuf::from("/nonexistent/bin/magick"),
            ffmpeg_bin: PathBuf::from("/nonexistent/bin/ffmpeg"),
            ffprobe_bin: PathBuf::from("/nonexistent/bin/ffprobe"),
        };
        assert!(matches!(tools.verify(false).await, Err(TranscodeError::Configuration(_))));
    }
}
