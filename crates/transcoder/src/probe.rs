use std::path::Path;
use serde::Deserialize;
use crate::error::{Result, TranscodeError};

/// Measured properties of the primary video stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaProbe {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

/// The subset of ffprobe JSON output we request
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Some containers only report duration per stream
    pub duration: Option<String>,
}

/// Arguments for probing `path` with ffprobe
pub fn ffprobe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "format=duration:stream=width,height,duration".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

fn parse_duration(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

impl FFProbeData {
    /// Reduce ffprobe output to a probe of the first video stream
    pub fn to_probe(&self, path: &Path) -> Result<MediaProbe> {
        let probe_error = |message: &str| TranscodeError::Probe {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        let stream = self
            .streams
            .first()
            .ok_or_else(|| probe_error("no video stream"))?;
        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(probe_error("video stream has no dimensions")),
        };

        let duration_secs = self
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_duration)
            .or_else(|| stream.duration.as_deref().and_then(parse_duration))
            .ok_or_else(|| probe_error("no usable duration"))?;

        Ok(MediaProbe {
            width,
            height,
            duration_secs,
        })
    }
}

/// Parse the JSON printed by ffprobe for `path`
pub fn parse_ffprobe_output(path: &Path, json: &str) -> Result<MediaProbe> {
    let data: FFProbeData = serde_json::from_str(json).map_err(|e| TranscodeError::Probe {
        path: path.to_path_buf(),
        message: format!("invalid ffprobe JSON: {}", e),
    })?;
    data.to_probe(path)
}
