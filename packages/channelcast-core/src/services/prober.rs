//! Runs `ffprobe` and parses duration, codec, resolution, frame rate, and
//! bitrate from its output.
//!
//! The prober never raises: every failure mode (missing binary, timeout,
//! unparseable output) collapses to an empty result, which callers treat as
//! "unknown, make no assumptions" per the error design's `ProbeError`
//! semantics.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::process_supervisor::{StdoutMode, SupervisedChild};
use crate::protocol_constants::{PROBE_DURATION_TIMEOUT_SECS, PROBE_INFO_TIMEOUT_SECS};

/// Media information extracted from a probed file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub video_bitrate: Option<u64>,
    pub audio_codec: Option<String>,
    pub audio_bitrate: Option<u64>,
}

impl MediaInfo {
    /// An empty record, as returned when probing fails entirely.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no video stream was found — the failure channel for
    /// `probe_video_info`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.video_codec.is_none()
    }
}

// ffprobe's `-of json` output shape, trimmed to the fields we read.
#[derive(Deserialize)]
struct ProbeDoc {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: String,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
}

/// Parses ffprobe's `num/den` frame rate fraction, e.g. `"30000/1001"`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Runs `ffprobe -v quiet -print_format json -show_format -show_streams
/// <path>` and returns its parsed stdout, or `None` on any failure.
async fn run_probe(path: &Path, timeout: Duration) -> Option<ProbeDoc> {
    let argv = vec![
        "ffprobe".to_string(),
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().into_owned(),
    ];
    let mut child = SupervisedChild::spawn(&argv, StdoutMode::Collect { timeout }).ok()?;
    let stdout = child.collect_stdout(timeout).await.ok()?;
    let _ = child.wait().await;
    serde_json::from_str(&stdout).ok()
}

/// Returns the duration of `path` in seconds, or `0.0` on any failure.
///
/// Callers must treat `0.0` as "unknown" rather than a literal zero-length
/// file — the prober has no distinct "unknown" sentinel beyond this.
pub async fn probe_duration(path: &Path) -> f64 {
    let timeout = Duration::from_secs(PROBE_DURATION_TIMEOUT_SECS);
    let Some(doc) = run_probe(path, timeout).await else {
        return 0.0;
    };
    doc.format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0)
}

/// Extracts video/audio codec, resolution, frame rate, and bitrates from
/// `path`. Returns an empty [`MediaInfo`] if ffprobe fails, times out, or no
/// video stream is present.
pub async fn probe_video_info(path: &Path) -> MediaInfo {
    let timeout = Duration::from_secs(PROBE_INFO_TIMEOUT_SECS);
    let Some(doc) = run_probe(path, timeout).await else {
        return MediaInfo::empty();
    };

    let container_bitrate = doc
        .format
        .as_ref()
        .and_then(|f| f.bit_rate.as_ref())
        .and_then(|b| b.parse::<u64>().ok());

    let video = doc.streams.iter().find(|s| s.codec_type == "video");
    let audio = doc.streams.iter().find(|s| s.codec_type == "audio");

    let Some(video) = video else {
        return MediaInfo::empty();
    };

    // The stream-level bitrate is preferred; the container-level figure is
    // used as a fallback when ffprobe doesn't report one per-stream (common
    // for MPEG-TS sources).
    let video_bitrate = video
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .or(container_bitrate);

    MediaInfo {
        video_codec: video.codec_name.clone(),
        width: video.width,
        height: video.height,
        fps: video.avg_frame_rate.as_deref().and_then(parse_frame_rate),
        video_bitrate,
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        audio_bitrate: audio
            .and_then(|a| a.bit_rate.as_ref())
            .and_then(|b| b.parse::<u64>().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_rate_handles_ntsc_fraction() {
        let fps = parse_frame_rate("30000/1001").unwrap();
        assert!((fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn parse_frame_rate_rejects_zero_denominator() {
        assert_eq!(parse_frame_rate("30/0"), None);
    }

    #[test]
    fn parse_frame_rate_rejects_malformed_input() {
        assert_eq!(parse_frame_rate("not-a-fraction"), None);
    }

    #[test]
    fn media_info_empty_has_no_video_codec() {
        assert!(MediaInfo::empty().is_empty());
    }

    #[test]
    fn media_info_with_video_codec_is_not_empty() {
        let info = MediaInfo {
            video_codec: Some("h264".to_string()),
            ..MediaInfo::empty()
        };
        assert!(!info.is_empty());
    }

    #[tokio::test]
    async fn probe_duration_of_missing_file_is_zero() {
        let path = Path::new("/nonexistent/path/to/nothing.mp4");
        assert_eq!(probe_duration(path).await, 0.0);
    }

    #[tokio::test]
    async fn probe_video_info_of_missing_file_is_empty() {
        let path = Path::new("/nonexistent/path/to/nothing.mp4");
        assert!(probe_video_info(path).await.is_empty());
    }

    #[test]
    fn probe_doc_parses_typical_ffprobe_json() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "avg_frame_rate": "24000/1001", "bit_rate": "5000000"},
                {"codec_type": "audio", "codec_name": "aac", "bit_rate": "192000"}
            ],
            "format": {"duration": "120.5", "bit_rate": "5200000"}
        }"#;
        let doc: ProbeDoc = serde_json::from_str(json).unwrap();
        assert_eq!(doc.streams.len(), 2);
        assert_eq!(doc.format.unwrap().duration.unwrap(), "120.5");
    }
}
