//! Decides whether a source can be remuxed (stream-copy) rather than
//! re-encoded, given a probed [`MediaInfo`] and a target [`TranscodeProfile`].

use super::prober::MediaInfo;
use crate::state::TranscodeProfile;

/// Resolution target in pixels, `None` for `"original"` (no constraint).
fn resolution_pixels(resolution: &str) -> Option<(u32, u32)> {
    match resolution {
        "720p" => Some((1280, 720)),
        "1080p" => Some((1920, 1080)),
        "1440p" => Some((2560, 1440)),
        "4k" => Some((3840, 2160)),
        _ => None,
    }
}

/// Frame rate target in fps, `None` for `"original"` (no constraint).
///
/// Fractional rates use the N/1001 convention: 23.976 = 24000/1001,
/// 29.97 = 30000/1001, 59.94 = 60000/1001.
fn fps_target(fps: &str) -> Option<f64> {
    match fps {
        "23.976" => Some(24000.0 / 1001.0),
        "24" => Some(24.0),
        "25" => Some(25.0),
        "29.97" => Some(30000.0 / 1001.0),
        "30" => Some(30.0),
        "50" => Some(50.0),
        "59.94" => Some(60000.0 / 1001.0),
        "60" => Some(60.0),
        _ => None,
    }
}

/// Parses a bitrate literal like `"8M"` or `"192k"` into bits per second.
fn parse_bitrate_bps(literal: &str) -> Option<u64> {
    if literal.is_empty() {
        return None;
    }
    let (digits, mult) = if let Some(d) = literal.strip_suffix(['M', 'm']) {
        (d, 1_000_000.0)
    } else if let Some(d) = literal.strip_suffix(['K', 'k']) {
        (d, 1_000.0)
    } else {
        (literal, 1.0)
    };
    let value: f64 = digits.parse().ok()?;
    Some((value * mult) as u64)
}

/// Maps the target codec literal (`"h264"`/`"h265"`) to the codec name
/// ffprobe reports for a matching stream (`"h264"`/`"hevc"`).
fn target_video_codec_name(codec: &str) -> Option<&'static str> {
    match codec {
        "h264" => Some("h264"),
        "h265" => Some("hevc"),
        _ => None,
    }
}

/// Returns `true` if `info` already satisfies `target` closely enough that
/// stream-copy (remux) can be used instead of re-encoding.
///
/// Missing probe info (empty record or no video codec) always blocks remux;
/// unknown source bitrates are permissive and never block it.
#[must_use]
pub fn specs_match(info: &MediaInfo, target: &TranscodeProfile) -> bool {
    if info.is_empty() {
        return false;
    }

    let Some(target_codec) = target_video_codec_name(&target.codec) else {
        return false;
    };
    if info.video_codec.as_deref() != Some(target_codec) {
        return false;
    }

    if info.audio_codec.as_deref() != Some("aac") {
        return false;
    }

    if let Some((w, h)) = resolution_pixels(&target.resolution) {
        match (info.width, info.height) {
            (Some(sw), Some(sh)) if sw == w && sh == h => {}
            _ => return false,
        }
    }

    if let Some(target_fps) = fps_target(&target.fps) {
        match info.fps {
            Some(src_fps) if (src_fps - target_fps).abs() <= 0.1 => {}
            _ => return false,
        }
    }

    if let Some(target_vbitrate) = parse_bitrate_bps(&target.vbitrate) {
        if let Some(src_vbitrate) = info.video_bitrate {
            if src_vbitrate as f64 > 1.2 * target_vbitrate as f64 {
                return false;
            }
        }
    }

    if let Some(target_abitrate) = parse_bitrate_bps(&target.abitrate) {
        if let Some(src_abitrate) = info.audio_bitrate {
            if src_abitrate as f64 > 1.2 * target_abitrate as f64 {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TranscodeProfile {
        TranscodeProfile {
            codec: "h264".to_string(),
            preset: "fast".to_string(),
            vbitrate: "8M".to_string(),
            abitrate: "192k".to_string(),
            resolution: "1080p".to_string(),
            fps: "23.976".to_string(),
        }
    }

    fn matching_info() -> MediaInfo {
        MediaInfo {
            video_codec: Some("h264".to_string()),
            width: Some(1920),
            height: Some(1080),
            fps: Some(24000.0 / 1001.0),
            video_bitrate: Some(5_000_000),
            audio_codec: Some("aac".to_string()),
            audio_bitrate: Some(160_000),
        }
    }

    #[test]
    fn matching_source_allows_remux() {
        assert!(specs_match(&matching_info(), &target()));
    }

    #[test]
    fn empty_info_blocks_remux() {
        assert!(!specs_match(&MediaInfo::empty(), &target()));
    }

    #[test]
    fn codec_mismatch_blocks_remux() {
        let mut info = matching_info();
        info.video_codec = Some("hevc".to_string());
        assert!(!specs_match(&info, &target()));
    }

    #[test]
    fn non_aac_audio_blocks_remux() {
        let mut info = matching_info();
        info.audio_codec = Some("mp3".to_string());
        assert!(!specs_match(&info, &target()));
    }

    #[test]
    fn resolution_mismatch_blocks_remux() {
        let mut info = matching_info();
        info.width = Some(1280);
        info.height = Some(720);
        assert!(!specs_match(&info, &target()));
    }

    #[test]
    fn original_resolution_target_has_no_constraint() {
        let mut info = matching_info();
        info.width = Some(640);
        info.height = Some(480);
        let mut t = target();
        t.resolution = "original".to_string();
        assert!(specs_match(&info, &t));
    }

    #[test]
    fn fps_within_tolerance_allows_remux() {
        let mut info = matching_info();
        info.fps = Some(23.9); // within 0.1 of 23.976
        assert!(specs_match(&info, &target()));
    }

    #[test]
    fn fps_outside_tolerance_blocks_remux() {
        let mut info = matching_info();
        info.fps = Some(25.0);
        assert!(!specs_match(&info, &target()));
    }

    #[test]
    fn unknown_source_bitrate_is_permissive() {
        let mut info = matching_info();
        info.video_bitrate = None;
        info.audio_bitrate = None;
        assert!(specs_match(&info, &target()));
    }

    #[test]
    fn excessive_video_bitrate_blocks_remux() {
        let mut info = matching_info();
        info.video_bitrate = Some(20_000_000); // > 1.2 * 8M
        assert!(!specs_match(&info, &target()));
    }

    #[test]
    fn video_bitrate_within_1_2x_tolerance_allows_remux() {
        let mut info = matching_info();
        info.video_bitrate = Some(9_000_000); // 1.125x of 8M, within tolerance
        assert!(specs_match(&info, &target()));
    }
}
