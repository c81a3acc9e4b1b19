//! Upload ingestion: extension validation, thumbnail generation, and the
//! data flow that routes a newly uploaded source to direct registration, a
//! remux job, or a full re-encode job, per the smart-ingest decision.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ChannelError, ChannelResult};
use crate::protocol_constants::{
    ALLOWED_EXTENSIONS, AUDIO_EXTENSIONS, THUMBNAIL_AUDIO_TIMEOUT_SECS, THUMBNAIL_SEEK_FRACTION,
    THUMBNAIL_SIZE, THUMBNAIL_VIDEO_TIMEOUT_SECS,
};
use crate::state::TranscodeProfile;

use super::prober;
use super::process_supervisor::{StdoutMode, SupervisedChild};
use super::registry::{ChannelRegistry, TranscodeRequest};
use super::smart_ingest;

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Whether `filename`'s extension is accepted for upload.
#[must_use]
pub fn validate_extension(filename: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension_of(filename).as_str())
}

/// Whether `filename`'s extension is audio-only (drives the thumbnail
/// strategy — a waveform image rather than a seeked video frame).
#[must_use]
pub fn is_audio_extension(filename: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&extension_of(filename).as_str())
}

/// Deterministic thumbnail path for a channel under `thumb_dir`.
#[must_use]
pub fn thumbnail_path(thumb_dir: &Path, cid: usize) -> PathBuf {
    thumb_dir.join(format!("ch{cid}.jpg"))
}

/// Generates a thumbnail image for `src_path` at `thumb_path`: a waveform
/// render for audio sources, or a frame seeked to 10% of the source's
/// duration for video.
///
/// # Errors
///
/// Returns [`ChannelError::ProcessLaunch`]/[`ChannelError::ProcessRuntime`]
/// if ffmpeg cannot be started or exits with a nonzero status, and
/// [`ChannelError::Probe`] if the underlying ffmpeg run times out.
pub async fn generate_thumbnail(src_path: &Path, thumb_path: &Path, filename: &str) -> ChannelResult<()> {
    let src = src_path.to_string_lossy().into_owned();
    let dst = thumb_path.to_string_lossy().into_owned();

    let (argv, timeout) = if is_audio_extension(filename) {
        let argv = vec![
            "ffmpeg".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            src,
            "-filter_complex".to_string(),
            format!("showwavespic=s={THUMBNAIL_SIZE}:colors=#ff6a00"),
            "-frames:v".to_string(),
            "1".to_string(),
            dst,
        ];
        (argv, Duration::from_secs(THUMBNAIL_AUDIO_TIMEOUT_SECS))
    } else {
        let duration = prober::probe_duration(src_path).await;
        let seek = (duration * THUMBNAIL_SEEK_FRACTION).max(0.0);
        let argv = vec![
            "ffmpeg".to_string(),
            "-y".to_string(),
            "-ss".to_string(),
            format!("{seek:.3}"),
            "-i".to_string(),
            src,
            "-vframes".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={THUMBNAIL_SIZE}:force_original_aspect_ratio=decrease,pad={THUMBNAIL_SIZE}:(ow-iw)/2:(oh-ih)/2:black"),
            dst,
        ];
        (argv, Duration::from_secs(THUMBNAIL_VIDEO_TIMEOUT_SECS))
    };

    let mut child = SupervisedChild::spawn(&argv, StdoutMode::Discard)?;
    let exit = tokio::time::timeout(timeout, child.wait())
        .await
        .map_err(|_| ChannelError::Probe("thumbnail generation timed out".to_string()))??;
    match exit {
        Some(0) => Ok(()),
        other => Err(ChannelError::ProcessRuntime(format!(
            "thumbnail generation exited with {other:?}"
        ))),
    }
}

/// Everything needed to drive one upload through the ingest pipeline.
pub struct UploadPlan {
    pub cid: usize,
    pub filename: String,
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    pub profile: TranscodeProfile,
    pub thumb_url: String,
    pub auto_start: bool,
}

/// Runs the ingest pipeline for `plan`: generates the thumbnail, then
/// either registers the source directly (profile requests passthrough), or
/// probes it and dispatches a remux job (smart-ingest decided the source
/// already matches the target closely enough) or a full re-encode job.
///
/// Intended to run as a detached background task; failures are logged, not
/// returned, since the HTTP response for the upload has already completed
/// by the time this runs.
pub async fn run_ingest_pipeline(registry: Arc<ChannelRegistry>, plan: UploadPlan, thumb_path: PathBuf) {
    if let Err(e) = generate_thumbnail(&plan.src_path, &thumb_path, &plan.filename).await {
        log::warn!("[ingest] thumbnail generation failed for cid {}: {e}", plan.cid);
    }

    let src_path_str = plan.src_path.to_string_lossy().into_owned();

    if plan.profile.codec == "copy" {
        if let Err(e) = registry
            .register_direct(
                plan.cid,
                src_path_str.clone(),
                plan.filename.clone(),
                src_path_str,
                plan.profile,
                plan.thumb_url,
                plan.auto_start,
            )
            .await
        {
            log::error!("[ingest] direct registration failed for cid {}: {e}", plan.cid);
        }
        return;
    }

    let info = prober::probe_video_info(&plan.src_path).await;
    let remux = !info.is_empty() && smart_ingest::specs_match(&info, &plan.profile);
    let job_profile = if remux {
        TranscodeProfile { codec: "copy".to_string(), ..plan.profile.clone() }
    } else {
        plan.profile.clone()
    };

    let req = TranscodeRequest {
        cid: plan.cid,
        src_path: src_path_str,
        dst_path: plan.dst_path.to_string_lossy().into_owned(),
        filename: plan.filename,
        profile: job_profile,
        thumb: plan.thumb_url,
        auto_start: plan.auto_start,
    };
    if let Err(e) = registry.start_transcode(req).await {
        log::error!("[ingest] failed to start transcode for cid {}: {e}", plan.cid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_extension_accepts_known_container() {
        assert!(validate_extension("movie.MKV"));
        assert!(validate_extension("clip.mp4"));
    }

    #[test]
    fn validate_extension_rejects_unknown_extension() {
        assert!(!validate_extension("archive.zip"));
        assert!(!validate_extension("noextension"));
    }

    #[test]
    fn is_audio_extension_distinguishes_audio_from_video() {
        assert!(is_audio_extension("song.flac"));
        assert!(!is_audio_extension("movie.mkv"));
    }

    #[test]
    fn thumbnail_path_is_deterministic_per_channel() {
        let dir = Path::new("/media/thumbs");
        assert_eq!(thumbnail_path(dir, 3), PathBuf::from("/media/thumbs/ch3.jpg"));
    }

    #[tokio::test]
    async fn generate_thumbnail_of_missing_source_fails() {
        let src = Path::new("/nonexistent/source.mp4");
        let dst = Path::new("/tmp/channelcast-test-thumb-nonexistent.jpg");
        let result = generate_thumbnail(src, dst, "source.mp4").await;
        assert!(result.is_err());
    }
}
