//! The REST surface: thin handlers that deserialize a request, call one
//! Channel Registry or Log Store operation, and serialize the result. No
//! business logic lives here.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ChannelError, ChannelResult};
use crate::events::BroadcastEvent;
use crate::protocol_constants::DEFAULT_LOG_READ_COUNT;
use crate::services::{self, ChannelUpdate, TranscodeRequest, UploadPlan};
use crate::state::TranscodeProfile;
use crate::utils::is_valid_bitrate;

use super::response::{api_ok, api_success};
use super::ws::ws_handler;
use super::AppState;

/// Builds the application's router, wiring every handler to its state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(ws_handler))
        .route("/api/status", get(get_status))
        .route("/api/transcode", get(get_global_transcode).post(set_global_transcode))
        .route("/api/bitrate", post(set_global_bitrate))
        .route("/api/nic", post(set_nic))
        .route("/api/nics", get(list_nics))
        .route("/api/monitor-nic", post(set_monitor_nic))
        .route("/api/media-path", post(set_media_path))
        .route("/api/auto-start", post(set_auto_start))
        .route("/api/upload/{cid}", post(upload_channel))
        .route("/api/retranscode/{cid}", post(retranscode_channel))
        .route("/api/update/{cid}", post(update_channel))
        .route("/api/start/{cid}", post(start_channel))
        .route("/api/stop/{cid}", post(stop_channel))
        .route("/api/channel/{cid}", delete(remove_channel))
        .route("/api/thumbnail/{cid}", get(get_thumbnail))
        .route("/api/start-all", post(start_all))
        .route("/api/stop-all", post(stop_all))
        .route("/api/restart", post(restart))
        .route("/api/shutdown", post(shutdown))
        .route("/api/logs", get(read_logs))
        .route("/api/logs/clear", post(clear_logs))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    api_success(json!({"status": "ok"}))
}

// ─────────────────────────────────────────────────────────────────────────────
// Global settings
// ─────────────────────────────────────────────────────────────────────────────

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({"channels": state.registry.get_status().await}))
}

async fn get_global_transcode(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.registry.global_transcode_profile())
}

async fn set_global_transcode(
    State(state): State<AppState>,
    Json(profile): Json<TranscodeProfile>,
) -> ChannelResult<impl IntoResponse> {
    let defaults = state.registry.global_transcode_profile();
    let sanitized = profile.sanitize(&defaults).map_err(ChannelError::Validation)?;
    state.registry.set_global_transcode_profile(sanitized);
    Ok(api_ok())
}

#[derive(Deserialize)]
struct BitrateRequest {
    bitrate: String,
}

async fn set_global_bitrate(
    State(state): State<AppState>,
    Json(body): Json<BitrateRequest>,
) -> ChannelResult<impl IntoResponse> {
    if !is_valid_bitrate(&body.bitrate) {
        return Err(ChannelError::Validation(format!("invalid bitrate literal: {}", body.bitrate)));
    }
    state.registry.apply_global_bitrate(body.bitrate);
    Ok(api_ok())
}

#[derive(Deserialize)]
struct NicRequest {
    nic: String,
}

async fn set_nic(State(state): State<AppState>, Json(body): Json<NicRequest>) -> impl IntoResponse {
    state.registry.set_nic(body.nic);
    api_ok()
}

async fn set_monitor_nic(State(state): State<AppState>, Json(body): Json<NicRequest>) -> impl IntoResponse {
    state.registry.set_monitor_nic(body.nic);
    api_ok()
}

async fn list_nics(State(state): State<AppState>) -> ChannelResult<impl IntoResponse> {
    let names = state
        .nic_resolver
        .list_interfaces()
        .map_err(|e| ChannelError::Internal(e.to_string()))?;
    Ok(api_success(json!({"interfaces": names})))
}

#[derive(Deserialize)]
struct MediaPathRequest {
    path: String,
}

async fn set_media_path(State(state): State<AppState>, Json(body): Json<MediaPathRequest>) -> impl IntoResponse {
    state.registry.set_media_path(body.path);
    api_ok()
}

#[derive(Deserialize)]
struct AutoStartRequest {
    enabled: bool,
}

async fn set_auto_start(State(state): State<AppState>, Json(body): Json<AutoStartRequest>) -> impl IntoResponse {
    state.registry.set_auto_start(body.enabled);
    api_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-channel operations
// ─────────────────────────────────────────────────────────────────────────────

/// Profile overrides a multipart upload or retranscode request may carry;
/// any field left `None` falls back to the current global default.
#[derive(Deserialize, Default)]
struct ProfileOverride {
    codec: Option<String>,
    preset: Option<String>,
    vbitrate: Option<String>,
    abitrate: Option<String>,
    resolution: Option<String>,
    fps: Option<String>,
}

impl ProfileOverride {
    fn apply(self, defaults: &TranscodeProfile) -> TranscodeProfile {
        TranscodeProfile {
            codec: self.codec.unwrap_or_else(|| defaults.codec.clone()),
            preset: self.preset.unwrap_or_else(|| defaults.preset.clone()),
            vbitrate: self.vbitrate.unwrap_or_else(|| defaults.vbitrate.clone()),
            abitrate: self.abitrate.unwrap_or_else(|| defaults.abitrate.clone()),
            resolution: self.resolution.unwrap_or_else(|| defaults.resolution.clone()),
            fps: self.fps.unwrap_or_else(|| defaults.fps.clone()),
        }
    }
}

async fn upload_channel(
    State(state): State<AppState>,
    Path(cid): Path<usize>,
    mut multipart: Multipart,
) -> ChannelResult<Response> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut overwrite = false;
    let mut auto_start = false;
    let mut profile_override = ProfileOverride::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ChannelError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("").to_string().as_str() {
            "file" => {
                filename = field.file_name().map(ToString::to_string);
                let data = field.bytes().await.map_err(|e| ChannelError::Validation(e.to_string()))?;
                file_bytes = Some(data.to_vec());
            }
            "overwrite" => {
                overwrite = field_text(field).await? == "true";
            }
            "auto_start" => {
                auto_start = field_text(field).await? == "true";
            }
            "codec" => profile_override.codec = Some(field_text(field).await?),
            "preset" => profile_override.preset = Some(field_text(field).await?),
            "vbitrate" => profile_override.vbitrate = Some(field_text(field).await?),
            "abitrate" => profile_override.abitrate = Some(field_text(field).await?),
            "resolution" => profile_override.resolution = Some(field_text(field).await?),
            "fps" => profile_override.fps = Some(field_text(field).await?),
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ChannelError::Validation("no file part in upload".to_string()))?;
    let bytes = file_bytes.ok_or_else(|| ChannelError::Validation("no file part in upload".to_string()))?;

    if !services::validate_extension(&filename) {
        return Err(ChannelError::Validation(format!("unsupported file extension: {filename}")));
    }

    let src_path = state.originals_dir.join(&filename);
    if src_path.exists() && !overwrite {
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({"exists": true, "filename": filename})),
        )
            .into_response());
    }

    tokio::fs::write(&src_path, &bytes)
        .await
        .map_err(|e| ChannelError::StateIO(format!("failed to write upload {filename}: {e}")))?;

    let defaults = state.registry.global_transcode_profile();
    let profile = profile_override
        .apply(&defaults)
        .sanitize(&defaults)
        .map_err(ChannelError::Validation)?;

    let dst_path = state.prepared_dir.join(format!("{cid}.ts"));
    let thumb_path = services::thumbnail_path(&state.thumbs_dir, cid);
    let thumb_url = format!("/api/thumbnail/{cid}");

    let plan = UploadPlan {
        cid,
        filename: filename.clone(),
        src_path: src_path.clone(),
        dst_path,
        profile,
        thumb_url,
        auto_start,
    };

    let registry = std::sync::Arc::clone(&state.registry);
    state.spawner.spawn(async move {
        services::run_ingest_pipeline(registry, plan, thumb_path).await;
    });

    Ok(api_success(json!({"cid": cid, "filename": filename, "accepted": true})).into_response())
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> ChannelResult<String> {
    field.text().await.map_err(|e| ChannelError::Validation(e.to_string()))
}

async fn retranscode_channel(
    State(state): State<AppState>,
    Path(cid): Path<usize>,
    Json(overrides): Json<ProfileOverride>,
) -> ChannelResult<impl IntoResponse> {
    let (src_path, filename) = state
        .registry
        .channel_source(cid)
        .ok_or_else(|| ChannelError::NotFound(format!("channel {cid}")))?;

    let defaults = state.registry.global_transcode_profile();
    let profile = overrides.apply(&defaults).sanitize(&defaults).map_err(ChannelError::Validation)?;
    let dst_path = state.prepared_dir.join(format!("{cid}.ts"));

    state
        .registry
        .start_transcode(TranscodeRequest {
            cid,
            src_path,
            dst_path: dst_path.to_string_lossy().into_owned(),
            filename,
            profile,
            thumb: String::new(),
            auto_start: true,
        })
        .await?;

    Ok(api_ok())
}

#[derive(Deserialize, Default)]
struct UpdateChannelRequest {
    ip: Option<String>,
    port: Option<u16>,
    encap: Option<String>,
    bitrate: Option<String>,
    #[serde(rename = "loop")]
    loop_playback: Option<bool>,
    nic: Option<String>,
    codec: Option<String>,
    preset: Option<String>,
    vbitrate: Option<String>,
    abitrate: Option<String>,
    resolution: Option<String>,
    fps: Option<String>,
}

impl From<UpdateChannelRequest> for ChannelUpdate {
    fn from(req: UpdateChannelRequest) -> Self {
        ChannelUpdate {
            ip: req.ip,
            port: req.port,
            encap: req.encap,
            bitrate: req.bitrate,
            loop_playback: req.loop_playback,
            nic: req.nic,
            codec: req.codec,
            preset: req.preset,
            vbitrate: req.vbitrate,
            abitrate: req.abitrate,
            resolution: req.resolution,
            fps: req.fps,
        }
    }
}

async fn update_channel(
    State(state): State<AppState>,
    Path(cid): Path<usize>,
    Json(body): Json<UpdateChannelRequest>,
) -> ChannelResult<impl IntoResponse> {
    if let Some(bitrate) = &body.bitrate {
        if !is_valid_bitrate(bitrate) {
            return Err(ChannelError::Validation(format!("invalid bitrate literal: {bitrate}")));
        }
    }

    let was_running = state.registry.update_channel(cid, body.into()).await?;

    if was_running {
        state.registry.start(cid).await;
        if let Some(meta) = state.registry.get_status().await.into_iter().find(|s| s.cid == cid) {
            state.events.emit(BroadcastEvent::StreamRestarted { cid, meta });
        }
    }

    Ok(api_ok())
}

async fn start_channel(State(state): State<AppState>, Path(cid): Path<usize>) -> impl IntoResponse {
    state.registry.start(cid).await;
    api_ok()
}

async fn stop_channel(State(state): State<AppState>, Path(cid): Path<usize>) -> impl IntoResponse {
    state.registry.stop(cid).await;
    api_ok()
}

async fn remove_channel(State(state): State<AppState>, Path(cid): Path<usize>) -> ChannelResult<impl IntoResponse> {
    let removed = state.registry.remove_channel(cid).await?;

    for path in [&removed.src_path, &removed.filepath, &removed.thumb] {
        if path.is_empty() {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[http] failed to remove {path}: {e}");
            }
        }
    }

    Ok(api_ok())
}

async fn get_thumbnail(State(state): State<AppState>, Path(cid): Path<usize>) -> ChannelResult<Response> {
    let thumb_path = services::thumbnail_path(&state.thumbs_dir, cid);
    let bytes = tokio::fs::read(&thumb_path)
        .await
        .map_err(|_| ChannelError::NotFound(format!("thumbnail for channel {cid}")))?;
    Ok(([(axum::http::header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Fleet operations
// ─────────────────────────────────────────────────────────────────────────────

async fn start_all(State(state): State<AppState>) -> impl IntoResponse {
    let launched = state.registry.start_all().await;
    api_success(json!({"launched": launched}))
}

async fn stop_all(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.registry.stop_all().await;
    api_success(json!({"stopped": stopped}))
}

// ─────────────────────────────────────────────────────────────────────────────
// System operations
// ─────────────────────────────────────────────────────────────────────────────

async fn restart(State(state): State<AppState>) -> impl IntoResponse {
    state.logs.system("restart requested via REST");
    state.lifecycle.request_restart();
    api_ok()
}

async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    state.logs.system("shutdown requested via REST");
    state.lifecycle.request_shutdown();
    api_ok()
}

#[derive(Deserialize)]
struct LogsQuery {
    count: Option<usize>,
}

async fn read_logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> impl IntoResponse {
    let count = query.count.unwrap_or(DEFAULT_LOG_READ_COUNT);
    api_success(json!({"entries": state.logs.read(count)}))
}

async fn clear_logs(State(state): State<AppState>) -> impl IntoResponse {
    state.logs.clear();
    api_ok()
}
