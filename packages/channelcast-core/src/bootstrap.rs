//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::context::{NetworkContext, NicResolver, SystemNicResolver};
use crate::error::{ChannelError, ChannelResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::logstore::LogStore;
use crate::protocol_constants::{APP_NAME, AUTO_START_DELAY_MS, EVENT_CHANNEL_CAPACITY, THUMBNAIL_REGEN_DELAY_MS};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{self, ChannelRegistry};
use crate::state::Config;
use crate::state_store;
use crate::utils::expand_tilde;

/// Container for all bootstrapped services.
///
/// This struct holds every service handle the HTTP/WebSocket layer and the
/// binary entrypoint share, wired together in [`bootstrap_services`].
pub struct BootstrappedServices {
    /// Single source of truth for channel state and lifecycle.
    pub registry: Arc<ChannelRegistry>,
    /// Broadcast channel bridging domain events to WebSocket clients.
    pub events: BroadcastEventBridge,
    /// In-memory rolling log store exposed via the logs endpoints.
    pub logs: Arc<LogStore>,
    /// Network configuration (port, advertised IP, URL building).
    pub network: NetworkContext,
    /// Resolves a NIC name to its IPv4 address for bind/monitor selection.
    pub nic_resolver: Arc<dyn NicResolver>,
    /// Task spawner for background operations.
    pub spawner: Arc<dyn TaskSpawner>,
    /// Resolved media root (originals/prepared/thumbs live under this).
    pub media_dir: PathBuf,
    /// Path to the persisted state document.
    pub state_path: PathBuf,
    metrics: services::MetricsSamplerHandle,
}

impl BootstrappedServices {
    /// Stops the metrics sampler and flushes a final state checkpoint.
    ///
    /// Does not stop running channel workers — a caller wanting a clean
    /// fleet stop should call `registry.stop_all()` first.
    pub fn shutdown(&self) {
        self.metrics.stop();
        self.registry.checkpoint();
        self.logs.system(format!("{APP_NAME} shutting down"));
    }
}

fn media_subdirs(media_dir: &Path) -> [PathBuf; 3] {
    [
        media_dir.join("originals"),
        media_dir.join("prepared"),
        media_dir.join("thumbs"),
    ]
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together:
///
/// 1. Validate the streaming section and resolve the media directory tree.
/// 2. Create the event bridge, log store, NIC resolver and task spawner.
/// 3. Construct the channel registry and restore it from persisted state.
/// 4. Start the metrics sampler and the delayed auto-start / thumbnail
///    regeneration background tasks.
///
/// The initialization log line is emitted *before* state is loaded: a
/// missing or corrupt state file is reported against an already-running
/// component rather than blocking startup, and the registry simply starts
/// empty rather than failing bootstrap.
///
/// # Errors
///
/// Returns [`ChannelError::Validation`] if `config.streaming` fails its
/// invariants (e.g. `max_channels` over the 254-channel ceiling), or
/// [`ChannelError::StateIO`] if the media directory tree cannot be created.
pub fn bootstrap_services(config: &Config, data_dir: &Path, network: NetworkContext) -> ChannelResult<BootstrappedServices> {
    config.streaming.validate().map_err(ChannelError::Validation)?;

    log::info!("{APP_NAME} v{} initialized", env!("CARGO_PKG_VERSION"));

    let media_dir = expand_tilde(&config.streaming.media_path);
    std::fs::create_dir_all(&media_dir).map_err(|e| ChannelError::StateIO(e.to_string()))?;
    for dir in media_subdirs(&media_dir) {
        std::fs::create_dir_all(&dir).map_err(|e| ChannelError::StateIO(e.to_string()))?;
    }

    let state_path = data_dir.join("state.json");
    let events = BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY);
    let logs = Arc::new(LogStore::new());
    let nic_resolver: Arc<dyn NicResolver> = SystemNicResolver::arc();
    let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioSpawner::current());

    let mut streaming = config.streaming.clone();
    streaming.media_path = media_dir.to_string_lossy().into_owned();

    let registry = Arc::new(ChannelRegistry::new(
        streaming,
        config.transcode.clone(),
        state_path.clone(),
        Arc::clone(&nic_resolver),
        Arc::new(events.clone()) as Arc<dyn EventEmitter>,
        Arc::clone(&spawner),
    ));

    // Loaded after the log line above, deliberately: a missing/corrupt
    // state file is reported against an already-initialized component, and
    // the registry just starts empty rather than faulting bootstrap.
    let loaded = state_store::load(&state_path);
    let restored_count = loaded.channels.len();
    registry.restore(loaded);

    logs.system(format!("{APP_NAME} bootstrapped with {restored_count} restored channel(s), media dir {media_dir:?}"));

    let metrics = services::start_metrics_sampler(Arc::new(events.clone()));

    spawn_auto_start(Arc::clone(&registry), Arc::clone(&spawner), Arc::clone(&logs));
    spawn_thumbnail_regen(Arc::clone(&registry), media_dir.clone(), Arc::clone(&spawner));

    Ok(BootstrappedServices {
        registry,
        events,
        logs,
        network,
        nic_resolver,
        spawner,
        media_dir,
        state_path,
        metrics,
    })
}

/// Schedules the one-shot delayed auto-start, giving WebSocket subscribers
/// time to attach before any channel starts streaming.
fn spawn_auto_start(registry: Arc<ChannelRegistry>, spawner: Arc<dyn TaskSpawner>, logs: Arc<LogStore>) {
    spawner.spawn(async move {
        tokio::time::sleep(Duration::from_millis(AUTO_START_DELAY_MS)).await;
        if !registry.auto_start_enabled() {
            return;
        }
        let launched = registry.start_all().await;
        logs.system(format!("auto-start launched {launched} channel(s)"));
    });
}

/// Regenerates thumbnails for every channel restored from state: the
/// thumbnail field is transient and never persisted, so a channel that
/// survives a restart otherwise has no thumbnail until its next upload.
fn spawn_thumbnail_regen(registry: Arc<ChannelRegistry>, media_dir: PathBuf, spawner: Arc<dyn TaskSpawner>) {
    spawner.spawn(async move {
        tokio::time::sleep(Duration::from_millis(THUMBNAIL_REGEN_DELAY_MS)).await;
        let thumbs_dir = media_dir.join("thumbs");
        for (cid, filepath, filename) in registry.channel_sources() {
            let src = PathBuf::from(&filepath);
            let thumb_path = services::thumbnail_path(&thumbs_dir, cid);
            if let Err(e) = services::generate_thumbnail(&src, &thumb_path, &filename).await {
                log::warn!("[bootstrap] thumbnail regeneration failed for cid {cid}: {e}");
                continue;
            }
            let thumb_url = format!("/api/thumbnail/{cid}");
            let _ = registry.set_thumb(cid, thumb_url);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bootstrap_rejects_invalid_streaming_section() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.streaming.max_channels = 300;
        let network = NetworkContext::for_test();
        let err = bootstrap_services(&config, dir.path(), network);
        assert!(matches!(err, Err(ChannelError::Validation(_))));
    }
}
