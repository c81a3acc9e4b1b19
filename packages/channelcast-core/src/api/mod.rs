//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services. It
//! provides the router construction and server startup functionality.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::context::{NetworkContext, NicResolver};
use crate::events::BroadcastEventBridge;
use crate::lifecycle::Lifecycle;
use crate::logstore::LogStore;
use crate::runtime::TaskSpawner;
use crate::services::ChannelRegistry;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper holding references to services; all business logic lives
/// in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Single source of truth for channel state and lifecycle.
    pub registry: Arc<ChannelRegistry>,
    /// Broadcast bridge for emitting events to `/events` subscribers.
    pub events: BroadcastEventBridge,
    /// In-memory rolling log store backing the logs endpoints.
    pub logs: Arc<LogStore>,
    /// Network configuration (port, advertised IP, URL building).
    pub network: NetworkContext,
    /// Resolves NIC names for the `/api/nics` listing.
    pub nic_resolver: Arc<dyn NicResolver>,
    /// Tracks live WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Spawns detached background work (upload ingest pipelines).
    pub spawner: Arc<dyn TaskSpawner>,
    /// Application restart/shutdown abstraction.
    pub lifecycle: Arc<dyn Lifecycle>,
    /// Directory holding uploaded source files.
    pub originals_dir: PathBuf,
    /// Directory holding conditioned (prepared) artifacts.
    pub prepared_dir: PathBuf,
    /// Directory holding generated thumbnails.
    pub thumbs_dir: PathBuf,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    registry: Option<Arc<ChannelRegistry>>,
    events: Option<BroadcastEventBridge>,
    logs: Option<Arc<LogStore>>,
    network: Option<NetworkContext>,
    nic_resolver: Option<Arc<dyn NicResolver>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    spawner: Option<Arc<dyn TaskSpawner>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    media_dir: Option<PathBuf>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates the fields shared with `BootstrappedServices`, leaving only
    /// `lifecycle` (app-specific) to be set separately.
    pub fn from_services(mut self, services: &crate::BootstrappedServices) -> Self {
        self.registry = Some(Arc::clone(&services.registry));
        self.events = Some(services.events.clone());
        self.logs = Some(Arc::clone(&services.logs));
        self.network = Some(services.network.clone());
        self.nic_resolver = Some(Arc::clone(&services.nic_resolver));
        self.spawner = Some(Arc::clone(&services.spawner));
        self.media_dir = Some(services.media_dir.clone());
        self.ws_manager = Some(Arc::new(WsConnectionManager::new()));
        self
    }

    /// Sets the application lifecycle implementation.
    pub fn lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Builds the `AppState`, panicking if a required field is missing.
    pub fn build(self) -> AppState {
        let media_dir = self.media_dir.expect("media_dir is required");
        AppState {
            registry: self.registry.expect("registry is required"),
            events: self.events.expect("events is required"),
            logs: self.logs.expect("logs is required"),
            network: self.network.expect("network is required"),
            nic_resolver: self.nic_resolver.expect("nic_resolver is required"),
            ws_manager: self.ws_manager.expect("ws_manager is required"),
            spawner: self.spawner.expect("spawner is required"),
            lifecycle: self.lifecycle.expect("lifecycle is required"),
            originals_dir: media_dir.join("originals"),
            prepared_dir: media_dir.join("prepared"),
            thumbs_dir: media_dir.join("thumbs"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Starts the HTTP server on the configured port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let port = state.network.get_port();
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("server listening on http://0.0.0.0:{port}");
    let app = http::create_router(state);

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
    Ok(())
}
