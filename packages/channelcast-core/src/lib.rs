//! ChannelCast Core - shared library for the ChannelCast media broadcaster.
//!
//! This crate provides the core functionality for ChannelCast: a server that
//! conditions uploaded media into a deterministic multicast UDP/RTP feed per
//! channel, supervises the ffmpeg processes involved, and exposes a REST/
//! WebSocket façade for control and observability.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for real-time client communication
//! - [`context`]: Network configuration and URL building
//! - [`state`]: Configuration document types (server/streaming/transcode)
//! - [`state_store`]: Atomic persistence of registry metadata and settings
//! - [`services`]: Process supervision, probing, smart ingest, transcode
//!   jobs, stream workers, the channel registry, and the metrics sampler
//! - [`lifecycle`]: Application restart/shutdown abstraction
//! - [`logstore`]: In-memory rolling log store
//! - [`error`]: Centralized error type
//! - [`api`]: HTTP/WebSocket façade and composition of `AppState`

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logstore;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod state_store;
pub mod utils;

pub use api::{start_server, AppState, AppStateBuilder, ServerError};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use context::{NetworkContext, NetworkError, NicResolver, SystemNicResolver, UrlBuilder};
pub use error::{ChannelError, ChannelResult, ErrorCode};
pub use events::{BroadcastEvent, BroadcastEventBridge, ChannelSnapshot, EventEmitter, NicThroughput};
pub use lifecycle::{Lifecycle, NoopLifecycle, ServerLifecycle};
pub use logstore::{LogEntry, LogLevel, LogStore};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, ServerSection, StreamingSection, TranscodeProfile};
pub use state_store::{ChannelRecord, GlobalStreamingSettings, LoadedState};
pub use utils::{expand_tilde, now_millis, validate_multicast_ip, IpValidationError};
