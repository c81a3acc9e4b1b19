//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the registry to emit lifecycle events
//! - [`BroadcastEvent`], the single topic of structured events consumed by
//!   any number of subscribers (REST clients via the `/events` WebSocket)
//!
//! The actual transport implementation (WebSocket fan-out) is handled
//! separately in the `api` module using [`BroadcastEventBridge`].

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use std::collections::HashMap;

use serde::Serialize;

/// Read-only snapshot of a channel's metadata, as returned by status queries
/// and embedded in events that describe a channel's full state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub cid: usize,
    pub filename: String,
    pub ip: String,
    pub port: u16,
    pub encap: String,
    #[serde(rename = "loop")]
    pub loop_playback: bool,
    pub bitrate: String,
    pub codec: String,
    pub preset: String,
    pub vbitrate: String,
    pub abitrate: String,
    pub resolution: String,
    pub fps: String,
    pub pre_transcoded: bool,
    pub running: bool,
    pub thumb: String,
}

/// Per-NIC throughput sample for the `metrics` event.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NicThroughput {
    pub tx_mbps: f64,
    pub rx_mbps: f64,
}

/// Events broadcast to subscribers.
///
/// This is the single topic the Event Bus fans out: every lifecycle
/// transition the Channel Registry and its workers produce is represented
/// as one variant here, tagged by `type` for JSON consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// A channel has a prepared artifact and is ready to be started.
    ChannelReady {
        cid: usize,
        filename: String,
        ip: String,
        port: u16,
        encap: String,
        bitrate: String,
        #[serde(rename = "loop")]
        loop_playback: bool,
        codec: String,
        preset: String,
        vbitrate: String,
        abitrate: String,
        thumb: String,
    },
    /// A transcode job started. `codec` is `"remux"` when smart-ingest chose
    /// stream-copy instead of a target codec.
    TranscodeStart {
        cid: usize,
        codec: String,
        preset: String,
    },
    /// Progress tick from an active transcode job.
    TranscodeProgress {
        cid: usize,
        pct: u8,
        eta_secs: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        fps: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
    },
    /// A transcode job failed while still active.
    TranscodeError { cid: usize, error: String },
    /// A stream worker stopped (either explicitly or at end-of-file with
    /// `loop` disabled).
    StreamStopped { cid: usize },
    /// A channel's network settings changed and its worker was restarted.
    StreamRestarted {
        cid: usize,
        meta: ChannelSnapshot,
    },
    /// `stop_all` completed.
    AllStopped,
    /// A host metrics sample.
    Metrics {
        cpu: f64,
        mem: f64,
        mem_used_gb: f64,
        mem_total_gb: f64,
        nics: HashMap<String, NicThroughput>,
    },
}
