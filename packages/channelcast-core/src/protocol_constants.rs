//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the wire contract this server promises its
//! subscribers (packet framing, process grace periods, validation sets) and
//! changing them would break compatibility with anything already consuming
//! a channel's multicast feed or its REST/event surface.

// ─────────────────────────────────────────────────────────────────────────────
// Multicast / RTP wire framing
// ─────────────────────────────────────────────────────────────────────────────

/// UDP/RTP payload packet size in bytes.
///
/// 1316 = 7 MPEG-TS packets (188 bytes each), the conventional size for
/// ffmpeg's `pkt_size` when streaming MPEG-TS over UDP/RTP.
pub const MULTICAST_PACKET_SIZE: u32 = 1316;

/// Multicast TTL for outgoing stream packets.
pub const MULTICAST_TTL: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Process supervision
// ─────────────────────────────────────────────────────────────────────────────

/// Grace period given to a child process after a graceful terminate request
/// before it is forcibly killed.
pub const PROCESS_STOP_GRACE_SECS: u64 = 3;

/// Hard timeout for `probe_duration`.
pub const PROBE_DURATION_TIMEOUT_SECS: u64 = 15;

/// Hard timeout for `probe_video_info`.
pub const PROBE_INFO_TIMEOUT_SECS: u64 = 20;

// ─────────────────────────────────────────────────────────────────────────────
// Event bus
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel for WebSocket/event subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Log store
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of entries the in-memory log store retains.
///
/// Once exceeded, the oldest half is dropped.
pub const MAX_LOG_LINES: usize = 2000;

/// Default number of entries returned by a log read when the caller doesn't
/// specify a count.
pub const DEFAULT_LOG_READ_COUNT: usize = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Host metrics sampler
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between host metrics samples.
pub const METRICS_SAMPLE_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Channel lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Delay after startup before auto-starting channels, to allow subscribers
/// (WebSocket/event clients) time to attach and not miss the initial
/// `channel_ready`/`stream` events.
pub const AUTO_START_DELAY_MS: u64 = 2500;

/// Delay before regenerating thumbnails for restored channels at startup.
pub const THUMBNAIL_REGEN_DELAY_MS: u64 = 1500;

/// Application identity, surfaced in logs and the status endpoint.
pub const APP_NAME: &str = "ChannelCast";

// ─────────────────────────────────────────────────────────────────────────────
// Validation sets
// ─────────────────────────────────────────────────────────────────────────────

/// Valid transcode codecs.
pub const VALID_CODECS: &[&str] = &["copy", "h264", "h265"];

/// Valid x264/x265 encoder presets.
pub const VALID_PRESETS: &[&str] = &["ultrafast", "superfast", "fast", "medium", "slow"];

/// Valid target resolutions.
pub const VALID_RESOLUTIONS: &[&str] = &["original", "720p", "1080p", "1440p", "4k"];

/// Valid target frame rates (as their string literals; fractional rates use
/// the conventional decimal spelling, not the N/1001 fraction).
pub const VALID_FPS: &[&str] = &[
    "original", "23.976", "24", "25", "29.97", "30", "50", "59.94", "60",
];

/// Bitrate presets offered to clients, in display-label / literal pairs.
/// The empty literal means "passthrough (copy)".
pub const BITRATE_PRESETS: &[(&str, &str)] = &[
    ("Passthrough (copy)", ""),
    ("1 Mbps", "1M"),
    ("2 Mbps", "2M"),
    ("4 Mbps", "4M"),
    ("6 Mbps", "6M"),
    ("8 Mbps", "8M"),
    ("10 Mbps", "10M"),
    ("15 Mbps", "15M"),
    ("20 Mbps", "20M"),
];

// ─────────────────────────────────────────────────────────────────────────────
// Upload ingest
// ─────────────────────────────────────────────────────────────────────────────

/// File extensions (without the leading dot, lowercase) accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "ts", "m2ts", "mp3", "wav", "flac", "aac", "m4a", "ogg",
];

/// Subset of [`ALLOWED_EXTENSIONS`] treated as audio-only for thumbnail
/// generation (waveform image instead of a seeked video frame).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "m4a", "ogg"];

/// Thumbnail image dimensions, `WIDTHxHEIGHT`.
pub const THUMBNAIL_SIZE: &str = "320x180";

/// Hard timeout for audio waveform thumbnail generation.
pub const THUMBNAIL_AUDIO_TIMEOUT_SECS: u64 = 15;

/// Hard timeout for video frame thumbnail generation.
pub const THUMBNAIL_VIDEO_TIMEOUT_SECS: u64 = 45;

/// Fraction into a video's duration to seek for its thumbnail frame.
pub const THUMBNAIL_SEEK_FRACTION: f64 = 0.1;
