//! Core configuration types.
//!
//! Provides the three sections of the configuration document described in
//! the server's JSON config file: [`ServerSection`], [`StreamingSection`],
//! and [`TranscodeProfile`] (the `transcode` section, also used as the
//! per-channel transcode profile shape).

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{VALID_CODECS, VALID_FPS, VALID_PRESETS, VALID_RESOLUTIONS};
use crate::utils::is_valid_bitrate;

fn is_valid_bitrate_or_default(value: &str, default: &str) -> String {
    if is_valid_bitrate(value) {
        value.to_string()
    } else {
        default.to_string()
    }
}

/// `server` section of the configuration document.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSection {
    /// Port to bind the HTTP/WebSocket server to.
    pub port: u16,
    /// Maximum accepted upload size, in gigabytes.
    pub max_upload_gb: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 5000,
            max_upload_gb: 20,
        }
    }
}

/// `streaming` section of the configuration document.
///
/// Mirrors the Global settings described in the data model: channel
/// ceiling, deterministic address allocation base, default per-channel
/// knobs, and where conditioned media lives on disk.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StreamingSection {
    /// Maximum number of concurrent channels.
    ///
    /// Must be `<= 254`: the deterministic allocator wraps the destination
    /// octet modulo 254 and does not itself guard against collisions past
    /// that ceiling.
    pub max_channels: usize,
    /// Base port; channel `cid`'s port is `base_port + 2*cid`.
    pub base_port: u16,
    /// Multicast base, e.g. `"239.252.100"`; channel `cid`'s address is
    /// `{multicast_base}.{(cid % 254) + 1}`.
    pub multicast_base: String,
    /// Default encapsulation for new channels: `"udp"` or `"rtp"`.
    pub default_encap: String,
    /// Default loop flag for new channels.
    pub default_loop: bool,
    /// Default bitrate cap for new channels (empty = passthrough).
    pub default_bitrate: String,
    /// Name of the NIC outgoing multicast traffic is sourced from.
    pub selected_nic: String,
    /// Name of the NIC the metrics sampler reports throughput for.
    pub monitor_nic: String,
    /// Directory holding uploaded originals and conditioned artifacts.
    pub media_path: String,
}

impl Default for StreamingSection {
    fn default() -> Self {
        Self {
            max_channels: 40,
            base_port: 1234,
            multicast_base: "239.252.100".to_string(),
            default_encap: "udp".to_string(),
            default_loop: true,
            default_bitrate: String::new(),
            selected_nic: String::new(),
            media_path: "~/channelcast/media".to_string(),
            monitor_nic: String::new(),
        }
    }
}

impl StreamingSection {
    /// Validates invariants that must hold for the deterministic allocator
    /// to avoid address collisions.
    ///
    /// # Errors
    ///
    /// Returns an error describing the violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_channels == 0 {
            return Err("max_channels must be >= 1".to_string());
        }
        if self.max_channels > 254 {
            return Err("max_channels must be <= 254 (deterministic allocator wraps the destination octet modulo 254)".to_string());
        }
        Ok(())
    }

    /// Computes the deterministic multicast address for a channel index.
    #[must_use]
    pub fn address_for(&self, cid: usize) -> String {
        format!("{}.{}", self.multicast_base, (cid % 254) + 1)
    }

    /// Computes the deterministic port for a channel index.
    #[must_use]
    pub fn port_for(&self, cid: usize) -> u16 {
        self.base_port + (cid as u16) * 2
    }
}

/// A transcode profile: the tuple (codec, preset, vbitrate, abitrate,
/// resolution, fps) that describes how a source should be conditioned.
///
/// Used both as the `transcode` section's global default and as the
/// per-upload/per-retranscode override.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TranscodeProfile {
    pub codec: String,
    pub preset: String,
    pub vbitrate: String,
    pub abitrate: String,
    pub resolution: String,
    pub fps: String,
}

impl Default for TranscodeProfile {
    fn default() -> Self {
        Self {
            codec: "h264".to_string(),
            preset: "fast".to_string(),
            vbitrate: "8M".to_string(),
            abitrate: "192k".to_string(),
            resolution: "1080p".to_string(),
            fps: "original".to_string(),
        }
    }
}

impl TranscodeProfile {
    /// Sanitizes an untrusted profile against the validation sets, falling
    /// back to `defaults` for any field that doesn't validate (except
    /// `codec`, which is rejected rather than silently replaced).
    ///
    /// # Errors
    ///
    /// Returns a validation error if `codec` is not one of the recognized
    /// literals.
    pub fn sanitize(mut self, defaults: &TranscodeProfile) -> Result<Self, String> {
        if !VALID_CODECS.contains(&self.codec.as_str()) {
            return Err(format!("unknown codec: {}", self.codec));
        }
        if !VALID_PRESETS.contains(&self.preset.as_str()) {
            self.preset = defaults.preset.clone();
        }
        if !VALID_RESOLUTIONS.contains(&self.resolution.as_str()) {
            self.resolution = defaults.resolution.clone();
        }
        if !VALID_FPS.contains(&self.fps.as_str()) {
            self.fps = defaults.fps.clone();
        }
        self.vbitrate = is_valid_bitrate_or_default(&self.vbitrate, &defaults.vbitrate);
        self.abitrate = is_valid_bitrate_or_default(&self.abitrate, &defaults.abitrate);
        Ok(self)
    }
}

/// Top-level configuration document: `server`, `streaming`, `transcode`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub streaming: StreamingSection,
    pub transcode: TranscodeProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_section_default_is_valid() {
        assert!(StreamingSection::default().validate().is_ok());
    }

    #[test]
    fn streaming_section_rejects_oversized_channel_count() {
        let mut section = StreamingSection::default();
        section.max_channels = 300;
        assert!(section.validate().is_err());
    }

    #[test]
    fn address_allocation_matches_formula() {
        let section = StreamingSection::default();
        assert_eq!(section.address_for(0), "239.252.100.1");
        assert_eq!(section.address_for(253), "239.252.100.254");
        assert_eq!(section.address_for(254), "239.252.100.1");
        assert_eq!(section.port_for(0), 1234);
        assert_eq!(section.port_for(5), 1244);
    }

    #[test]
    fn transcode_profile_sanitize_falls_back_to_defaults() {
        let defaults = TranscodeProfile::default();
        let dirty = TranscodeProfile {
            codec: "h264".to_string(),
            preset: "blazing".to_string(),
            vbitrate: "not-a-bitrate".to_string(),
            abitrate: "192k".to_string(),
            resolution: "8k".to_string(),
            fps: "61".to_string(),
        };
        let clean = dirty.sanitize(&defaults).unwrap();
        assert_eq!(clean.preset, defaults.preset);
        assert_eq!(clean.vbitrate, defaults.vbitrate);
        assert_eq!(clean.resolution, defaults.resolution);
        assert_eq!(clean.fps, defaults.fps);
    }

    #[test]
    fn transcode_profile_sanitize_rejects_unknown_codec() {
        let defaults = TranscodeProfile::default();
        let dirty = TranscodeProfile {
            codec: "vp9".to_string(),
            ..defaults.clone()
        };
        assert!(dirty.sanitize(&defaults).is_err());
    }

    #[test]
    fn config_default_is_sensible() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.streaming.max_channels, 40);
        assert_eq!(config.transcode.codec, "h264");
    }
}
