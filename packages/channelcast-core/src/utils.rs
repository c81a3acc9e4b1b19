//! General utilities shared across the application.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Expands a leading `~` or `~/` in `path` to the user's home directory.
/// Paths without a leading `~` are returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    Path::new(path).to_path_buf()
}

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Multicast destination validation
// ─────────────────────────────────────────────────────────────────────────────

use std::net::{IpAddr, Ipv4Addr};

use crate::error::ErrorCode;

/// Error returned when an IP address is not valid as a channel's multicast
/// destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpValidationError {
    /// IPv6 addresses are not supported (the wire contract is IPv4 multicast).
    Ipv6NotSupported,
    /// Not a multicast address (224.0.0.0/4).
    NotMulticast,
}

impl ErrorCode for IpValidationError {
    fn code(&self) -> &'static str {
        "invalid_ip"
    }
}

impl IpValidationError {
    /// Returns a human-readable description of the error.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ipv6NotSupported => "IPv6 addresses are not supported; channels stream IPv4 multicast",
            Self::NotMulticast => "address is not in the multicast range 224.0.0.0/4",
        }
    }
}

impl std::fmt::Display for IpValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for IpValidationError {}

/// Validates that an IP address is suitable as a channel's multicast
/// destination: IPv4 and within 224.0.0.0/4.
///
/// # Examples
///
/// ```
/// use std::net::IpAddr;
/// use channelcast_core::validate_multicast_ip;
///
/// let ip: IpAddr = "239.1.1.1".parse().unwrap();
/// assert!(validate_multicast_ip(&ip).is_ok());
///
/// let ip: IpAddr = "192.168.1.100".parse().unwrap();
/// assert!(validate_multicast_ip(&ip).is_err());
/// ```
pub fn validate_multicast_ip(ip: &IpAddr) -> Result<Ipv4Addr, IpValidationError> {
    let ipv4 = match ip {
        IpAddr::V4(v4) => *v4,
        IpAddr::V6(_) => return Err(IpValidationError::Ipv6NotSupported),
    };

    if !ipv4.is_multicast() {
        return Err(IpValidationError::NotMulticast);
    }

    Ok(ipv4)
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel request validation
// ─────────────────────────────────────────────────────────────────────────────

use std::sync::OnceLock;

use regex::Regex;

use crate::protocol_constants::{VALID_CODECS, VALID_FPS, VALID_PRESETS, VALID_RESOLUTIONS};

fn bitrate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?[kKmM]$").expect("valid regex"))
}

/// Validates a bitrate literal like `"8M"`, `"192k"`, or `"1.5M"`.
///
/// An empty string is always valid and means "passthrough / no cap".
#[must_use]
pub fn is_valid_bitrate(bitrate: &str) -> bool {
    bitrate.is_empty() || bitrate_regex().is_match(bitrate)
}

/// Validates a channel index against the configured ceiling.
#[must_use]
pub fn is_valid_cid(cid: usize, max_channels: usize) -> bool {
    cid < max_channels
}

/// Validates a transcode codec literal.
#[must_use]
pub fn is_valid_codec(codec: &str) -> bool {
    VALID_CODECS.contains(&codec)
}

/// Validates an encoder preset literal.
#[must_use]
pub fn is_valid_preset(preset: &str) -> bool {
    VALID_PRESETS.contains(&preset)
}

/// Validates a target resolution literal.
#[must_use]
pub fn is_valid_resolution(resolution: &str) -> bool {
    VALID_RESOLUTIONS.contains(&resolution)
}

/// Validates a target frame rate literal.
#[must_use]
pub fn is_valid_fps(fps: &str) -> bool {
    VALID_FPS.contains(&fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_multicast_ip_accepts_multicast() {
        let ip: IpAddr = "239.1.1.1".parse().unwrap();
        assert_eq!(validate_multicast_ip(&ip).unwrap().to_string(), "239.1.1.1");
    }

    #[test]
    fn test_validate_multicast_ip_rejects_unicast() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        assert_eq!(
            validate_multicast_ip(&ip),
            Err(IpValidationError::NotMulticast)
        );
    }

    #[test]
    fn test_validate_multicast_ip_rejects_ipv6() {
        let ip: IpAddr = "::1".parse().unwrap();
        assert_eq!(
            validate_multicast_ip(&ip),
            Err(IpValidationError::Ipv6NotSupported)
        );
    }

    #[test]
    fn test_bitrate_validation() {
        assert!(is_valid_bitrate(""));
        assert!(is_valid_bitrate("8M"));
        assert!(is_valid_bitrate("192k"));
        assert!(is_valid_bitrate("1.5M"));
        assert!(!is_valid_bitrate("8 Mbps"));
        assert!(!is_valid_bitrate("M8"));
    }

    #[test]
    fn test_cid_validation() {
        assert!(is_valid_cid(0, 40));
        assert!(is_valid_cid(39, 40));
        assert!(!is_valid_cid(40, 40));
    }

    #[test]
    fn test_codec_preset_resolution_fps_validation() {
        assert!(is_valid_codec("copy"));
        assert!(!is_valid_codec("vp9"));
        assert!(is_valid_preset("fast"));
        assert!(!is_valid_preset("blazing"));
        assert!(is_valid_resolution("1080p"));
        assert!(!is_valid_resolution("8k"));
        assert!(is_valid_fps("29.97"));
        assert!(!is_valid_fps("29.98"));
    }

    #[test]
    fn test_ip_validation_error_code() {
        assert_eq!(IpValidationError::Ipv6NotSupported.code(), "invalid_ip");
        assert_eq!(IpValidationError::NotMulticast.code(), "invalid_ip");
    }

    #[test]
    fn expand_tilde_leaves_absolute_path_unchanged() {
        assert_eq!(expand_tilde("/media/channelcast"), PathBuf::from("/media/channelcast"));
    }

    #[test]
    fn expand_tilde_expands_leading_tilde_slash() {
        let expanded = expand_tilde("~/channelcast/media");
        assert!(expanded.ends_with("channelcast/media"));
        assert!(expanded.is_absolute());
    }
}
