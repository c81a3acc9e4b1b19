//! Server configuration.
//!
//! Supports loading the `server`/`streaming`/`transcode` document from JSON
//! with environment variable overrides. Keys beginning with `_` are treated
//! as comments by `serde`'s default "ignore unknown fields" behavior and
//! never reach the typed config.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use channelcast_core::Config as CoreConfig;

/// Server configuration: the core JSON document plus the CLI-only knobs
/// (advertised address, data directory) that live outside the channel
/// lifecycle's own config document.
#[derive(Debug, Default)]
pub struct ServerConfig {
    /// The `server`/`streaming`/`transcode` document handed to the core.
    pub core: CoreConfig,
    /// Explicit IP to advertise to clients, overriding auto-detection.
    /// Override: `CHANNELCAST_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,
    /// Name of the NIC to resolve and advertise instead of an explicit IP.
    /// Override: `CHANNELCAST_ADVERTISE_NIC`
    pub advertise_nic: Option<String>,
    /// Directory holding the persisted state file.
    /// Override: `CHANNELCAST_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Loads configuration from a JSON file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let core = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        } else {
            CoreConfig::default()
        };

        let mut config = Self {
            core,
            advertise_ip: None,
            advertise_nic: None,
            data_dir: None,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies `CHANNELCAST_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHANNELCAST_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.core.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("CHANNELCAST_ADVERTISE_IP") {
            if let Ok(ip) = val.parse() {
                self.advertise_ip = Some(ip);
            }
        }
        if let Ok(val) = std::env::var("CHANNELCAST_ADVERTISE_NIC") {
            self.advertise_nic = Some(val);
        }
        if let Ok(val) = std::env::var("CHANNELCAST_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("CHANNELCAST_MEDIA_PATH") {
            self.core.streaming.media_path = val;
        }
    }
}
