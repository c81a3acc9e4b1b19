//! Network configuration context for the streaming server.
//!
//! This module provides [`NetworkContext`] which bundles the HTTP server's
//! bind port and advertised address, and [`NicResolver`] which resolves a
//! named network interface to the IPv4 address stream workers bind their
//! outgoing multicast traffic to (the `localaddr` URL parameter ffmpeg
//! accepts for UDP/RTP output).

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// Network configuration shared across services.
///
/// Bundles the HTTP server's bind port and the address it should be
/// reached at (used to build thumbnail and WebSocket URLs returned to
/// clients).
#[derive(Clone)]
pub struct NetworkContext {
    /// Server port (initially 0 if auto-assigned, set when server starts).
    pub port: Arc<RwLock<u16>>,
    /// Notifier signaled when port is assigned.
    pub port_notify: Arc<Notify>,
    /// IP address clients can reach this server at.
    pub local_ip: Arc<RwLock<String>>,
}

impl NetworkContext {
    /// Creates a `NetworkContext` with explicit configuration.
    #[must_use]
    pub fn explicit(bind_port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(bind_port)),
            port_notify: Arc::new(Notify::new()),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
        }
    }

    /// Creates a `NetworkContext` using auto-detected local IP.
    ///
    /// # Errors
    ///
    /// Returns an error if IP detection fails.
    pub fn auto_detect(preferred_port: u16) -> Result<Self, NetworkError> {
        let local_ip = local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))?;
        Ok(Self {
            port: Arc::new(RwLock::new(preferred_port)),
            port_notify: Arc::new(Notify::new()),
            local_ip: Arc::new(RwLock::new(local_ip)),
        })
    }

    /// Creates a `NetworkContext` for testing with a fixed IP.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(0, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
    }

    /// Returns the current port value.
    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    /// Returns the current local IP.
    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Sets the port and notifies waiters.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
        self.port_notify.notify_waiters();
    }

    /// Returns a `UrlBuilder` for the current network configuration.
    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(self.get_local_ip(), self.get_port())
    }
}

/// Trait for resolving a named network interface's IPv4 address.
///
/// Stream workers pass the result as the `localaddr` URL parameter so
/// outgoing multicast traffic leaves through a specific NIC rather than
/// whatever the OS routing table picks by default.
pub trait NicResolver: Send + Sync {
    /// Resolves `nic_name` to its IPv4 address.
    ///
    /// Returns `Ok(None)` if `nic_name` is empty (no NIC pinned, let the OS
    /// route normally) and `Err` only on a genuine lookup failure.
    fn resolve(&self, nic_name: &str) -> Result<Option<Ipv4Addr>, NetworkError>;

    /// Lists the names of available network interfaces.
    fn list_interfaces(&self) -> Result<Vec<String>, NetworkError>;
}

/// Default NIC resolver using the system's network interface list.
#[derive(Debug, Clone, Default)]
pub struct SystemNicResolver;

impl SystemNicResolver {
    /// Creates a new `SystemNicResolver`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Creates a new `SystemNicResolver` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn NicResolver> {
        Arc::new(Self::new())
    }
}

impl NicResolver for SystemNicResolver {
    fn resolve(&self, nic_name: &str) -> Result<Option<Ipv4Addr>, NetworkError> {
        if nic_name.is_empty() {
            return Ok(None);
        }
        let ifas = local_ip_address::list_afinet_netifas()
            .map_err(|e| NetworkError::Interface(e.to_string()))?;
        for (name, ip) in ifas {
            if name == nic_name {
                if let IpAddr::V4(v4) = ip {
                    return Ok(Some(v4));
                }
            }
        }
        Ok(None)
    }

    fn list_interfaces(&self) -> Result<Vec<String>, NetworkError> {
        let ifas = local_ip_address::list_afinet_netifas()
            .map_err(|e| NetworkError::Interface(e.to_string()))?;
        let mut names: Vec<String> = ifas.into_iter().map(|(name, _)| name).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    /// Network interface error.
    #[error("Network interface error: {0}")]
    Interface(String),
}

/// Builder for constructing URLs for the streaming server's HTTP surface.
pub struct UrlBuilder {
    ip: String,
    port: u16,
}

impl UrlBuilder {
    /// Creates a new `UrlBuilder` for the given server address.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Returns the base URL for the server (e.g., `http://192.168.1.100:8080`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// Returns the thumbnail URL for a given channel index.
    #[must_use]
    pub fn thumbnail_url(&self, cid: usize) -> String {
        format!("{}/api/thumbnail/{}", self.base_url(), cid)
    }

    /// Returns the WebSocket URL for the real-time event stream.
    #[must_use]
    pub fn events_url(&self) -> String {
        format!("ws://{}:{}/events", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_context_uses_provided_ip() {
        let ctx = NetworkContext::explicit(8080, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(ctx.get_local_ip(), "192.168.1.100");
        assert_eq!(ctx.get_port(), 8080);
    }

    #[test]
    fn url_builder_generates_correct_urls() {
        let builder = UrlBuilder::new("192.168.1.100", 8080);
        assert_eq!(builder.base_url(), "http://192.168.1.100:8080");
        assert_eq!(
            builder.thumbnail_url(3),
            "http://192.168.1.100:8080/api/thumbnail/3"
        );
        assert_eq!(builder.events_url(), "ws://192.168.1.100:8080/events");
    }

    #[test]
    fn nic_resolver_empty_name_is_no_pin() {
        let resolver = SystemNicResolver::new();
        assert_eq!(resolver.resolve("").unwrap(), None);
    }
}
