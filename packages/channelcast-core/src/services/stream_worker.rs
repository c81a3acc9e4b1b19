//! A long-lived child that reads a prepared artifact at native rate and
//! writes it continuously to a multicast destination.
//!
//! Unlike a transcode job, a stream worker's settings can be changed without
//! tearing down the owning channel; [`StreamWorker::update_settings`] stops
//! the current child and updates the configuration but leaves restart to the
//! caller, keeping the exposed policy minimal (§4.4 of the spec this
//! implements).

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use super::process_supervisor::{default_grace, StdoutMode, SupervisedChild};
use crate::protocol_constants::{MULTICAST_PACKET_SIZE, MULTICAST_TTL};
use crate::state::TranscodeProfile;

/// The knobs a stream worker needs to build its ffmpeg invocation. Distinct
/// from [`TranscodeProfile`] in that `bitrate` is an optional cap (`None` =
/// passthrough) rather than a required target.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub prepared_path: String,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub encap: Encapsulation,
    pub loop_playback: bool,
    pub bitrate: Option<String>,
    pub pre_transcoded: bool,
    pub source_nic_addr: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encapsulation {
    Udp,
    Rtp,
}

/// Parses a bitrate literal like `"8M"`/`"192k"` into kbps.
fn bitrate_kbps(literal: &str) -> Option<u64> {
    if literal.is_empty() {
        return None;
    }
    let (digits, mult) = if let Some(d) = literal.strip_suffix(['M', 'm']) {
        (d, 1000.0)
    } else if let Some(d) = literal.strip_suffix(['K', 'k']) {
        (d, 1.0)
    } else {
        (literal, 1.0 / 1000.0)
    };
    let value: f64 = digits.parse().ok()?;
    Some((value * mult) as u64)
}

/// Builds the destination URL, encoding packet size, TTL, and the bound
/// source NIC as query parameters ffmpeg's UDP/RTP muxers understand.
#[must_use]
pub fn build_destination_url(settings: &StreamSettings) -> String {
    let scheme = match settings.encap {
        Encapsulation::Udp => "udp",
        Encapsulation::Rtp => "rtp",
    };
    let mut url = format!(
        "{scheme}://{}:{}?pkt_size={MULTICAST_PACKET_SIZE}&ttl={MULTICAST_TTL}",
        settings.ip, settings.port
    );
    if let Some(nic_ip) = settings.source_nic_addr {
        url.push_str(&format!("&localaddr={nic_ip}"));
    }
    url
}

/// Builds the ffmpeg argv that reads `settings.prepared_path` at native rate
/// and writes it to the destination built by [`build_destination_url`].
///
/// Stream-copy is used when `pre_transcoded` is true or no bitrate cap is
/// set; otherwise the worker transcodes on the fly to the cap (target = max,
/// buffer = 2x), matching the transcode job's fixed rate-control scheme.
#[must_use]
pub fn build_argv(settings: &StreamSettings) -> Vec<String> {
    let dst = build_destination_url(settings);
    let mut argv: Vec<String> = vec!["ffmpeg".to_string(), "-re".to_string()];

    if settings.loop_playback {
        argv.extend(["-stream_loop".to_string(), "-1".to_string()]);
    }

    argv.extend(["-i".to_string(), settings.prepared_path.clone()]);

    let use_copy = settings.pre_transcoded || settings.bitrate.is_none();
    if use_copy {
        argv.extend(["-c".to_string(), "copy".to_string()]);
    } else {
        let cap_kbps = settings
            .bitrate
            .as_deref()
            .and_then(bitrate_kbps)
            .unwrap_or(8000);
        argv.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-b:v".to_string(),
            format!("{cap_kbps}k"),
            "-maxrate".to_string(),
            format!("{cap_kbps}k"),
            "-bufsize".to_string(),
            format!("{}k", cap_kbps * 2),
            "-c:a".to_string(),
            "copy".to_string(),
        ]);
    }

    let mux_format = match settings.encap {
        Encapsulation::Udp => "mpegts",
        Encapsulation::Rtp => "rtp_mpegts",
    };
    argv.extend(["-f".to_string(), mux_format.to_string(), dst]);
    argv
}

/// The installed-but-opaque handle to a running child, held by the registry
/// slot while a stream is live.
struct RunHandle {
    /// Signals the background task to terminate the child early.
    cancel: Arc<Notify>,
    /// Signaled by the background task once the child is confirmed gone
    /// (whether via cancellation or a natural exit), so `stop()` can block
    /// until teardown is actually complete.
    done: Arc<Notify>,
}

/// A handle to a possibly-running stream worker.
///
/// Owned exclusively by the Channel Registry; callers never see the
/// underlying child.
pub struct StreamWorker {
    settings: parking_lot::RwLock<StreamSettings>,
    running: Arc<Mutex<Option<RunHandle>>>,
}

impl StreamWorker {
    #[must_use]
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            settings: parking_lot::RwLock::new(settings),
            running: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> StreamSettings {
        self.settings.read().clone()
    }

    /// True if a child is currently installed (the worker believes itself
    /// running). Does not re-check the OS process table.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Starts the streaming child if not already running. `on_stop` fires
    /// once the child exits on its own (natural end-of-file for a
    /// non-looping stream, or an unexpected crash) — it never fires from an
    /// explicit [`StreamWorker::stop`].
    pub async fn start(&self, on_stop: impl Fn() + Send + Sync + 'static) {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return;
        }

        let argv = build_argv(&self.settings());
        let Ok(mut child) = SupervisedChild::spawn(&argv, StdoutMode::Discard) else {
            return;
        };

        let cancel = Arc::new(Notify::new());
        let done = Arc::new(Notify::new());
        let running = Arc::clone(&self.running);
        let cancel_task = Arc::clone(&cancel);
        let done_task = Arc::clone(&done);

        tokio::spawn(async move {
            let exited_naturally = tokio::select! {
                _ = cancel_task.notified() => {
                    child.stop(default_grace()).await;
                    false
                }
                _ = child.wait() => true,
            };
            *running.lock().await = None;
            done_task.notify_one();
            if exited_naturally {
                on_stop();
            }
        });

        *guard = Some(RunHandle { cancel, done });
    }

    /// Stops the child if running, waiting up to the standard grace period.
    /// Idempotent: calling `stop` on an already-stopped worker is a no-op.
    pub async fn stop(&self) {
        let handle = self.running.lock().await.take();
        if let Some(handle) = handle {
            handle.cancel.notify_one();
            handle.done.notified().await;
        }
    }

    /// Applies new settings, stopping the worker first if it was running.
    /// Returns whether it had been running, so the caller can decide to
    /// restart — this function never restarts on its own.
    pub async fn update_settings(&self, settings: StreamSettings) -> bool {
        let was_running = self.is_running().await;
        if was_running {
            self.stop().await;
        }
        *self.settings.write() = settings;
        was_running
    }

    /// Rebinds the prepared artifact path and pre-transcoded flag in place.
    /// Takes effect on the worker's next start; a running child keeps
    /// reading its current file until explicitly restarted.
    pub fn rebind(&self, prepared_path: String, pre_transcoded: bool) {
        let mut settings = self.settings.write();
        settings.prepared_path = prepared_path;
        settings.pre_transcoded = pre_transcoded;
    }

    /// Rebinds the source NIC address used to build the destination URL.
    pub fn rebind_source_nic(&self, source_nic_addr: Option<Ipv4Addr>) {
        self.settings.write().source_nic_addr = source_nic_addr;
    }

    /// Rebinds the bitrate cap. `None` means stream-copy (subject to
    /// `pre_transcoded`, which always wins regardless of this value).
    pub fn rebind_bitrate(&self, bitrate: Option<String>) {
        self.settings.write().bitrate = bitrate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_settings() -> StreamSettings {
        StreamSettings {
            prepared_path: "/media/prepared/0.ts".to_string(),
            ip: Ipv4Addr::new(239, 1, 1, 1),
            port: 5100,
            encap: Encapsulation::Udp,
            loop_playback: true,
            bitrate: None,
            pre_transcoded: false,
            source_nic_addr: Some(Ipv4Addr::new(192, 168, 1, 50)),
        }
    }

    #[test]
    fn destination_url_encodes_packet_size_ttl_and_localaddr() {
        let url = build_destination_url(&udp_settings());
        assert!(url.starts_with("udp://239.1.1.1:5100?"));
        assert!(url.contains("pkt_size=1316"));
        assert!(url.contains("ttl=10"));
        assert!(url.contains("localaddr=192.168.1.50"));
    }

    #[test]
    fn rtp_encapsulation_uses_rtp_scheme_and_muxer() {
        let mut settings = udp_settings();
        settings.encap = Encapsulation::Rtp;
        let url = build_destination_url(&settings);
        assert!(url.starts_with("rtp://"));
        let argv = build_argv(&settings);
        assert!(argv.contains(&"rtp_mpegts".to_string()));
    }

    #[test]
    fn no_bitrate_cap_uses_stream_copy() {
        let argv = build_argv(&udp_settings());
        assert!(argv.contains(&"-c".to_string()));
        assert!(argv.contains(&"copy".to_string()));
    }

    #[test]
    fn pre_transcoded_dominates_bitrate_cap() {
        let mut settings = udp_settings();
        settings.bitrate = Some("4M".to_string());
        settings.pre_transcoded = true;
        let argv = build_argv(&settings);
        assert!(argv.contains(&"-c".to_string()));
        assert!(argv.contains(&"copy".to_string()));
        assert!(!argv.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn bitrate_cap_without_pre_transcoded_encodes_on_the_fly() {
        let mut settings = udp_settings();
        settings.bitrate = Some("4M".to_string());
        settings.pre_transcoded = false;
        let argv = build_argv(&settings);
        assert!(argv.contains(&"libx264".to_string()));
        assert!(argv.contains(&"4000k".to_string()));
        assert!(argv.contains(&"8000k".to_string())); // 2x buffer
    }

    #[test]
    fn looping_adds_stream_loop_flag() {
        let argv = build_argv(&udp_settings());
        assert!(argv.contains(&"-stream_loop".to_string()));
        assert!(argv.contains(&"-1".to_string()));
    }

    #[test]
    fn non_looping_omits_stream_loop_flag() {
        let mut settings = udp_settings();
        settings.loop_playback = false;
        let argv = build_argv(&settings);
        assert!(!argv.contains(&"-stream_loop".to_string()));
    }

    #[tokio::test]
    async fn new_worker_is_not_running() {
        let worker = StreamWorker::new(udp_settings());
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn stop_on_idle_worker_is_a_no_op() {
        let worker = StreamWorker::new(udp_settings());
        worker.stop().await;
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn update_settings_on_idle_worker_reports_not_running() {
        let worker = StreamWorker::new(udp_settings());
        let mut next = udp_settings();
        next.port = 5102;
        let was_running = worker.update_settings(next.clone()).await;
        assert!(!was_running);
        assert_eq!(worker.settings().port, 5102);
    }
}
