//! Periodic host metrics sampler: CPU, memory, and per-NIC throughput.
//!
//! Publishes a [`crate::events::BroadcastEvent::Metrics`] every
//! [`METRICS_SAMPLE_INTERVAL_SECS`] until cancelled. Throughput is derived
//! from the delta of cumulative byte counters between ticks, so the first
//! tick after startup always reports zero for every interface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sysinfo::{Networks, System};
use tokio::sync::Notify;

use crate::events::{BroadcastEvent, EventEmitter, NicThroughput};
use crate::protocol_constants::METRICS_SAMPLE_INTERVAL_SECS;

/// Handle to a running metrics sampler task.
pub struct MetricsSamplerHandle {
    active: Arc<AtomicBool>,
    cancel: Arc<Notify>,
}

impl MetricsSamplerHandle {
    /// Stops the sampler. The in-flight tick (if any) still completes but no
    /// further events are published afterward.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.cancel.notify_waiters();
        }
    }
}

fn mbps(bytes: u64, interval_secs: f64) -> f64 {
    (bytes as f64 * 8.0) / 1_000_000.0 / interval_secs
}

/// Starts the sampler as a background task. Every known network interface is
/// reported in each tick's `nics` map; the caller decides which one to
/// highlight.
pub fn start(emitter: Arc<dyn EventEmitter>) -> MetricsSamplerHandle {
    let active = Arc::new(AtomicBool::new(true));
    let cancel = Arc::new(Notify::new());
    let handle = MetricsSamplerHandle { active: Arc::clone(&active), cancel: Arc::clone(&cancel) };

    tokio::spawn(run(emitter, active, cancel));

    handle
}

async fn run(emitter: Arc<dyn EventEmitter>, active: Arc<AtomicBool>, cancel: Arc<Notify>) {
    let interval = std::time::Duration::from_secs(METRICS_SAMPLE_INTERVAL_SECS);
    let mut sys = System::new();
    let mut networks = Networks::new_with_refreshed_list();
    let mut last_bytes: HashMap<String, (u64, u64)> = HashMap::new();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.notified() => return,
            _ = ticker.tick() => {}
        }
        if !active.load(Ordering::SeqCst) {
            return;
        }

        sys.refresh_cpu_usage();
        sys.refresh_memory();
        networks.refresh(true);

        let cpu = f64::from(sys.global_cpu_usage());
        let mem_total_gb = sys.total_memory() as f64 / 1_073_741_824.0;
        let mem_used_gb = sys.used_memory() as f64 / 1_073_741_824.0;
        let mem = if mem_total_gb > 0.0 { (mem_used_gb / mem_total_gb) * 100.0 } else { 0.0 };

        let interval_secs = interval.as_secs_f64();
        let mut nics = HashMap::new();
        for (name, data) in &networks {
            let (rx_total, tx_total) = (data.total_received(), data.total_transmitted());
            let (prev_rx, prev_tx) = last_bytes.get(name).copied().unwrap_or((rx_total, tx_total));
            let rx_delta = rx_total.saturating_sub(prev_rx);
            let tx_delta = tx_total.saturating_sub(prev_tx);
            last_bytes.insert(name.clone(), (rx_total, tx_total));
            nics.insert(
                name.clone(),
                NicThroughput { tx_mbps: mbps(tx_delta, interval_secs), rx_mbps: mbps(rx_delta, interval_secs) },
            );
        }

        emitter.emit(BroadcastEvent::Metrics { cpu, mem, mem_used_gb, mem_total_gb, nics });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mbps_converts_bytes_per_interval_to_megabits_per_second() {
        let value = mbps(1_000_000, 8.0);
        assert!((value - 1.0).abs() < 0.001);
    }

    #[test]
    fn mbps_of_zero_bytes_is_zero() {
        assert_eq!(mbps(0, 5.0), 0.0);
    }

    #[tokio::test]
    async fn stop_before_first_tick_prevents_any_emission() {
        use crate::events::NoopEventEmitter;
        let handle = start(Arc::new(NoopEventEmitter));
        handle.stop();
        assert!(!handle.active.load(Ordering::SeqCst));
    }
}
