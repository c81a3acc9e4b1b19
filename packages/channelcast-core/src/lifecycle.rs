//! Application lifecycle abstraction.
//!
//! This module provides a [`Lifecycle`] trait for controlling application
//! lifecycle operations like restart and shutdown. Different implementations
//! handle these operations appropriately for their environment (Tauri app
//! vs standalone server).

/// Trait for application lifecycle operations.
///
/// Services that need to trigger application-level actions (like restarting
/// after a configuration change) use this trait rather than directly calling
/// platform-specific APIs.
///
/// # Example
///
/// ```ignore
/// struct ConfigService {
///     lifecycle: Arc<dyn Lifecycle>,
/// }
///
/// impl ConfigService {
///     fn apply_config_requiring_restart(&self, config: Config) {
///         // Save config...
///         self.lifecycle.request_restart();
///     }
/// }
/// ```
pub trait Lifecycle: Send + Sync {
    /// Requests an application restart.
    ///
    /// The implementation determines how the restart is performed:
    /// - Tauri app: Uses Tauri's restart API
    /// - Standalone server: May log and exit (requiring orchestrator restart)
    fn request_restart(&self);

    /// Requests a graceful shutdown.
    ///
    /// The application should clean up resources and exit cleanly.
    fn request_shutdown(&self);
}

/// Server lifecycle implementation for standalone deployment.
///
/// Restart replaces the current process image in place with the same
/// executable and arguments it was launched with, so a settings change that
/// requires a restart doesn't need an external orchestrator. Shutdown
/// triggers a clean process exit.
pub struct ServerLifecycle;

impl Lifecycle for ServerLifecycle {
    #[cfg(unix)]
    fn request_restart(&self) {
        use std::os::unix::process::CommandExt;

        log::info!("Restart requested, re-executing process image");
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                log::error!("Restart failed: could not resolve current executable: {e}");
                return;
            }
        };
        let args: Vec<String> = std::env::args().skip(1).collect();
        let err = std::process::Command::new(exe).args(args).exec();
        // exec() only returns on failure.
        log::error!("Restart failed: exec returned: {err}");
    }

    #[cfg(not(unix))]
    fn request_restart(&self) {
        log::warn!("Restart requested but self-exec is unix-only; exiting for an external orchestrator to relaunch");
        std::process::exit(0);
    }

    fn request_shutdown(&self) {
        log::info!("Shutdown requested");
        std::process::exit(0);
    }
}

/// No-op lifecycle for testing or embedded use.
///
/// Does nothing on restart/shutdown requests. Useful in tests or when
/// embedding the core library in an application that manages its own lifecycle.
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {
    fn request_restart(&self) {
        log::debug!("Restart requested (no-op)");
    }

    fn request_shutdown(&self) {
        log::debug!("Shutdown requested (no-op)");
    }
}
