//! Cooperative stop flag for the control loop

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ControlError, ControlResult};

/// Longest uninterrupted sleep while waiting out a tick interval.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Default)]
pub struct StopSignal {
    stop: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking early once a stop is requested.
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Spawn a watcher thread that requests a stop on Ctrl-C or SIGTERM.
    ///
    /// The watcher only sets the flag; a tick in progress always completes.
    pub fn install_os_handlers(&self) -> ControlResult<thread::JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .map_err(|e| ControlError::Transport {
                collaborator: "signal watcher".to_string(),
                source: e,
            })?;
        let signal = self.clone();

        let handle = thread::Builder::new()
            .name("signal-watcher".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let name = wait_for_signal().await;
                    tracing::warn!(signal = name, "stop requested, finishing current tick");
                    signal.request_stop();
                })
            })?;
        Ok(handle)
    }
}

/// Resolve with `name` once `signal` fires.
///
/// A signal that cannot be watched is logged and never resolves, so a failed
/// registration is not mistaken for a stop request.
pub async fn await_signal<F>(name: &'static str, signal: F) -> &'static str
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => name,
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "cannot watch signal");
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        let mut term = signal(SignalKind::terminate())?;
        term.recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "SIGTERM stream closed"))
    };
    tokio::select! {
        name = await_signal("SIGINT", tokio::signal::ctrl_c()) => name,
        name = await_signal("SIGTERM", terminate) => name,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    await_signal("Ctrl-C", tokio::signal::ctrl_c()).await
}
