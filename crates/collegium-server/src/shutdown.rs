//! Graceful shutdown.
//!
//! Both types here are thin wrappers over a `tokio::sync::watch` channel:
//! [`ShutdownSignal`] publishes a "stopping" flag to the accept loop and
//! every connection task, and [`ConnectionTracker`] publishes the number of
//! open connections so the server can wait for it to reach zero.
//!
//! ```rust,ignore
//! let shutdown = ShutdownSignal::with_os_signals();
//! tokio::select! {
//!     () = shutdown.recv() => tracing::info!("stopping"),
//!     _ = tokio::time::sleep(Duration::from_secs(60)) => {}
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable stop flag. Once raised it stays raised.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stopping: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stopping: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Raises the flag. Repeated calls change nothing.
    pub fn trigger(&self) {
        self.stopping.send_if_modified(|stopping| !std::mem::replace(stopping, true));
    }

    /// Whether [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.stopping.borrow()
    }

    /// Completes once the flag is raised, immediately if it already is.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut flag = self.stopping.subscribe();
        async move {
            // An error means every sender is gone; nothing can fire after that.
            let _ = flag.wait_for(|stopping| *stopping).await;
        }
    }

    /// A signal raised by SIGTERM or SIGINT, or Ctrl+C off unix.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let raise = signal.clone();
        tokio::spawn(async move {
            os_signal().await;
            raise.trigger();
        });
        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "unix signal handlers unavailable, using ctrl_c");
            return ctrl_c().await;
        }
    };

    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    };
    tracing::info!(signal = name, "shutdown requested");
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "no Ctrl+C handler; trigger shutdown programmatically");
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "ctrl_c", "shutdown requested");
}

/// Open-connection counter.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    open: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// A tracker with nothing open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Counts one connection until the returned token drops.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.open.send_modify(|open| *open += 1);
        ConnectionToken {
            open: Arc::clone(&self.open),
        }
    }

    /// Connections currently counted.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.open.borrow()
    }

    /// Completes when no tokens are outstanding.
    pub async fn wait_idle(&self) {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a connection task for as long as it runs.
#[derive(Debug)]
pub struct ConnectionToken {
    open: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.open.send_modify(|open| *open = open.saturating_sub(1));
    }
}
