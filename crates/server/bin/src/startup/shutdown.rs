//! Shutdown signals
//!
//! The replicator stops on SIGINT (Ctrl+C) or SIGTERM. Whichever arrives
//! first is reported so the caller can log why it is stopping.

use tokio::signal;
use tracing::error;

/// Reason for shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM signal received
    SigTerm,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::SigTerm => write!(f, "SIGTERM"),
        }
    }
}

/// Waits for the first shutdown signal.
///
/// A handler that cannot be installed never fires; the other one still
/// works.
pub async fn wait_for_signal() -> ShutdownReason {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupt,
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let term = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                ShutdownReason::SigTerm
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<ShutdownReason>();

    tokio::select! {
        reason = ctrl_c => reason,
        reason = term => reason,
    }
}
