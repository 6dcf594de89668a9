//! Signal observers
//!
//! Two independent boolean state signals the controller subscribes to: the
//! battery-optimization exemption and screen power. Each observer owns a
//! long-lived poll task that publishes over a `watch` channel only when the
//! observed value changes; subscribers see current state, never history.

pub mod battery;
pub mod screen;

pub use battery::BatteryExemptionObserver;
pub use screen::ScreenPowerObserver;

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors from signal subscription
#[derive(Debug, Error, Clone)]
pub enum SignalError {
    /// The OS capability behind this signal is missing; the consumer should
    /// treat the dependent feature as permanently disabled.
    #[error("signal source unavailable: {0}")]
    Unavailable(String),
}

/// A restartable, infinite boolean state signal.
///
/// `subscribe` is idempotent: the underlying poll task is spawned at most
/// once, and repeated calls hand out additional receivers over the same
/// channel. `unsubscribe` aborts the task; nothing is delivered afterwards
/// until a fresh `subscribe`.
pub trait SignalObserver: Send + Sync {
    fn subscribe(&self) -> Result<watch::Receiver<bool>, SignalError>;
    fn unsubscribe(&self);

    /// Last published value
    fn last(&self) -> bool;
}

/// Run a command with a hard wall-clock bound on the tokio runtime
pub(crate) async fn run_cmd_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Output, String> {
    tokio::time::timeout(
        timeout,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await
    .map_err(|_| format!("{} timed out after {:?}", program, timeout))?
    .map_err(|e| format!("failed to execute {}: {}", program, e))
}
