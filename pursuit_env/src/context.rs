//! Core environment context trait for the pursuit viewer.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts time and task scheduling so that the live-update
/// pipeline can run in both production (tokio) and test (paused-clock)
/// environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `tokio::spawn`
/// - **Tests**: `TokioContext` under a paused runtime - the same impl,
///   driven by tokio's virtual clock
///
/// # Determinism
///
/// All waiting in the connection manager (heartbeat interval, ack
/// deadline, reconnect backoff) is expressed through [`sleep`] and
/// deadlines derived from [`now`], never as blocking calls, so a paused
/// runtime observes the exact timer sequence production would.
///
/// [`sleep`]: ViewerContext::sleep
/// [`now`]: ViewerContext::now
#[async_trait]
pub trait ViewerContext: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since context creation.
    ///
    /// Used for heartbeat and backoff deadline arithmetic. Under a paused
    /// test runtime this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends the calling task for the given duration.
    ///
    /// Never blocks the thread; other sessions and store consumers keep
    /// running.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// The name is a diagnostic label for log output.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
