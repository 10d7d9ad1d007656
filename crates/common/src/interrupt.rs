//! Cooperative cancellation for device connect/login sequences.
//!
//! Long-running work (pairing, polling loops, handshakes) checks a
//! [`CancellationToken`] between steps and surfaces cancellation as an
//! [`Interrupted`] value instead of a generic failure, so callers can tell
//! "the user stopped this" apart from "the device misbehaved".

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

/// Marker error returned when work was abandoned because its token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation was interrupted")]
pub struct Interrupted;

/// Returns `Err(Interrupted)` once `token` has been cancelled.
pub fn check_interrupt(token: &CancellationToken) -> Result<(), Interrupted> {
    if token.is_cancelled() {
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Drive `fut` to completion unless `token` is cancelled first.
///
/// The future is dropped on cancellation; whatever it owned (an in-flight
/// HTTP request, for instance) is torn down with it.
pub async fn run_until_cancelled<F>(token: &CancellationToken, fut: F) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Interrupted),
        out = fut => Ok(out),
    }
}
