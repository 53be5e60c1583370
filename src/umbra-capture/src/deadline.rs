//! Bounded waits around calls that can hang
//!
//! Capture and recognition call into other processes' rendering and into OS
//! engines, either of which can stall indefinitely. The call runs on a worker
//! thread and the caller stops waiting once the deadline passes; a stalled
//! worker is detached rather than joined.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The deadline passed before the worker produced a value
    #[error("no result within {0:?}")]
    Elapsed(Duration),

    #[error("worker failed: {0}")]
    Failed(String),
}

/// Run `f` on a worker thread and wait at most `timeout` for its result
pub fn run_with_timeout<T, F>(name: &str, timeout: Duration, f: F) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(1);

    let spawned = thread::Builder::new()
        .name(format!("umbra-{}", name))
        .spawn(move || {
            // The receiver is gone once the caller has timed out.
            let _ = sender.send(f());
        });

    if let Err(e) = spawned {
        return Err(WorkerError::Failed(format!("could not spawn {} worker: {}", name, e)));
    }

    match receiver.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("{} did not finish within {:?}, abandoning worker", name, timeout);
            Err(WorkerError::Elapsed(timeout))
        }
        // The worker panicked before sending.
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(WorkerError::Failed(format!(
            "{} worker exited without a result",
            name
        ))),
    }
}
