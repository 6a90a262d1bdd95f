//! Error types surfaced by the container.
//!
//! Most failures in a display layer are not worth surfacing: decorator faults degrade the
//! affected bar, writer failures are logged and the next tick retries. [`ProgressError`] only
//! covers the cases a caller can act on.

use std::io;

use thiserror::Error;

/// Errors returned by [`Progress`](crate::Progress) operations.
#[derive(Error, Debug)]
pub enum ProgressError {
    /// The container has been waited on and no longer accepts bars.
    #[error("progress container is closed")]
    Closed,

    /// The actor thread for a new bar could not be started.
    #[error("failed to spawn bar actor: {0}")]
    Spawn(#[source] io::Error),

    /// The frame writer rejected a frame or flush.
    #[error("failed to write frame: {0}")]
    Write(#[from] io::Error),
}
