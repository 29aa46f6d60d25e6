//! Error types shared across the crate.

use std::io;
use thiserror::Error;

/// Failures of a collective operation over a process group.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// A rank contributed a buffer of a different length than its peers.
    #[error("buffer length mismatch: expected {expected} values, rank {rank} sent {got}")]
    LengthMismatch {
        rank: usize,
        expected: usize,
        got: usize,
    },

    /// Ranks disagreed about which collective they are executing.
    #[error("collective mismatch from rank {rank}: {detail}")]
    Protocol { rank: usize, detail: String },

    #[error("rank {rank} out of range for a group of {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("timed out connecting to root at {addr}")]
    ConnectTimeout { addr: String },
}

/// Top-level error returned by the painter and compositor.
#[derive(Debug, Error)]
pub enum MipError {
    #[error(transparent)]
    Comm(#[from] CommError),

    /// The render target refused or could not display the image.
    #[error("present failed: {0}")]
    Present(String),

    #[error("image buffer holds {got} bytes, expected {expected} for {width}x{height} RGB")]
    ImageSize {
        width: usize,
        height: usize,
        expected: usize,
        got: usize,
    },
}
