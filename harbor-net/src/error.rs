//! Error types for the buffer layer.

use thiserror::Error;

/// Errors surfaced by [`crate::RingBuffer`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// A push was attempted while the ring held `capacity` elements.
    #[error("ring buffer is at capacity")]
    NoCapacity,

    /// An index at or beyond the ring's fixed capacity.
    #[error("index {0} is outside the ring's capacity")]
    OutOfBounds(usize),
}
