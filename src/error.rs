//! Error types for Trickle.

use thiserror::Error;

/// Result type alias using Trickle's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Trickle operations.
///
/// Protocol violations between peers are deliberately not errors: an
/// operator ignores malformed or late signals rather than failing. This
/// type covers genuine API misuse at the crate boundary, such as driving
/// a [`ManualHandle`](crate::source::ManualHandle) after its stream has
/// already terminated.
#[derive(Error, Debug)]
pub enum Error {
    /// The stream has already ended or been cancelled.
    #[error("stream already terminated")]
    Closed,

    /// The source has not been attached to a sink yet.
    #[error("source not attached to a sink")]
    NotAttached,
}
