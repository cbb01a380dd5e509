//! # Trickle
//!
//! A throttle operator for a minimalist push/pull streaming protocol.
//!
//! Trickle models the smallest useful streaming contract: a producer hands
//! its consumer a talkback during a `Start` handshake, then delivers `Data`
//! and finally `End`; the consumer can `Pull` (pull-mode producers) or
//! `Cancel` through the talkback at any time. On top of that contract sit
//! two rate-limiting operators built around a timer-gated cooldown window:
//!
//! - [`operators::Throttle`]: lossy — at most one value per window, excess
//!   arrivals dropped, termination never delayed.
//! - [`operators::QueuedThrottle`]: lossless — arrivals queue during the
//!   window and drain one per window, termination included.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use trickle::prelude::*;
//! use std::time::Duration;
//!
//! // Push-mode producer, one value every 100ms; forward at most one per 150ms.
//! let fast = TickerSource::from_millis(100, (0..5).collect());
//! let slow = Throttle::new(Duration::from_millis(150)).apply(fast);
//!
//! let collector = Collector::new();
//! slow.attach(collector.sink());
//! ```
//!
//! Operators and push-mode sources schedule work on tokio, so streams must
//! be attached from within a runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod error;
pub mod operators;
pub mod signal;
pub mod sink;
pub mod source;
pub mod timer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::operators::{QueuedThrottle, Throttle};
    pub use crate::signal::{EndReason, Request, Signal, Talkback};
    pub use crate::sink::{Collector, SinkHandle};
    pub use crate::source::{BoxSource, IterSource, ManualSource, Source, TickerSource};
}

pub use error::{Error, Result};
