//! Stream-transform operators.
//!
//! An operator wraps a producer and is itself a [`Source`](crate::source::Source),
//! so operators compose by nesting. Two throttle policies are provided, each
//! internally consistent:
//!
//! - [`Throttle`]: lossy. At most one value per cooldown window; excess
//!   push-mode arrivals are dropped; termination is never delayed.
//! - [`QueuedThrottle`]: lossless. Everything that arrives during a cooldown
//!   window is queued and drained one element per window, termination
//!   included.

mod queued_throttle;
mod throttle;

pub use queued_throttle::QueuedThrottle;
pub use throttle::Throttle;
