//! Cancellable one-shot timer.
//!
//! Models a "run this after a delay, unless cancelled first" scheduled task
//! on top of tokio. Cancellation is synchronous: after [`CooldownTimer::cancel`]
//! returns (or the timer is dropped), a firing that has not yet run will
//! never run. A firing that already started cannot be recalled; callers that
//! need to discard such a race check their own state inside the callback.

use std::time::Duration;
use tokio::task::AbortHandle;

/// A cancellable scheduled task that fires once after a delay.
///
/// Dropping the timer cancels it, so holding it in an `Option` field gives
/// scoped ownership: replacing or clearing the field kills the pending
/// firing.
///
/// Requires a tokio runtime at start time.
#[derive(Debug)]
pub struct CooldownTimer {
    abort: AbortHandle,
}

impl CooldownTimer {
    /// Schedule `on_elapsed` to run once, `delay` from now.
    ///
    /// A zero delay fires at the next scheduler tick, never synchronously
    /// inside this call.
    pub fn start(delay: Duration, on_elapsed: impl FnOnce() + Send + 'static) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_elapsed();
        });
        Self {
            abort: task.abort_handle(),
        }
    }

    /// Cancel the pending firing.
    ///
    /// Safe to call more than once, and after the timer already fired.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Check if the timer already fired or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        self.abort.abort();
    }
}
