//! Lossy throttle operator.
//!
//! Forwards a value, then opens a cooldown window of the configured delay.
//! Values arriving while the window is open are dropped. Termination is
//! never throttled: `End` is forwarded immediately, cooldown or not. When a
//! window closes the operator issues one `Pull` upstream, which drives
//! pull-mode producers at exactly one value per window.

use crate::signal::{EndReason, Request, Signal, Talkback};
use crate::sink::SinkHandle;
use crate::source::{BoxSource, Source};
use crate::timer::CooldownTimer;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A rate-limiting operator that drops values arriving too fast.
///
/// At most one value is forwarded per `delay` window. The first value of a
/// burst is always forwarded immediately; the rest of the burst is discarded.
/// `End` passes through untouched at any time. A zero delay is pass-through:
/// nothing is ever dropped.
///
/// Requires a tokio runtime when the stream is attached.
///
/// # Example
///
/// ```rust,ignore
/// use trickle::operators::Throttle;
/// use trickle::source::TickerSource;
/// use std::time::Duration;
///
/// let fast = TickerSource::from_millis(100, (0..5).collect());
/// let throttled = Throttle::new(Duration::from_millis(150)).apply(fast);
/// ```
pub struct Throttle {
    delay: Duration,
    name: String,
}

impl Throttle {
    /// Create a throttle with the given cooldown delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            name: format!("throttle-{}ms", delay.as_millis()),
            delay,
        }
    }

    /// Create a throttle with the delay given in milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Set a custom name (used in log output).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the configured cooldown delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Get the operator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap a producer, yielding the throttled source.
    pub fn apply<T, S>(self, source: S) -> BoxSource<T>
    where
        T: Send + 'static,
        S: Source<T> + 'static,
    {
        Box::new(ThrottledSource {
            delay: self.delay,
            name: self.name,
            source: Box::new(source),
        })
    }
}

struct ThrottledSource<T> {
    delay: Duration,
    name: String,
    source: BoxSource<T>,
}

impl<T: Send + 'static> Source<T> for ThrottledSource<T> {
    fn attach(self: Box<Self>, sink: SinkHandle<T>) {
        let core = Arc::new(ThrottleCore {
            delay: self.delay,
            name: self.name,
            sink,
            state: Mutex::new(ThrottleState {
                upstream: None,
                window: None,
                epoch: 0,
                cooling: false,
                source_done: false,
                sink_done: false,
            }),
        });

        // Hand the consumer its talkback first; it may cancel synchronously.
        let talkback = {
            let core = Arc::clone(&core);
            Talkback::new(move |request| core.on_consumer_request(request))
        };
        core.sink.send(Signal::Start(talkback));

        let upstream_sink = {
            let core = Arc::clone(&core);
            SinkHandle::new(move |signal| core.on_producer_signal(signal))
        };
        self.source.attach(upstream_sink);
    }
}

struct ThrottleCore<T> {
    delay: Duration,
    name: String,
    sink: SinkHandle<T>,
    state: Mutex<ThrottleState>,
}

/// Per-stream operator state. Lives behind a mutex because producer,
/// consumer, and timer may signal from different threads; the lock is never
/// held across an outbound send, so synchronous re-entrancy cannot deadlock.
struct ThrottleState {
    upstream: Option<Talkback>,
    window: Option<CooldownTimer>,
    /// Incremented whenever a window opens or the stream terminates; a
    /// window firing that carries a stale epoch lost the race and is ignored.
    epoch: u64,
    cooling: bool,
    source_done: bool,
    sink_done: bool,
}

enum Greet {
    Ignore,
    CancelProducer(Talkback),
    Pull(Talkback),
}

impl<T: Send + 'static> ThrottleCore<T> {
    fn on_producer_signal(self: &Arc<Self>, signal: Signal<T>) {
        match signal {
            Signal::Start(talkback) => self.on_producer_start(talkback),
            Signal::Data(value) => self.on_producer_data(value),
            Signal::End(reason) => self.on_producer_end(reason),
        }
    }

    fn on_producer_start(self: &Arc<Self>, talkback: Talkback) {
        let action = {
            let mut state = self.state.lock().unwrap();
            if state.upstream.is_some() || state.source_done {
                Greet::Ignore // duplicate start
            } else if state.sink_done {
                // Consumer bailed before the handshake completed.
                Greet::CancelProducer(talkback)
            } else {
                state.upstream = Some(talkback.clone());
                Greet::Pull(talkback)
            }
        };
        match action {
            Greet::Ignore => {}
            Greet::CancelProducer(talkback) => talkback.cancel(),
            // Safe for push producers (they ignore it), required for pull
            // producers to emit anything at all.
            Greet::Pull(talkback) => talkback.pull(),
        }
    }

    fn on_producer_data(self: &Arc<Self>, value: T) {
        let epoch = {
            let mut state = self.state.lock().unwrap();
            if state.sink_done || state.source_done || state.upstream.is_none() {
                return; // late, early, or misbehaving producer
            }
            if state.cooling {
                tracing::trace!(operator = %self.name, "dropping value during cooldown");
                return;
            }
            state.epoch += 1;
            state.cooling = !self.delay.is_zero();
            state.window = None; // supersede any pending zero-delay firing
            state.epoch
        };

        self.sink.send(Signal::Data(value));
        self.open_window(epoch);
    }

    fn on_producer_end(self: &Arc<Self>, reason: Option<EndReason>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.sink_done || state.source_done || state.upstream.is_none() {
                return;
            }
            // End is never throttled; the stream completes right here.
            state.source_done = true;
            state.sink_done = true;
            state.cooling = false;
            state.epoch += 1;
            state.window = None;
            state.upstream = None;
        }
        tracing::debug!(operator = %self.name, "stream ended");
        self.sink.send(Signal::End(reason));
    }

    fn on_consumer_request(self: &Arc<Self>, request: Request) {
        match request {
            // The operator is push-only toward the consumer.
            Request::Pull => {}
            Request::Cancel => {
                let upstream = {
                    let mut state = self.state.lock().unwrap();
                    if state.sink_done {
                        return;
                    }
                    state.sink_done = true;
                    state.cooling = false;
                    state.epoch += 1;
                    state.window = None;
                    state.upstream.take()
                };
                tracing::debug!(operator = %self.name, "consumer cancelled");
                if let Some(talkback) = upstream {
                    talkback.cancel();
                }
            }
        }
    }

    /// Arm the cooldown window `epoch`, unless the stream moved on while the
    /// value was being forwarded.
    fn open_window(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock().unwrap();
        if state.sink_done || state.epoch != epoch {
            return;
        }
        let core = Arc::clone(self);
        state.window = Some(CooldownTimer::start(self.delay, move || {
            core.on_window_elapsed(epoch);
        }));
    }

    fn on_window_elapsed(self: &Arc<Self>, epoch: u64) {
        let upstream = {
            let mut state = self.state.lock().unwrap();
            if state.sink_done || state.epoch != epoch {
                return; // cancelled or superseded while the firing was in flight
            }
            state.cooling = false;
            state.window = None;
            if state.source_done {
                None
            } else {
                state.upstream.clone()
            }
        };
        if let Some(talkback) = upstream {
            talkback.pull();
        }
    }
}
