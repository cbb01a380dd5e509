//! Lossless (queuing) throttle operator.
//!
//! Same handshake and cooldown machinery as [`Throttle`](super::Throttle),
//! but nothing is dropped: signals arriving while a window is open are
//! queued, and each closing window drains exactly one queued element before
//! re-entering cooldown. Termination queues like data, so a fast producer's
//! `End` is observed only after everything before it has been delivered.

use crate::signal::{EndReason, Request, Signal, Talkback};
use crate::sink::SinkHandle;
use crate::source::{BoxSource, Source};
use crate::timer::CooldownTimer;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A rate-limiting operator that buffers values arriving too fast.
///
/// Delivery order is exactly arrival order; delivery times are stretched so
/// consecutive forwards are at least `delay` apart. If the producer outruns
/// the cooldown rate indefinitely the queue grows without bound; that is the
/// documented cost of losing nothing.
///
/// Requires a tokio runtime when the stream is attached.
pub struct QueuedThrottle {
    delay: Duration,
    name: String,
}

impl QueuedThrottle {
    /// Create a queuing throttle with the given cooldown delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            name: format!("queued-throttle-{}ms", delay.as_millis()),
            delay,
        }
    }

    /// Create a queuing throttle with the delay given in milliseconds.
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
        Box::new(QueuedSource {
            delay: self.delay,
            name: self.name,
            source: Box::new(source),
        })
    }
}

struct QueuedSource<T> {
    delay: Duration,
    name: String,
    source: BoxSource<T>,
}

impl<T: Send + 'static> Source<T> for QueuedSource<T> {
    fn attach(self: Box<Self>, sink: SinkHandle<T>) {
        let core = Arc::new(QueuedCore {
            delay: self.delay,
            name: self.name,
            sink,
            state: Mutex::new(QueuedState {
                upstream: None,
                window: None,
                queue: VecDeque::new(),
                epoch: 0,
                cooling: false,
                source_done: false,
                sink_done: false,
            }),
        });

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

/// A signal buffered while a cooldown window is open.
enum Queued<T> {
    Data(T),
    End(Option<EndReason>),
}

struct QueuedCore<T> {
    delay: Duration,
    name: String,
    sink: SinkHandle<T>,
    state: Mutex<QueuedState<T>>,
}

struct QueuedState<T> {
    upstream: Option<Talkback>,
    window: Option<CooldownTimer>,
    queue: VecDeque<Queued<T>>,
    epoch: u64,
    cooling: bool,
    source_done: bool,
    sink_done: bool,
}

impl<T> QueuedState<T> {
    /// Signals must queue whenever delivery is gated, either by an open
    /// window or by older queued elements that have to drain first.
    fn must_queue(&self) -> bool {
        self.cooling || !self.queue.is_empty()
    }

    fn finish(&mut self) {
        self.source_done = true;
        self.sink_done = true;
        self.cooling = false;
        self.epoch += 1;
        self.window = None;
        self.upstream = None;
        self.queue.clear();
    }
}

impl<T: Send + 'static> QueuedCore<T> {
    fn on_producer_signal(self: &Arc<Self>, signal: Signal<T>) {
        match signal {
            Signal::Start(talkback) => self.on_producer_start(talkback),
            Signal::Data(value) => self.on_producer_data(value),
            Signal::End(reason) => self.on_producer_end(reason),
        }
    }

    fn on_producer_start(self: &Arc<Self>, talkback: Talkback) {
        enum Greet {
            Ignore,
            CancelProducer,
            Pull,
        }
        let action = {
            let mut state = self.state.lock().unwrap();
            if state.upstream.is_some() || state.source_done {
                Greet::Ignore
            } else if state.sink_done {
                Greet::CancelProducer
            } else {
                state.upstream = Some(talkback.clone());
                Greet::Pull
            }
        };
        match action {
            Greet::Ignore => {}
            Greet::CancelProducer => talkback.cancel(),
            Greet::Pull => talkback.pull(),
        }
    }

    fn on_producer_data(self: &Arc<Self>, value: T) {
        let epoch = {
            let mut state = self.state.lock().unwrap();
            if state.sink_done || state.source_done || state.upstream.is_none() {
                return;
            }
            if state.must_queue() {
                tracing::trace!(
                    operator = %self.name,
                    queued = state.queue.len() + 1,
                    "buffering value during cooldown"
                );
                state.queue.push_back(Queued::Data(value));
                return;
            }
            state.epoch += 1;
            state.cooling = !self.delay.is_zero();
            state.window = None;
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
            state.source_done = true;
            if state.must_queue() {
                // Termination drains behind everything queued before it.
                state.queue.push_back(Queued::End(reason));
                return;
            }
            state.finish();
        }
        tracing::debug!(operator = %self.name, "stream ended");
        self.sink.send(Signal::End(reason));
    }

    fn on_consumer_request(self: &Arc<Self>, request: Request) {
        match request {
            Request::Pull => {}
            Request::Cancel => {
                let upstream = {
                    let mut state = self.state.lock().unwrap();
                    if state.sink_done {
                        return;
                    }
                    let upstream = state.upstream.take();
                    state.finish();
                    upstream
                };
                tracing::debug!(operator = %self.name, "consumer cancelled");
                if let Some(talkback) = upstream {
                    talkback.cancel();
                }
            }
        }
    }

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
        enum Drain<T> {
            Idle(Option<Talkback>),
            Emit {
                value: T,
                epoch: u64,
                pull: Option<Talkback>,
            },
            Finish(Option<EndReason>),
        }

        let drain = {
            let mut state = self.state.lock().unwrap();
            if state.sink_done || state.epoch != epoch {
                return;
            }
            state.window = None;
            let pull = if state.source_done {
                None
            } else {
                state.upstream.clone()
            };
            match state.queue.pop_front() {
                None => {
                    state.cooling = false;
                    Drain::Idle(pull)
                }
                Some(Queued::Data(value)) => {
                    // Re-enter cooldown immediately: the drained element
                    // counts as this window's delivery.
                    state.epoch += 1;
                    state.cooling = !self.delay.is_zero();
                    Drain::Emit {
                        value,
                        epoch: state.epoch,
                        pull,
                    }
                }
                Some(Queued::End(reason)) => {
                    state.finish();
                    Drain::Finish(reason)
                }
            }
        };

        match drain {
            Drain::Idle(pull) => {
                if let Some(talkback) = pull {
                    talkback.pull();
                }
            }
            Drain::Emit { value, epoch, pull } => {
                let live = { !self.state.lock().unwrap().sink_done };
                if live {
                    self.sink.send(Signal::Data(value));
                    self.open_window(epoch);
                }
                if let Some(talkback) = pull {
                    let live = {
                        let state = self.state.lock().unwrap();
                        !state.sink_done && !state.source_done
                    };
                    if live {
                        talkback.pull();
                    }
                }
            }
            Drain::Finish(reason) => {
                self.sink.send(Signal::End(reason));
            }
        }
    }
}
