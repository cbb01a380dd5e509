//! Consumer-side handles and built-in sinks.
//!
//! A peer in the protocol is simply something callable with a [`Signal`];
//! [`SinkHandle`] is that callable, cheap to clone and sharable across
//! threads. Stateful consumers keep their state behind their own lock and
//! must never hold it while signalling another peer, so that a synchronous
//! forward can safely trigger cancellation before the forwarding call
//! returns.

use crate::signal::{EndReason, Signal, Talkback};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Shared handle to a peer that accepts downstream signals.
///
/// This is the consumer-facing half of the protocol: producers and operators
/// deliver `Start`, `Data`, and `End` signals through it.
pub struct SinkHandle<T> {
    inner: Arc<dyn Fn(Signal<T>) + Send + Sync>,
}

impl<T> SinkHandle<T> {
    /// Wrap a signal handler as a sink.
    pub fn new(handler: impl Fn(Signal<T>) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    /// Deliver a signal to this sink.
    pub fn send(&self, signal: Signal<T>) {
        (self.inner)(signal);
    }
}

impl<T> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SinkHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SinkHandle")
    }
}

/// A sink that records everything it receives.
///
/// Useful in tests and at application boundaries: it captures the talkback
/// from the `Start` handshake (so the stream can be cancelled mid-flight),
/// collects every delivered value, and remembers how the stream ended.
///
/// # Example
///
/// ```rust,ignore
/// use trickle::sink::Collector;
///
/// let collector = Collector::new();
/// source.attach(collector.sink());
///
/// // ... later ...
/// assert_eq!(collector.values(), vec![1, 2, 3]);
/// assert!(collector.is_ended());
/// ```
pub struct Collector<T> {
    inner: Arc<CollectorInner<T>>,
}

struct CollectorInner<T> {
    state: Mutex<CollectorState<T>>,
}

struct CollectorState<T> {
    talkback: Option<Talkback>,
    values: Vec<T>,
    ended: bool,
    end_reason: Option<EndReason>,
}

impl<T: Send + 'static> Collector<T> {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                state: Mutex::new(CollectorState {
                    talkback: None,
                    values: Vec::new(),
                    ended: false,
                    end_reason: None,
                }),
            }),
        }
    }

    /// Get the sink handle to attach a source to.
    pub fn sink(&self) -> SinkHandle<T> {
        let inner = Arc::clone(&self.inner);
        SinkHandle::new(move |signal| {
            let mut state = inner.state.lock().unwrap();
            match signal {
                Signal::Start(talkback) => state.talkback = Some(talkback),
                Signal::Data(value) => state.values.push(value),
                Signal::End(reason) => {
                    state.ended = true;
                    state.end_reason = reason;
                }
            }
        })
    }

    /// Check if the handshake completed.
    pub fn is_started(&self) -> bool {
        self.inner.state.lock().unwrap().talkback.is_some()
    }

    /// Get the number of values received so far.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().values.len()
    }

    /// Check if no values were received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the stream terminated.
    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().unwrap().ended
    }

    /// Get the termination reason, if the stream ended with one.
    pub fn end_reason(&self) -> Option<EndReason> {
        self.inner.state.lock().unwrap().end_reason.clone()
    }

    /// Cancel the stream through the captured talkback.
    ///
    /// Returns `false` if no talkback was received yet.
    pub fn cancel(&self) -> bool {
        let talkback = self.inner.state.lock().unwrap().talkback.clone();
        match talkback {
            Some(talkback) => {
                talkback.cancel();
                true
            }
            None => false,
        }
    }
}

impl<T: Clone + Send + 'static> Collector<T> {
    /// Get a snapshot of the values received so far.
    pub fn values(&self) -> Vec<T> {
        self.inner.state.lock().unwrap().values.clone()
    }
}

impl<T: Send + 'static> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sink_handle_dispatch() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = {
            let count = count.clone();
            SinkHandle::new(move |signal: Signal<u32>| {
                if signal.is_data() {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        sink.send(Signal::Data(1));
        sink.send(Signal::Data(2));
        sink.send(Signal::End(None));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_collector_records_values() {
        let collector = Collector::new();
        let sink = collector.sink();

        sink.send(Signal::Start(Talkback::noop()));
        sink.send(Signal::Data(10));
        sink.send(Signal::Data(20));

        assert!(collector.is_started());
        assert_eq!(collector.values(), vec![10, 20]);
        assert_eq!(collector.len(), 2);
        assert!(!collector.is_ended());
    }

    #[test]
    fn test_collector_records_end() {
        let collector: Collector<u32> = Collector::new();
        let sink = collector.sink();

        sink.send(Signal::End(Some(EndReason::new("oops"))));

        assert!(collector.is_ended());
        assert_eq!(collector.end_reason().unwrap().message(), "oops");
    }

    #[test]
    fn test_collector_cancel_without_talkback() {
        let collector: Collector<u32> = Collector::new();
        assert!(!collector.cancel());
    }

    #[test]
    fn test_collector_cancel_reaches_talkback() {
        let cancelled = Arc::new(AtomicUsize::new(0));
        let talkback = {
            let cancelled = cancelled.clone();
            Talkback::new(move |request| {
                if request == crate::signal::Request::Cancel {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let collector: Collector<u32> = Collector::new();
        collector.sink().send(Signal::Start(talkback));

        assert!(collector.cancel());
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }
}
