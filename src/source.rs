//! Producer-side trait and built-in sources.
//!
//! A [`Source`] is started by attaching it to a [`SinkHandle`]; attaching is
//! the begin signal of the handshake. The source must synchronously hand the
//! sink a [`Talkback`] via [`Signal::Start`] before emitting anything else.
//!
//! Built-in producers:
//! - [`IterSource`]: pull-mode, emits one value per `Pull`
//! - [`TickerSource`]: push-mode, emits on a fixed interval (tokio task)
//! - [`ManualSource`]: push-mode, driven from application code through a
//!   cloneable [`ManualHandle`]

use crate::error::{Error, Result};
use crate::signal::{EndReason, Request, Signal, Talkback};
use crate::sink::SinkHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

/// An upstream producer of values.
///
/// Attaching consumes the source: the handshake happens exactly once per
/// stream. Push-mode sources emit on their own schedule and ignore `Pull`;
/// pull-mode sources emit only in response to it. Either way, `Cancel`
/// through the handed-out talkback must stop the source.
pub trait Source<T>: Send {
    /// Start the stream toward `sink`.
    ///
    /// Must synchronously deliver `Signal::Start` with a talkback before any
    /// data flows.
    fn attach(self: Box<Self>, sink: SinkHandle<T>);

    /// Box this source for dynamic composition.
    fn boxed(self) -> BoxSource<T>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

/// A boxed, dynamically dispatched source.
pub type BoxSource<T> = Box<dyn Source<T>>;

impl<T> Source<T> for Box<dyn Source<T>> {
    fn attach(self: Box<Self>, sink: SinkHandle<T>) {
        (*self).attach(sink);
    }
}

// ============================================================================
// IterSource
// ============================================================================

/// A pull-mode source backed by an iterator.
///
/// Emits exactly one value per `Pull` request and `End(None)` once the
/// iterator is exhausted. Without a pulling consumer (or an operator pulling
/// on its behalf) it emits nothing at all.
///
/// # Example
///
/// ```rust,ignore
/// use trickle::source::IterSource;
///
/// let source = IterSource::new(vec![10, 20, 30]);
/// ```
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    /// Create a pull-mode source over the given items.
    pub fn new<It>(items: It) -> Self
    where
        It: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
        }
    }
}

struct IterState<I> {
    iter: I,
    done: bool,
}

impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    fn attach(self: Box<Self>, sink: SinkHandle<I::Item>) {
        let state = Arc::new(Mutex::new(IterState {
            iter: self.iter,
            done: false,
        }));

        let talkback = {
            let sink = sink.clone();
            Talkback::new(move |request| match request {
                Request::Pull => {
                    // Release the lock before signalling: the consumer may
                    // pull again synchronously from inside its handler.
                    let next = {
                        let mut state = state.lock().unwrap();
                        if state.done {
                            return;
                        }
                        match state.iter.next() {
                            Some(value) => Some(value),
                            None => {
                                state.done = true;
                                None
                            }
                        }
                    };
                    match next {
                        Some(value) => sink.send(Signal::Data(value)),
                        None => sink.send(Signal::End(None)),
                    }
                }
                Request::Cancel => {
                    state.lock().unwrap().done = true;
                }
            })
        };

        sink.send(Signal::Start(talkback));
    }
}

// ============================================================================
// TickerSource
// ============================================================================

/// A push-mode source that emits values on a fixed interval.
///
/// The first value is emitted as soon as the stream starts; each following
/// value one `interval` later. `End(None)` follows the last value
/// immediately. `Pull` requests are ignored; `Cancel` aborts the emitting
/// task.
///
/// Requires a tokio runtime at attach time.
pub struct TickerSource<T> {
    interval: Duration,
    items: Vec<T>,
}

impl<T> TickerSource<T> {
    /// Create a ticker emitting `items` spaced by `interval`.
    pub fn new(interval: Duration, items: Vec<T>) -> Self {
        Self { interval, items }
    }

    /// Create a ticker with the interval given in milliseconds.
    pub fn from_millis(millis: u64, items: Vec<T>) -> Self {
        Self::new(Duration::from_millis(millis), items)
    }

    /// Get the configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<T: Send + 'static> Source<T> for TickerSource<T> {
    fn attach(self: Box<Self>, sink: SinkHandle<T>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let abort: Arc<Mutex<Option<AbortHandle>>> = Arc::new(Mutex::new(None));

        let talkback = {
            let cancelled = Arc::clone(&cancelled);
            let abort = Arc::clone(&abort);
            Talkback::new(move |request| {
                if request == Request::Cancel {
                    cancelled.store(true, Ordering::SeqCst);
                    if let Some(handle) = abort.lock().unwrap().take() {
                        handle.abort();
                    }
                }
            })
        };
        sink.send(Signal::Start(talkback));
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        let Self { interval, items } = *self;
        let task = tokio::spawn({
            let cancelled = Arc::clone(&cancelled);
            async move {
                for (index, item) in items.into_iter().enumerate() {
                    if index > 0 {
                        tokio::time::sleep(interval).await;
                    }
                    if cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    sink.send(Signal::Data(item));
                }
                if !cancelled.load(Ordering::SeqCst) {
                    sink.send(Signal::End(None));
                }
            }
        });

        *abort.lock().unwrap() = Some(task.abort_handle());
        // The cancel may have raced the spawn.
        if cancelled.load(Ordering::SeqCst) {
            task.abort();
        }
    }
}

// ============================================================================
// ManualSource
// ============================================================================

/// A push-mode source driven from application code.
///
/// Obtain a [`ManualHandle`] before attaching and use it to emit values and
/// terminate the stream. The handle also exposes what the downstream peer
/// requested, which makes it convenient for exercising operators in tests.
///
/// # Example
///
/// ```rust,ignore
/// use trickle::source::ManualSource;
///
/// let source = ManualSource::new();
/// let handle = source.handle();
///
/// // ... attach the source ...
/// handle.emit(42)?;
/// handle.end(None)?;
/// ```
pub struct ManualSource<T> {
    inner: Arc<ManualInner<T>>,
}

struct ManualInner<T> {
    state: Mutex<ManualState<T>>,
}

struct ManualState<T> {
    sink: Option<SinkHandle<T>>,
    ended: bool,
    cancelled: bool,
    pulls: u64,
}

/// Handle for driving a [`ManualSource`].
///
/// Can be cloned and sent to other threads.
pub struct ManualHandle<T> {
    inner: Arc<ManualInner<T>>,
}

impl<T: Send + 'static> ManualSource<T> {
    /// Create a new manual source.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualInner {
                state: Mutex::new(ManualState {
                    sink: None,
                    ended: false,
                    cancelled: false,
                    pulls: 0,
                }),
            }),
        }
    }

    /// Get a handle for driving this source.
    pub fn handle(&self) -> ManualHandle<T> {
        ManualHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Default for ManualSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Source<T> for ManualSource<T> {
    fn attach(self: Box<Self>, sink: SinkHandle<T>) {
        self.inner.state.lock().unwrap().sink = Some(sink.clone());

        let inner = Arc::clone(&self.inner);
        let talkback = Talkback::new(move |request| {
            let mut state = inner.state.lock().unwrap();
            match request {
                Request::Pull => state.pulls += 1,
                Request::Cancel => {
                    state.cancelled = true;
                    state.sink = None;
                }
            }
        });
        sink.send(Signal::Start(talkback));
    }
}

impl<T: Send + 'static> ManualHandle<T> {
    /// Emit one value downstream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after the stream ended or was cancelled,
    /// and [`Error::NotAttached`] before the source is attached.
    pub fn emit(&self, value: T) -> Result<()> {
        let sink = {
            let state = self.inner.state.lock().unwrap();
            if state.ended || state.cancelled {
                return Err(Error::Closed);
            }
            match &state.sink {
                Some(sink) => sink.clone(),
                None => return Err(Error::NotAttached),
            }
        };
        sink.send(Signal::Data(value));
        Ok(())
    }

    /// Terminate the stream, normally (`None`) or with an error reason.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after the stream ended or was cancelled,
    /// and [`Error::NotAttached`] before the source is attached.
    pub fn end(&self, reason: Option<EndReason>) -> Result<()> {
        let sink = {
            let mut state = self.inner.state.lock().unwrap();
            if state.ended || state.cancelled {
                return Err(Error::Closed);
            }
            let Some(sink) = state.sink.take() else {
                return Err(Error::NotAttached);
            };
            state.ended = true;
            sink
        };
        sink.send(Signal::End(reason));
        Ok(())
    }

    /// Get the number of `Pull` requests received from downstream.
    pub fn pulls(&self) -> u64 {
        self.inner.state.lock().unwrap().pulls
    }

    /// Check if downstream cancelled the stream.
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().unwrap().cancelled
    }

    /// Check if the source is currently attached to a live sink.
    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().unwrap().sink.is_some()
    }
}

impl<T> Clone for ManualHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Collector;

    fn capture_talkback<T: Send + 'static>(
        collector: &Collector<T>,
        slot: &Arc<Mutex<Option<Talkback>>>,
    ) -> SinkHandle<T> {
        let inner = collector.sink();
        let slot = Arc::clone(slot);
        SinkHandle::new(move |signal| {
            if let Signal::Start(talkback) = &signal {
                *slot.lock().unwrap() = Some(talkback.clone());
            }
            inner.send(signal);
        })
    }

    #[test]
    fn test_iter_source_emits_per_pull() {
        let collector = Collector::new();
        let slot = Arc::new(Mutex::new(None));
        let sink = capture_talkback(&collector, &slot);

        IterSource::new(vec![1, 2, 3]).boxed().attach(sink);
        let talkback = slot.lock().unwrap().clone().unwrap();

        assert!(collector.is_empty());

        talkback.pull();
        assert_eq!(collector.values(), vec![1]);

        talkback.pull();
        talkback.pull();
        assert_eq!(collector.values(), vec![1, 2, 3]);
        assert!(!collector.is_ended());

        // Exhausted: one End, then silence.
        talkback.pull();
        assert!(collector.is_ended());
        talkback.pull();
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_iter_source_cancel_stops_emission() {
        let collector = Collector::new();
        let slot = Arc::new(Mutex::new(None));
        let sink = capture_talkback(&collector, &slot);

        IterSource::new(0..100).boxed().attach(sink);
        let talkback = slot.lock().unwrap().clone().unwrap();

        talkback.pull();
        talkback.cancel();
        talkback.pull();
        talkback.pull();

        assert_eq!(collector.values(), vec![0]);
        assert!(!collector.is_ended());
    }

    #[test]
    fn test_manual_source_not_attached() {
        let source: ManualSource<u32> = ManualSource::new();
        let handle = source.handle();

        assert!(matches!(handle.emit(1), Err(Error::NotAttached)));
        assert!(matches!(handle.end(None), Err(Error::NotAttached)));
    }

    #[test]
    fn test_manual_source_emit_and_end() {
        let source = ManualSource::new();
        let handle = source.handle();
        let collector = Collector::new();

        source.boxed().attach(collector.sink());
        assert!(handle.is_attached());

        handle.emit(5).unwrap();
        handle.emit(6).unwrap();
        handle.end(None).unwrap();

        assert_eq!(collector.values(), vec![5, 6]);
        assert!(collector.is_ended());
        assert!(collector.end_reason().is_none());

        // Terminated: further driving is an error.
        assert!(matches!(handle.emit(7), Err(Error::Closed)));
        assert!(matches!(handle.end(None), Err(Error::Closed)));
    }

    #[test]
    fn test_manual_source_observes_requests() {
        let source: ManualSource<u32> = ManualSource::new();
        let handle = source.handle();
        let collector = Collector::new();

        source.boxed().attach(collector.sink());
        assert_eq!(handle.pulls(), 0);

        collector.cancel();
        assert!(handle.is_cancelled());
        assert!(!handle.is_attached());
        assert!(matches!(handle.emit(1), Err(Error::Closed)));
    }

    #[test]
    fn test_ticker_source_builders() {
        let ticker = TickerSource::from_millis(100, vec![1, 2, 3]);
        assert_eq!(ticker.interval(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_source_emits_spaced() {
        let collector = Collector::new();
        TickerSource::from_millis(100, vec![0u32, 1, 2])
            .boxed()
            .attach(collector.sink());

        assert!(collector.is_started());

        // First item lands as soon as the task runs.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(collector.values(), vec![0]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(collector.values(), vec![0, 1]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(collector.values(), vec![0, 1, 2]);
        assert!(collector.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_source_cancel_aborts() {
        let collector = Collector::new();
        TickerSource::from_millis(50, vec![0u32, 1, 2, 3])
            .boxed()
            .attach(collector.sink());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(collector.values(), vec![0, 1]);

        assert!(collector.cancel());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(collector.values(), vec![0, 1]);
        assert!(!collector.is_ended());
    }
}
