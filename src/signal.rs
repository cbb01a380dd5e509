//! Protocol signal types.
//!
//! The streaming protocol exchanges two kinds of messages:
//!
//! - [`Signal`]: flows downstream (producer to consumer). `Start` opens the
//!   handshake and carries a [`Talkback`]; `Data` carries one value; `End`
//!   carries an optional termination reason.
//! - [`Request`]: flows upstream through a [`Talkback`]. `Pull` asks for the
//!   next value; `Cancel` stops the stream.
//!
//! A pull-mode producer emits a value only in response to `Pull`; a push-mode
//! producer emits on its own schedule and ignores `Pull`.

use std::fmt;
use std::sync::Arc;

/// A control request sent upstream through a [`Talkback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Request the next value (ignored by push-mode producers).
    Pull,
    /// Stop the stream; no further signals are wanted.
    Cancel,
}

/// Handle for sending control requests upstream.
///
/// A `Talkback` is handed to a peer inside [`Signal::Start`] and is the only
/// way that peer can talk back to the sender. It can be cloned and sent to
/// other threads.
#[derive(Clone)]
pub struct Talkback {
    inner: Arc<dyn Fn(Request) + Send + Sync>,
}

impl Talkback {
    /// Create a talkback from a request handler.
    pub fn new(handler: impl Fn(Request) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    /// Create a talkback that ignores every request.
    ///
    /// Useful for producers that neither support pulling nor need to observe
    /// cancellation.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Send a request upstream.
    pub fn request(&self, request: Request) {
        (self.inner)(request);
    }

    /// Request the next value.
    pub fn pull(&self) {
        self.request(Request::Pull);
    }

    /// Stop the stream.
    pub fn cancel(&self) {
        self.request(Request::Cancel);
    }
}

impl fmt::Debug for Talkback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Talkback")
    }
}

/// Opaque reason attached to an error termination.
///
/// Operators never inspect the reason; it is forwarded verbatim to the
/// consumer. Normal completion carries no reason (`End(None)`).
#[derive(Debug, Clone)]
pub struct EndReason {
    message: Arc<str>,
}

impl EndReason {
    /// Create a termination reason from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into().into(),
        }
    }

    /// Get the reason message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&str> for EndReason {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for EndReason {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A message flowing downstream, from producer to consumer.
#[derive(Debug)]
pub enum Signal<T> {
    /// Handshake: carries the handle the receiver uses to talk back.
    Start(Talkback),
    /// One value.
    Data(T),
    /// Termination. `None` means normal completion; `Some` carries an
    /// opaque error reason.
    End(Option<EndReason>),
}

impl<T> Signal<T> {
    /// Check if this is a start signal.
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start(_))
    }

    /// Check if this is a data signal.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    /// Check if this is a termination signal.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End(_))
    }

    /// Take the carried value, if this is a data signal.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Data(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<T> for Signal<T> {
    fn from(value: T) -> Self {
        Self::Data(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_signal_predicates() {
        assert!(Signal::<u32>::Start(Talkback::noop()).is_start());
        assert!(Signal::Data(1).is_data());
        assert!(Signal::<u32>::End(None).is_end());
        assert!(!Signal::Data(1).is_end());
    }

    #[test]
    fn test_signal_into_data() {
        assert_eq!(Signal::Data(7).into_data(), Some(7));
        assert_eq!(Signal::<u32>::End(None).into_data(), None);
    }

    #[test]
    fn test_signal_from_value() {
        let signal: Signal<&str> = "hello".into();
        assert!(signal.is_data());
    }

    #[test]
    fn test_talkback_dispatch() {
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let talkback = {
            let seen = seen.clone();
            Talkback::new(move |request| seen.lock().unwrap().push(request))
        };

        talkback.pull();
        talkback.pull();
        talkback.cancel();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Request::Pull, Request::Pull, Request::Cancel]
        );
    }

    #[test]
    fn test_talkback_noop() {
        // Must not panic, must accept anything.
        let talkback = Talkback::noop();
        talkback.pull();
        talkback.cancel();
    }

    #[test]
    fn test_end_reason_display() {
        let reason = EndReason::new("connection reset");
        assert_eq!(reason.message(), "connection reset");
        assert_eq!(format!("{}", reason), "connection reset");

        let from_str: EndReason = "boom".into();
        assert_eq!(from_str.message(), "boom");
    }
}
