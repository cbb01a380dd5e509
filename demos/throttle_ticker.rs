//! Demo: throttle a fast push-mode ticker.
//!
//! A ticker emits one value every 100ms; the throttle forwards at most one
//! value per 250ms window and drops the rest. Run with:
//!
//! ```sh
//! cargo run --example throttle_ticker
//! ```

use std::time::Duration;
use trickle::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let fast = TickerSource::from_millis(100, (0..10).collect::<Vec<u32>>());
    let throttled = Throttle::from_millis(250).apply(fast);

    let sink = SinkHandle::new(|signal: Signal<u32>| match signal {
        Signal::Start(_) => tracing::info!("stream started"),
        Signal::Data(value) => tracing::info!(value, "received"),
        Signal::End(reason) => tracing::info!(?reason, "stream ended"),
    });
    throttled.attach(sink);

    tokio::time::sleep(Duration::from_millis(1500)).await;
}
