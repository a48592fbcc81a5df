//! Server-Sent Events relay for worker logs.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, BoxStream, StreamExt};
use shared::{LogBus, LogFrame};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ApiResult, OrInternal};

pub type LogEventStream = Sse<BoxStream<'static, Result<Event, Infallible>>>;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub const BACKTEST_GREETING: &str = "Connected to backtest log stream...";

/// One `data: {"log": ..., "timestamp": ...}` frame.
pub fn frame_event(message: impl Into<String>) -> Option<Event> {
    match Event::default().json_data(LogFrame::now(message)) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping log frame that failed to serialize: {}", e);
            None
        }
    }
}

/// Subscribes to `channel` and forwards every message as an SSE frame.
///
/// The subscription lives exactly as long as the response body; when the
/// client goes away axum drops the stream and the bus unsubscribes.
pub async fn relay(
    bus: &dyn LogBus,
    channel: String,
    greeting: Option<&str>,
) -> ApiResult<LogEventStream> {
    let messages = bus
        .subscribe(&channel)
        .await
        .or_internal("Failed to subscribe to log channel")?;
    debug!(channel = %channel, "Client attached to log stream");

    let greeting = stream::iter(greeting.map(str::to_string));
    let events = greeting
        .chain(messages)
        .filter_map(|message| async move { frame_event(message).map(Ok::<_, Infallible>) })
        .boxed();

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}
