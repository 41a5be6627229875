//! Server-Sent Events framing for the live push channel.
use bytes::Bytes;
use futures::{stream, Stream};
use log::*;
use tally_engine::broadcast::{PushMessage, Subscriber};

use crate::errors::ServerError;

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// `event: <name>\ndata: <json>\n\n`
pub fn sse_frame(msg: &PushMessage) -> Result<Bytes, ServerError> {
    let data = serde_json::to_string(msg)
        .map_err(|e| ServerError::Unspecified(format!("Could not serialize push message. {e}")))?;
    Ok(Bytes::from(format!("event: {}\ndata: {data}\n\n", msg.event_name())))
}

/// Turns a subscriber into an SSE body. The first frame is a `connected` event carrying the connection id, which the
/// client needs to manage its subscriptions. The stream ends once the connection has been removed from the registry.
pub fn event_stream(subscriber: Subscriber) -> impl Stream<Item = Result<Bytes, ServerError>> {
    let hello = PushMessage::Connected { connection_id: subscriber.id() };
    stream::unfold((Some(hello), subscriber), |(pending, mut sub)| async move {
        let msg = match pending {
            Some(msg) => msg,
            None => match sub.recv().await {
                Some(msg) => msg,
                None => {
                    debug!("📡️ Live stream for connection {} has ended", sub.id());
                    return None;
                },
            },
        };
        Some((sse_frame(&msg), (None, sub)))
    })
}
