// Chunked JSON streaming - newline-delimited message feed
use crate::application::messages::Message;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Wraps a stream of serializable items into an `application/x-ndjson` response.
pub fn chunked_json_stream<S, T>(stream: S) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize,
{
    let byte_stream = stream.map(|item| serialize_chunk(&item));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// One JSON document terminated by `\n`.
fn serialize_chunk<T: Serialize>(item: &T) -> Result<Bytes, std::io::Error> {
    let payload = serde_json::to_vec(item)?;
    let mut chunk = BytesMut::with_capacity(payload.len() + 1);
    chunk.put_slice(&payload);
    chunk.put_u8(b'\n');
    Ok(chunk.freeze())
}

/// Replays `history`, then follows the live feed until the sender goes away.
/// Entries dropped because the client fell behind are skipped.
pub fn feed_stream(
    history: Vec<Message>,
    mut rx: broadcast::Receiver<Message>,
) -> impl Stream<Item = Message> + Send + 'static {
    async_stream::stream! {
        for message in history {
            yield message;
        }
        loop {
            match rx.recv().await {
                Ok(message) => yield message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("message stream client lagged, {} entries skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
