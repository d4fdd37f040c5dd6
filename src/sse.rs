//! Incremental decoder for the conversation push stream.
//!
//! The stream is line-oriented SSE: each event carries a `data:` field,
//! events are separated by a blank line, and a reserved payload value (the
//! terminator token) signals completion. The decoder keeps a persistent
//! text buffer and only acts on complete frames, so a terminator split
//! across chunks is never matched against a partial line.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ClientError;

/// One decoded event, paired with whether the stream is finished.
///
/// `payload` is `None` on the terminator event; the synthetic terminal
/// event emitted when the source ends without a terminator carries the
/// last payload seen, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent<T> {
    pub payload: Option<T>,
    pub done: bool,
}

/// Stream adapter turning a raw byte stream into typed [`StreamEvent`]s.
///
/// Guarantees exactly one terminal event (`done == true`) per stream and
/// strict arrival order. Frames whose payload fails to parse as `T` are
/// dropped, not fatal: the upstream emits heartbeat and partial frames and
/// treating them as errors would kill healthy streams. Drops are logged at
/// `warn` so the rate stays observable.
pub struct EventStream<S, T> {
    inner: S,
    // Kept as raw bytes so a multi-byte character split across chunks is
    // only decoded once its frame is complete.
    buffer: Vec<u8>,
    terminator: String,
    last: Option<T>,
    source_done: bool,
    finished: bool,
}

impl<S, T> EventStream<S, T> {
    pub fn new(inner: S, terminator: impl Into<String>) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            terminator: terminator.into(),
            last: None,
            source_done: false,
            finished: false,
        }
    }
}

/// Extract the next complete frame (up to a blank line) from the buffer,
/// advancing past it. Returns `None` until a full frame has arrived.
fn next_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|pair| pair == b"\n\n")?;
    let frame = buffer[..end].to_vec();
    buffer.drain(..end + 2);
    Some(frame)
}

/// Collect the payload of a frame from its `data:` lines, joined with
/// newlines per the SSE event-assembly rules. Non-data lines (comments,
/// other fields) are ignored.
fn frame_data(frame: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(rest);
                }
                None => data = Some(rest.to_string()),
            }
        }
    }
    data
}

impl<S, E, T> Stream for EventStream<S, T>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error,
    T: DeserializeOwned + Clone + Unpin,
{
    type Item = Result<StreamEvent<T>, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            // Drain complete frames before asking the source for more.
            let frame = match next_frame(&mut this.buffer) {
                Some(frame) => Some(frame),
                None if this.source_done && !this.buffer.is_empty() => {
                    // The source is closed, so the remainder is as complete
                    // as it will ever get; treat it as a final frame.
                    Some(std::mem::take(&mut this.buffer))
                }
                None => None,
            };

            if let Some(frame) = frame {
                let frame = String::from_utf8_lossy(&frame);
                let Some(data) = frame_data(&frame) else {
                    continue;
                };
                if data == this.terminator {
                    this.finished = true;
                    return Poll::Ready(Some(Ok(StreamEvent {
                        payload: None,
                        done: true,
                    })));
                }
                match serde_json::from_str::<T>(&data) {
                    Ok(payload) => {
                        this.last = Some(payload.clone());
                        return Poll::Ready(Some(Ok(StreamEvent {
                            payload: Some(payload),
                            done: false,
                        })));
                    }
                    Err(err) => {
                        warn!(error = %err, "skipping malformed stream frame");
                        continue;
                    }
                }
            }

            if this.source_done {
                // Exhausted without a terminator: emit the one synthetic
                // terminal event so callers always observe completion.
                this.finished = true;
                return Poll::Ready(Some(Ok(StreamEvent {
                    payload: this.last.take(),
                    done: true,
                })));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    // Raw CR only shows up in line endings (0x0D is never
                    // part of a multi-byte sequence, and inside JSON it
                    // would be escaped), so dropping it here keeps the
                    // frame scan a plain b"\n\n" search.
                    this.buffer.extend(bytes.iter().filter(|&&b| b != b'\r'));
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(ClientError::Unknown(Some(err.to_string())))));
                }
                Poll::Ready(None) => {
                    this.source_done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
