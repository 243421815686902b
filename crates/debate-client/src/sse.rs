//! # SSE framing
//!
//! Turns a chunked HTTP body into [`SseFrame`]s:
//! - bytes are buffered until a blank line closes an event block
//! - `event:` names the frame (default `message`), `data:` lines are joined with `\n`
//! - comments (`:`), `id:` and `retry:` are skipped
//! - a chunk that completes no event yields a heartbeat frame, so idle
//!   detection sees keep-alives and slow partial frames as activity
//! - a trailing block without a closing blank line is still delivered at EOF

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

use debate_core::errors::ApiError;
use debate_core::stream::{EventStream, SseFrame};

/// Event name used when a block carries no `event:` field.
const DEFAULT_EVENT: &str = "message";

struct FrameState<S> {
    inner: Pin<Box<S>>,
    buffer: BytesMut,
    pending: VecDeque<SseFrame>,
    done: bool,
}

impl<S> FrameState<S> {
    /// Move every complete block into `pending`. Returns how many frames were queued.
    fn drain_complete(&mut self) -> usize {
        let before = self.pending.len();
        while let Some(pos) = find_block_end(&self.buffer) {
            let block = self.buffer.split_to(pos + 2);
            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block[..pos])) {
                self.pending.push_back(frame);
            }
        }
        self.pending.len() - before
    }

    fn drain_remaining(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let rest = self.buffer.split();
        if let Some(frame) = parse_block(&String::from_utf8_lossy(&rest)) {
            self.pending.push_back(frame);
        }
    }
}

/// Wrap a byte stream into a stream of SSE frames, preserving wire order.
///
/// A read error is yielded once as [`ApiError::StreamInterrupted`] and ends the stream.
pub fn frame_stream<S, E>(byte_stream: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = FrameState {
        inner: Box::pin(byte_stream),
        buffer: BytesMut::with_capacity(8192),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.pending.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    // CR only ever appears as part of a line ending.
                    st.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
                    if st.drain_complete() == 0 {
                        st.pending.push_back(SseFrame::heartbeat());
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "SSE stream read error");
                    st.done = true;
                    return Some((Err(ApiError::StreamInterrupted(e.to_string())), st));
                }
                None => {
                    st.done = true;
                    st.drain_remaining();
                }
            }
        }
    }))
}

fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {} // id, retry
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }

    Some(SseFrame {
        event: event
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data: data.join("\n"),
    })
}
