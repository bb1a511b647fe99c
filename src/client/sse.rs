//! Decoding of the relayed event stream.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::collections::VecDeque;

use crate::client::error::ClientError;
use crate::protocol::StreamEvent;
use crate::relay::framing::{LineBuffer, DATA_PREFIX};

/// Turns raw body fragments into [`StreamEvent`]s.
///
/// Records that are not valid JSON events are skipped with a warning. The
/// stream as a whole is never aborted because of one bad record.
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineBuffer,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        self.lines
            .push(fragment)
            .into_iter()
            .filter_map(|line| decode_line(&line))
            .collect()
    }
}

fn decode_line(line: &[u8]) -> Option<StreamEvent> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("Skipping non UTF-8 event record: {}", e);
            return None;
        }
    };

    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Skipping malformed event record: {}", e);
            None
        }
    }
}

/// Open response body of one turn.
pub struct TurnStream {
    body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    decoder: EventDecoder,
    ready: VecDeque<StreamEvent>,
}

impl TurnStream {
    pub fn new(body: BoxStream<'static, Result<Bytes, reqwest::Error>>) -> Self {
        Self {
            body,
            decoder: EventDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next decoded event. `None` once the server closed the stream.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, ClientError>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(Ok(event));
            }

            match self.body.next().await? {
                Ok(bytes) => self.ready.extend(self.decoder.push(&bytes)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
