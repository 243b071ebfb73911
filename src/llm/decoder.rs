//! Reassembles a chunked response body into text lines.

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 decoder and newline splitter.
///
/// Multi-byte characters split across chunk boundaries are held back until
/// the rest of their bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending_bytes: Vec<u8>,
    leftover: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(chunk);
        self.decode_pending();

        let mut lines = Vec::new();
        while let Some(pos) = self.leftover.find('\n') {
            lines.push(self.leftover[..pos].to_string());
            self.leftover.drain(..=pos);
        }
        lines
    }

    /// End of stream: flush whatever is left as a final line.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            self.pending_bytes.clear();
            self.leftover.push(REPLACEMENT);
        }
        if self.leftover.is_empty() {
            None
        } else {
            Some(self.leftover)
        }
    }

    fn decode_pending(&mut self) {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        let mut start = 0;
        loop {
            match std::str::from_utf8(&bytes[start..]) {
                Ok(valid) => {
                    self.leftover.push_str(valid);
                    start = bytes.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    self.leftover
                        .push_str(std::str::from_utf8(&bytes[start..valid_end]).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            self.leftover.push(REPLACEMENT);
                            start = valid_end + bad;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        bytes.drain(..start);
        self.pending_bytes = bytes;
    }
}

struct LineState<S> {
    chunks: S,
    decoder: Option<LineDecoder>,
    ready: VecDeque<String>,
}

/// Turn a stream of byte chunks into a lazy stream of lines.
///
/// A chunk error is passed through and ends the stream.
pub fn decode_lines<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = LineState {
        chunks,
        decoder: Some(LineDecoder::new()),
        ready: VecDeque::new(),
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            let decoder = state.decoder.as_mut()?;
            match state.chunks.next().await {
                Some(Ok(chunk)) => state.ready.extend(decoder.push(chunk.as_ref())),
                Some(Err(err)) => {
                    state.decoder = None;
                    return Some((Err(err), state));
                }
                None => {
                    let tail = state.decoder.take().and_then(LineDecoder::finish);
                    state.ready.extend(tail);
                }
            }
        }
    })
}
