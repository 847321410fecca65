//! Stream frame decoding
//!
//! Upstream providers stream bytes that are only loosely aligned with their
//! protocol units. [`FrameDecoder`] turns those bytes into delimiter-separated
//! text frames, holding back any UTF-8 code point or delimiter that is split
//! across two reads. [`decode_stream`] wraps the decoder around an async byte
//! stream.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::native::streaming::StreamError;

/// Raw upstream body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Lazy single-pass sequence of decoded frames
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

/// Delimiter used when none is given
pub const DEFAULT_DELIMITER: &str = "\n\n";

/// Maximum frame length written to logs
const LOG_FRAME_LIMIT: usize = 500;

/// Incremental, UTF-8 safe frame splitter.
///
/// # Example
/// ```
/// use conduit::streaming::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new("\n\n");
///
/// // The second frame is still incomplete
/// let frames = decoder.feed(b"data: {\"a\":1}\n\nda");
/// assert_eq!(frames, vec!["data: {\"a\":1}"]);
///
/// let frames = decoder.feed(b"ta: {\"b\":2}\n\n");
/// assert_eq!(frames, vec!["data: {\"b\":2}"]);
/// assert_eq!(decoder.finish(), None);
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    delimiter: String,
    /// Decoded text not yet terminated by a delimiter
    buffer: String,
    /// Bytes of an incomplete trailing code point
    pending: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder splitting on `delimiter` (empty means `"\n\n"`)
    pub fn new(delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        Self {
            delimiter: if delimiter.is_empty() {
                DEFAULT_DELIMITER.to_string()
            } else {
                delimiter
            },
            buffer: String::new(),
            pending: Vec::new(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Feed one read and return every frame it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.decode(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find(self.delimiter.as_str()) {
            let frame: String = self.buffer.drain(..pos).collect();
            self.buffer.drain(..self.delimiter.len());
            if !is_blank(&frame) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush the decoder at end of stream
    ///
    /// A dangling partial code point is replaced with U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push_str(&tail);
            self.pending.clear();
        }

        let frame = std::mem::take(&mut self.buffer);
        (!is_blank(&frame)).then_some(frame)
    }

    /// Whether undelivered data is buffered
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty() || !self.pending.is_empty()
    }

    fn decode(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        // Invalid sequence in the middle of the input
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Incomplete code point at the end; wait for more bytes
                        None => {
                            self.pending.drain(..valid_end);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn is_blank(frame: &str) -> bool {
    frame.trim().is_empty()
}

/// Decode a byte stream into frames
pub fn decode_stream<S>(bytes: S, delimiter: &str) -> FrameStream
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
{
    decode_stream_filtered(bytes, delimiter, |_: &str| true)
}

/// Decode a byte stream into frames, dropping frames `keep` rejects
///
/// A read error is yielded once and ends the stream. Dropping the returned
/// stream drops `bytes`, which stops the upstream read.
pub fn decode_stream_filtered<S, F>(bytes: S, delimiter: &str, keep: F) -> FrameStream
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    F: Fn(&str) -> bool + Send + 'static,
{
    let mut decoder = FrameDecoder::new(delimiter);

    Box::pin(async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut failed = false;

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in decoder.feed(&chunk) {
                        if keep(&frame) {
                            yield Ok(frame);
                        }
                    }
                }
                Err(e) => {
                    failed = true;
                    yield Err(e);
                    break;
                }
            }
        }

        if !failed {
            if let Some(frame) = decoder.finish() {
                if keep(&frame) {
                    yield Ok(frame);
                }
            }
        }
    })
}

/// One SSE message split into its `event:` and `data:` fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Whether the data is the `[DONE]` sentinel
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Parse a frame into its SSE fields
///
/// Multiple `data:` lines are joined with `\n`. A frame without any `data:`
/// line (plain JSON-lines protocols) is returned whole as data. Comment lines
/// starting with `:` are ignored.
pub fn parse_sse_frame(frame: &str) -> SseFrame {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    let mut saw_field = false;

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
            saw_field = true;
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
            saw_field = true;
        } else if line.starts_with(':') || line.starts_with("id:") || line.starts_with("retry:") {
            saw_field = true;
        }
    }

    if !saw_field {
        return SseFrame {
            event: None,
            data: frame.trim().to_string(),
        };
    }

    SseFrame {
        event,
        data: data.join("\n"),
    }
}

/// Whether a frame carries the `[DONE]` sentinel
pub fn is_done(frame: &str) -> bool {
    parse_sse_frame(frame).is_done()
}

/// Whether a frame is only SSE comments (heartbeats)
pub fn is_comment(frame: &str) -> bool {
    frame
        .lines()
        .all(|line| line.is_empty() || line.starts_with(':'))
}

/// Truncate a frame for logging without splitting a code point
pub fn truncate_for_log(frame: &str) -> &str {
    if frame.len() <= LOG_FRAME_LIMIT {
        return frame;
    }
    let mut end = LOG_FRAME_LIMIT;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    &frame[..end]
}
