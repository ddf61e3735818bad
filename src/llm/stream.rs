//! Decoding of `text/event-stream` chat completions.
//!
//! The provider sends one `data: {json}` line per delta and a final
//! `data: [DONE]`. Lines are split on raw bytes so multi-byte characters that
//! straddle network chunks are reassembled before UTF-8 decoding.

use crate::llm::LlmError;
use crate::llm::models::ChatChunk;
use futures::{Stream, StreamExt, stream};
use std::fmt::Display;
use tracing::debug;

#[derive(Debug)]
enum SseLine {
    Chunk(Result<ChatChunk, LlmError>),
    Done,
    Skip,
}

fn parse_line(line: &[u8]) -> SseLine {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim(),
        Err(e) => {
            return SseLine::Chunk(Err(LlmError::ResponseError(format!(
                "Invalid UTF-8 in event stream: {}",
                e
            ))));
        }
    };

    // Blank separators, comments (": keep-alive") and non-data fields
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseLine::Done;
    }

    SseLine::Chunk(serde_json::from_str::<ChatChunk>(data).map_err(|e| {
        LlmError::ResponseError(format!("Failed to parse stream chunk: {} - Chunk was: {}", e, data))
    }))
}

struct Decoder<S> {
    bytes: S,
    buffer: Vec<u8>,
    finished: bool,
}

/// Turns a byte stream into the sequence of chunks it carries.
pub fn sse_chunks<S, B, E>(bytes: S) -> impl Stream<Item = Result<ChatChunk, LlmError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let decoder = Decoder {
        bytes,
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        loop {
            if decoder.finished {
                return None;
            }

            if let Some(pos) = decoder.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = decoder.buffer.drain(..=pos).collect();
                match parse_line(&line) {
                    SseLine::Chunk(chunk) => return Some((chunk, decoder)),
                    SseLine::Done => {
                        debug!("Event stream finished");
                        return None;
                    }
                    SseLine::Skip => continue,
                }
            }

            match decoder.bytes.next().await {
                Some(Ok(bytes)) => decoder.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    decoder.finished = true;
                    return Some((Err(LlmError::ConnectionError(e.to_string())), decoder));
                }
                None => {
                    // A final event without a trailing newline
                    decoder.finished = true;
                    let rest = std::mem::take(&mut decoder.buffer);
                    return match parse_line(&rest) {
                        SseLine::Chunk(chunk) => Some((chunk, decoder)),
                        SseLine::Done | SseLine::Skip => None,
                    };
                }
            }
        }
    })
}
