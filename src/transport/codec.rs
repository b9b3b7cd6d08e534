//! Wire codec
//!
//! A frame is one JSON-encoded `Record` terminated by `\n`. JSON never emits
//! a raw newline, so the delimiter cannot occur inside a frame. Frames longer
//! than the configured bound are rejected in both directions.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::broker::message::Record;
use crate::utils::CodecError;

pub const DEFAULT_MAX_FRAME_LEN: usize = 8192;

/// Serialize a record into a frame body (without the delimiter).
pub fn encode(record: &Record) -> Result<String, CodecError> {
    Ok(serde_json::to_string(record)?)
}

/// Like `encode`, but refuses frames the peer would reject.
pub fn encode_bounded(record: &Record, max_frame_len: usize) -> Result<String, CodecError> {
    let frame = encode(record)?;
    if frame.len() > max_frame_len {
        return Err(CodecError::FrameTooLong { max: max_frame_len });
    }
    Ok(frame)
}

pub fn decode(frame: &str) -> Result<Record, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

/// Delimiter framing plus record decoding for `FramedRead`, and raw frame
/// writing for `FramedWrite`.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    lines: LinesCodec,
    max_frame_len: usize,
}

impl RecordCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_len),
            max_frame_len,
        }
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>, CodecError> {
        loop {
            match self.lines.decode(src) {
                // tolerate blank keep-alive lines
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return decode(&line).map(Some),
                Ok(None) => return Ok(None),
                Err(e) => return Err(CodecError::from_lines(e, self.max_frame_len)),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Record>, CodecError> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return decode(&line).map(Some),
                Ok(None) => return Ok(None),
                Err(e) => return Err(CodecError::from_lines(e, self.max_frame_len)),
            }
        }
    }
}

impl Encoder<String> for RecordCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: String, dst: &mut BytesMut) -> Result<(), CodecError> {
        if frame.len() > self.max_frame_len {
            return Err(CodecError::FrameTooLong {
                max: self.max_frame_len,
            });
        }
        self.lines
            .encode(frame, dst)
            .map_err(|e| CodecError::from_lines(e, self.max_frame_len))
    }
}
