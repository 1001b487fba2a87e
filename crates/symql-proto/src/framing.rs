//! Message framing utilities for transport layer.
//!
//! This module provides length-prefix framing for messages exchanged with a
//! backend engine over its stdin/stdout pipes. The format is simple: 4-byte
//! big-endian length prefix followed by the payload. A complete frame is the
//! end-of-reply marker.

use std::io::{Read, Write};

use bytes::{Buf, Bytes, BytesMut};

use crate::Error;

/// Maximum message size (64 MB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a payload with a length prefix.
///
/// Returns a new buffer containing `[length (4 bytes BE)][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::FrameTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode the length from a 4-byte header.
///
/// Returns the payload length as a usize.
pub fn decode_frame_length(header: &[u8; LENGTH_PREFIX_SIZE]) -> Result<usize, Error> {
    let len = u32::from_be_bytes(*header) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::FrameTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(len)
}

/// Write one frame to a stream and flush it.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), Error> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame from a stream.
///
/// Returns `Ok(None)` on a clean end of stream before a header; a stream
/// that ends inside a frame is an error.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, Error> {
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(Error::InvalidMessage(
                    "stream ended inside a frame header".to_string(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let len = decode_frame_length(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Incremental frame decoder for a byte stream.
///
/// Bytes are pushed as they arrive from a pipe; complete frames are popped
/// in order. A partial frame stays buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete payload, if any.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, Error> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let mut header = [0u8; LENGTH_PREFIX_SIZE];
        header.copy_from_slice(&self.buffer[..LENGTH_PREFIX_SIZE]);
        let len = decode_frame_length(&header)?;
        if self.buffer.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None);
        }
        self.buffer.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
