//! Packet framing over a byte stream.
//!
//! A [`PacketChannel`] turns logical messages into length-prefixed,
//! sequence-numbered frames and back. Messages of `MAX_PACKET_SIZE` bytes or
//! more are split into full frames followed by a shorter one; when the last
//! full frame ends the message exactly, an empty frame terminates it.

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};

use mywire_core::error::ProtocolError;
use mywire_core::{Error, Result, UsageErrorKind};

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// Default limit on a single logical message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Framed message transport over any blocking `Read + Write` stream.
pub struct PacketChannel<S> {
    stream: S,
    /// Sequence id of the next frame, in either direction
    sequence: u8,
    /// Largest logical message accepted in either direction
    max_message_size: usize,
    /// Largest frame payload; always MAX_PACKET_SIZE outside tests
    frame_size: usize,
}

impl<S> std::fmt::Debug for PacketChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketChannel")
            .field("sequence", &self.sequence)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}

impl<S: Read + Write> PacketChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sequence: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            frame_size: MAX_PACKET_SIZE,
        }
    }

    /// Shrink the per-frame payload limit so splitting can be exercised
    /// without 16 MiB buffers.
    #[cfg(test)]
    pub(crate) fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size.clamp(1, MAX_PACKET_SIZE);
        self
    }

    /// Start a new command: the next frame written carries sequence id 0.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Set the largest logical message this channel will send or accept.
    ///
    /// Frames are still split at `MAX_PACKET_SIZE`; this bounds the total.
    pub fn set_max_message_size(&mut self, size: usize) {
        self.max_message_size = size.max(1);
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Write one logical message.
    ///
    /// Oversized messages fail with `PacketTooLarge` before any byte reaches
    /// the stream, so framing stays intact.
    #[allow(clippy::result_large_err)]
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_message_size {
            return Err(Error::usage(
                UsageErrorKind::PacketTooLarge,
                format!(
                    "message of {} bytes exceeds max packet size {}",
                    payload.len(),
                    self.max_message_size
                ),
            ));
        }

        let mut rest = payload;
        loop {
            let chunk_len = rest.len().min(self.frame_size);
            let (chunk, tail) = rest.split_at(chunk_len);
            let header = PacketHeader {
                payload_length: chunk_len as u32,
                sequence_id: self.sequence,
            };
            tracing::trace!(len = chunk_len, seq = self.sequence, "write frame");
            self.stream
                .write_all(&header.to_bytes())
                .and_then(|()| self.stream.write_all(chunk))
                .map_err(|e| io_error("failed to write packet", e))?;
            self.sequence = self.sequence.wrapping_add(1);
            rest = tail;
            if chunk_len < self.frame_size {
                break;
            }
        }

        self.stream
            .flush()
            .map_err(|e| io_error("failed to flush stream", e))
    }

    /// Read one logical message, joining continuation frames.
    #[allow(clippy::result_large_err)]
    pub fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header_buf = [0u8; PacketHeader::SIZE];
            self.stream
                .read_exact(&mut header_buf)
                .map_err(|e| io_error("failed to read packet header", e))?;
            let header = PacketHeader::from_bytes(&header_buf);
            let len = header.payload_length as usize;
            tracing::trace!(len, seq = header.sequence_id, "read frame");

            if header.sequence_id != self.sequence {
                return Err(Error::Protocol(ProtocolError {
                    message: format!(
                        "packet sequence mismatch: expected {}, got {}",
                        self.sequence, header.sequence_id
                    ),
                    raw_data: Some(header_buf.to_vec()),
                    source: None,
                }));
            }
            self.sequence = self.sequence.wrapping_add(1);

            if payload.len() + len > self.max_message_size {
                return Err(Error::protocol(format!(
                    "incoming message exceeds max packet size {}",
                    self.max_message_size
                )));
            }

            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream
                .read_exact(&mut payload[start..])
                .map_err(|e| io_error("failed to read packet payload", e))?;

            if len < self.frame_size {
                return Ok(payload);
            }
        }
    }
}

fn io_error(context: &str, err: io::Error) -> Error {
    Error::Protocol(ProtocolError {
        message: format!("{}: {}", context, err),
        raw_data: None,
        source: Some(Box::new(err)),
    })
}
