//! Length-prefixed JSON framing
//!
//! ```text
//! +-------------------+---------------------------+
//! |  Length (u32 BE)  |  UTF-8 JSON envelope body |
//! |      4 bytes      |       Length bytes        |
//! +-------------------+---------------------------+
//! ```
//!
//! A peer that closes the socket before any header byte arrives ends the
//! session cleanly. Closing anywhere inside a header or body is a
//! `Connection` error.

use crate::error::{OverlayError, Result};
use crate::protocol::message::{Envelope, MessageType};
use std::io::{ErrorKind, Read, Write};

/// Length header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Largest body a peer may announce
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Bodies are buffered in steps of this size as bytes actually arrive
const READ_CHUNK: usize = 64 * 1024;

/// Serialize an envelope to its JSON body
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    serde_json::to_vec(envelope)
        .map_err(|e| OverlayError::Serialization(format!("Failed to encode envelope: {e}")))
}

/// Parse a JSON body, rejecting unknown message types
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| OverlayError::MalformedMessage(format!("Invalid envelope: {e}")))?;
    if envelope.kind == MessageType::Unknown {
        return Err(OverlayError::MalformedMessage(
            "Unrecognised message type".to_string(),
        ));
    }
    Ok(envelope)
}

/// Prefix a body with its 4-byte big-endian length
pub fn frame(body: &[u8]) -> Result<Vec<u8>> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(OverlayError::Serialization(format!(
            "Frame of {} bytes exceeds {MAX_FRAME_SIZE}",
            body.len()
        )));
    }
    let mut framed = Vec::with_capacity(HEADER_SIZE + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(body);
    Ok(framed)
}

pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    let framed = frame(body)?;
    writer
        .write_all(&framed)
        .map_err(|e| OverlayError::Network(format!("Failed to send frame: {e}")))?;
    writer
        .flush()
        .map_err(|e| OverlayError::Network(format!("Failed to flush frame: {e}")))
}

/// Read one frame body, or `None` when the peer closed between frames
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE];
    if !read_exactly(reader, &mut header, true)? {
        return Ok(None);
    }

    let size = u32::from_be_bytes(header) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(OverlayError::Connection(format!(
            "Announced frame of {size} bytes exceeds {MAX_FRAME_SIZE}"
        )));
    }

    let mut body = Vec::with_capacity(size.min(READ_CHUNK));
    while body.len() < size {
        let start = body.len();
        let end = size.min(start + READ_CHUNK);
        body.resize(end, 0);
        read_exactly(reader, &mut body[start..end], false)?;
    }
    Ok(Some(body))
}

pub fn send_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let body = encode(envelope)?;
    write_frame(writer, &body)
}

/// Read and decode the next envelope; `Ok(None)` on clean end of session
pub fn receive_envelope<R: Read>(reader: &mut R) -> Result<Option<Envelope>> {
    match read_frame(reader)? {
        Some(body) => decode(&body).map(Some),
        None => Ok(None),
    }
}

/// Fill `buf` completely. Returns `Ok(false)` only when `eof_ok` is set
/// and the stream ended before the first byte.
fn read_exactly<R: Read>(reader: &mut R, buf: &mut [u8], eof_ok: bool) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if eof_ok && filled == 0 {
                    return Ok(false);
                }
                return Err(OverlayError::Connection(format!(
                    "Connection closed after {filled} of {} bytes",
                    buf.len()
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e)
                if eof_ok
                    && filled == 0
                    && matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                    ) =>
            {
                return Ok(false);
            }
            Err(e) => {
                return Err(OverlayError::Connection(format!(
                    "Read failed after {filled} of {} bytes: {e}",
                    buf.len()
                )))
            }
        }
    }
    Ok(true)
}
