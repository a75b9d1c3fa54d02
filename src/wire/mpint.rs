//! Primitive readers/writers for the length-prefixed encodings used
//! throughout the agent wire protocol: 32-bit big-endian integers,
//! length-prefixed byte strings, and SSH `mpint`s.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::error::{AgentError, Result};

fn protocol_err(msg: impl Into<String>) -> AgentError {
    AgentError::Protocol(msg.into())
}

/// Read a big-endian `u32` length prefix followed by that many bytes.
pub fn read_string(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = cur
        .read_u32::<BigEndian>()
        .map_err(|_| protocol_err("truncated length prefix"))? as usize;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)
        .map_err(|_| protocol_err("truncated string"))?;
    Ok(buf)
}

/// Read a length-prefixed string and require it to be valid UTF-8.
pub fn read_utf8(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let bytes = read_string(cur)?;
    String::from_utf8(bytes).map_err(|_| protocol_err("string is not valid UTF-8"))
}

/// Read a single byte.
pub fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8> {
    cur.read_u8().map_err(|_| protocol_err("truncated byte"))
}

/// Read a big-endian `u32`.
pub fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32> {
    cur.read_u32::<BigEndian>()
        .map_err(|_| protocol_err("truncated u32"))
}

/// Read an SSH boolean (one byte, any nonzero value is true).
pub fn read_bool(cur: &mut Cursor<&[u8]>) -> Result<bool> {
    Ok(read_u8(cur)? != 0)
}

/// Read an `mpint`: a length-prefixed string interpreted as an unsigned
/// big-endian integer. A leading zero byte used only to keep the value
/// non-negative is stripped; callers that need the raw two's-complement
/// encoding should use [`read_string`] instead.
pub fn read_mpint(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let raw = read_string(cur)?;
    let trimmed = match raw.first() {
        Some(0) if raw.len() > 1 => &raw[1..],
        _ => &raw[..],
    };
    Ok(trimmed.to_vec())
}

/// Write a big-endian `u32` length prefix followed by `bytes`.
pub fn write_string(out: &mut Vec<u8>, bytes: &[u8]) -> io::Result<()> {
    out.write_u32::<BigEndian>(bytes.len() as u32)?;
    out.write_all(bytes)
}

/// Write a length-prefixed UTF-8 string.
pub fn write_utf8(out: &mut Vec<u8>, s: &str) -> io::Result<()> {
    write_string(out, s.as_bytes())
}

/// Write a big-endian `u32`.
pub fn write_u32(out: &mut Vec<u8>, v: u32) -> io::Result<()> {
    out.write_u32::<BigEndian>(v)
}

/// Write a single byte.
pub fn write_u8(out: &mut Vec<u8>, v: u8) -> io::Result<()> {
    out.write_u8(v)
}

/// Encode `magnitude` (an unsigned big-endian byte string, leading zeros
/// already stripped) as an SSH `mpint`: prefix a `0x00` byte if the high
/// bit of the first byte would otherwise be read as a sign bit.
pub fn write_mpint(out: &mut Vec<u8>, magnitude: &[u8]) -> io::Result<()> {
    let trimmed = {
        let mut start = 0;
        while start + 1 < magnitude.len() && magnitude[start] == 0 {
            start += 1;
        }
        &magnitude[start..]
    };
    if trimmed.is_empty() {
        return write_string(out, &[0]);
    }
    if trimmed[0] & 0x80 != 0 {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        write_string(out, &padded)
    } else {
        write_string(out, trimmed)
    }
}
