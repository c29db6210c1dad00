//! Packet framing and primitive type encode/decode for the SFTP wire format.
//!
//! Every SFTP packet on the wire is `uint32 length | byte[length]`. The
//! first byte of the payload is the opcode; every opcode except `INIT` and
//! `VERSION` is followed by a `uint32` request id. This module only knows
//! about the primitives (`u8`/`u32`/`u64`/`string`/`handle`); attribute and
//! name-list encoding is version-specific and lives in [`crate::protocol`].
//!
//! Parsing is generic over `bytes::Buf` so the same functions read a
//! borrowed `&[u8]` cursor or an owned `Bytes` value — the dispatcher uses
//! `Bytes` so that a command handler's future does not borrow from the
//! packet buffer, keeping the per-opcode function-pointer table's lifetime
//! to just `&mut SftpSession`.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

/// Maximum single string/bytes field accepted from the wire. Guards against
/// a malicious length prefix forcing a multi-gigabyte allocation.
pub const MAX_WIRE_STRING: usize = 256 * 1024;

/// A growable response buffer with `send_begin`/`send_end` length-prefix
/// framing, mirroring how the reference implementation defers the length
/// field until the whole packet body is known.
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// Begin a new packet: reserves the 4-byte length prefix.
    pub fn begin() -> Self {
        let mut buf = BytesMut::new();
        buf.put_u32(0); // placeholder, patched in `end`
        Writer { buf }
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64(v);
        self
    }

    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.put_bytes(s.as_bytes());
        self
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
        self
    }

    /// Finish the packet: back-patch the length prefix and return the bytes
    /// ready to hand to the channel writer.
    pub fn end(mut self) -> Vec<u8> {
        let len = (self.buf.len() - 4) as u32;
        self.buf[0..4].copy_from_slice(&len.to_be_bytes());
        self.buf.to_vec()
    }
}

/// Read a `uint8` off the front of a request cursor.
pub fn get_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(Error::Protocol("truncated u8".into()));
    }
    Ok(buf.get_u8())
}

/// Read a `uint32` off the front of a request cursor.
pub fn get_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::Protocol("truncated u32".into()));
    }
    Ok(buf.get_u32())
}

/// Read a `uint64` off the front of a request cursor.
pub fn get_u64<B: Buf>(buf: &mut B) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::Protocol("truncated u64".into()));
    }
    Ok(buf.get_u64())
}

/// Read a length-prefixed byte string, bounded by [`MAX_WIRE_STRING`].
pub fn get_bytes<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    if buf.remaining() < 4 {
        return Err(Error::Protocol("truncated string length".into()));
    }
    let len = buf.get_u32() as usize;
    if len > MAX_WIRE_STRING {
        return Err(Error::Protocol(format!("string length {len} exceeds limit")));
    }
    if buf.remaining() < len {
        return Err(Error::Protocol("truncated string body".into()));
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Read a length-prefixed string, requiring valid UTF-8. Used for fields
/// the protocol defines as text (status messages, extension names); raw
/// filenames go through [`get_bytes`] and are only validated as UTF-8 at a
/// higher layer that can fall back gracefully.
pub fn get_string<B: Buf>(buf: &mut B) -> Result<String> {
    let bytes = get_bytes(buf)?;
    String::from_utf8(bytes).map_err(|e| Error::Protocol(format!("invalid UTF-8 string: {e}")))
}

/// Read a path field. Paths are wire-identical to strings in every version
/// this server implements; the indirection exists so a future version with
/// a distinct filename encoding only has to change this one function plus
/// the matching `put_path`.
pub fn get_path<B: Buf>(buf: &mut B) -> Result<String> {
    get_string(buf)
}

/// Read a handle field (opaque bytes, not required to be UTF-8).
pub fn get_handle<B: Buf>(buf: &mut B) -> Result<Vec<u8>> {
    get_bytes(buf)
}
