//! LAN transfer framing
//!
//! A transfer is a header `<filename>:<size>` followed by exactly `size` raw
//! bytes. There is no checksum and no length prefix on the header.
//!
//! Two header styles exist on the wire:
//!
//! - [`FrameStyle::Line`] terminates the header with `\n`. The reader keeps
//!   reading until it sees the terminator, so it does not matter how the OS
//!   splits or coalesces segments.
//! - [`FrameStyle::Legacy`] sends no terminator. The reader takes a single
//!   receive of up to [`MAX_HEADER_LEN`] bytes and parses `<name>:<digits>`
//!   out of it; anything after the digits is the start of the body. A body
//!   that begins with an ASCII digit is indistinguishable from the size, and
//!   a header split across segments is misread. Use it only to talk to peers
//!   that cannot send the terminator.

use crate::error::{Result, TransferError};
use std::io::{ErrorKind, Read, Write};

/// Separator between filename and size
pub const HEADER_DELIMITER: u8 = b':';

/// Terminator of a [`FrameStyle::Line`] header
pub const LINE_TERMINATOR: u8 = b'\n';

/// Largest header a receiver accepts
pub const MAX_HEADER_LEN: usize = 4096;

/// Body chunk size
pub const CHUNK_SIZE: usize = 4096;

/// How the header is delimited from the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStyle {
    /// Header ends with `\n`
    #[default]
    Line,
    /// No terminator; header parsed out of a single receive
    Legacy,
}

/// Decoded transfer header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// File name as sent by the peer
    pub filename: String,
    /// Declared body size in bytes
    pub size: u64,
}

/// Encode `<filename>:<size>`
pub fn encode_header(filename: &str, size: u64) -> Result<Vec<u8>> {
    validate_filename(filename)?;
    Ok(format!("{}:{}", filename, size).into_bytes())
}

/// Decode `<filename>:<size>`
pub fn decode_header(bytes: &[u8]) -> Result<(String, u64)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| TransferError::Protocol("header is not valid UTF-8".to_string()))?;

    let (filename, size) = text.rsplit_once(HEADER_DELIMITER as char).ok_or_else(|| {
        TransferError::Protocol(format!("header '{}' has no ':' delimiter", text))
    })?;

    if filename.is_empty() {
        return Err(TransferError::Protocol("header has an empty filename".to_string()));
    }

    let size = size
        .parse::<u64>()
        .map_err(|_| TransferError::Protocol(format!("invalid size '{}' in header", size)))?;

    Ok((filename.to_string(), size))
}

/// Write the header for `filename`/`size` in the given style
pub fn write_header<W: Write>(
    writer: &mut W,
    filename: &str,
    size: u64,
    style: FrameStyle,
) -> std::io::Result<()> {
    let mut bytes = encode_header(filename, size)
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e.to_string()))?;
    if style == FrameStyle::Line {
        bytes.push(LINE_TERMINATOR);
    }
    writer.write_all(&bytes)
}

/// Read a header off `reader`
///
/// Returns the header together with any body bytes that arrived in the
/// same receive.
pub fn read_header<R: Read>(reader: &mut R, style: FrameStyle) -> Result<(Header, Vec<u8>)> {
    match style {
        FrameStyle::Line => read_line_header(reader),
        FrameStyle::Legacy => read_legacy_header(reader),
    }
}

fn read_line_header<R: Read>(reader: &mut R) -> Result<(Header, Vec<u8>)> {
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        let n = read_retrying(reader, &mut chunk)?;
        if n == 0 {
            return Err(TransferError::Protocol(
                "connection closed before the header was complete".to_string(),
            ));
        }

        let scanned = buf.len();
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf[scanned..].iter().position(|&b| b == LINE_TERMINATOR) {
            let end = scanned + pos;
            if end > MAX_HEADER_LEN {
                break;
            }
            let (filename, size) = decode_header(&buf[..end])?;
            let leftover = buf[end + 1..].to_vec();
            return Ok((Header { filename, size }, leftover));
        }

        if buf.len() > MAX_HEADER_LEN {
            break;
        }
    }

    Err(TransferError::Protocol(format!(
        "header exceeds {} bytes",
        MAX_HEADER_LEN
    )))
}

fn read_legacy_header<R: Read>(reader: &mut R) -> Result<(Header, Vec<u8>)> {
    let mut chunk = vec![0u8; MAX_HEADER_LEN];
    let n = read_retrying(reader, &mut chunk)?;
    if n == 0 {
        return Err(TransferError::Protocol(
            "connection closed before a header arrived".to_string(),
        ));
    }
    let chunk = &chunk[..n];

    let delim = chunk
        .iter()
        .position(|&b| b == HEADER_DELIMITER)
        .ok_or_else(|| TransferError::Protocol("header has no ':' delimiter".to_string()))?;

    let digits = chunk[delim + 1..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return Err(TransferError::Protocol("header has no size".to_string()));
    }

    let end = delim + 1 + digits;
    let (filename, size) = decode_header(&chunk[..end])?;
    Ok((Header { filename, size }, chunk[end..].to_vec()))
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Protocol(format!("reading header: {}", e))),
        }
    }
}

/// Check that a filename can travel in a header
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(TransferError::Protocol("filename is empty".to_string()));
    }
    if filename.bytes().any(|b| b == HEADER_DELIMITER || b == LINE_TERMINATOR) {
        return Err(TransferError::Protocol(format!(
            "filename '{}' contains ':' or a newline",
            filename.escape_debug()
        )));
    }
    Ok(())
}
