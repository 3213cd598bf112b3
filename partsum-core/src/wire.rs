//! Low-level field codecs shared by the manifest and fingerprint formats.
//!
//! Binary fields: unsigned LEB128 varints, varint-length-prefixed strings,
//! single-byte booleans and 16-byte little-endian hashes. Text fields
//! (header line and the v2 body) are parsed from a `BufRead` so that decimal
//! numbers can stop at the first non-digit without consuming it.

use crate::error::{ChecksumError, Result};
use std::io::{BufRead, Read, Write};

/// Longest varint accepted for a u64.
const MAX_VARINT_LEN: usize = 10;

/// Literal prefix of every manifest and fingerprint header line.
pub const HEADER_PREFIX: &str = "checksums format version: ";

pub fn write_varint<W: Write + ?Sized>(w: &mut W, mut v: u64) -> Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut n = 0;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            buf[n] = byte;
            n += 1;
            break;
        }
        buf[n] = byte | 0x80;
        n += 1;
    }
    w.write_all(&buf[..n])?;
    Ok(())
}

pub fn read_varint<R: Read + ?Sized>(r: &mut R) -> Result<u64> {
    let mut v = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let b = read_u8(r)?;
        let bits = u64::from(b & 0x7F);
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(ChecksumError::malformed("varint overflows u64"));
        }
        v |= bits << (7 * i);
        if b & 0x80 == 0 {
            return Ok(v);
        }
    }
    Err(ChecksumError::malformed("varint longer than 10 bytes"))
}

fn read_u8<R: Read + ?Sized>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

pub fn write_bool<W: Write + ?Sized>(w: &mut W, v: bool) -> Result<()> {
    w.write_all(&[u8::from(v)])?;
    Ok(())
}

pub fn read_bool<R: Read + ?Sized>(r: &mut R) -> Result<bool> {
    Ok(read_u8(r)? != 0)
}

pub fn write_hash<W: Write + ?Sized>(w: &mut W, v: u128) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_hash<R: Read + ?Sized>(r: &mut R) -> Result<u128> {
    let mut b = [0u8; 16];
    r.read_exact(&mut b)?;
    Ok(u128::from_le_bytes(b))
}

pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str) -> Result<()> {
    write_varint(w, s.len() as u64)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Reads a varint-length-prefixed UTF-8 string of at most `max_len` bytes.
pub fn read_string<R: Read + ?Sized>(r: &mut R, max_len: usize) -> Result<String> {
    let len = read_varint(r)?;
    if len > max_len as u64 {
        return Err(ChecksumError::malformed(format!(
            "file name of {len} bytes exceeds limit of {max_len}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| ChecksumError::malformed("file name is not valid UTF-8"))
}

/// Consumes exactly `expected` or fails naming the token.
pub fn assert_str<R: BufRead + ?Sized>(r: &mut R, expected: &str) -> Result<()> {
    let mut buf = vec![0u8; expected.len()];
    r.read_exact(&mut buf).map_err(|_| {
        ChecksumError::malformed(format!("expected {:?} before end of stream", expected))
    })?;
    if buf != expected.as_bytes() {
        return Err(ChecksumError::malformed(format!(
            "expected {:?}, found {:?}",
            expected,
            String::from_utf8_lossy(&buf)
        )));
    }
    Ok(())
}

fn peek<R: BufRead + ?Sized>(r: &mut R) -> Result<Option<u8>> {
    Ok(r.fill_buf()?.first().copied())
}

/// Decimal unsigned integer; stops before the first non-digit.
pub fn read_text_u64<R: BufRead + ?Sized>(r: &mut R) -> Result<u64> {
    let mut v: u64 = 0;
    let mut digits = 0usize;
    while let Some(b) = peek(r)? {
        if !b.is_ascii_digit() {
            break;
        }
        v = v
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| ChecksumError::malformed("decimal number overflows u64"))?;
        digits += 1;
        r.consume(1);
    }
    if digits == 0 {
        return Err(ChecksumError::malformed("expected decimal number"));
    }
    Ok(v)
}

/// Text boolean: a single `0` or `1`.
pub fn read_text_bool<R: BufRead + ?Sized>(r: &mut R) -> Result<bool> {
    match peek(r)? {
        Some(b'0') => {
            r.consume(1);
            Ok(false)
        }
        Some(b'1') => {
            r.consume(1);
            Ok(true)
        }
        Some(other) => Err(ChecksumError::malformed(format!(
            "expected boolean 0 or 1, found {:?}",
            other as char
        ))),
        None => Err(ChecksumError::malformed("expected boolean before end of stream")),
    }
}

/// Text field running up to (not including) the next tab or newline.
pub fn read_text_string<R: BufRead + ?Sized>(r: &mut R, max_len: usize) -> Result<String> {
    let mut out = Vec::new();
    loop {
        let buf = r.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let stop = buf.iter().position(|&b| b == b'\t' || b == b'\n');
        let take = stop.unwrap_or(buf.len());
        out.extend_from_slice(&buf[..take]);
        r.consume(take);
        if out.len() > max_len {
            return Err(ChecksumError::malformed(format!(
                "file name exceeds limit of {max_len} bytes"
            )));
        }
        if stop.is_some() {
            break;
        }
    }
    String::from_utf8(out).map_err(|_| ChecksumError::malformed("file name is not valid UTF-8"))
}

pub fn write_header<W: Write + ?Sized>(w: &mut W, version: u64) -> Result<()> {
    writeln!(w, "{HEADER_PREFIX}{version}")?;
    Ok(())
}

/// Parses `checksums format version: <N>\n` and returns N.
pub fn read_header<R: BufRead + ?Sized>(r: &mut R) -> Result<u64> {
    assert_str(r, HEADER_PREFIX)?;
    let v = read_text_u64(r)?;
    assert_str(r, "\n")?;
    Ok(v)
}

/// True when the reader has nothing left.
pub fn at_eof<R: BufRead + ?Sized>(r: &mut R) -> Result<bool> {
    Ok(r.fill_buf()?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_boundaries() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v).unwrap();
            assert_eq!(read_varint(&mut &buf[..]).unwrap(), v);
        }
        let mut buf = Vec::new();
        write_varint(&mut buf, 300).unwrap();
        assert_eq!(buf, [0xAC, 0x02]);
    }

    #[test]
    fn varint_rejects_overlong() {
        let bad = [0xFFu8; 11];
        assert!(read_varint(&mut &bad[..]).is_err());
    }

    #[test]
    fn header_parse() {
        let mut r = &b"checksums format version: 42\nrest"[..];
        assert_eq!(read_header(&mut r).unwrap(), 42);
        assert_eq!(r, b"rest");
    }

    #[test]
    fn header_rejects_wrong_literal() {
        let mut r = &b"checksum format version: 4\n"[..];
        let err = read_header(&mut r).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MalformedStream);
    }

    #[test]
    fn text_string_stops_at_newline() {
        let mut r = &b"data.bin\n\tsize: 5"[..];
        assert_eq!(read_text_string(&mut r, 1024).unwrap(), "data.bin");
        assert_eq!(r, b"\n\tsize: 5");
    }

    #[test]
    fn decimal_requires_digit() {
        let mut r = &b"x"[..];
        assert!(read_text_u64(&mut r).is_err());
    }
}
