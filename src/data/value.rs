//! Value Encoding
//!
//! Values either inline into the row (small integers) or are appended to a
//! value store as `LEB128 length ++ bytes`. Large values are DEFLATE
//! compressed when that makes them shorter.

use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::row::ValueRef;
use crate::error::{BuildError, Result};

/// Longest digit string that is inlined (fits well below 2^38)
const MAX_INLINE_DIGITS: usize = 9;

/// Parse a value that can be stored inline
///
/// Accepts 1 to 9 ASCII digits without a leading zero (a lone `0` is
/// fine), so the decimal rendering of the result reproduces the bytes.
pub fn inline_int(value: &[u8]) -> Option<i64> {
    if value.is_empty() || value.len() > MAX_INLINE_DIGITS {
        return None;
    }
    if value[0] == b'0' {
        return (value.len() == 1).then_some(0);
    }
    let mut n: i64 = 0;
    for &b in value {
        if !b.is_ascii_digit() {
            return None;
        }
        n = n * 10 + (b - b'0') as i64;
    }
    Some(n)
}

/// Render an inlined integer back into value bytes
pub fn inline_bytes(n: i64) -> Vec<u8> {
    n.to_string().into_bytes()
}

/// Value compressor
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    /// Values shorter than this are stored raw
    min_len: usize,
}

impl Compressor {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Compress a value; `None` if compression would not shrink it
    pub fn pack(&self, value: &[u8]) -> io::Result<Option<Vec<u8>>> {
        if value.len() < self.min_len {
            return Ok(None);
        }
        let mut encoder =
            DeflateEncoder::new(Vec::with_capacity(value.len() / 2), Compression::fast());
        encoder.write_all(value)?;
        let packed = encoder.finish()?;
        Ok((packed.len() < value.len()).then_some(packed))
    }

    /// Reverse [`pack`](Self::pack)
    pub fn unpack(packed: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(packed.len() * 2);
        DeflateDecoder::new(packed).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Append-only value store writer
///
/// Tracks its own length so offsets are known without seeking.
#[derive(Debug)]
pub struct ValueStore<W: Write> {
    out: W,
    len: u64,
    compressor: Compressor,
}

impl<W: Write> ValueStore<W> {
    pub fn new(out: W, compressor: Compressor) -> Self {
        Self {
            out,
            len: 0,
            compressor,
        }
    }

    /// Store a value and return how the row should reference it
    pub fn add(&mut self, value: &[u8]) -> Result<ValueRef> {
        if let Some(n) = inline_int(value) {
            return Ok(ValueRef::Inline(n));
        }
        let offset = self.len;
        if offset > ValueRef::MAX_OFFSET {
            return Err(BuildError::Io(io::Error::new(
                io::ErrorKind::Other,
                "value store exceeds addressable size",
            )));
        }
        let packed = self.compressor.pack(value)?;
        let compressed = packed.is_some();
        let bytes = packed.as_deref().unwrap_or(value);
        self.len += leb128::write::unsigned(&mut self.out, bytes.len() as u64)? as u64;
        self.out.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(ValueRef::Stored { offset, compressed })
    }

    /// Bytes written so far
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if nothing was stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flush and return the underlying writer
    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Read one stored entry at `offset` and undo compression
pub fn read_value<R: Read + Seek>(input: &mut R, offset: u64, compressed: bool) -> Result<Vec<u8>> {
    input.seek(SeekFrom::Start(offset))?;
    let len = read_unsigned(input)?;
    let mut bytes = vec![0u8; len as usize];
    input.read_exact(&mut bytes)?;
    if compressed {
        Ok(Compressor::unpack(&bytes)?)
    } else {
        Ok(bytes)
    }
}

/// Read a LEB128 number, mapping decoder errors onto build errors
pub fn read_unsigned<R: Read>(input: &mut R) -> Result<u64> {
    leb128::read::unsigned(input).map_err(|e| match e {
        leb128::read::Error::IoError(io) => BuildError::Io(io),
        leb128::read::Error::Overflow => BuildError::Corrupt("number overflows 64 bits".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_inline_int() {
        assert_eq!(inline_int(b"42"), Some(42));
        assert_eq!(inline_int(b"0"), Some(0));
        assert_eq!(inline_int(b"999999999"), Some(999_999_999));
        assert_eq!(inline_int(b"1000000000"), None);
        assert_eq!(inline_int(b"042"), None);
        assert_eq!(inline_int(b"-1"), None);
        assert_eq!(inline_int(b" 1"), None);
        assert_eq!(inline_int(b""), None);
        assert_eq!(inline_bytes(42), b"42");
    }

    #[test]
    fn test_inline_consumes_no_store_space() {
        let mut store = ValueStore::new(Vec::new(), Compressor::new(64));
        assert_eq!(store.add(b"42").unwrap(), ValueRef::Inline(42));
        assert!(store.is_empty());
    }

    #[test]
    fn test_short_values_stay_raw() {
        let mut store = ValueStore::new(Vec::new(), Compressor::new(64));
        let first = store.add(b"hello").unwrap();
        let second = store.add(b"world").unwrap();
        assert_eq!(first, ValueRef::Stored { offset: 0, compressed: false });
        assert_eq!(second, ValueRef::Stored { offset: 6, compressed: false });

        let bytes = store.into_inner().unwrap();
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_value(&mut cursor, 6, false).unwrap(), b"world");
    }

    #[test]
    fn test_large_value_round_trips_compressed() {
        let text: Vec<u8> = b"lorem ipsum dolor sit amet ".repeat(200);
        let mut store = ValueStore::new(Vec::new(), Compressor::new(64));
        let value = store.add(&text).unwrap();
        let ValueRef::Stored { offset, compressed } = value else {
            panic!("expected stored value, got {value:?}");
        };
        assert!(compressed);
        assert!(store.len() < text.len() as u64);

        let mut cursor = Cursor::new(store.into_inner().unwrap());
        assert_eq!(read_value(&mut cursor, offset, compressed).unwrap(), text);
    }

    #[test]
    fn test_incompressible_value_stays_raw() {
        // Pseudo-random bytes do not shrink under DEFLATE
        let mut state = 0x2545_f491u32;
        let noise: Vec<u8> = (0..256)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let compressor = Compressor::new(64);
        assert!(compressor.pack(&noise).unwrap().is_none());
    }
}
