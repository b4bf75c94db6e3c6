//! Bounded random-access reader over a candidate region (§4.2).
//!
//! A [`Cursor`] never lets a parser read past the advertised filesize.
//! Every primitive read fails non-fatally (`ErrorKind::NotEnoughData`)
//! on short reads rather than panicking or silently zero-filling.

use crate::error::{CarveError, ErrorKind};
use std::io::{Read, Seek, SeekFrom};

/// The minimal trait a region handle needs to satisfy. Blanket-implemented
/// for anything that is already `Read + Seek`.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Fixed, ordered fallback chain for bounded string reads that are not
/// valid UTF-8. Kept as a single constant (§4.2, §9 "Global encoding
/// lists") rather than scattered per-call-site fallbacks.
pub const ENCODING_FALLBACK_CHAIN: &[&encoding_rs::Encoding] = &[
    encoding_rs::SHIFT_JIS,
    encoding_rs::EUC_JP,
    encoding_rs::EUC_KR,
    encoding_rs::WINDOWS_1252,
];

pub struct Cursor<'a> {
    region: &'a mut dyn ReadSeek,
    /// Absolute offset this cursor is anchored at (the start of the
    /// candidate region).
    base: u64,
    /// Absolute end-of-file boundary; reads/seeks may never cross it.
    filesize: u64,
}

impl<'a> Cursor<'a> {
    pub fn new(region: &'a mut dyn ReadSeek, base: u64, filesize: u64) -> CarveResult<Self> {
        let mut cursor = Cursor {
            region,
            base,
            filesize,
        };
        cursor.seek_abs(base)?;
        Ok(cursor)
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    /// Current absolute position.
    pub fn position(&mut self) -> CarveResult<u64> {
        self.region
            .stream_position()
            .map_err(|e| CarveError::io(self.base, e.to_string()))
    }

    /// How many bytes remain before `filesize` from the current cursor.
    pub fn remaining(&mut self) -> CarveResult<u64> {
        let pos = self.position()?;
        Ok(self.filesize.saturating_sub(pos))
    }

    /// Seeks to an absolute offset. Seeking outside `[base, filesize)` is
    /// a programming error per the specification, not a recoverable
    /// result — callers that compute an out-of-range offset have a bug.
    pub fn seek_abs(&mut self, absolute: u64) -> CarveResult<()> {
        debug_assert!(
            absolute >= self.base && absolute <= self.filesize,
            "seek outside region bounds"
        );
        self.region
            .seek(SeekFrom::Start(absolute))
            .map_err(|e| CarveError::io(absolute, e.to_string()))?;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> CarveResult<()> {
        let pos = self.position()?;
        self.seek_abs(pos + n)
    }

    /// Reads exactly `buf.len()` bytes, failing non-fatally if fewer are
    /// available before `filesize`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> CarveResult<()> {
        let pos = self.position()?;
        if pos.saturating_add(buf.len() as u64) > self.filesize {
            return Err(CarveError::new(
                pos,
                ErrorKind::NotEnoughData,
                format!("need {} bytes, only {} remain", buf.len(), self.filesize - pos),
            ));
        }
        self.region
            .read_exact(buf)
            .map_err(|e| CarveError::new(pos, ErrorKind::NotEnoughData, e.to_string()))
    }

    pub fn read_vec(&mut self, len: usize) -> CarveResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> CarveResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16_le(&mut self) -> CarveResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u16_be(&mut self) -> CarveResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32_le(&mut self) -> CarveResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u32_be(&mut self) -> CarveResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u64_le(&mut self) -> CarveResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_u64_be(&mut self) -> CarveResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads a fixed-size magic and compares it against `expected`,
    /// failing with `ErrorKind::BadMagic` on mismatch.
    pub fn expect_magic(&mut self, expected: &[u8]) -> CarveResult<()> {
        let pos = self.position()?;
        let found = self.read_vec(expected.len())?;
        if found != expected {
            return Err(CarveError::new(
                pos,
                ErrorKind::BadMagic,
                format!("expected magic {:02x?}, found {:02x?}", expected, found),
            ));
        }
        Ok(())
    }

    /// Reads up to `max_len` bytes and decodes them as text, trying
    /// UTF-8 first, then [`ENCODING_FALLBACK_CHAIN`] in order, finally
    /// falling back to a lossy escape of the raw bytes.
    pub fn read_text(&mut self, max_len: usize) -> CarveResult<String> {
        let bytes = self.read_vec(max_len)?;
        Ok(decode_text(&bytes))
    }
}

/// Applies the UTF-8-first, legacy-encodings-second, raw-bytes-last
/// decoding chain to an already-read byte slice.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    for encoding in ENCODING_FALLBACK_CHAIN {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return decoded.into_owned();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

type CarveResult<T> = Result<T, CarveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    #[test]
    fn reads_integers_with_explicit_endianness() {
        let data = vec![0x01, 0x02, 0x03, 0x04];
        let mut io = IoCursor::new(data);
        let mut cur = Cursor::new(&mut io, 0, 4).unwrap();
        assert_eq!(cur.read_u16_le().unwrap(), 0x0201);
        assert_eq!(cur.read_u16_be().unwrap(), 0x0304);
    }

    #[test]
    fn short_read_is_not_enough_data() {
        let data = vec![0x01];
        let mut io = IoCursor::new(data);
        let mut cur = Cursor::new(&mut io, 0, 1).unwrap();
        let err = cur.read_u32_le().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotEnoughData);
    }

    #[test]
    fn magic_mismatch_reports_bad_magic() {
        let data = vec![b'P', b'K', 0x03, 0x04];
        let mut io = IoCursor::new(data);
        let mut cur = Cursor::new(&mut io, 0, 4).unwrap();
        let err = cur.expect_magic(b"GIF8").unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadMagic);
    }

    #[test]
    fn decode_text_prefers_utf8() {
        assert_eq!(decode_text(b"hello"), "hello");
    }
}
