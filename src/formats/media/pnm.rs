//! Netpbm (PNM family): a two-byte magic `P1`..`P6` selecting ASCII or
//! binary PBM/PGM/PPM, followed by whitespace-separated ASCII header
//! tokens (width, height, and — for PGM/PPM — maxval), comments
//! beginning with `#` to end-of-line, then either ASCII sample text or
//! a fixed-size binary raster.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

pub struct Pnm;

impl Parser for Pnm {
    fn pretty_name(&self) -> &'static str {
        "pnm"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pbm", "pgm", "ppm", "pnm"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"P1", b"P2", b"P3", b"P4", b"P5", b"P6"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 2 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "pnm: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let magic = match cursor.read_vec(2) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if magic[0] != b'P' || !(b'1'..=b'6').contains(&magic[1]) {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "pnm: bad magic").into();
        }
        let kind = magic[1] - b'0';
        let binary = kind >= 4;
        let needs_maxval = kind != 1 && kind != 4;

        let mut reader = TokenReader::new(&mut cursor);
        let Some(width_tok) = reader.next_token() else {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "pnm: missing width token").into();
        };
        let Some(height_tok) = reader.next_token() else {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "pnm: missing height token").into();
        };
        let width: u64 = match std::str::from_utf8(&width_tok).ok().and_then(|s| s.parse().ok()) {
            Some(v) if v > 0 => v,
            _ => return CarveError::new(ctx.offset, ErrorKind::BadField, "pnm: bad width").into(),
        };
        let height: u64 = match std::str::from_utf8(&height_tok).ok().and_then(|s| s.parse().ok()) {
            Some(v) if v > 0 => v,
            _ => return CarveError::new(ctx.offset, ErrorKind::BadField, "pnm: bad height").into(),
        };
        let maxval: u64 = if needs_maxval {
            match reader.next_token().and_then(|tok| std::str::from_utf8(&tok).ok().map(str::to_string)).and_then(|s| s.parse().ok()) {
                Some(v) if v > 0 && v < 65536 => v,
                _ => return CarveError::new(ctx.offset, ErrorKind::BadField, "pnm: bad maxval").into(),
            }
        } else {
            1
        };

        let length = if binary {
            let header_end = match reader.position() {
                Ok(p) => p + 1, // single whitespace byte after the last token
                Err(e) => return e.into(),
            };
            let sample_bytes = if maxval > 255 { 2 } else { 1 };
            let channels = if kind == 6 { 3 } else { 1 };
            let raster_len = width * height * channels * sample_bytes;
            header_end - ctx.offset + raster_len
        } else {
            // ASCII variants have no fixed-size raster: their end is
            // only knowable by counting `width*height*channels` sample
            // tokens, which this crate does to find the true extent.
            let channels = if kind == 3 { 3 } else { 1 };
            let sample_count = width * height * channels;
            let mut count = 0u64;
            let mut end = match reader.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            while count < sample_count {
                match reader.next_token() {
                    Some(_) => {
                        count += 1;
                        end = match reader.position() {
                            Ok(p) => p,
                            Err(e) => return e.into(),
                        };
                    }
                    None => {
                        return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "pnm: truncated ASCII sample data").into();
                    }
                }
            }
            end - ctx.offset
        };

        if ctx.offset + length > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "pnm: declared extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, length, labels, "pnm", "pnm") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

/// Tokenizes whitespace-separated ASCII fields directly off a
/// [`Cursor`] one byte at a time (tokens themselves are short numeric
/// fields, so no buffering beyond the current token is needed).
struct TokenReader<'c, 'a> {
    cursor: &'c mut Cursor<'a>,
}

impl<'c, 'a> TokenReader<'c, 'a> {
    fn new(cursor: &'c mut Cursor<'a>) -> Self {
        TokenReader { cursor }
    }

    fn position(&mut self) -> Result<u64, CarveError> {
        self.cursor.position()
    }

    fn peek(&mut self) -> Option<u8> {
        let pos = self.cursor.position().ok()?;
        let b = self.cursor.read_u8().ok()?;
        self.cursor.seek_abs(pos).ok()?;
        Some(b)
    }

    fn next_token(&mut self) -> Option<Vec<u8>> {
        loop {
            while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
                self.cursor.read_u8().ok()?;
            }
            if self.peek() == Some(b'#') {
                while !matches!(self.peek(), Some(b'\n') | None) {
                    self.cursor.read_u8().ok()?;
                }
                continue;
            }
            break;
        }
        self.peek()?;
        let mut out = Vec::new();
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                break;
            }
            out.push(b);
            self.cursor.read_u8().ok()?;
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_pgm() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"P5\n2 2\n255\n");
        data.extend([10u8, 20, 30, 40]);
        data
    }

    #[test]
    fn accepts_minimal_binary_pgm() {
        let data = minimal_pgm();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Pnm.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_truncated_raster() {
        let mut data = minimal_pgm();
        data.truncate(data.len() - 2);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Pnm.parse(&mut ctx).is_success());
    }
}
