//! Adobe SWF: a 3-byte signature selecting the body's compression —
//! `FWS` uncompressed, `CWS` zlib, `ZWS` LZMA — followed by a version
//! byte and a little-endian total file length covering the signature
//! itself.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::decompress::{self, LzmaAloneDecoder, StreamDecoder, ZlibDecoder};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

pub struct Swf;

impl Parser for Swf {
    fn pretty_name(&self) -> &'static str {
        "swf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["swf"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"FWS", b"CWS", b"ZWS"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 8 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "swf: short header").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        macro_rules! try_read {
            ($e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                }
            };
        }
        let kind = try_read!(cursor.read_vec(3));
        let _version = try_read!(cursor.read_u8());
        let file_length = try_read!(cursor.read_u32_le()) as u64;
        drop(cursor);

        if file_length < 8 {
            return CarveError::new(base + 4, ErrorKind::BadField, "swf: implausible total length").into();
        }

        let length = match kind.as_slice() {
            b"FWS" => {
                if base + file_length > filesize {
                    return CarveError::new(base, ErrorKind::BadOffset, "swf: declared length exceeds region").into();
                }
                file_length
            }
            b"CWS" => {
                let mut body_cursor = match Cursor::new(ctx.region, base + 8, filesize) {
                    Ok(c) => c,
                    Err(e) => return e.into(),
                };
                let body = match body_cursor.read_vec((filesize - base - 8) as usize) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
                drop(body_cursor);
                let (_decoded, consumed) = match decompress::decode_all(ZlibDecoder::default(), &body) {
                    Ok(ok) => ok,
                    Err(e) => return CarveError::new(base + 8, ErrorKind::BadStructure, e.reason).into(),
                };
                8 + consumed as u64
            }
            b"ZWS" => {
                let mut body_cursor = match Cursor::new(ctx.region, base + 12, filesize) {
                    Ok(c) => c,
                    Err(e) => return e.into(),
                };
                let body = match body_cursor.read_vec((filesize - base - 12) as usize) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
                drop(body_cursor);
                let mut decoder = LzmaAloneDecoder::default();
                let (_decoded, consumed) = match decoder.feed(&body).and_then(|(mut out, used)| {
                    out.extend(decoder.finish()?);
                    Ok((out, used))
                }) {
                    Ok(ok) => ok,
                    Err(e) => return CarveError::new(base + 12, ErrorKind::BadStructure, e.reason).into(),
                };
                12 + consumed as u64
            }
            _ => return CarveError::new(base, ErrorKind::BadMagic, "swf: bad signature").into(),
        };

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS).add(well_known::VIDEO);
        match finish_region(ctx, length, labels, "swf", "swf") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_swf() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"FWS");
        data.push(6);
        data.extend(20u32.to_le_bytes());
        data.extend([0u8; 12]);
        data
    }

    #[test]
    fn accepts_minimal_uncompressed_swf() {
        let data = minimal_swf();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Swf.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_implausible_length_field() {
        let mut data = minimal_swf();
        data[4..8].copy_from_slice(&0u32.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Swf.parse(&mut ctx).is_success());
    }
}
