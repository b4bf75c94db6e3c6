//! FLV: a 9-byte header (`FLV` magic, version, type flags, header
//! size) followed by a `PreviousTagSize0` (always `0`) and then a
//! sequence of tags, each an 11-byte tag header plus its body and a
//! trailing 4-byte `PreviousTagSize`.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"FLV";

pub struct Flv;

impl Parser for Flv {
    fn pretty_name(&self) -> &'static str {
        "flv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["flv"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 13 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "flv: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(MAGIC).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "flv: bad signature").into();
        }
        if cursor.skip(2).is_err() {
            // version + type flags
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "flv: short header").into();
        }
        let header_size = match cursor.read_u32_be() {
            Ok(v) => v as u64,
            Err(e) => return e.into(),
        };
        if header_size < 9 {
            return CarveError::new(ctx.offset + 5, ErrorKind::BadField, "flv: bad header size").into();
        }
        if cursor.seek_abs(ctx.offset + header_size).is_err() {
            return CarveError::new(ctx.offset + 5, ErrorKind::BadField, "flv: header size exceeds region").into();
        }
        let prev_tag_size_0 = match cursor.read_u32_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if prev_tag_size_0 != 0 {
            return CarveError::new(ctx.offset + header_size, ErrorKind::BadField, "flv: PreviousTagSize0 must be zero").into();
        }

        let mut saw_tag = false;
        loop {
            let pos = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            if pos >= filesize {
                break;
            }
            let type_byte = match cursor.read_u8() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let tag_type = type_byte & 0x1F;
            if ![8, 9, 18].contains(&tag_type) {
                if cursor.seek_abs(pos).is_err() {
                    return CarveError::new(pos, ErrorKind::BadStructure, "flv: failed to rewind").into();
                }
                break;
            }
            let mut body_len_buf = [0u8; 4];
            body_len_buf[1..].copy_from_slice(&match cursor.read_vec(3) {
                Ok(v) => v,
                Err(e) => return e.into(),
            });
            let body_len = u32::from_be_bytes(body_len_buf) as u64;
            if cursor.skip(7).is_err() {
                // timestamp(3) + timestamp-extended(1) + stream id(3)
                return CarveError::new(pos, ErrorKind::NotEnoughData, "flv: truncated tag header").into();
            }
            if cursor.skip(body_len).is_err() {
                return CarveError::new(pos, ErrorKind::NotEnoughData, "flv: tag body exceeds region").into();
            }
            let prev_size = match cursor.read_u32_be() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            if prev_size != 11 + body_len {
                return CarveError::new(pos, ErrorKind::BadField, "flv: PreviousTagSize mismatch").into();
            }
            saw_tag = true;
        }

        if !saw_tag {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "flv: no media tags").into();
        }

        let length = match cursor.position() {
            Ok(p) => p - ctx.offset,
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add(well_known::VIDEO);
        match finish_region(ctx, length, labels, "flv", "flv") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_flv() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"FLV");
        data.push(1);
        data.push(0x05);
        data.extend(9u32.to_be_bytes());
        data.extend([0u8; 4]); // PreviousTagSize0
        // one script tag, empty body
        data.push(18);
        data.extend([0u8, 0, 0]); // body length 0
        data.extend([0u8; 3]); // timestamp
        data.push(0); // timestamp extended
        data.extend([0u8; 3]); // stream id
        data.extend(11u32.to_be_bytes()); // PreviousTagSize
        data
    }

    #[test]
    fn accepts_minimal_flv() {
        let data = minimal_flv();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Flv.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_previous_tag_size() {
        let mut data = minimal_flv();
        let len = data.len();
        data[len - 4..].copy_from_slice(&0u32.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Flv.parse(&mut ctx).is_success());
    }
}
