//! ICO/CUR: a 6-byte `ICONDIR` (reserved=0, type 1=icon/2=cursor, image
//! count) followed by that many 16-byte `ICONDIRENTRY` records, each
//! naming an offset/size pair into the same file for its image data
//! (commonly a BMP DIB or a full PNG).

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

pub struct Ico;

impl Parser for Ico {
    fn pretty_name(&self) -> &'static str {
        "ico"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ico", "cur"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[&[0x00, 0x00, 0x01, 0x00], &[0x00, 0x00, 0x02, 0x00]]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 6 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "ico: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let reserved = match cursor.read_u16_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let image_type = match cursor.read_u16_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if reserved != 0 {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "ico: bad ICONDIR header").into();
        }
        if image_type != 1 && image_type != 2 {
            return CarveError::new(ctx.offset, ErrorKind::BadField, "ico: bad resource type").into();
        }
        let count = match cursor.read_u16_le() {
            Ok(v) => v as u64,
            Err(e) => return e.into(),
        };
        if count == 0 {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "ico: zero images declared").into();
        }
        let entries_end = 6 + count * 16;
        if entries_end > filesize - ctx.offset {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "ico: directory entries exceed region").into();
        }

        let mut end = entries_end;
        for i in 0..count {
            let entry_pos = ctx.offset + 6 + i * 16;
            if cursor.skip(8).is_err() {
                // width, height, color count, reserved, planes, bpp
                return CarveError::new(entry_pos, ErrorKind::NotEnoughData, "ico: truncated directory entry").into();
            }
            let size = match cursor.read_u32_le() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            let offset = match cursor.read_u32_le() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            if offset < entries_end {
                return CarveError::new(entry_pos, ErrorKind::BadOffset, "ico: image data overlaps directory").into();
            }
            end = end.max(offset + size);
        }
        if ctx.offset + end > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "ico: image data exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        let ext = if image_type == 2 { "cur" } else { "ico" };
        match finish_region(ctx, end, labels, ext, "ico") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_ico() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend([0, 0, 1, 0]);
        data.extend(1u16.to_le_bytes());
        let mut entry = Vec::new();
        entry.push(16); // width
        entry.push(16); // height
        entry.push(0); // color count
        entry.push(0); // reserved
        entry.extend(1u16.to_le_bytes()); // planes
        entry.extend(32u16.to_le_bytes()); // bpp
        entry.extend(8u32.to_le_bytes()); // size
        entry.extend(22u32.to_le_bytes()); // offset
        data.extend(entry);
        data.extend([0u8; 8]); // image payload
        data
    }

    #[test]
    fn accepts_minimal_ico() {
        let data = minimal_ico();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Ico.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_zero_images() {
        let mut data = minimal_ico();
        data[4..6].copy_from_slice(&0u16.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Ico.parse(&mut ctx).is_success());
    }
}
