//! GIF87a/GIF89a: logical screen descriptor, optional global color
//! table, then a block stream (image descriptors, graphic control and
//! application/comment/plain-text extensions) terminated by the trailer
//! byte `0x3B`. Truncation is detected at block granularity so a
//! partial image block fails cleanly rather than silently stopping.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

pub struct Gif;

impl Parser for Gif {
    fn pretty_name(&self) -> &'static str {
        "gif"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["gif"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"GIF87a", b"GIF89a"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 13 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "gif: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let magic = match cursor.read_vec(6) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if magic != b"GIF87a" && magic != b"GIF89a" {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "gif: bad signature").into();
        }
        if cursor.skip(4).is_err() {
            // width(2) + height(2)
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "gif: truncated screen descriptor").into();
        }
        let packed = match cursor.read_u8() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if cursor.skip(2).is_err() {
            // background color index + pixel aspect ratio
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "gif: truncated screen descriptor").into();
        }
        let has_gct = packed & 0x80 != 0;
        let gct_size = if has_gct { 3u64 * (1 << ((packed & 0x07) + 1)) } else { 0 };
        if cursor.skip(gct_size).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "gif: truncated global color table").into();
        }

        let mut frame_count = 0usize;
        let mut trailer_seen = false;
        loop {
            let pos = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let introducer = match cursor.read_u8() {
                Ok(v) => v,
                Err(_) => return CarveError::new(pos, ErrorKind::NotEnoughData, "gif: missing trailer").into(),
            };
            match introducer {
                0x3B => {
                    trailer_seen = true;
                    break;
                }
                0x21 => {
                    // Extension: label byte, then sub-blocks until a
                    // zero-length block.
                    if cursor.skip(1).is_err() {
                        return CarveError::new(pos, ErrorKind::NotEnoughData, "gif: truncated extension").into();
                    }
                    if let Err(e) = skip_sub_blocks(&mut cursor) {
                        return e.into();
                    }
                }
                0x2C => {
                    if cursor.skip(8).is_err() {
                        return CarveError::new(pos, ErrorKind::NotEnoughData, "gif: truncated image descriptor").into();
                    }
                    let local_packed = match cursor.read_u8() {
                        Ok(v) => v,
                        Err(e) => return e.into(),
                    };
                    let has_lct = local_packed & 0x80 != 0;
                    let lct_size = if has_lct { 3u64 * (1 << ((local_packed & 0x07) + 1)) } else { 0 };
                    if cursor.skip(lct_size).is_err() {
                        return CarveError::new(pos, ErrorKind::NotEnoughData, "gif: truncated local color table").into();
                    }
                    if cursor.skip(1).is_err() {
                        // LZW minimum code size
                        return CarveError::new(pos, ErrorKind::NotEnoughData, "gif: truncated image data").into();
                    }
                    if let Err(e) = skip_sub_blocks(&mut cursor) {
                        return e.into();
                    }
                    frame_count += 1;
                }
                other => {
                    return CarveError::new(pos, ErrorKind::BadStructure, format!("gif: unexpected block introducer 0x{other:02x}")).into();
                }
            }
        }
        if !trailer_seen || frame_count == 0 {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "gif: no image blocks").into();
        }

        let length = match cursor.position() {
            Ok(p) => p - ctx.offset,
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        if frame_count > 1 {
            labels.add(well_known::ANIMATED);
        }
        match finish_region(ctx, length, labels, "gif", "gif") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

fn skip_sub_blocks(cursor: &mut Cursor<'_>) -> Result<(), CarveError> {
    loop {
        let pos = cursor.position()?;
        let len = cursor.read_u8().map_err(|_| {
            CarveError::new(pos, ErrorKind::NotEnoughData, "gif: truncated sub-block stream")
        })?;
        if len == 0 {
            return Ok(());
        }
        cursor.skip(len as u64).map_err(|_| {
            CarveError::new(pos, ErrorKind::NotEnoughData, "gif: truncated sub-block")
        })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn minimal_gif() -> Vec<u8> {
        let mut data = b"GIF89a".to_vec();
        data.extend(4u16.to_le_bytes()); // width
        data.extend(4u16.to_le_bytes()); // height
        data.push(0); // packed: no GCT
        data.push(0); // background color index
        data.push(0); // pixel aspect ratio
        // Image descriptor
        data.push(0x2C);
        data.extend(0u16.to_le_bytes());
        data.extend(0u16.to_le_bytes());
        data.extend(4u16.to_le_bytes());
        data.extend(4u16.to_le_bytes());
        data.push(0); // packed: no LCT
        data.push(2); // LZW min code size
        data.push(1); // sub-block length
        data.push(0x00); // one data byte
        data.push(0); // block terminator
        data.push(0x3B); // trailer
        data
    }

    #[test]
    fn accepts_minimal_single_frame_gif() {
        let data = minimal_gif();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Gif.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_trailer() {
        let mut data = minimal_gif();
        data.pop();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Gif.parse(&mut ctx).is_success());
    }
}
