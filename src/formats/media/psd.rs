//! Adobe PSD/PSB: a 26-byte fixed header (`8BPS` magic, version 1 for
//! PSD / 2 for PSB, 6 reserved zero bytes, channel count, dimensions,
//! depth, color mode), followed by four length-prefixed sections:
//! color mode data, image resources, layer and mask info, and the
//! final image data.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"8BPS";

pub struct Psd;

impl Parser for Psd {
    fn pretty_name(&self) -> &'static str {
        "psd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["psd"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 26 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "psd: short header").into();
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
        if try_read!(cursor.read_vec(4)) != MAGIC {
            return CarveError::new(base, ErrorKind::BadMagic, "psd: bad magic").into();
        }
        let version = try_read!(cursor.read_u16_be());
        if version != 1 && version != 2 {
            return CarveError::new(base + 4, ErrorKind::BadVersion, "psd: version must be 1 (PSD) or 2 (PSB)").into();
        }
        let reserved = try_read!(cursor.read_vec(6));
        if reserved.iter().any(|&b| b != 0) {
            return CarveError::new(base + 6, ErrorKind::BadField, "psd: reserved bytes must be zero").into();
        }
        let channels = try_read!(cursor.read_u16_be());
        let height = try_read!(cursor.read_u32_be());
        let width = try_read!(cursor.read_u32_be());
        let depth = try_read!(cursor.read_u16_be());
        let color_mode = try_read!(cursor.read_u16_be());
        drop(cursor);

        if !(1..=56).contains(&channels) {
            return CarveError::new(base + 12, ErrorKind::BadField, "psd: bad channel count").into();
        }
        if width == 0 || height == 0 {
            return CarveError::new(base + 14, ErrorKind::BadField, "psd: zero-sized image").into();
        }
        if ![1, 8, 16, 32].contains(&depth) {
            return CarveError::new(base + 22, ErrorKind::BadField, "psd: bad bit depth").into();
        }
        if color_mode > 9 {
            return CarveError::new(base + 24, ErrorKind::BadField, "psd: bad color mode").into();
        }

        let size_width: u64 = if version == 2 { 8 } else { 4 };
        let mut pos = 26u64;
        for _ in 0..3 {
            pos = match read_length_prefixed(ctx, base + pos, filesize, size_width) {
                Ok(p) => p - base,
                Err(e) => return e.into(),
            };
        }
        // Final image data section: length-prefixed the same way.
        pos = match read_length_prefixed(ctx, base + pos, filesize, size_width) {
            Ok(p) => p - base,
            Err(e) => return e.into(),
        };

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, pos, labels, "psd", "psd") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

fn read_length_prefixed(ctx: &mut ParseContext<'_>, pos: u64, filesize: u64, size_width: u64) -> Result<u64, CarveError> {
    let mut cursor = Cursor::new(ctx.region, pos, filesize)?;
    let len = if size_width == 8 { cursor.read_u64_be()? } else { cursor.read_u32_be()? as u64 };
    let section_end = pos + size_width + len;
    if section_end > filesize {
        return Err(CarveError::new(pos, ErrorKind::BadOffset, "psd: section length exceeds region"));
    }
    Ok(section_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_psd() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"8BPS");
        data.extend(1u16.to_be_bytes());
        data.extend([0u8; 6]);
        data.extend(3u16.to_be_bytes()); // channels
        data.extend(4u32.to_be_bytes()); // height
        data.extend(4u32.to_be_bytes()); // width
        data.extend(8u16.to_be_bytes()); // depth
        data.extend(3u16.to_be_bytes()); // RGB color mode
        data.extend(0u32.to_be_bytes()); // color mode data len
        data.extend(0u32.to_be_bytes()); // image resources len
        data.extend(0u32.to_be_bytes()); // layer/mask info len
        data.extend(0u32.to_be_bytes()); // image data section len
        data
    }

    #[test]
    fn accepts_minimal_psd() {
        let data = minimal_psd();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Psd.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_nonzero_reserved_bytes() {
        let mut data = minimal_psd();
        data[6] = 1;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Psd.parse(&mut ctx).is_success());
    }
}
