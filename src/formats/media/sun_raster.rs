//! Sun raster image: a fixed 32-byte big-endian header (magic
//! `0x59a66a95`, width, height, depth, declared data length, raster
//! type, color-map type and length), optionally followed by a color
//! map and then raw or RLE-compressed pixel data.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: u32 = 0x59a6_6a95;

pub struct SunRaster;

impl Parser for SunRaster {
    fn pretty_name(&self) -> &'static str {
        "sun-raster"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ras"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[&MAGIC.to_be_bytes()]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 32 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "sun-raster: short header").into();
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
        let magic = try_read!(cursor.read_u32_be());
        if magic != MAGIC {
            return CarveError::new(base, ErrorKind::BadMagic, "sun-raster: bad magic").into();
        }
        let width = try_read!(cursor.read_u32_be()) as u64;
        let height = try_read!(cursor.read_u32_be()) as u64;
        let depth = try_read!(cursor.read_u32_be());
        let mut data_length = try_read!(cursor.read_u32_be()) as u64;
        let ras_type = try_read!(cursor.read_u32_be());
        let map_type = try_read!(cursor.read_u32_be());
        let map_length = try_read!(cursor.read_u32_be()) as u64;

        if width == 0 || height == 0 {
            return CarveError::new(base + 4, ErrorKind::BadField, "sun-raster: zero-sized image").into();
        }
        if ![1, 8, 24, 32].contains(&depth) {
            return CarveError::new(base + 12, ErrorKind::BadField, "sun-raster: unsupported pixel depth").into();
        }
        if ras_type > 5 {
            return CarveError::new(base + 20, ErrorKind::BadField, "sun-raster: bad raster type").into();
        }
        if map_type > 3 {
            return CarveError::new(base + 24, ErrorKind::BadField, "sun-raster: bad colormap type").into();
        }

        if data_length == 0 {
            let row_bytes = (width * depth as u64).div_ceil(8).div_ceil(2) * 2;
            data_length = row_bytes * height;
        }

        let length = 32 + map_length + data_length;
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "sun-raster: declared extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, length, labels, "ras", "sun-raster") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_ras() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(MAGIC.to_be_bytes());
        data.extend(2u32.to_be_bytes()); // width
        data.extend(2u32.to_be_bytes()); // height
        data.extend(8u32.to_be_bytes()); // depth
        data.extend(4u32.to_be_bytes()); // data length
        data.extend(1u32.to_be_bytes()); // ras_type
        data.extend(0u32.to_be_bytes()); // map_type
        data.extend(0u32.to_be_bytes()); // map_length
        data.extend([0u8; 4]);
        data
    }

    #[test]
    fn accepts_minimal_raster() {
        let data = minimal_ras();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(SunRaster.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_depth() {
        let mut data = minimal_ras();
        data[12..16].copy_from_slice(&3u32.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!SunRaster.parse(&mut ctx).is_success());
    }
}
