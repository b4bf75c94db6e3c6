//! Khronos KTX texture container: a fixed 12-byte identifier, an
//! endianness marker (`0x04030201` read back either way confirms the
//! reader picked the right endianness), then a flat header of u32
//! fields ending in `bytesOfKeyValueData`, after which the key/value
//! metadata block and mipmap image data follow.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const IDENTIFIER: &[u8] = &[0xAB, b'K', b'T', b'X', b' ', b'1', b'1', 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];

pub struct Ktx;

impl Parser for Ktx {
    fn pretty_name(&self) -> &'static str {
        "ktx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ktx"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[IDENTIFIER]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 64 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "ktx: short header").into();
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
        if try_read!(cursor.read_vec(12)) != IDENTIFIER {
            return CarveError::new(base, ErrorKind::BadMagic, "ktx: bad identifier").into();
        }
        let endianness = try_read!(cursor.read_u32_le());
        if endianness != 0x0403_0201 {
            return CarveError::new(base + 12, ErrorKind::BadField, "ktx: bad endianness marker").into();
        }
        let _gl_type = try_read!(cursor.read_u32_le());
        let _gl_type_size = try_read!(cursor.read_u32_le());
        let _gl_format = try_read!(cursor.read_u32_le());
        let _gl_internal_format = try_read!(cursor.read_u32_le());
        let _gl_base_internal_format = try_read!(cursor.read_u32_le());
        let pixel_width = try_read!(cursor.read_u32_le());
        let _pixel_height = try_read!(cursor.read_u32_le());
        let _pixel_depth = try_read!(cursor.read_u32_le());
        let _array_elements = try_read!(cursor.read_u32_le());
        let faces = try_read!(cursor.read_u32_le());
        let mip_levels = try_read!(cursor.read_u32_le()).max(1) as u64;
        let kv_data_size = try_read!(cursor.read_u32_le()) as u64;
        drop(cursor);

        if pixel_width == 0 {
            return CarveError::new(base + 36, ErrorKind::BadField, "ktx: zero width").into();
        }
        if faces != 1 && faces != 6 {
            return CarveError::new(base + 48, ErrorKind::BadField, "ktx: face count must be 1 or 6").into();
        }

        let images_start = 64 + kv_data_size;
        if base + images_start > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "ktx: key/value data exceeds region").into();
        }

        // Each mip level is prefixed by its own u32 image size; walk
        // the chain to find the true end rather than estimating.
        let mut pos = images_start;
        for _ in 0..mip_levels {
            let mut level_cursor = match Cursor::new(ctx.region, base + pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let image_size = match level_cursor.read_u32_le() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            drop(level_cursor);
            let padded = image_size.div_ceil(4) * 4;
            pos += 4 + padded * faces as u64;
            if base + pos > filesize {
                return CarveError::new(base + pos, ErrorKind::BadOffset, "ktx: mip level data exceeds region").into();
            }
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, pos, labels, "ktx", "ktx") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_ktx() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(IDENTIFIER);
        data.extend(0x0403_0201u32.to_le_bytes());
        data.extend(0u32.to_le_bytes()); // glType
        data.extend(1u32.to_le_bytes()); // glTypeSize
        data.extend(0u32.to_le_bytes()); // glFormat
        data.extend(0x1908u32.to_le_bytes()); // glInternalFormat
        data.extend(0x1908u32.to_le_bytes()); // glBaseInternalFormat
        data.extend(4u32.to_le_bytes()); // width
        data.extend(4u32.to_le_bytes()); // height
        data.extend(0u32.to_le_bytes()); // depth
        data.extend(0u32.to_le_bytes()); // array elements
        data.extend(1u32.to_le_bytes()); // faces
        data.extend(1u32.to_le_bytes()); // mip levels
        data.extend(0u32.to_le_bytes()); // kv data size
        data.extend(8u32.to_le_bytes()); // image size
        data.extend([0u8; 8]);
        data
    }

    #[test]
    fn accepts_minimal_ktx() {
        let data = minimal_ktx();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Ktx.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_endianness_marker() {
        let mut data = minimal_ktx();
        data[12..16].copy_from_slice(&0u32.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Ktx.parse(&mut ctx).is_success());
    }
}
