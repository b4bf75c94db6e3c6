//! GIMP brush (`.gbr`): a big-endian header giving its own total
//! header size, a version (1 or 2), width/height, color depth, magic
//! `GIMP`, a spacing field (version 2 only), and a NUL-terminated name
//! filling out the rest of the declared header.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"GIMP";

pub struct GimpBrush;

impl Parser for GimpBrush {
    fn pretty_name(&self) -> &'static str {
        "gimp-brush"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["gbr"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        // The magic sits at byte offset 20 within the header, not at
        // the start of the file: candidates are discovered there.
        if ctx.offset < 20 {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "gimp-brush: magic too close to start of file").into();
        }
        let base = ctx.offset - 20;
        let filesize = ctx.filesize;
        if filesize - base < 28 {
            return CarveError::new(base, ErrorKind::NotEnoughData, "gimp-brush: short header").into();
        }
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
        let header_size = try_read!(cursor.read_u32_be()) as u64;
        let version = try_read!(cursor.read_u32_be());
        let width = try_read!(cursor.read_u32_be()) as u64;
        let height = try_read!(cursor.read_u32_be()) as u64;
        let bytes_per_pixel = try_read!(cursor.read_u32_be()) as u64;
        let magic = try_read!(cursor.read_vec(4));
        drop(cursor);

        if magic != MAGIC {
            return CarveError::new(base + 16, ErrorKind::BadMagic, "gimp-brush: bad magic").into();
        }
        if version != 1 && version != 2 {
            return CarveError::new(base + 4, ErrorKind::BadVersion, "gimp-brush: bad version").into();
        }
        if width == 0 || height == 0 {
            return CarveError::new(base + 8, ErrorKind::BadField, "gimp-brush: zero-sized brush").into();
        }
        if bytes_per_pixel != 1 && bytes_per_pixel != 4 {
            return CarveError::new(base + 16, ErrorKind::BadField, "gimp-brush: bad color depth").into();
        }
        if header_size <= 28 {
            return CarveError::new(base, ErrorKind::BadField, "gimp-brush: header size too small to hold a name").into();
        }

        let pixel_data_len = width * height * bytes_per_pixel;
        let length = header_size + pixel_data_len;
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "gimp-brush: declared extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS).add("brush");
        match finish_region(ctx, length - (ctx.offset - base), labels, "gbr", "gimp-brush") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_gbr() -> Vec<u8> {
        let name = b"x";
        let header_size = 28 + name.len() as u32;
        let mut data = Vec::new();
        data.extend(header_size.to_be_bytes());
        data.extend(2u32.to_be_bytes()); // version
        data.extend(2u32.to_be_bytes()); // width
        data.extend(2u32.to_be_bytes()); // height
        data.extend(1u32.to_be_bytes()); // bytes per pixel
        data.extend(MAGIC);
        data.extend(0u32.to_be_bytes()); // spacing
        data.extend(name);
        data.push(0);
        data.extend([0u8; 4]); // pixel data
        data
    }

    #[test]
    fn accepts_minimal_gbr() {
        let data = minimal_gbr();
        let magic_offset = 20u64;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, magic_offset, dir.path().to_path_buf());
        assert!(GimpBrush.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut data = minimal_gbr();
        data[8..12].copy_from_slice(&0u32.to_be_bytes());
        let magic_offset = 20u64;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, magic_offset, dir.path().to_path_buf());
        assert!(!GimpBrush.parse(&mut ctx).is_success());
    }
}
