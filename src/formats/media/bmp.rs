//! Windows/OS2 BMP: a 14-byte file header (`BM` magic, declared file
//! size, pixel data offset) followed by a DIB header whose own first
//! field is its size, which in turn tells us which BMP variant this is.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

pub struct Bmp;

impl Parser for Bmp {
    fn pretty_name(&self) -> &'static str {
        "bmp"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["bmp"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"BM"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        use crate::cursor::Cursor;
        if ctx.remaining() < 18 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "bmp: short header").into();
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
        if try_read!(cursor.read_vec(2)) != b"BM" {
            return CarveError::new(base, ErrorKind::BadMagic, "bmp: bad signature").into();
        }
        let file_size = try_read!(cursor.read_u32_le()) as u64;
        let _reserved = try_read!(cursor.read_vec(4));
        let pixel_offset = try_read!(cursor.read_u32_le()) as u64;
        let dib_header_size = try_read!(cursor.read_u32_le()) as u64;

        if !(12..=256).contains(&dib_header_size) {
            return CarveError::new(base + 14, ErrorKind::BadField, "bmp: implausible DIB header size").into();
        }
        if pixel_offset < 14 + dib_header_size {
            return CarveError::new(base + 10, ErrorKind::BadField, "bmp: pixel data offset inside headers").into();
        }
        if file_size < pixel_offset || base + file_size > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "bmp: declared size exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, file_size, labels, "bmp", "bmp") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_bmp() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"BM");
        data.extend(70u32.to_le_bytes()); // file size
        data.extend(0u32.to_le_bytes());
        data.extend(54u32.to_le_bytes()); // pixel offset
        data.extend(40u32.to_le_bytes()); // DIB header size (BITMAPINFOHEADER)
        data.resize(70, 0);
        data
    }

    #[test]
    fn accepts_minimal_bmp() {
        let data = minimal_bmp();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Bmp.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_pixel_offset_inside_headers() {
        let mut data = minimal_bmp();
        data[10..14].copy_from_slice(&4u32.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Bmp.parse(&mut ctx).is_success());
    }
}
