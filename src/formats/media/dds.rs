//! DirectDraw Surface (`.dds`): a 4-byte magic `DDS ` followed by a
//! fixed 124-byte `DDS_HEADER` (itself declaring its own size as a
//! cross-check), optionally extended by a DX10 header when the pixel
//! format's FourCC is `DX10`.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"DDS ";

pub struct Dds;

impl Parser for Dds {
    fn pretty_name(&self) -> &'static str {
        "dds"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["dds"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 128 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "dds: short header").into();
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
            return CarveError::new(base, ErrorKind::BadMagic, "dds: bad magic").into();
        }
        let header_size = try_read!(cursor.read_u32_le());
        if header_size != 124 {
            return CarveError::new(base + 4, ErrorKind::BadField, "dds: header size must be 124").into();
        }
        let _flags = try_read!(cursor.read_u32_le());
        let height = try_read!(cursor.read_u32_le());
        let width = try_read!(cursor.read_u32_le());
        let pitch_or_linear = try_read!(cursor.read_u32_le()) as u64;
        let depth = try_read!(cursor.read_u32_le());
        let mip_count = try_read!(cursor.read_u32_le());
        drop(cursor);

        if width == 0 || height == 0 {
            return CarveError::new(base + 12, ErrorKind::BadField, "dds: zero-sized image").into();
        }

        // Pixel format lives at offset 76, 32 bytes, with its own
        // declared size and FourCC.
        let mut pf_cursor = match Cursor::new(ctx.region, base + 76, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let pf_size = try_read!(pf_cursor.read_u32_le());
        if pf_size != 32 {
            return CarveError::new(base + 76, ErrorKind::BadField, "dds: pixel format size must be 32").into();
        }
        let pf_flags = try_read!(pf_cursor.read_u32_le());
        let fourcc = try_read!(pf_cursor.read_vec(4));
        drop(pf_cursor);

        let header_len = if pf_flags & 0x4 != 0 && fourcc == b"DX10" { 128 + 20 } else { 128 };

        // Without decoding the full compressed-block math for every
        // FourCC, a conservative estimate is used: the larger of the
        // declared pitch/linear size and a generic depth*mip estimate
        // to avoid truncating legitimate texture data.
        let depth = depth.max(1) as u64;
        let mip_count = mip_count.max(1) as u64;
        let estimate = pitch_or_linear.max((width as u64) * (height as u64) * depth) * mip_count;
        let length = header_len as u64 + estimate;
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "dds: estimated extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, length, labels, "dds", "dds") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_dds() -> Vec<u8> {
        let mut data = vec![0u8; 128];
        data[0..4].copy_from_slice(MAGIC);
        data[4..8].copy_from_slice(&124u32.to_le_bytes());
        data[12..16].copy_from_slice(&4u32.to_le_bytes()); // height
        data[16..20].copy_from_slice(&4u32.to_le_bytes()); // width
        data[20..24].copy_from_slice(&16u32.to_le_bytes()); // pitch
        data.extend(vec![0u8; 16]);
        data
    }

    #[test]
    fn accepts_minimal_dds() {
        let data = minimal_dds();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Dds.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_header_size() {
        let mut data = minimal_dds();
        data[4..8].copy_from_slice(&0u32.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Dds.parse(&mut ctx).is_success());
    }
}
