//! SGI (Silicon Graphics) raster image: a 512-byte header beginning
//! with the big-endian magic `0x01DA`, a storage format byte (0 =
//! uncompressed, 1 = RLE), bytes-per-channel, dimension count, then
//! width/height/channel counts. RLE images carry a trailing
//! offset/length table sized by `height * channels`; this crate treats
//! the header's declared dimensions as authoritative for length.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = &[0x01, 0xDA];

pub struct Sgi;

impl Parser for Sgi {
    fn pretty_name(&self) -> &'static str {
        "sgi"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["sgi", "rgb", "rgba", "bw"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 512 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "sgi: short header").into();
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
        if try_read!(cursor.read_vec(2)) != MAGIC {
            return CarveError::new(base, ErrorKind::BadMagic, "sgi: bad magic").into();
        }
        let storage = try_read!(cursor.read_u8());
        let bpc = try_read!(cursor.read_u8());
        let dimension = try_read!(cursor.read_u16_be());
        let width = try_read!(cursor.read_u16_be()) as u64;
        let height = try_read!(cursor.read_u16_be()) as u64;
        let channels = try_read!(cursor.read_u16_be()) as u64;

        if storage > 1 {
            return CarveError::new(base + 2, ErrorKind::BadField, "sgi: bad storage format").into();
        }
        if bpc != 1 && bpc != 2 {
            return CarveError::new(base + 3, ErrorKind::BadField, "sgi: bad bytes-per-channel").into();
        }
        if !(1..=3).contains(&dimension) {
            return CarveError::new(base + 4, ErrorKind::BadField, "sgi: bad dimension count").into();
        }
        if width == 0 || height == 0 || channels == 0 {
            return CarveError::new(base + 6, ErrorKind::BadField, "sgi: zero-sized image").into();
        }

        let length = if storage == 1 {
            // RLE: true extent is only known by walking the offset
            // table, which itself lives right after the 512-byte header.
            let table_entries = height * channels;
            let table_bytes = table_entries * 4 * 2; // start + length tables
            let table_base = base + 512;
            if table_base + table_bytes > filesize {
                return CarveError::new(table_base, ErrorKind::NotEnoughData, "sgi: truncated RLE offset table").into();
            }
            let mut table_cursor = match Cursor::new(ctx.region, table_base, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let mut max_end = table_base + table_bytes - base;
            for _ in 0..table_entries {
                let start = match table_cursor.read_u32_be() {
                    Ok(v) => v as u64,
                    Err(e) => return e.into(),
                };
                max_end = max_end.max(start);
            }
            for _ in 0..table_entries {
                if let Err(e) = table_cursor.read_u32_be() {
                    return e.into();
                }
            }
            drop(table_cursor);
            max_end + 1 // conservative; actual scanline lengths trail each start
        } else {
            512 + width * height * channels * bpc as u64
        };

        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "sgi: declared extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, length, labels, "sgi", "sgi") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_sgi() -> Vec<u8> {
        let mut header = vec![0u8; 512];
        header[0..2].copy_from_slice(MAGIC);
        header[2] = 0; // uncompressed
        header[3] = 1; // bpc
        header[4..6].copy_from_slice(&3u16.to_be_bytes());
        header[6..8].copy_from_slice(&2u16.to_be_bytes()); // width
        header[8..10].copy_from_slice(&2u16.to_be_bytes()); // height
        header[10..12].copy_from_slice(&3u16.to_be_bytes()); // channels
        let mut data = header;
        data.extend(vec![0u8; 2 * 2 * 3]);
        data
    }

    #[test]
    fn accepts_minimal_uncompressed_sgi() {
        let data = minimal_sgi();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Sgi.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_zero_width() {
        let mut data = minimal_sgi();
        data[6..8].copy_from_slice(&0u16.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Sgi.parse(&mut ctx).is_success());
    }
}
