//! ODEX (Android "optimized DEX"): a thin 40-byte header wrapping an
//! embedded DEX image plus dependency and optimization-data sections,
//! validated by an Adler-32 over the latter two.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::checksum::{Adler32, ChecksumAdapter};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::android::dex::validate_dex;
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"dey\n";
const VERSION: &[u8] = b"036\0";
const HEADER_SIZE: u64 = 40;

pub struct Odex;

impl Parser for Odex {
    fn pretty_name(&self) -> &'static str {
        "android-odex"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["odex"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"dey\n036\0"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < HEADER_SIZE {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "odex: short header").into();
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

        if let Err(e) = cursor.expect_magic(MAGIC) {
            return e.into();
        }
        let version = try_read!(cursor.read_vec(4));
        if version != VERSION {
            return CarveError::new(base + 4, ErrorKind::BadVersion, "odex: unsupported version").into();
        }
        let dex_offset = try_read!(cursor.read_u32_le()) as u64;
        let dex_len = try_read!(cursor.read_u32_le()) as u64;
        let deps_offset = try_read!(cursor.read_u32_le()) as u64;
        let deps_len = try_read!(cursor.read_u32_le()) as u64;
        let opt_offset = try_read!(cursor.read_u32_le()) as u64;
        let opt_len = try_read!(cursor.read_u32_le()) as u64;
        let _flags = try_read!(cursor.read_u32_le());
        let checksum = try_read!(cursor.read_u32_le());
        drop(cursor);

        for (name, offset, len) in [("dex", dex_offset, dex_len), ("deps", deps_offset, deps_len), ("opt", opt_offset, opt_len)] {
            let end = match (base + offset).checked_add(len) {
                Some(v) => v,
                None => return CarveError::new(base, ErrorKind::BadStructure, format!("odex: {name} section overflow")).into(),
            };
            if end > filesize {
                return CarveError::new(base + offset, ErrorKind::BadOffset, format!("odex: {name} section extends past region")).into();
            }
        }

        if let Err(e) = validate_dex(ctx.region, base + dex_offset, filesize, false) {
            return e.into();
        }

        if deps_len > 0 || opt_len > 0 {
            let combined_start = base + deps_offset.min(opt_offset);
            let combined_end = (base + deps_offset + deps_len).max(base + opt_offset + opt_len);
            let mut combined_cursor = match Cursor::new(ctx.region, combined_start, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let combined = try_read!(combined_cursor.read_vec((combined_end - combined_start) as usize));
            drop(combined_cursor);
            let computed = Adler32::digest(&combined);
            if computed != checksum {
                return CarveError::new(base + 36, ErrorKind::BadChecksum, "odex: deps/opt Adler-32 mismatch").into();
            }
        }

        let length = [dex_offset + dex_len, deps_offset + deps_len, opt_offset + opt_len]
            .into_iter()
            .max()
            .unwrap_or(HEADER_SIZE);

        let mut labels = LabelSet::new();
        labels.add(well_known::ANDROID).add("odex");
        match finish_region(ctx, length, labels, "odex", "android-odex") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use crate::checksum::Sha1Adapter;
    use std::io::Cursor as IoCursor;

    fn minimal_dex_bytes() -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(b"dex\n035\0");
        h.extend(0u32.to_le_bytes());
        h.extend([0u8; 20]);
        let header_size = 0x70u32;
        let map_off = header_size;
        let file_size = header_size + 4 + 12;
        h.extend(file_size.to_le_bytes());
        h.extend(header_size.to_le_bytes());
        h.extend(0x1234_5678u32.to_le_bytes());
        for _ in 0..2 {
            h.extend(0u32.to_le_bytes());
        }
        h.extend(map_off.to_le_bytes());
        for _ in 0..12 {
            h.extend(0u32.to_le_bytes());
        }
        h.extend(map_off.to_le_bytes());
        assert_eq!(h.len(), header_size as usize);
        h.extend(1u32.to_le_bytes());
        h.extend(0x0000u16.to_le_bytes());
        h.extend(0u16.to_le_bytes());
        h.extend(1u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        let sha1 = {
            let mut hasher = Sha1Adapter::new();
            hasher.update(&h[32..]);
            hasher.finalize()
        };
        h[12..32].copy_from_slice(&sha1);
        let adler = Adler32::digest(&h[12..]);
        h[8..12].copy_from_slice(&adler.to_le_bytes());
        h
    }

    #[test]
    fn accepts_an_odex_wrapping_a_valid_dex() {
        let dex = minimal_dex_bytes();
        let deps = b"deps-bytes".to_vec();
        let opt = b"opt-bytes!!".to_vec();
        let dex_offset = 40u32;
        let deps_offset = dex_offset + dex.len() as u32;
        let opt_offset = deps_offset + deps.len() as u32;

        let mut combined = deps.clone();
        combined.extend(&opt);
        let checksum = Adler32::digest(&combined);

        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(VERSION);
        data.extend(dex_offset.to_le_bytes());
        data.extend((dex.len() as u32).to_le_bytes());
        data.extend(deps_offset.to_le_bytes());
        data.extend((deps.len() as u32).to_le_bytes());
        data.extend(opt_offset.to_le_bytes());
        data.extend((opt.len() as u32).to_le_bytes());
        data.extend(0u32.to_le_bytes());
        data.extend(checksum.to_le_bytes());
        data.extend(&dex);
        data.extend(&deps);
        data.extend(&opt);

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match Odex.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, data.len() as u64),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let dex = minimal_dex_bytes();
        let deps = b"deps-bytes".to_vec();
        let opt = b"opt-bytes!!".to_vec();
        let dex_offset = 40u32;
        let deps_offset = dex_offset + dex.len() as u32;
        let opt_offset = deps_offset + deps.len() as u32;

        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(VERSION);
        data.extend(dex_offset.to_le_bytes());
        data.extend((dex.len() as u32).to_le_bytes());
        data.extend(deps_offset.to_le_bytes());
        data.extend((deps.len() as u32).to_le_bytes());
        data.extend(opt_offset.to_le_bytes());
        data.extend((opt.len() as u32).to_le_bytes());
        data.extend(0u32.to_le_bytes());
        data.extend(0xDEAD_BEEFu32.to_le_bytes());
        data.extend(&dex);
        data.extend(&deps);
        data.extend(&opt);

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Odex.parse(&mut ctx).is_success());
    }
}
