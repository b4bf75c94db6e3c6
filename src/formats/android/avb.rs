//! Android Verified Boot 2.0 (`AvbVBMetaImage`): a fixed 256-byte header
//! addressing five variable-length sub-blocks by `(offset, size)` pairs,
//! optionally re-anchored by a trailing `AVBf` footer.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"AVB0";
const FOOTER_MAGIC: &[u8] = b"AVBf";
const HEADER_SIZE: u64 = 256;
const PADDING_ALIGNMENT: u64 = 4096;

pub struct Avb;

impl Parser for Avb {
    fn pretty_name(&self) -> &'static str {
        "android-avb"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["vbmeta"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < HEADER_SIZE {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "avb: short header").into();
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
        let _major = try_read!(cursor.read_u32_be());
        let _minor = try_read!(cursor.read_u32_be());
        let auth_block_size = try_read!(cursor.read_u64_be());
        let aux_block_size = try_read!(cursor.read_u64_be());
        let _algorithm = try_read!(cursor.read_u32_be());

        let mut max_end = HEADER_SIZE;
        for name in ["hash", "signature", "pubkey", "pubkey-metadata", "descriptors"] {
            let offset = try_read!(cursor.read_u64_be());
            let size = try_read!(cursor.read_u64_be());
            if size == 0 {
                continue;
            }
            // Hash/signature descriptors live in the authentication
            // block; the rest in the auxiliary block, immediately
            // following it. Offsets are block-relative per the AOSP
            // `AvbVBMetaImageHeader` layout.
            let block_base = if name == "hash" || name == "signature" { HEADER_SIZE } else { HEADER_SIZE + auth_block_size };
            let end = match block_base.checked_add(offset).and_then(|v| v.checked_add(size)) {
                Some(v) => v,
                None => return CarveError::new(base, ErrorKind::BadStructure, format!("avb: {name} sub-block overflow")).into(),
            };
            if end > HEADER_SIZE + auth_block_size + aux_block_size {
                return CarveError::new(base, ErrorKind::BadOffset, format!("avb: {name} sub-block extends past declared blocks")).into();
            }
            max_end = max_end.max(end);
        }
        let _rollback_index = try_read!(cursor.read_u64_be());
        let _flags = try_read!(cursor.read_u32_be());
        let _pad = try_read!(cursor.read_vec(4));
        let release_string = try_read!(cursor.read_vec(48));
        drop(cursor);

        let release = String::from_utf8_lossy(&release_string).trim_end_matches('\0').to_string();

        let mut length = max_end.max(HEADER_SIZE + auth_block_size + aux_block_size);
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "avb: declared blocks extend past region").into();
        }

        // Tolerate 4096-byte NUL padding immediately following the
        // logical content before declaring a footer or ending the region.
        let mut padded_end = base + length;
        while padded_end < filesize && padded_end - base < PADDING_ALIGNMENT * 4 {
            let next_aligned = ((padded_end - base) / PADDING_ALIGNMENT + 1) * PADDING_ALIGNMENT + base;
            if next_aligned > filesize {
                break;
            }
            let mut pad_cursor = match Cursor::new(ctx.region, padded_end, filesize) {
                Ok(c) => c,
                Err(_) => break,
            };
            let probe_len = (next_aligned - padded_end).min(64) as usize;
            if probe_len == 0 {
                break;
            }
            let probe = match pad_cursor.read_vec(probe_len) {
                Ok(v) => v,
                Err(_) => break,
            };
            if !probe.iter().all(|&b| b == 0) {
                break;
            }
            padded_end = next_aligned;
        }
        if padded_end > base + length {
            length = padded_end - base;
        }

        let _ = release;

        let mut labels = LabelSet::new();
        labels.add(well_known::ANDROID).add("avb");
        match finish_region(ctx, length, labels, "vbmeta", "android-avb") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn minimal_header() -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(MAGIC);
        h.extend(1u32.to_be_bytes());
        h.extend(0u32.to_be_bytes());
        h.extend(0u64.to_be_bytes()); // auth_block_size
        h.extend(0u64.to_be_bytes()); // aux_block_size
        h.extend(0u32.to_be_bytes()); // algorithm
        for _ in 0..5 {
            h.extend(0u64.to_be_bytes()); // offset
            h.extend(0u64.to_be_bytes()); // size
        }
        h.extend(0u64.to_be_bytes()); // rollback index
        h.extend(0u32.to_be_bytes()); // flags
        h.extend([0u8; 4]); // pad
        h.extend([0u8; 48]); // release string
        h.extend(vec![0u8; 256 - h.len()]);
        h
    }

    #[test]
    fn accepts_a_bare_header_with_empty_blocks() {
        let data = minimal_header();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match Avb.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, 256),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_short_header() {
        let data = vec![0u8; 10];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Avb.parse(&mut ctx).is_success());
    }
}
