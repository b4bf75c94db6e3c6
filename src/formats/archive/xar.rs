//! Apple XAR (`xar!` magic): a fixed binary header followed by a
//! compressed XML table of contents and a heap of file data. Like `7z`
//! above, only the container is validated here — the TOC is decompressed
//! and its declared heap offsets bounds-checked, but XAR's own signed,
//! per-entry encoding metadata is not replayed into one artifact per
//! member (no XML parser sits in this crate's dependency stack).

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::decompress::{self, ZlibDecoder};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::LabelSet;
use regex::bytes::Regex;

const MAGIC: &[u8] = b"xar!";
const HEADER_LEN: u64 = 28;

pub struct Xar;

impl Parser for Xar {
    fn pretty_name(&self) -> &'static str {
        "xar"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xar", "pkg"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < HEADER_LEN {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "xar: short region").into();
        }
        let base = ctx.offset;
        let mut cursor = match Cursor::new(ctx.region, base, ctx.filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(MAGIC).is_err() {
            return CarveError::new(base, ErrorKind::BadMagic, "xar: bad magic").into();
        }
        let header_size = match cursor.read_u16_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let version = match cursor.read_u16_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if version != 1 {
            return CarveError::new(base, ErrorKind::BadVersion, format!("xar: unsupported version {version}")).into();
        }
        let toc_length_compressed = match cursor.read_u64_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let toc_length_uncompressed = match cursor.read_u64_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if cursor.skip(4).is_err() {
            // checksum algorithm ID
            return CarveError::new(base, ErrorKind::NotEnoughData, "xar: short checksum field").into();
        }
        if (header_size as u64) < HEADER_LEN {
            return CarveError::new(base, ErrorKind::BadField, "xar: header size too small").into();
        }

        let toc_start = base + header_size as u64;
        let heap_start = toc_start + toc_length_compressed;
        if heap_start > ctx.filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "xar: TOC exceeds region").into();
        }
        let mut toc_cursor = match Cursor::new(ctx.region, toc_start, ctx.filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let toc_compressed = match toc_cursor.read_vec(toc_length_compressed as usize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        drop(toc_cursor);

        let (toc_xml, _consumed) = match decompress::decode_all(ZlibDecoder::default(), &toc_compressed) {
            Ok(ok) => ok,
            Err(e) => return CarveError::new(toc_start, ErrorKind::BadStructure, format!("xar: TOC inflate failed: {}", e.reason)).into(),
        };
        if toc_length_uncompressed != 0 && toc_xml.len() as u64 != toc_length_uncompressed {
            return CarveError::new(toc_start, ErrorKind::BadField, "xar: TOC size mismatch").into();
        }

        // Every <file> entry's heap extent must fit inside the heap.
        // A dedicated XML parser is overkill for bounds-checking alone,
        // so <offset>/<length> pairs are pulled out with a regex over
        // the decompressed TOC bytes.
        let offset_re = Regex::new(r"(?s)<offset>\s*(\d+)\s*</offset>\s*<length>\s*(\d+)\s*</length>").unwrap();
        let mut heap_extent: u64 = 0;
        for captures in offset_re.captures_iter(&toc_xml) {
            let entry_offset: u64 = match std::str::from_utf8(&captures[1]).ok().and_then(|s| s.parse().ok()) {
                Some(v) => v,
                None => return CarveError::new(toc_start, ErrorKind::BadField, "xar: unparsable heap offset").into(),
            };
            let entry_length: u64 = match std::str::from_utf8(&captures[2]).ok().and_then(|s| s.parse().ok()) {
                Some(v) => v,
                None => return CarveError::new(toc_start, ErrorKind::BadField, "xar: unparsable heap length").into(),
            };
            let end = match entry_offset.checked_add(entry_length) {
                Some(v) => v,
                None => return CarveError::new(toc_start, ErrorKind::BadOffset, "xar: heap extent overflow").into(),
            };
            heap_extent = heap_extent.max(end);
        }
        if heap_start + heap_extent > ctx.filesize {
            return CarveError::new(toc_start, ErrorKind::BadOffset, "xar: heap entry exceeds region").into();
        }

        let length = (heap_start + heap_extent) - base;
        let mut labels = LabelSet::new();
        labels.add("xar").add("archive");
        match finish_region(ctx, length, labels, "xar", "xar") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::{Cursor as IoCursor, Write};

    fn build_xar(toc_xml: &[u8], heap: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(toc_xml).unwrap();
        let toc_compressed = encoder.finish().unwrap();

        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(&(HEADER_LEN as u16).to_be_bytes());
        data.extend(1u16.to_be_bytes());
        data.extend((toc_compressed.len() as u64).to_be_bytes());
        data.extend((toc_xml.len() as u64).to_be_bytes());
        data.extend(0u32.to_be_bytes());
        data.extend(&toc_compressed);
        data.extend(heap);
        data
    }

    #[test]
    fn parses_a_minimal_container_and_bounds_checks_the_heap() {
        let toc = br#"<xar><toc><file><data><offset>0</offset><length>4</length></data></file></toc></xar>"#;
        let data = build_xar(toc, b"data");

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match Xar.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, data.len() as u64),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_heap_entry_that_exceeds_the_region() {
        let toc = br#"<xar><toc><file><data><offset>0</offset><length>4000</length></data></file></toc></xar>"#;
        let data = build_xar(toc, b"data");

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Xar.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; 64];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Xar.parse(&mut ctx).is_success());
    }
}
