//! Chrome PAK resource bundle (`tools/grit` `DataPack`), versions 4 and
//! 5: a flat table of `(id, offset)` records bounding a contiguous blob
//! of resource bodies, terminated by a sentinel end-of-file offset.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const V4_MAGIC: [u8; 4] = 4u32.to_le_bytes();
const V5_MAGIC: [u8; 4] = 5u32.to_le_bytes();

pub struct ChromePak;

impl Parser for ChromePak {
    fn pretty_name(&self) -> &'static str {
        "chrome-pak"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pak"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[&V4_MAGIC, &V5_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 4 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "chrome pak: short header").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let version = match cursor.read_u32_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };

        let end_offset = match version {
            4 => match parse_v4(&mut cursor) {
                Ok(v) => v,
                Err(e) => return e.into(),
            },
            5 => match parse_v5(&mut cursor) {
                Ok(v) => v,
                Err(e) => return e.into(),
            },
            other => return CarveError::new(base + 4, ErrorKind::BadVersion, format!("chrome pak: unsupported version {other}")).into(),
        };
        drop(cursor);

        if base + end_offset > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "chrome pak: end-of-file offset exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::RESOURCE).add("chrome-pak");
        match finish_region(ctx, end_offset, labels, "pak", "chrome-pak") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

/// v4 layout: u32 resource count, u8 encoding, `count` `(u16 id, u32
/// offset)` records, two zero pad bytes, u32 end-of-file sentinel.
fn parse_v4(cursor: &mut Cursor<'_>) -> Result<u64, CarveError> {
    let count = cursor.read_u32_le()?;
    let _encoding = cursor.read_u8()?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let _id = cursor.read_u16_le()?;
        let offset = cursor.read_u32_le()?;
        offsets.push(offset);
    }
    let _pad = cursor.read_vec(2)?;
    let end_offset = cursor.read_u32_le()?;
    validate_offsets_sorted(&offsets, end_offset)?;
    Ok(end_offset as u64)
}

/// v5 layout: u8 encoding, 3 pad bytes, u16 resource count, u16 alias
/// count, `count` `(u16 id, u32 offset)` records, a terminating
/// sentinel record, then `alias_count` `(u16 id, u16 resource index)`
/// alias records.
fn parse_v5(cursor: &mut Cursor<'_>) -> Result<u64, CarveError> {
    let _encoding = cursor.read_u8()?;
    let _pad = cursor.read_vec(3)?;
    let count = cursor.read_u16_le()?;
    let alias_count = cursor.read_u16_le()?;

    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let _id = cursor.read_u16_le()?;
        let offset = cursor.read_u32_le()?;
        offsets.push(offset);
    }
    let _sentinel_id = cursor.read_u16_le()?;
    let end_offset = cursor.read_u32_le()?;
    validate_offsets_sorted(&offsets, end_offset)?;

    for _ in 0..alias_count {
        let _alias_id = cursor.read_u16_le()?;
        let resource_index = cursor.read_u16_le()?;
        if resource_index as u32 >= count as u32 {
            return Err(CarveError::new(0, ErrorKind::BadStructure, "chrome pak: alias points past resource table"));
        }
    }

    Ok(end_offset as u64)
}

fn validate_offsets_sorted(offsets: &[u32], end_offset: u32) -> Result<(), CarveError> {
    let mut prev = 0u32;
    for &offset in offsets {
        if offset < prev {
            return Err(CarveError::new(0, ErrorKind::BadStructure, "chrome pak: resource offsets are not sorted"));
        }
        prev = offset;
    }
    if prev > end_offset {
        return Err(CarveError::new(0, ErrorKind::BadStructure, "chrome pak: resource offset exceeds end-of-file sentinel"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn build_v4(resources: &[(u16, u32)], end_offset: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(4u32.to_le_bytes());
        data.extend((resources.len() as u32).to_le_bytes());
        data.push(0); // encoding
        for (id, offset) in resources {
            data.extend(id.to_le_bytes());
            data.extend(offset.to_le_bytes());
        }
        data.extend([0u8; 2]);
        data.extend(end_offset.to_le_bytes());
        while (data.len() as u32) < end_offset {
            data.push(0xAB);
        }
        data
    }

    #[test]
    fn accepts_a_sorted_v4_table() {
        let data = build_v4(&[(1, 20), (2, 30)], 40);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match ChromePak.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, 40),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_unsorted_offsets() {
        let data = build_v4(&[(1, 30), (2, 20)], 40);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!ChromePak.parse(&mut ctx).is_success());
    }
}
