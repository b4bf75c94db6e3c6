//! Apple ICNS: an 8-byte header (`icns` magic + big-endian total file
//! size) followed by a flat sequence of TLV icon-family entries (4-byte
//! type + big-endian length including the 8-byte entry header).

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{finish_region, read_region};
use crate::label::{well_known, LabelSet};

pub struct Icns;

impl Parser for Icns {
    fn pretty_name(&self) -> &'static str {
        "icns"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["icns"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"icns"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let region = match read_region(ctx, Some(8)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if region.len() < 8 || &region[..4] != b"icns" {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "icns: bad signature").into();
        }
        let total_size = u32::from_be_bytes(region[4..8].try_into().unwrap()) as u64;
        if total_size < 8 || ctx.offset + total_size > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "icns: declared size exceeds region").into();
        }

        let full = match read_region(ctx, Some(total_size)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        let mut pos = 8usize;
        let mut saw_entry = false;
        while pos + 8 <= full.len() {
            let entry_len = u32::from_be_bytes(full[pos + 4..pos + 8].try_into().unwrap()) as usize;
            if entry_len < 8 || pos + entry_len > full.len() {
                return CarveError::new(ctx.offset + pos as u64, ErrorKind::BadField, "icns: bad entry length").into();
            }
            saw_entry = true;
            pos += entry_len;
        }
        if !saw_entry || pos != full.len() {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "icns: entries do not exactly fill declared size").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS).add(well_known::APPLE);
        match finish_region(ctx, total_size, labels, "icns", "icns") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_icns() -> Vec<u8> {
        let mut entry = Vec::new();
        entry.extend(b"ic07");
        entry.extend(12u32.to_be_bytes());
        entry.extend([0u8; 4]);
        let total = 8 + entry.len() as u32;
        let mut data = Vec::new();
        data.extend(b"icns");
        data.extend(total.to_be_bytes());
        data.extend(entry);
        data
    }

    #[test]
    fn accepts_minimal_icns() {
        let data = minimal_icns();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Icns.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_entries_not_filling_declared_size() {
        let mut data = minimal_icns();
        let total = data.len() as u32 + 4;
        data[4..8].copy_from_slice(&total.to_be_bytes());
        data.extend([0u8; 4]);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Icns.parse(&mut ctx).is_success());
    }
}
