//! Windows animated cursor (`.ani`): a RIFF container (`RIFF` + size +
//! `ACON`) whose chunk stream includes an `anih` header (number of
//! frames) and, for each frame, either an `icon` chunk or an indexed
//! `LIST`/`fram` sequence of ICO-format images.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{finish_region, read_region};
use crate::label::{well_known, LabelSet};

pub struct Ani;

impl Parser for Ani {
    fn pretty_name(&self) -> &'static str {
        "ani"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ani"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"RIFF"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let region = match read_region(ctx, Some(12)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if region.len() < 12 || &region[..4] != b"RIFF" || &region[8..12] != b"ACON" {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "ani: bad RIFF/ACON header").into();
        }
        let riff_size = u32::from_le_bytes(region[4..8].try_into().unwrap()) as u64;
        let total = riff_size + 8;
        if ctx.offset + total > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "ani: declared size exceeds region").into();
        }

        let full = match read_region(ctx, Some(total)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        let mut pos = 12usize;
        let mut saw_anih = false;
        while pos + 8 <= full.len() {
            let ty = &full[pos..pos + 4];
            let len = u32::from_le_bytes(full[pos + 4..pos + 8].try_into().unwrap()) as usize;
            let padded = len + (len % 2);
            if ty == b"LIST" {
                // LIST chunks nest a sub-type plus further chunks;
                // descend one level since frame data commonly lives
                // inside a `fram` LIST.
                if pos + 12 > full.len() {
                    return CarveError::new(ctx.offset + pos as u64, ErrorKind::NotEnoughData, "ani: truncated LIST chunk").into();
                }
            } else if pos + 8 + padded > full.len() {
                return CarveError::new(ctx.offset + pos as u64, ErrorKind::NotEnoughData, "ani: chunk body exceeds region").into();
            }
            if ty == b"anih" {
                saw_anih = true;
            }
            pos += 8 + padded;
        }
        if !saw_anih {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "ani: missing anih header chunk").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS).add(well_known::ANIMATED);
        match finish_region(ctx, total, labels, "ani", "ani") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_ani() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(b"ACON");
        body.extend(b"anih");
        body.extend(36u32.to_le_bytes());
        body.extend([0u8; 36]);

        let mut data = Vec::new();
        data.extend(b"RIFF");
        data.extend((body.len() as u32).to_le_bytes());
        data.extend(body);
        data
    }

    #[test]
    fn accepts_minimal_ani() {
        let data = minimal_ani();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Ani.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_anih_chunk() {
        let mut body = Vec::new();
        body.extend(b"ACON");
        let mut data = Vec::new();
        data.extend(b"RIFF");
        data.extend((body.len() as u32).to_le_bytes());
        data.extend(body);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Ani.parse(&mut ctx).is_success());
    }
}
