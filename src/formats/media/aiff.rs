//! AIFF/AIFF-C: an IFF container (`FORM` + big-endian size + `AIFF` or
//! `AIFC` form type) holding a flat chunk sequence, each a 4-byte ID
//! plus a big-endian length (padded to an even byte count).

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{finish_region, read_region};
use crate::label::{well_known, LabelSet};

pub struct Aiff;

impl Parser for Aiff {
    fn pretty_name(&self) -> &'static str {
        "aiff"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["aiff", "aif"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"FORM"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let region = match read_region(ctx, Some(12)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if region.len() < 12 || &region[..4] != b"FORM" || !(&region[8..12] == b"AIFF" || &region[8..12] == b"AIFC") {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "aiff: bad FORM/AIFF header").into();
        }
        let form_size = u32::from_be_bytes(region[4..8].try_into().unwrap()) as u64;
        let total = form_size + 8;
        if ctx.offset + total > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "aiff: declared size exceeds region").into();
        }

        let full = match read_region(ctx, Some(total)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        let mut pos = 12usize;
        let mut saw_comm = false;
        let mut saw_ssnd = false;
        while pos + 8 <= full.len() {
            let ty = &full[pos..pos + 4];
            let len = u32::from_be_bytes(full[pos + 4..pos + 8].try_into().unwrap()) as usize;
            let padded = len + (len % 2);
            if pos + 8 + padded > full.len() {
                return CarveError::new(ctx.offset + pos as u64, ErrorKind::NotEnoughData, "aiff: chunk body exceeds region").into();
            }
            match ty {
                b"COMM" => saw_comm = true,
                b"SSND" => saw_ssnd = true,
                _ => {}
            }
            pos += 8 + padded;
        }
        if !saw_comm || !saw_ssnd {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "aiff: missing COMM or SSND chunk").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::AUDIO);
        match finish_region(ctx, total, labels, "aiff", "aiff") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_aiff() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(b"AIFF");
        body.extend(b"COMM");
        body.extend(2u32.to_be_bytes());
        body.extend([0u8; 2]);
        body.extend(b"SSND");
        body.extend(4u32.to_be_bytes());
        body.extend([0u8; 4]);

        let mut data = Vec::new();
        data.extend(b"FORM");
        data.extend((body.len() as u32).to_be_bytes());
        data.extend(body);
        data
    }

    #[test]
    fn accepts_minimal_aiff() {
        let data = minimal_aiff();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Aiff.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_ssnd() {
        let mut body = Vec::new();
        body.extend(b"AIFF");
        body.extend(b"COMM");
        body.extend(2u32.to_be_bytes());
        body.extend([0u8; 2]);
        let mut data = Vec::new();
        data.extend(b"FORM");
        data.extend((body.len() as u32).to_be_bytes());
        data.extend(body);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Aiff.parse(&mut ctx).is_success());
    }
}
