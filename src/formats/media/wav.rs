//! WAV: a RIFF container (`RIFF` + size + `WAVE`) holding at minimum an
//! `fmt ` chunk and a `data` chunk, both flat TLV entries padded to an
//! even byte count like every other RIFF-family format here.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{finish_region, read_region};
use crate::label::{well_known, LabelSet};

pub struct Wav;

impl Parser for Wav {
    fn pretty_name(&self) -> &'static str {
        "wav"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wav"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"RIFF"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let region = match read_region(ctx, Some(12)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if region.len() < 12 || &region[..4] != b"RIFF" || &region[8..12] != b"WAVE" {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "wav: bad RIFF/WAVE header").into();
        }
        let riff_size = u32::from_le_bytes(region[4..8].try_into().unwrap()) as u64;
        let total = riff_size + 8;
        if ctx.offset + total > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "wav: declared size exceeds region").into();
        }

        let full = match read_region(ctx, Some(total)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        let mut pos = 12usize;
        let mut saw_fmt = false;
        let mut saw_data = false;
        while pos + 8 <= full.len() {
            let ty = &full[pos..pos + 4];
            let len = u32::from_le_bytes(full[pos + 4..pos + 8].try_into().unwrap()) as usize;
            let padded = len + (len % 2);
            if pos + 8 + padded > full.len() {
                return CarveError::new(ctx.offset + pos as u64, ErrorKind::NotEnoughData, "wav: chunk body exceeds region").into();
            }
            match ty {
                b"fmt " => saw_fmt = true,
                b"data" => saw_data = true,
                _ => {}
            }
            pos += 8 + padded;
        }
        if !saw_fmt || !saw_data {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "wav: missing fmt or data chunk").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::AUDIO);
        match finish_region(ctx, total, labels, "wav", "wav") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_wav() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(b"WAVE");
        body.extend(b"fmt ");
        body.extend(16u32.to_le_bytes());
        body.extend([0u8; 16]);
        body.extend(b"data");
        body.extend(4u32.to_le_bytes());
        body.extend([0u8; 4]);

        let mut data = Vec::new();
        data.extend(b"RIFF");
        data.extend((body.len() as u32).to_le_bytes());
        data.extend(body);
        data
    }

    #[test]
    fn accepts_minimal_wav() {
        let data = minimal_wav();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Wav.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_data_chunk() {
        let mut body = Vec::new();
        body.extend(b"WAVE");
        body.extend(b"fmt ");
        body.extend(16u32.to_le_bytes());
        body.extend([0u8; 16]);
        let mut data = Vec::new();
        data.extend(b"RIFF");
        data.extend((body.len() as u32).to_le_bytes());
        data.extend(body);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Wav.parse(&mut ctx).is_success());
    }
}
