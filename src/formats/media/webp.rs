//! WebP: a RIFF container (`RIFF` + little-endian size + `WEBP` form
//! type) holding one VP8/VP8L/VP8X chunk plus optional extended chunks
//! (ICCP, ANIM/ANMF, ALPH, EXIF, XMP).

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{finish_region, read_region};
use crate::label::{well_known, LabelSet};

pub struct WebP;

impl Parser for WebP {
    fn pretty_name(&self) -> &'static str {
        "webp"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["webp"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"RIFF"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let region = match read_region(ctx, Some(12)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        if region.len() < 12 || &region[..4] != b"RIFF" || &region[8..12] != b"WEBP" {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "webp: bad RIFF/WEBP header").into();
        }
        let riff_size = u32::from_le_bytes(region[4..8].try_into().unwrap()) as u64;
        let total = riff_size + 8;
        if ctx.offset + total > ctx.filesize {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "webp: declared size exceeds region").into();
        }

        let full = match read_region(ctx, Some(total)) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };
        let mut pos = 12usize;
        let mut saw_image_chunk = false;
        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        while pos + 8 <= full.len() {
            let ty = &full[pos..pos + 4];
            let len = u32::from_le_bytes(full[pos + 4..pos + 8].try_into().unwrap()) as usize;
            let padded = len + (len % 2);
            if pos + 8 + padded > full.len() {
                return CarveError::new(ctx.offset + pos as u64, ErrorKind::NotEnoughData, "webp: chunk body exceeds region").into();
            }
            match ty {
                b"VP8 " | b"VP8L" | b"VP8X" => saw_image_chunk = true,
                b"ANIM" | b"ANMF" => {
                    labels.add(well_known::ANIMATED);
                }
                _ => {}
            }
            pos += 8 + padded;
        }
        if !saw_image_chunk {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "webp: no VP8/VP8L/VP8X chunk").into();
        }

        match finish_region(ctx, total, labels, "webp", "webp") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_webp() -> Vec<u8> {
        let mut vp8 = Vec::new();
        vp8.extend(b"VP8L");
        vp8.extend(4u32.to_le_bytes());
        vp8.extend([0u8; 4]);

        let mut riff_body = Vec::new();
        riff_body.extend(b"WEBP");
        riff_body.extend(&vp8);

        let mut data = Vec::new();
        data.extend(b"RIFF");
        data.extend((riff_body.len() as u32).to_le_bytes());
        data.extend(riff_body);
        data
    }

    #[test]
    fn accepts_minimal_webp() {
        let data = minimal_webp();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(WebP.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_non_webp_form_type() {
        let mut data = minimal_webp();
        data[8..12].copy_from_slice(b"WAVE");
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!WebP.parse(&mut ctx).is_success());
    }
}
