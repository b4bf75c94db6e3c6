//! Sun/NeXT `.au` audio: a 24-byte big-endian header (`.snd` magic,
//! data offset, data size, encoding, sample rate, channel count).
//! `data_size` of `0xFFFFFFFF` means "unknown, read to EOF" in the
//! original format; this crate treats that as "whole remaining region".

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b".snd";

pub struct Au;

impl Parser for Au {
    fn pretty_name(&self) -> &'static str {
        "au"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["au", "snd"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 24 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "au: short header").into();
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
        if try_read!(cursor.read_vec(4)) != MAGIC {
            return CarveError::new(base, ErrorKind::BadMagic, "au: bad magic").into();
        }
        let data_offset = try_read!(cursor.read_u32_be()) as u64;
        let data_size = try_read!(cursor.read_u32_be()) as u64;
        let encoding = try_read!(cursor.read_u32_be());
        let _sample_rate = try_read!(cursor.read_u32_be());
        let channels = try_read!(cursor.read_u32_be());

        if data_offset < 24 {
            return CarveError::new(base + 4, ErrorKind::BadField, "au: data offset inside header").into();
        }
        if channels == 0 || channels > 16 {
            return CarveError::new(base + 20, ErrorKind::BadField, "au: implausible channel count").into();
        }
        if encoding == 0 || encoding > 27 {
            return CarveError::new(base + 12, ErrorKind::BadField, "au: bad encoding").into();
        }

        let length = if data_size == 0xFFFF_FFFF {
            filesize - base
        } else {
            data_offset + data_size
        };
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "au: declared extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::AUDIO);
        match finish_region(ctx, length, labels, "au", "au") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_au() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(24u32.to_be_bytes());
        data.extend(4u32.to_be_bytes());
        data.extend(2u32.to_be_bytes()); // 8-bit mu-law-ish encoding id
        data.extend(8000u32.to_be_bytes());
        data.extend(1u32.to_be_bytes());
        data.extend([0u8; 4]);
        data
    }

    #[test]
    fn accepts_minimal_au() {
        let data = minimal_au();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Au.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_zero_channels() {
        let mut data = minimal_au();
        data[20..24].copy_from_slice(&0u32.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Au.parse(&mut ctx).is_success());
    }
}
