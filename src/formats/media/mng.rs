//! MNG (Multiple-image Network Graphics): the same length+type+data+CRC
//! chunk stream PNG uses, under an 8-byte MNG signature, opening with a
//! fixed 28-byte `MHDR` chunk and terminated by `MEND`. Embedded PNG/JNG
//! sub-datastreams (their own nested `IHDR`..`IEND` runs) are carried
//! through byte-exactly as ordinary chunks, the same way this crate
//! never re-encodes PNG's own `IDAT` payloads.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::checksum::{ChecksumAdapter, Crc32};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const SIGNATURE: &[u8] = &[0x8A, b'M', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const CHUNK_HASH_WINDOW: usize = 64 * 1024;

pub struct Mng;

impl Parser for Mng {
    fn pretty_name(&self) -> &'static str {
        "mng"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mng"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[SIGNATURE]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 8 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "mng: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(SIGNATURE).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "mng: bad signature").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS).add(well_known::ANIMATED);
        let mut pos = ctx.offset + 8;
        let mut saw_mhdr = false;
        let mut saw_mend = false;
        loop {
            if pos + 8 > filesize {
                return CarveError::new(pos, ErrorKind::NotEnoughData, "mng: truncated chunk header").into();
            }
            let len = match cursor.read_u32_be() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            let ty = match cursor.read_vec(4) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if pos + 12 + len > filesize {
                return CarveError::new(pos, ErrorKind::NotEnoughData, "mng: chunk body exceeds region").into();
            }

            let mut hasher = Crc32::new();
            hasher.update(&ty);
            let mut remaining = len;
            while remaining > 0 {
                let take = remaining.min(CHUNK_HASH_WINDOW as u64) as usize;
                let chunk = match cursor.read_vec(take) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
                hasher.update(&chunk);
                remaining -= take as u64;
            }
            let crc_actual = hasher.finalize();
            let crc_stored = match cursor.read_u32_be() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if crc_stored != crc_actual {
                return CarveError::new(pos, ErrorKind::BadChecksum, "mng: chunk CRC mismatch").into();
            }

            match ty.as_slice() {
                b"MHDR" => {
                    if pos != ctx.offset + 8 {
                        return CarveError::new(pos, ErrorKind::BadStructure, "mng: MHDR not first chunk").into();
                    }
                    if len != 28 {
                        return CarveError::new(pos, ErrorKind::BadField, "mng: MHDR must be 28 bytes").into();
                    }
                    saw_mhdr = true;
                }
                b"BACK" | b"FRAM" | b"LOOP" | b"ENDL" | b"SHOW" | b"MAGN" => {
                    labels.add("mng-control");
                }
                b"IHDR" | b"JHDR" => {
                    labels.add("mng-embedded-image");
                }
                b"MEND" => {
                    saw_mend = true;
                    pos += 12 + len;
                    break;
                }
                _ => {}
            }
            pos += 12 + len;
        }

        if !saw_mhdr {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "mng: no MHDR chunk").into();
        }
        if !saw_mend {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "mng: no MEND chunk").into();
        }

        match finish_region(ctx, pos - ctx.offset, labels, "mng", "mng") {
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

    fn chunk(ty: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend((data.len() as u32).to_be_bytes());
        out.extend(ty);
        out.extend(data);
        let crc = Crc32::digest(&[ty.as_slice(), data].concat());
        out.extend(crc.to_be_bytes());
        out
    }

    fn minimal_mng() -> Vec<u8> {
        let mut data = SIGNATURE.to_vec();
        data.extend(chunk(b"MHDR", &[0u8; 28]));
        data.extend(chunk(b"MEND", &[]));
        data
    }

    #[test]
    fn accepts_minimal_mng() {
        let data = minimal_mng();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Mng.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_mhdr_length() {
        let mut data = SIGNATURE.to_vec();
        data.extend(chunk(b"MHDR", &[0u8; 20]));
        data.extend(chunk(b"MEND", &[]));
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Mng.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_mend() {
        let mut data = SIGNATURE.to_vec();
        data.extend(chunk(b"MHDR", &[0u8; 28]));
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Mng.parse(&mut ctx).is_success());
    }
}
