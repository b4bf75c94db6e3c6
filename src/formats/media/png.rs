//! PNG: an 8-byte signature followed by a sequence of 4-byte-length +
//! 4-byte-type + data + 4-byte CRC chunks, terminated by `IEND`.
//! Recognizes the APNG (`acTL`/`fcTL`/`fdAT`), Android nine-patch, and
//! common textual-metadata chunk types for labeling only — every chunk's
//! bytes are carried through byte-exactly regardless of type.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::checksum::{ChecksumAdapter, Crc32};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Largest single read issued while hashing one chunk's bytes for its
/// CRC — chunk bodies are streamed in pieces this big rather than read
/// whole, per §5's memory discipline.
const CHUNK_HASH_WINDOW: usize = 64 * 1024;

pub struct Png;

impl Parser for Png {
    fn pretty_name(&self) -> &'static str {
        "png"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[SIGNATURE]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 8 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "png: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(SIGNATURE).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "png: bad signature").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        let mut pos = ctx.offset + 8;
        let mut saw_ihdr = false;
        let mut saw_iend = false;
        loop {
            if pos + 8 > filesize {
                return CarveError::new(pos, ErrorKind::NotEnoughData, "png: truncated chunk header").into();
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
                return CarveError::new(pos, ErrorKind::NotEnoughData, "png: chunk body exceeds region").into();
            }

            // Hash type+data in bounded windows rather than reading the
            // whole chunk body into one buffer up front.
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
                return CarveError::new(pos, ErrorKind::BadChecksum, "png: chunk CRC mismatch").into();
            }

            match ty.as_slice() {
                b"IHDR" => {
                    if pos != ctx.offset + 8 {
                        return CarveError::new(pos, ErrorKind::BadStructure, "png: IHDR not first chunk").into();
                    }
                    saw_ihdr = true;
                }
                b"acTL" => {
                    labels.add(well_known::ANIMATED).add(well_known::APNG);
                }
                b"IDOT" | b"iDOT" => {
                    labels.add(well_known::APPLE);
                }
                b"npTc" => {
                    labels.add(well_known::NINEPATCH);
                }
                b"tEXt" | b"zTXt" | b"iTXt" | b"eXIf" | b"tIME" => {
                    labels.add("png-metadata");
                }
                b"IEND" => {
                    saw_iend = true;
                    pos += 12 + len;
                    break;
                }
                _ => {}
            }
            pos += 12 + len;
        }

        if !saw_ihdr {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "png: no IHDR chunk").into();
        }
        if !saw_iend {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "png: no IEND chunk").into();
        }

        match finish_region(ctx, pos - ctx.offset, labels, "png", "png") {
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

    fn minimal_png() -> Vec<u8> {
        let mut data = SIGNATURE.to_vec();
        data.extend(chunk(b"IHDR", &[0u8; 13]));
        data.extend(chunk(b"IEND", &[]));
        data
    }

    #[test]
    fn accepts_minimal_png() {
        let data = minimal_png();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Png.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_crc() {
        let mut data = minimal_png();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Png.parse(&mut ctx).is_success());
    }
}
