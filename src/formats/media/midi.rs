//! Standard MIDI file: an `MThd` header chunk (always 6 bytes: format,
//! track count, division) followed by that many `MTrk` chunks, each a
//! big-endian length-prefixed stream of delta-time + event bytes.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const HEADER_MAGIC: &[u8] = b"MThd";

pub struct Midi;

impl Parser for Midi {
    fn pretty_name(&self) -> &'static str {
        "midi"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mid", "midi"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[HEADER_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 14 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "midi: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(HEADER_MAGIC).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "midi: bad MThd magic").into();
        }
        let header_len = match cursor.read_u32_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if header_len != 6 {
            return CarveError::new(ctx.offset + 4, ErrorKind::BadField, "midi: header chunk length must be 6").into();
        }
        let format = match cursor.read_u16_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if format > 2 {
            return CarveError::new(ctx.offset + 8, ErrorKind::BadField, "midi: bad format").into();
        }
        let track_count = match cursor.read_u16_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if format == 0 && track_count != 1 {
            return CarveError::new(ctx.offset + 10, ErrorKind::BadField, "midi: format 0 requires exactly one track").into();
        }
        if cursor.skip(2).is_err() {
            // division
            return CarveError::new(ctx.offset + 12, ErrorKind::NotEnoughData, "midi: truncated header").into();
        }

        for _ in 0..track_count {
            let pos = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let track_magic = match cursor.read_vec(4) {
                Ok(v) => v,
                Err(_) => return CarveError::new(pos, ErrorKind::BadStructure, "midi: expected MTrk chunk").into(),
            };
            if track_magic != b"MTrk" {
                return CarveError::new(pos, ErrorKind::BadStructure, "midi: expected MTrk chunk").into();
            }
            let track_len = match cursor.read_u32_be() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            if cursor.skip(track_len).is_err() {
                return CarveError::new(pos, ErrorKind::NotEnoughData, "midi: track body exceeds region").into();
            }
        }

        let length = match cursor.position() {
            Ok(p) => p - ctx.offset,
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add(well_known::AUDIO);
        match finish_region(ctx, length, labels, "mid", "midi") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_midi() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(HEADER_MAGIC);
        data.extend(6u32.to_be_bytes());
        data.extend(0u16.to_be_bytes()); // format
        data.extend(1u16.to_be_bytes()); // track count
        data.extend(96u16.to_be_bytes()); // division
        data.extend(b"MTrk");
        data.extend(4u32.to_be_bytes());
        data.extend([0x00, 0xFF, 0x2F, 0x00]); // end-of-track meta event
        data
    }

    #[test]
    fn accepts_minimal_midi() {
        let data = minimal_midi();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Midi.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_format_zero_with_multiple_tracks() {
        let mut data = minimal_midi();
        data[10..12].copy_from_slice(&2u16.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Midi.parse(&mut ctx).is_success());
    }
}
