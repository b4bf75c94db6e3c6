//! JPEG/JFIF: SOI, a sequence of marker segments (APPn, DQT, DHT, SOF,
//! DHP, COM, ...), one or more scans (each an SOS header followed by
//! entropy-coded data terminated by the next non-stuffed `0xFF` marker),
//! and EOI.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const SOI: &[u8] = &[0xFF, 0xD8];

pub struct Jpeg;

impl Parser for Jpeg {
    fn pretty_name(&self) -> &'static str {
        "jpeg"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["jpg", "jpeg"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[SOI]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 4 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "jpeg: short region").into();
        }
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(SOI).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "jpeg: bad SOI marker").into();
        }

        let mut saw_sof = false;
        loop {
            let pos = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let lead = match cursor.read_u8() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if lead != 0xFF {
                return CarveError::new(pos, ErrorKind::BadStructure, "jpeg: expected marker").into();
            }
            // Marker padding: a run of extra 0xFF fill bytes before the
            // real marker byte.
            let mut marker = match cursor.read_u8() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            while marker == 0xFF {
                marker = match cursor.read_u8() {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
            }

            if marker == 0xD8 {
                let here = match cursor.position() {
                    Ok(p) => p,
                    Err(e) => return e.into(),
                };
                return CarveError::new(here, ErrorKind::BadStructure, "jpeg: unexpected second SOI").into();
            }
            if marker == 0xD9 {
                // EOI with no scan: degenerate but well-formed.
                break;
            }
            if (0xD0..=0xD7).contains(&marker) {
                continue; // RST markers carry no length
            }
            if marker == 0x01 || marker == 0x00 {
                continue;
            }

            let seg_pos = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let seg_len = match cursor.read_u16_be() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            if seg_len < 2 {
                return CarveError::new(seg_pos, ErrorKind::BadField, "jpeg: bad segment length").into();
            }
            let seg_end = seg_pos + seg_len;
            if (0xC0..=0xCF).contains(&marker) && marker != 0xC4 && marker != 0xC8 && marker != 0xCC {
                saw_sof = true;
            }

            if marker == 0xDA {
                // Start of scan: the header ends at seg_end, entropy
                // data follows until the next real marker. Scanned one
                // or two bytes at a time, never buffered.
                if cursor.seek_abs(seg_end).is_err() {
                    return CarveError::new(seg_pos, ErrorKind::NotEnoughData, "jpeg: truncated SOS header").into();
                }
                loop {
                    let scan_pos = match cursor.position() {
                        Ok(p) => p,
                        Err(e) => return e.into(),
                    };
                    let b = match cursor.read_u8() {
                        Ok(v) => v,
                        Err(_) => {
                            return CarveError::new(scan_pos, ErrorKind::NotEnoughData, "jpeg: truncated entropy-coded scan").into();
                        }
                    };
                    if b == 0xFF {
                        let next = match cursor.read_u8() {
                            Ok(v) => v,
                            Err(_) => {
                                return CarveError::new(scan_pos, ErrorKind::NotEnoughData, "jpeg: truncated scan terminator").into();
                            }
                        };
                        if next == 0x00 || (0xD0..=0xD7).contains(&next) {
                            continue;
                        }
                        if cursor.seek_abs(scan_pos).is_err() {
                            return e_seek_fail(scan_pos).into();
                        }
                        break;
                    }
                }
                continue;
            }

            if cursor.seek_abs(seg_end).is_err() {
                return CarveError::new(seg_pos, ErrorKind::NotEnoughData, "jpeg: segment exceeds region").into();
            }
        }

        if !saw_sof {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "jpeg: no frame header").into();
        }

        let length = match cursor.position() {
            Ok(p) => p - ctx.offset,
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS);
        match finish_region(ctx, length, labels, "jpg", "jpeg") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

fn e_seek_fail(pos: u64) -> CarveError {
    CarveError::new(pos, ErrorKind::NotEnoughData, "jpeg: failed to rewind after scan terminator")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_jpeg() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend([0xFF, 0xD8]); // SOI
        // SOF0
        data.extend([0xFF, 0xC0]);
        data.extend(11u16.to_be_bytes());
        data.extend([8, 0, 1, 0, 1, 1, 0, 0, 0]);
        // SOS
        data.extend([0xFF, 0xDA]);
        data.extend(8u16.to_be_bytes());
        data.extend([1, 0, 0, 0, 1, 0]);
        data.extend([0x11, 0x22, 0x33]); // entropy-coded data
        data.extend([0xFF, 0xD9]); // EOI
        data
    }

    #[test]
    fn accepts_minimal_jpeg() {
        let data = minimal_jpeg();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Jpeg.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_frame_header() {
        let mut data = Vec::new();
        data.extend([0xFF, 0xD8]);
        data.extend([0xFF, 0xD9]);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Jpeg.parse(&mut ctx).is_success());
    }
}
