//! CPIO archives: the "new ASCII"/"new CRC" format (magic `070701`/
//! `070702`, 8-hex-digit fields) and the legacy "old ASCII" format
//! (magic `070707`, 6-octal-digit fields). Both are record-linked and
//! terminated by a member named `TRAILER!!!`.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::carve_to_file;
use crate::label::LabelSet;
use crate::path_policy::sanitize_entry_name;

const TRAILER: &str = "TRAILER!!!";

pub struct CpioNew;

impl Parser for CpioNew {
    fn pretty_name(&self) -> &'static str {
        "cpio"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cpio"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"070701", b"070702"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        parse_new_ascii(ctx)
    }
}

fn parse_new_ascii(ctx: &mut ParseContext<'_>) -> ParseOutcome {
    if ctx.remaining() < 110 {
        return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "cpio: short region").into();
    }
    let base = ctx.offset;
    let filesize = ctx.filesize;
    let mut members = Vec::new();
    let mut pos = base;

    loop {
        if filesize - pos < 110 {
            return CarveError::new(pos, ErrorKind::NotEnoughData, "cpio: truncated header").into();
        }
        let mut cursor = match Cursor::new(ctx.region, pos, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let magic = match cursor.read_vec(6) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if magic != b"070701" && magic != b"070702" {
            return CarveError::new(pos, ErrorKind::BadMagic, "cpio: bad magic").into();
        }
        let mut hex_fields = [0u32; 11];
        for field in hex_fields.iter_mut() {
            let raw = match cursor.read_vec(8) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            *field = match std::str::from_utf8(&raw).ok().and_then(|s| u32::from_str_radix(s, 16).ok()) {
                Some(v) => v,
                None => return CarveError::new(pos, ErrorKind::BadField, "cpio: unparsable hex field").into(),
            };
        }
        let filesize_field = hex_fields[6] as u64;
        let namesize = hex_fields[10] as u64;
        if namesize == 0 {
            return CarveError::new(pos, ErrorKind::BadField, "cpio: zero-length name").into();
        }
        let header_end = match cursor.position() {
            Ok(p) => p,
            Err(e) => return e.into(),
        };
        let name_raw = match cursor.read_vec((namesize - 1) as usize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let name = crate::cursor::decode_text(&name_raw);
        // Name field (incl. NUL) is padded to a 4-byte boundary measured
        // from the start of the header.
        let name_field_end = header_end + namesize;
        let padded_name_end = align4(name_field_end - base) + base;
        if cursor.seek_abs(padded_name_end).is_err() {
            return CarveError::new(padded_name_end, ErrorKind::BadOffset, "cpio: name padding exceeds region").into();
        }
        let data_start = padded_name_end;
        if data_start + filesize_field > filesize {
            return CarveError::new(pos, ErrorKind::BadOffset, "cpio: body exceeds region").into();
        }

        if name == TRAILER {
            let body_end = data_start + filesize_field;
            let end = align4(body_end - base) + base;
            drop(cursor);
            let length = end.min(filesize) - base;

            let mut artifacts = Vec::new();
            for (member_name, member_start, member_size) in members {
                let mut sub_ctx = ParseContext::new(ctx.region, filesize, member_start, ctx.output_dir.clone());
                let mut labels = LabelSet::new();
                labels.add("cpio").add("unpacked");
                match carve_to_file(&mut sub_ctx, &sanitize_entry_name(&member_name), member_size, labels) {
                    Ok(artifact) => artifacts.push(artifact),
                    Err(e) => return e.into(),
                }
            }
            return Success::tree(length, artifacts).into();
        }

        members.push((name, data_start, filesize_field));
        let body_end = data_start + filesize_field;
        pos = align4(body_end - base) + base;
        if pos > filesize {
            return CarveError::new(body_end, ErrorKind::BadOffset, "cpio: body padding exceeds region").into();
        }
    }
}

fn align4(len: u64) -> u64 {
    (len + 3) & !3
}

/// The legacy "old ASCII" variant (`070707` magic, 6-octal-digit
/// fields, no alignment padding between records).
pub struct CpioOld;

impl Parser for CpioOld {
    fn pretty_name(&self) -> &'static str {
        "cpio-odc"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cpio"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"070707"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 76 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "cpio-odc: short region").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut members = Vec::new();
        let mut pos = base;

        loop {
            if filesize - pos < 76 {
                return CarveError::new(pos, ErrorKind::NotEnoughData, "cpio-odc: truncated header").into();
            }
            let mut cursor = match Cursor::new(ctx.region, pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            if cursor.expect_magic(b"070707").is_err() {
                return CarveError::new(pos, ErrorKind::BadMagic, "cpio-odc: bad magic").into();
            }
            let mut octal_fields = [0u32; 12];
            for (i, field) in octal_fields.iter_mut().enumerate() {
                let width = if i == 10 { 11 } else { 6 };
                let raw = match cursor.read_vec(width) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
                *field = match std::str::from_utf8(&raw).ok().and_then(|s| u32::from_str_radix(s.trim(), 8).ok()) {
                    Some(v) => v,
                    None => return CarveError::new(pos, ErrorKind::BadField, "cpio-odc: unparsable octal field").into(),
                };
            }
            let namesize = octal_fields[9] as u64;
            let filesize_field = octal_fields[11] as u64;
            let name_raw = match cursor.read_vec(namesize as usize) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let name = crate::cursor::decode_text(&name_raw);
            let data_start = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            if data_start + filesize_field > filesize {
                return CarveError::new(pos, ErrorKind::BadOffset, "cpio-odc: body exceeds region").into();
            }

            if name.trim_end_matches('\0') == TRAILER {
                drop(cursor);
                let length = (data_start + filesize_field) - base;
                let mut artifacts = Vec::new();
                for (member_name, member_start, member_size) in members {
                    let mut sub_ctx = ParseContext::new(ctx.region, filesize, member_start, ctx.output_dir.clone());
                    let mut labels = LabelSet::new();
                    labels.add("cpio").add("unpacked");
                    match carve_to_file(&mut sub_ctx, &sanitize_entry_name(&member_name), member_size, labels) {
                        Ok(artifact) => artifacts.push(artifact),
                        Err(e) => return e.into(),
                    }
                }
                return Success::tree(length, artifacts).into();
            }

            members.push((name, data_start, filesize_field));
            pos = data_start + filesize_field;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn new_ascii_header(magic: &str, name: &str, filesize: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(magic.as_bytes());
        let namesize = name.len() as u64 + 1;
        let fields = [0u32, 0, 0, 0, 1, 0, filesize as u32, 0, 0, 0, namesize as u32];
        for f in fields {
            out.extend(format!("{f:08x}").into_bytes());
        }
        out.extend(name.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn new_ascii_body(data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    #[test]
    fn parses_a_minimal_new_ascii_archive() {
        let mut data = new_ascii_header("070701", "hello.txt", 2);
        data.extend(new_ascii_body(b"hi"));
        data.extend(new_ascii_header("070701", TRAILER, 0));

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match CpioNew.parse(&mut ctx) {
            ParseOutcome::Success(success) => {
                assert_eq!(success.artifacts.len(), 1);
                assert_eq!(success.artifacts[0].relative_path, "hello.txt");
            }
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; 128];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!CpioNew.parse(&mut ctx).is_success());
    }
}
