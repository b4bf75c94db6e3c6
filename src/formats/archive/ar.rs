//! Unix `ar` archive (`!<arch>\n` magic, 60-byte member headers).

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::carve_to_file;
use crate::label::LabelSet;
use crate::path_policy::sanitize_entry_name;

const MAGIC: &[u8] = b"!<arch>\n";
const HEADER_LEN: u64 = 60;

pub struct Ar;

impl Parser for Ar {
    fn pretty_name(&self) -> &'static str {
        "ar"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["a"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < MAGIC.len() as u64 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "ar: short region").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(MAGIC).is_err() {
            return CarveError::new(base, ErrorKind::BadMagic, "ar: bad magic").into();
        }

        // GNU long-filename table (member name "//") referenced by
        // later members via "/<offset>" names.
        let mut long_names: Vec<u8> = Vec::new();
        let mut members = Vec::new();

        loop {
            let remaining = match cursor.remaining() {
                Ok(r) => r,
                Err(e) => return e.into(),
            };
            if remaining == 0 {
                break;
            }
            if remaining < HEADER_LEN {
                break; // trailing padding shorter than a header: stop here
            }
            let header_start = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let name_raw = match cursor.read_vec(16) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if cursor.skip(12 + 6 + 6 + 8).is_err() {
                return CarveError::new(header_start, ErrorKind::NotEnoughData, "ar: short header").into();
            }
            let size_raw = match cursor.read_vec(10) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let end_magic = match cursor.read_vec(2) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if end_magic != b"\x60\n" {
                return CarveError::new(header_start, ErrorKind::BadField, "ar: bad member end magic").into();
            }
            let size: u64 = match std::str::from_utf8(&size_raw)
                .ok()
                .and_then(|s| s.trim().parse().ok())
            {
                Some(v) => v,
                None => return CarveError::new(header_start, ErrorKind::BadField, "ar: unparsable size field").into(),
            };
            let data_start = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            if data_start + size > filesize {
                return CarveError::new(header_start, ErrorKind::BadOffset, "ar: member size exceeds region").into();
            }
            let name = decode_name(&name_raw, &long_names);
            if name == "//" {
                long_names = match cursor.read_vec(size as usize) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
            } else if name != "/" {
                members.push((name, data_start, size));
                if cursor.skip(size).is_err() {
                    return CarveError::new(data_start, ErrorKind::BadOffset, "ar: member body exceeds region").into();
                }
            } else {
                // "/" is the symbol table; skip its body.
                if cursor.skip(size).is_err() {
                    return CarveError::new(data_start, ErrorKind::BadOffset, "ar: symbol table exceeds region").into();
                }
            }
            if size % 2 == 1 {
                let _ = cursor.skip(1); // member bodies are 2-byte aligned
            }
        }

        if members.is_empty() {
            return CarveError::new(base, ErrorKind::BadStructure, "ar: no members found").into();
        }

        let length = match cursor.position() {
            Ok(p) => p - base,
            Err(e) => return e.into(),
        };
        drop(cursor);

        let mut artifacts = Vec::new();
        for (name, data_start, size) in members {
            let mut sub_ctx = ParseContext::new(ctx.region, filesize, data_start, ctx.output_dir.clone());
            let mut labels = LabelSet::new();
            labels.add("ar").add("unpacked");
            match carve_to_file(&mut sub_ctx, &sanitize_entry_name(&name), size, labels) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => return e.into(),
            }
        }

        Success::tree(length, artifacts).into()
    }
}

fn decode_name(raw: &[u8], long_names: &[u8]) -> String {
    let trimmed = raw
        .iter()
        .rposition(|&b| b != b' ')
        .map(|end| &raw[..=end])
        .unwrap_or(&[]);
    let s = crate::cursor::decode_text(trimmed);
    let s = s.strip_suffix('/').unwrap_or(&s).to_string();
    if let Some(offset_str) = s.strip_prefix('/').filter(|rest| !rest.is_empty()) {
        if let Ok(offset) = offset_str.parse::<usize>() {
            if offset < long_names.len() {
                let slice = &long_names[offset..];
                let end = slice.iter().position(|&b| b == b'/' || b == b'\n').unwrap_or(slice.len());
                return crate::cursor::decode_text(&slice[..end]);
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn make_member(name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut name_field = format!("{name}/");
        name_field.truncate(16);
        out.extend(format!("{name_field:<16}").into_bytes());
        out.extend(format!("{:<12}", 0).into_bytes());
        out.extend(format!("{:<6}", 0).into_bytes());
        out.extend(format!("{:<6}", 0).into_bytes());
        out.extend(format!("{:<8}", "100644").into_bytes());
        out.extend(format!("{:<10}", data.len()).into_bytes());
        out.extend(b"\x60\n");
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn parses_a_minimal_archive_with_one_member() {
        let mut data = MAGIC.to_vec();
        data.extend(make_member("hello.txt", b"hi"));

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match Ar.parse(&mut ctx) {
            ParseOutcome::Success(success) => {
                assert_eq!(success.length, data.len() as u64);
                assert_eq!(success.artifacts.len(), 1);
                assert_eq!(success.artifacts[0].relative_path, "hello.txt");
            }
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; 64];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Ar.parse(&mut ctx).is_success());
    }
}
