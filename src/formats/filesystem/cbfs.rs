//! coreboot CBFS: a sequence of `LARCHIVE`-prefixed components, each
//! naming itself with a NUL-terminated string padded out to its
//! declared data offset, all 64-byte aligned. Exactly one component is
//! the `ORBC` master header.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::carve_to_file;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;

const COMPONENT_MAGIC: &[u8] = b"LARCHIVE";
const MASTER_HEADER_MAGIC: &[u8] = b"ORBC";
const ALIGNMENT: u64 = 64;

pub struct Cbfs;

impl Parser for Cbfs {
    fn pretty_name(&self) -> &'static str {
        "cbfs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cbfs"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[COMPONENT_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 24 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "cbfs: short first component").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;

        let mut pos = base;
        let mut components = Vec::new();
        let mut saw_master_header = false;

        loop {
            if filesize - pos < 24 {
                break;
            }
            let mut cursor = match Cursor::new(ctx.region, pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let magic = match cursor.read_vec(8) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if magic != COMPONENT_MAGIC {
                if components.is_empty() {
                    return CarveError::new(pos, ErrorKind::BadMagic, "cbfs: bad component magic").into();
                }
                break;
            }
            let length = match cursor.read_u32_be() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            let ty = match cursor.read_u32_be() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let _checksum = match cursor.read_u32_be() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let data_offset = match cursor.read_u32_be() {
                Ok(v) => v as u64,
                Err(e) => return e.into(),
            };
            drop(cursor);

            if data_offset < 24 || pos + data_offset > filesize {
                return CarveError::new(pos, ErrorKind::BadOffset, "cbfs: implausible data offset").into();
            }
            let name_len = data_offset - 24;
            let mut name_cursor = match Cursor::new(ctx.region, pos + 24, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let name_raw = match name_cursor.read_vec(name_len as usize) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            drop(name_cursor);
            let name_end = name_raw.iter().position(|&b| b == 0).unwrap_or(name_raw.len());
            let name = crate::cursor::decode_text(&name_raw[..name_end]);

            if pos + data_offset + length > filesize {
                return CarveError::new(pos, ErrorKind::BadOffset, "cbfs: component body exceeds region").into();
            }

            if name == "cbfs master header" || is_master_header(ctx, pos + data_offset, filesize) {
                saw_master_header = true;
            }

            components.push((name, pos + data_offset, length, ty));
            let component_len = data_offset + length;
            pos += component_len.div_ceil(ALIGNMENT) * ALIGNMENT;
            if pos >= filesize {
                break;
            }
        }

        if components.is_empty() {
            return CarveError::new(base, ErrorKind::BadStructure, "cbfs: no components found").into();
        }
        if !saw_master_header {
            return CarveError::new(base, ErrorKind::BadStructure, "cbfs: no master header component found").into();
        }

        let length = pos - base;
        let mut artifacts = Vec::new();
        for (name, data_start, size, ty) in components {
            if size == 0 {
                continue;
            }
            let mut sub_ctx = ParseContext::new(ctx.region, filesize, data_start, ctx.output_dir.clone());
            let mut labels = LabelSet::new();
            labels.add(well_known::FILESYSTEM).add("cbfs-entry").add(format!("cbfs-type-0x{ty:08x}"));
            let safe_name = if name.is_empty() { format!("component-0x{data_start:x}") } else { sanitize_entry_name(&name) };
            match carve_to_file(&mut sub_ctx, &safe_name, size, labels) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => return e.into(),
            }
        }

        Success::tree(length, artifacts).into()
    }
}

fn is_master_header(ctx: &mut ParseContext<'_>, offset: u64, filesize: u64) -> bool {
    if offset + 4 > filesize {
        return false;
    }
    match Cursor::new(ctx.region, offset, filesize).and_then(|mut c| c.read_vec(4)) {
        Ok(magic) => magic == MASTER_HEADER_MAGIC,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn component(name: &str, ty: u32, body: &[u8]) -> Vec<u8> {
        let mut name_field = name.as_bytes().to_vec();
        name_field.push(0);
        let data_offset = 24 + name_field.len() as u64;
        let mut out = Vec::new();
        out.extend(COMPONENT_MAGIC);
        out.extend((body.len() as u32).to_be_bytes());
        out.extend(ty.to_be_bytes());
        out.extend(0u32.to_be_bytes());
        out.extend((data_offset as u32).to_be_bytes());
        out.extend(&name_field);
        out.extend(body);
        while out.len() as u64 % ALIGNMENT != 0 {
            out.push(0);
        }
        out
    }

    #[test]
    fn requires_a_master_header_component() {
        let data = component("stage", 0x10, b"hello");
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Cbfs.parse(&mut ctx).is_success());
    }

    #[test]
    fn accepts_a_master_header_plus_stage() {
        let mut master_body = vec![0u8; 4];
        master_body[0..4].copy_from_slice(MASTER_HEADER_MAGIC);
        let mut data = component("cbfs master header", 0x01, &master_body);
        data.extend(component("stage", 0x10, b"hello"));
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Cbfs.parse(&mut ctx).is_success());
    }
}
