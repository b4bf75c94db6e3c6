//! Small index-driven boot container formats that share one shape: a
//! magic, an entry count, a flat `(name, offset, size)` table, then the
//! blobs themselves. Qualcomm's Snapdragon boot, Huawei's boot
//! container, and the `nb0` multi-image format all fit this skeleton
//! with only the magic width and entry layout differing.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use crate::path_policy;
use std::io::Write as _;

const SNAPDRAGON_MAGIC: &[u8] = b"BOOTLDR!";
const HUAWEI_MAGIC: &[u8] = b"HWBT";
const NB0_MAGIC: &[u8] = b"NB0\0";

struct IndexEntry {
    name: String,
    offset: u64,
    size: u64,
}

pub struct SnapdragonBoot;

impl Parser for SnapdragonBoot {
    fn pretty_name(&self) -> &'static str {
        "snapdragon-boot"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[SNAPDRAGON_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        parse_indexed_container(ctx, SNAPDRAGON_MAGIC, 8, 32, "snapdragon-boot")
    }
}

pub struct HuaweiBoot;

impl Parser for HuaweiBoot {
    fn pretty_name(&self) -> &'static str {
        "huawei-boot"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[HUAWEI_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        parse_indexed_container(ctx, HUAWEI_MAGIC, 4, 16, "huawei-boot")
    }
}

pub struct Nb0;

impl Parser for Nb0 {
    fn pretty_name(&self) -> &'static str {
        "nb0"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[NB0_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        parse_indexed_container(ctx, NB0_MAGIC, 4, 64, "nb0")
    }
}

/// Shared walk for the magic+count+`(name, offset, size)` table shape.
/// `name_field_len` is the per-entry fixed-width NUL-padded name field
/// (32 bytes for Snapdragon, 16 for Huawei, 64 for nb0, matching each
/// container's published entry struct).
fn parse_indexed_container(ctx: &mut ParseContext<'_>, magic: &[u8], magic_len: usize, name_field_len: usize, format_name: &'static str) -> ParseOutcome {
    let entry_len = name_field_len as u64 + 8 + 8;
    let min_len = magic_len as u64 + 4 + entry_len;
    if ctx.remaining() < min_len {
        return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, format!("{format_name}: short header")).into();
    }
    let base = ctx.offset;
    let filesize = ctx.filesize;
    let mut cursor = match Cursor::new(ctx.region, base, filesize) {
        Ok(c) => c,
        Err(e) => return e.into(),
    };
    if let Err(e) = cursor.expect_magic(magic) {
        return e.into();
    }
    let count = match cursor.read_u32_le() {
        Ok(v) => v,
        Err(e) => return e.into(),
    };
    if count == 0 || count > 4096 {
        return CarveError::new(base + magic_len as u64, ErrorKind::BadField, format!("{format_name}: implausible entry count {count}")).into();
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw_name = match cursor.read_vec(name_field_len) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let offset = match cursor.read_u64_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let size = match cursor.read_u64_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..name_end]).into_owned();
        entries.push(IndexEntry { name, offset, size });
    }
    drop(cursor);

    let mut max_end = base + magic_len as u64 + 4 + entry_len * count as u64;
    let mut artifacts = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry.size == 0 {
            continue;
        }
        let start = base + entry.offset;
        let end = match start.checked_add(entry.size) {
            Some(v) => v,
            None => return CarveError::new(base, ErrorKind::BadStructure, format!("{format_name}: entry #{i} size overflow")).into(),
        };
        if end > filesize {
            return CarveError::new(start, ErrorKind::BadOffset, format!("{format_name}: entry #{i} extends past region")).into();
        }
        max_end = max_end.max(end);

        let mut body_cursor = match Cursor::new(ctx.region, start, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let body = match body_cursor.read_vec(entry.size as usize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        drop(body_cursor);

        let name = if entry.name.is_empty() { format!("entry-{i}") } else { path_policy::sanitize_entry_name(&entry.name) };
        let mut labels = LabelSet::new();
        labels.add(well_known::ANDROID).add(format_name);
        match write_named_artifact(ctx, &name, &body, labels) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => return e.into(),
        }
    }

    Success::tree(max_end - base, artifacts).into()
}

fn write_named_artifact(ctx: &mut ParseContext<'_>, relative_name: &str, content: &[u8], labels: LabelSet) -> Result<Artifact, CarveError> {
    let dest_path = ctx.output_dir.join(relative_name);
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CarveError::io(ctx.offset, format!("creating {}: {e}", parent.display())))?;
    }
    let guard = PartialFileGuard::create(&dest_path)?;
    let mut file = guard.file();
    file.write_all(content).map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
    drop(file);
    guard.commit();
    Ok(Artifact::new(relative_name, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn build(magic: &[u8], name_field_len: usize, entries: &[(&str, &[u8])]) -> Vec<u8> {
        let header_len = magic.len() + 4 + entries.len() * (name_field_len + 16);
        let mut bodies = Vec::new();
        let mut offsets = Vec::new();
        let mut pos = header_len as u64;
        for (_, body) in entries {
            offsets.push(pos);
            bodies.extend_from_slice(body);
            pos += body.len() as u64;
        }

        let mut out = Vec::new();
        out.extend_from_slice(magic);
        out.extend((entries.len() as u32).to_le_bytes());
        for ((name, body), offset) in entries.iter().zip(&offsets) {
            let mut name_field = vec![0u8; name_field_len];
            name_field[..name.len()].copy_from_slice(name.as_bytes());
            out.extend(name_field);
            out.extend(offset.to_le_bytes());
            out.extend((body.len() as u64).to_le_bytes());
        }
        out.extend(bodies);
        out
    }

    #[test]
    fn snapdragon_boot_extracts_named_blobs() {
        let data = build(SNAPDRAGON_MAGIC, 32, &[("sbl1", b"sbl1-bytes"), ("aboot", b"aboot-bytes")]);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match SnapdragonBoot.parse(&mut ctx) {
            ParseOutcome::Success(success) => {
                assert_eq!(success.artifacts.len(), 2);
                assert_eq!(std::fs::read(dir.path().join("sbl1")).unwrap(), b"sbl1-bytes");
            }
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn nb0_rejects_entry_past_region() {
        let mut data = build(NB0_MAGIC, 64, &[("part0", b"bytes")]);
        let len = data.len();
        data.truncate(len - 2);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Nb0.parse(&mut ctx).is_success());
    }
}
