//! D-Link's little-endian ROMFS variant, as shipped in many D-Link
//! firmware images: a 32-byte superblock followed by a flat table of
//! metadata entries, each either a directory body (child uid + name
//! list) or a data body, optionally LZMA-compressed.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::decompress::{self, LzmaRawDecoder, LzmaRawParams};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;
use std::io::Write as _;

const MAGIC: &[u8] = b"DLK-ROM";
const ENTRY_ALIGN: u64 = 32;
const TYPE_DIR: u32 = 0x0000_0001;
const TYPE_DATA: u32 = 0x0000_0008;
const TYPE_LZMA: u32 = 0x005B_0000;

struct MetaEntry {
    ty: u32,
    decompressed_size: u64,
    body_offset: u64,
    uid: u32,
}

pub struct DlinkRomfs;

impl Parser for DlinkRomfs {
    fn pretty_name(&self) -> &'static str {
        "dlink-romfs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["romfs"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 32 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "dlink-romfs: short superblock").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if let Err(e) = cursor.expect_magic(MAGIC) {
            return e.into();
        }
        macro_rules! try_read {
            ($e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                }
            };
        }
        let _reserved = try_read!(cursor.read_vec(9));
        let root_uid = try_read!(cursor.read_u32_le());
        let fs_size = try_read!(cursor.read_u32_le()) as u64;
        let _ = try_read!(cursor.read_vec(32 - 7 - 9 - 4 - 4));
        drop(cursor);

        if fs_size == 0 || base + fs_size > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "dlink-romfs: declared size exceeds region").into();
        }

        let root = match read_entry(ctx, base + 32, filesize) {
            Ok(e) => e,
            Err(e) => return e.into(),
        };
        if root.ty & TYPE_DIR == 0 || root.uid != root_uid {
            return CarveError::new(base + 32, ErrorKind::BadStructure, "dlink-romfs: root entry is not the declared root directory").into();
        }

        let mut artifacts = Vec::new();
        if let Err(e) = walk_dir(ctx, base, filesize, &root, "", &mut artifacts, 0) {
            return e.into();
        }

        Success::tree(fs_size, artifacts).into()
    }
}

fn read_entry(ctx: &mut ParseContext<'_>, offset: u64, filesize: u64) -> Result<MetaEntry, CarveError> {
    let mut cursor = Cursor::new(ctx.region, offset, filesize)?;
    let ty = cursor.read_u32_le()?;
    cursor.skip(8)?;
    let decompressed_size = cursor.read_u32_le()? as u64;
    cursor.skip(4)?;
    let body_offset = cursor.read_u32_le()? as u64;
    cursor.skip(4)?;
    let uid = u32::from_le_bytes(
        cursor.read_vec(4)?.try_into().map_err(|_| CarveError::new(offset, ErrorKind::BadField, "dlink-romfs: bad uid field"))?,
    );
    Ok(MetaEntry { ty, decompressed_size, body_offset, uid })
}

fn walk_dir(
    ctx: &mut ParseContext<'_>,
    base: u64,
    filesize: u64,
    dir: &MetaEntry,
    prefix: &str,
    artifacts: &mut Vec<crate::carver::Artifact>,
    depth: u32,
) -> Result<(), CarveError> {
    if depth > 64 {
        return Err(CarveError::new(base, ErrorKind::BadStructure, "dlink-romfs: directory nesting too deep"));
    }
    if dir.ty & TYPE_DIR == 0 {
        return Ok(());
    }
    let body_base = base + dir.body_offset;
    if body_base >= filesize {
        return Ok(());
    }
    let mut pos = body_base;
    let body_end = (body_base + dir.decompressed_size).min(filesize);
    while pos + 8 <= body_end {
        let mut cursor = Cursor::new(ctx.region, pos, filesize)?;
        let child_uid = cursor.read_u32_le()?;
        cursor.skip(4)?;
        drop(cursor);
        if child_uid == 0 {
            break;
        }
        let mut name_end = pos + 8;
        loop {
            if name_end >= filesize {
                return Err(CarveError::new(pos, ErrorKind::NotEnoughData, "dlink-romfs: unterminated entry name"));
            }
            let mut probe = Cursor::new(ctx.region, name_end, filesize)?;
            let byte = probe.read_u8()?;
            drop(probe);
            name_end += 1;
            if byte == 0 {
                break;
            }
        }
        let mut probe = Cursor::new(ctx.region, pos + 8, filesize)?;
        let raw_name = probe.read_vec((name_end - pos - 8 - 1) as usize)?;
        drop(probe);
        let name = crate::cursor::decode_text(&raw_name);
        let full_name = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };

        // Child metadata entries are indexed by `uid`: the `uid`-th
        // 32-byte metadata slot after the superblock.
        let child_offset = base + 32 + (child_uid as u64) * ENTRY_ALIGN;
        let child = read_entry(ctx, child_offset, filesize)?;

        if child.ty & TYPE_DIR != 0 {
            walk_dir(ctx, base, filesize, &child, &full_name, artifacts, depth + 1)?;
        } else if child.ty & TYPE_DATA != 0 {
            let data_base = base + child.body_offset;
            let content = if child.ty & TYPE_LZMA == TYPE_LZMA {
                let raw = {
                    let mut c = Cursor::new(ctx.region, data_base, filesize)?;
                    c.read_vec((filesize - data_base) as usize)?
                };
                match decompress::decode_all(LzmaRawDecoder::new(LzmaRawParams::JFFS2), &raw) {
                    Ok((decoded, _)) => decoded,
                    Err(_) => raw,
                }
            } else {
                let mut c = Cursor::new(ctx.region, data_base, filesize)?;
                c.read_vec(child.decompressed_size as usize)?
            };
            let mut labels = LabelSet::new();
            labels.add(well_known::FILESYSTEM).add("dlink-romfs-entry").add(well_known::UNPACKED);
            let rel_name = sanitize_entry_name(&full_name);
            let dest_path = ctx.output_dir.join(&rel_name);
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CarveError::io(data_base, e.to_string()))?;
            }
            let guard = PartialFileGuard::create(&dest_path)?;
            let mut file = guard.file();
            file.write_all(&content).map_err(|e| CarveError::io(data_base, e.to_string()))?;
            drop(file);
            guard.commit();
            artifacts.push(Artifact::new(rel_name, labels));
        }

        pos = name_end.div_ceil(ENTRY_ALIGN) * ENTRY_ALIGN;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    #[test]
    fn rejects_short_superblock() {
        let data = vec![0u8; 16];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!DlinkRomfs.parse(&mut ctx).is_success());
    }
}
