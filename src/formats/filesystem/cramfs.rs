//! CramFS: endianness-detected magic, version-2 superblock validated
//! natively; content extraction delegated to `fsck.cramfs -x` (§6.3).

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::external::{ExternalTool, Gateway};
use crate::label::{well_known, LabelSet};

const MAGIC_LE: &[u8] = &[0x45, 0x3d, 0xcd, 0x28];
const MAGIC_BE: &[u8] = &[0x28, 0xcd, 0x3d, 0x45];
const SIGNATURE: &[u8] = b"Compressed ROMFS";
const FLAG_FSID_VERSION_2: u32 = 0x0000_0001;
const SUPERBLOCK_SIZE: u64 = 64 + 12;

pub struct Cramfs;

impl Parser for Cramfs {
    fn pretty_name(&self) -> &'static str {
        "cramfs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cramfs"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC_LE, MAGIC_BE]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < SUPERBLOCK_SIZE {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "cramfs: short superblock").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let magic = match cursor.read_vec(4) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let big_endian = match magic.as_slice() {
            m if m == MAGIC_LE => false,
            m if m == MAGIC_BE => true,
            _ => return CarveError::new(base, ErrorKind::BadMagic, "cramfs: bad magic").into(),
        };

        macro_rules! read_u32 {
            () => {
                if big_endian { cursor.read_u32_be() } else { cursor.read_u32_le() }
            };
        }

        let total_size = match read_u32!() {
            Ok(v) => v as u64,
            Err(e) => return e.into(),
        };
        let flags = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if flags & FLAG_FSID_VERSION_2 == 0 {
            return CarveError::new(base + 8, ErrorKind::BadVersion, "cramfs: only version 2 superblocks are supported").into();
        }
        if let Err(e) = cursor.skip(4) {
            return e.into(); // future
        }
        let signature = match cursor.read_vec(16) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if signature != SIGNATURE {
            return CarveError::new(base + 16, ErrorKind::BadMagic, "cramfs: bad signature string").into();
        }
        let _crc = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _edition = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let blocks = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let files = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if let Err(e) = cursor.skip(16) {
            return e.into(); // volume name
        }

        let root_word0 = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let root_word1 = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let root_word2 = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        drop(cursor);

        let root_mode = (root_word0 & 0xFFFF) as u16;
        let _root_uid = (root_word0 >> 16) as u16;
        let root_size = root_word1 & 0x00FF_FFFF;
        let _root_gid = (root_word1 >> 24) as u8;
        let root_namelen = root_word2 & 0x3F;
        let root_offset = (root_word2 >> 6) as u64 * 4;

        if root_mode & 0xF000 != 0x4000 {
            return CarveError::new(base + 64, ErrorKind::BadStructure, "cramfs: root inode is not a directory").into();
        }
        if root_namelen != 0 && root_namelen > 0x3F {
            return CarveError::new(base + 72, ErrorKind::BadField, "cramfs: implausible root name length").into();
        }
        if root_offset != 0 && base + root_offset > filesize {
            return CarveError::new(base + 72, ErrorKind::BadOffset, "cramfs: root directory offset exceeds region").into();
        }
        let _ = root_size;

        if total_size == 0 || base + total_size > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "cramfs: declared size exceeds region").into();
        }
        if blocks == 0 && files > 0 {
            return CarveError::new(base + 40, ErrorKind::BadStructure, "cramfs: non-empty filesystem with zero blocks").into();
        }

        let gateway = Gateway::default();
        if !gateway.is_available(ExternalTool::FsckCramfs) {
            return CarveError::new(base, ErrorKind::ExternalToolUnavailable, "cramfs: fsck.cramfs not installed").into();
        }
        let staging = match super::stage_region(ctx, total_size, "cramfs") {
            Ok(path) => path,
            Err(e) => return e.into(),
        };
        let dest = ctx.output_dir.join("cramfs-root");
        if let Err(e) = std::fs::create_dir_all(&dest).map_err(|e| CarveError::io(base, e.to_string())) {
            return e.into();
        }
        let dest_str = dest.to_string_lossy().into_owned();
        let staging_str = staging.to_string_lossy().into_owned();
        if let Err(e) = gateway.run(ExternalTool::FsckCramfs, &["-x", &dest_str, &staging_str], base) {
            return e.into();
        }

        let mut artifacts = Vec::new();
        match gateway.list_extracted(&dest) {
            Ok(paths) => {
                for path in paths {
                    let mut labels = LabelSet::new();
                    labels.add(well_known::FILESYSTEM).add("cramfs-entry");
                    let relative = std::path::Path::new("cramfs-root").join(&path);
                    artifacts.push(Artifact::new(relative.to_string_lossy().into_owned(), labels));
                }
            }
            Err(e) => return CarveError::io(base, e.to_string()).into(),
        }

        Success::tree(total_size, artifacts).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn minimal_header(version2: bool) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(MAGIC_LE);
        h.extend(256u32.to_le_bytes()); // size
        h.extend(if version2 { FLAG_FSID_VERSION_2.to_le_bytes() } else { 0u32.to_le_bytes() });
        h.extend(0u32.to_le_bytes()); // future
        h.extend(SIGNATURE);
        h.extend(0u32.to_le_bytes()); // crc
        h.extend(0u32.to_le_bytes()); // edition
        h.extend(1u32.to_le_bytes()); // blocks
        h.extend(0u32.to_le_bytes()); // files
        h.extend(vec![0u8; 16]); // volume name
        let mode_uid: u32 = 0x4000; // mode=0o040000 (dir), uid=0
        h.extend(mode_uid.to_le_bytes());
        h.extend(0u32.to_le_bytes()); // size/gid
        h.extend(0u32.to_le_bytes()); // namelen/offset
        h.extend(vec![0u8; 256 - h.len()]);
        h
    }

    #[test]
    fn rejects_version_1_superblock() {
        let data = minimal_header(false);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Cramfs.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_signature() {
        let mut data = minimal_header(true);
        data[16] = b'X';
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Cramfs.parse(&mut ctx).is_success());
    }
}
