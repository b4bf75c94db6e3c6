//! SquashFS: magic-only native validation, content extraction delegated
//! to `unsquashfs` (§6.3) since a from-scratch decompressor for every
//! block-compression algorithm squashfs supports is out of scope here.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::external::{ExternalTool, Gateway};
use crate::label::{well_known, LabelSet};
use std::time::Duration;

const MAGIC_LE: &[u8] = b"hsqs";
const MAGIC_BE: &[u8] = b"sqsh";
const TAIL_PADDING: u64 = 4096;

pub struct Squashfs;

impl Parser for Squashfs {
    fn pretty_name(&self) -> &'static str {
        "squashfs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["squashfs"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC_LE, MAGIC_BE]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 96 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "squashfs: short superblock").into();
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
            _ => return CarveError::new(base, ErrorKind::BadMagic, "squashfs: bad magic").into(),
        };

        macro_rules! read_u16 {
            () => {
                if big_endian { cursor.read_u16_be() } else { cursor.read_u16_le() }
            };
        }
        macro_rules! read_u32 {
            () => {
                if big_endian { cursor.read_u32_be() } else { cursor.read_u32_le() }
            };
        }
        macro_rules! read_u64 {
            () => {
                if big_endian { cursor.read_u64_be() } else { cursor.read_u64_le() }
            };
        }

        let _inode_count = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _mod_time = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _block_size = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _frag_count = match read_u32!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _compression = match read_u16!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _block_log = match read_u16!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _flags = match read_u16!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _no_ids = match read_u16!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let major = match read_u16!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let _minor = match read_u16!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if !(1..=4).contains(&major) {
            return CarveError::new(base + 28, ErrorKind::BadVersion, format!("squashfs: unsupported major version {major}")).into();
        }
        let _root_inode = match read_u64!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let bytes_used = match read_u64!() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        drop(cursor);

        if bytes_used == 0 || base + bytes_used > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "squashfs: declared size exceeds region").into();
        }
        let mut length = bytes_used;

        // Optional NUL tail padding up to the next 4096-byte boundary.
        let padded_end = (base + length).div_ceil(TAIL_PADDING) * TAIL_PADDING;
        if padded_end <= filesize && padded_end > base + length {
            length = padded_end - base;
        }

        let gateway = Gateway::default();
        if !gateway.is_available(ExternalTool::Unsquashfs) {
            return CarveError::new(base, ErrorKind::ExternalToolUnavailable, "squashfs: unsquashfs not installed").into();
        }

        let staging = match super::stage_region(ctx, bytes_used, "squashfs") {
            Ok(path) => path,
            Err(e) => return e.into(),
        };
        let dest = ctx.output_dir.join("squashfs-root");
        let dest_str = dest.to_string_lossy().into_owned();
        let staging_str = staging.to_string_lossy().into_owned();
        if let Err(e) = gateway.run(ExternalTool::Unsquashfs, &["-f", "-d", &dest_str, &staging_str], base) {
            return e.into();
        }

        let mut artifacts = Vec::new();
        match gateway.list_extracted(&dest) {
            Ok(paths) => {
                for path in paths {
                    let mut labels = LabelSet::new();
                    labels.add(well_known::FILESYSTEM).add("squashfs-entry");
                    let relative = std::path::Path::new("squashfs-root").join(&path);
                    artifacts.push(Artifact::new(relative.to_string_lossy().into_owned(), labels));
                }
            }
            Err(e) => return CarveError::io(base, e.to_string()).into(),
        }

        Success::tree(length, artifacts).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn minimal_header(major: u16) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(MAGIC_LE);
        h.extend(0u32.to_le_bytes()); // inode_count
        h.extend(0u32.to_le_bytes()); // mod_time
        h.extend(131072u32.to_le_bytes()); // block_size
        h.extend(0u32.to_le_bytes()); // frag_count
        h.extend(1u16.to_le_bytes()); // compression
        h.extend(17u16.to_le_bytes()); // block_log
        h.extend(0u16.to_le_bytes()); // flags
        h.extend(1u16.to_le_bytes()); // no_ids
        h.extend(major.to_le_bytes());
        h.extend(0u16.to_le_bytes()); // minor
        h.extend(0u64.to_le_bytes()); // root_inode
        h.extend(96u64.to_le_bytes()); // bytes_used
        h.extend(vec![0u8; 96 - h.len()]);
        h
    }

    #[test]
    fn rejects_unsupported_major_version() {
        let data = minimal_header(9);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Squashfs.parse(&mut ctx).is_success());
    }
}
