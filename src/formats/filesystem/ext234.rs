//! ext2/ext3/ext4: superblock validation (including the sparse-superblock
//! backup-group derivation) done natively; content extraction delegated
//! to the `e2tools` external gateway (§6.3).

use super::stage_region;
use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::external::{ExternalTool, Gateway};
use crate::label::{well_known, LabelSet};

const SUPERBLOCK_OFFSET: u64 = 1024;
const MAGIC_OFFSET: u64 = 0x38;
const MAGIC: u16 = 0xEF53;
const RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;

pub struct Ext234;

impl Parser for Ext234 {
    fn pretty_name(&self) -> &'static str {
        "ext234"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["img"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < SUPERBLOCK_OFFSET + 264 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "ext234: region too short for a superblock").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let sb_base = base + SUPERBLOCK_OFFSET;
        let mut cursor = match Cursor::new(ctx.region, sb_base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };

        macro_rules! try_read {
            ($e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                }
            };
        }

        let inodes_count = try_read!(cursor.read_u32_le());
        let blocks_count = try_read!(cursor.read_u32_le());
        let r_blocks_count = try_read!(cursor.read_u32_le());
        let free_blocks_count = try_read!(cursor.read_u32_le());
        let free_inodes_count = try_read!(cursor.read_u32_le());
        let first_data_block = try_read!(cursor.read_u32_le());
        let log_block_size = try_read!(cursor.read_u32_le());
        let _log_frag_size = try_read!(cursor.read_u32_le());
        let blocks_per_group = try_read!(cursor.read_u32_le());
        let _frags_per_group = try_read!(cursor.read_u32_le());
        let _inodes_per_group = try_read!(cursor.read_u32_le());
        if let Err(e) = cursor.skip(4 + 4 + 2 + 2) {
            return e.into(); // mtime, wtime, mnt_count, max_mnt_count
        }
        let magic = try_read!(cursor.read_u16_le());
        if magic != MAGIC {
            return CarveError::new(sb_base, ErrorKind::BadMagic, "ext234: bad superblock magic").into();
        }
        if let Err(e) = cursor.skip(2 + 2 + 2 + 4 + 4 + 4 + 4) {
            return e.into(); // state, errors, minor_rev, lastcheck, checkinterval, creator_os, rev_level
        }
        let rev_level_offset_check = 0; // rev_level already consumed above
        let _ = rev_level_offset_check;
        if let Err(e) = cursor.skip(2 + 2) {
            return e.into(); // def_resuid, def_resgid
        }

        if inodes_count == 0 || blocks_count == 0 {
            return CarveError::new(sb_base, ErrorKind::BadField, "ext234: zero inode or block count").into();
        }
        if r_blocks_count > blocks_count {
            return CarveError::new(sb_base + 8, ErrorKind::BadField, "ext234: reserved blocks exceed total").into();
        }
        if free_blocks_count > blocks_count {
            return CarveError::new(sb_base + 12, ErrorKind::BadField, "ext234: free blocks exceed total").into();
        }
        if free_inodes_count > inodes_count {
            return CarveError::new(sb_base + 16, ErrorKind::BadField, "ext234: free inodes exceed total").into();
        }
        if first_data_block != 0 && first_data_block != 1 {
            return CarveError::new(sb_base + 20, ErrorKind::BadField, "ext234: first data block must be 0 or 1").into();
        }
        if log_block_size > 6 {
            return CarveError::new(sb_base + 24, ErrorKind::BadField, "ext234: implausible block size exponent").into();
        }
        let block_size = 1024u64 << log_block_size;
        if blocks_per_group == 0 {
            return CarveError::new(sb_base + 32, ErrorKind::BadField, "ext234: zero blocks per group").into();
        }

        // Re-read the dynamic-rev fields (rev_level, inode_size) with a
        // fresh cursor rather than threading the running one through the
        // fixed skips above.
        let mut dyn_cursor = match Cursor::new(ctx.region, sb_base + 76, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let rev_level = try_read!(dyn_cursor.read_u32_le());
        if rev_level > 1 {
            return CarveError::new(sb_base + 76, ErrorKind::BadVersion, "ext234: unsupported revision level").into();
        }
        let inode_size = if rev_level == 0 {
            128
        } else {
            let _def_resuid = try_read!(dyn_cursor.read_u16_le());
            let _def_resgid = try_read!(dyn_cursor.read_u16_le());
            let _first_ino = try_read!(dyn_cursor.read_u32_le());
            try_read!(dyn_cursor.read_u16_le()) as u64
        };
        if inode_size > block_size {
            return CarveError::new(sb_base + 88, ErrorKind::BadField, "ext234: inode size exceeds block size").into();
        }

        let feature_ro_compat = if rev_level == 1 {
            let mut feature_cursor = match Cursor::new(ctx.region, sb_base + 100, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            try_read!(feature_cursor.read_u32_le())
        } else {
            0
        };
        let sparse_super = feature_ro_compat & RO_COMPAT_SPARSE_SUPER != 0;

        let group_count = (blocks_count as u64).div_ceil(blocks_per_group as u64);
        for group in 0..group_count {
            if !sparse_super || has_backup_superblock(group) {
                let group_first_block = first_data_block as u64 + group * blocks_per_group as u64;
                let backup_byte_offset = base + group_first_block * block_size;
                if backup_byte_offset + 1024 > filesize {
                    return CarveError::new(backup_byte_offset, ErrorKind::BadOffset, format!("ext234: backup superblock for group {group} extends past region")).into();
                }
                let mut backup_cursor = match Cursor::new(ctx.region, backup_byte_offset + MAGIC_OFFSET, filesize) {
                    Ok(c) => c,
                    Err(e) => return e.into(),
                };
                let backup_magic = try_read!(backup_cursor.read_u16_le());
                if backup_magic != MAGIC {
                    return CarveError::new(backup_byte_offset, ErrorKind::BadChecksum, format!("ext234: backup superblock for group {group} has bad magic")).into();
                }
            }
        }

        let length = blocks_count as u64 * block_size;
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "ext234: declared filesystem size exceeds region").into();
        }

        let gateway = Gateway::default();
        if !gateway.is_available(ExternalTool::E2ls) {
            return CarveError::new(base, ErrorKind::ExternalToolUnavailable, "ext234: e2tools not installed").into();
        }
        let staging = match stage_region(ctx, length, "ext") {
            Ok(path) => path,
            Err(e) => return e.into(),
        };
        let dest = ctx.output_dir.join("ext-root");
        if let Err(e) = std::fs::create_dir_all(&dest).map_err(|e| CarveError::io(base, e.to_string())) {
            return e.into();
        }
        let dest_str = dest.to_string_lossy().into_owned();
        let source_spec = format!("{}:/", staging.to_string_lossy());
        if let Err(e) = gateway.run(ExternalTool::E2cp, &["-p", "-a", &source_spec, &dest_str], base) {
            return e.into();
        }

        let mut artifacts = Vec::new();
        match gateway.list_extracted(&dest) {
            Ok(paths) => {
                for path in paths {
                    let mut labels = LabelSet::new();
                    labels.add(well_known::FILESYSTEM).add("ext234-entry");
                    let relative = std::path::Path::new("ext-root").join(&path);
                    artifacts.push(Artifact::new(relative.to_string_lossy().into_owned(), labels));
                }
            }
            Err(e) => return CarveError::io(base, e.to_string()).into(),
        }

        Success::tree(length, artifacts).into()
    }
}

/// Sparse-superblock backup placement (`ext2_group_sparse` in the Linux
/// kernel): group 0 and 1 always carry a backup; beyond that, only
/// groups whose index is a power of 3, 5, or 7.
fn has_backup_superblock(group: u64) -> bool {
    if group == 0 || group == 1 {
        return true;
    }
    [3u64, 5, 7].iter().any(|&base| is_power_of(group, base))
}

fn is_power_of(mut n: u64, base: u64) -> bool {
    if n == 0 {
        return false;
    }
    while n % base == 0 {
        n /= base;
    }
    n == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_groups_match_powers_of_3_5_7() {
        assert!(has_backup_superblock(0));
        assert!(has_backup_superblock(1));
        assert!(has_backup_superblock(3));
        assert!(has_backup_superblock(5));
        assert!(has_backup_superblock(7));
        assert!(has_backup_superblock(9));
        assert!(has_backup_superblock(25));
        assert!(!has_backup_superblock(2));
        assert!(!has_backup_superblock(4));
        assert!(!has_backup_superblock(6));
    }
}
