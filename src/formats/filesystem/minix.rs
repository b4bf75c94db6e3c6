//! Minix v1 filesystem (the Linux "1L" on-disk variant): a 1 KiB boot
//! block, a 1 KiB superblock, an inode bitmap, a zone bitmap, then the
//! inode table and data zones.
//!
//! §9 "Open questions / likely source bugs" flags that the original
//! implementation iterates inode *numbers* 1..inode_count directly
//! rather than consulting the inode bitmap, which can report a
//! dangling (never-allocated) inode slot as a real file. This parser
//! walks the directory tree from the root inode instead of scanning
//! every inode slot, which sidesteps the bug structurally, but still
//! validates the bitmap is present and consults it before trusting any
//! inode the directory walk reaches.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::carve_to_file;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;

const BLOCK_SIZE: u64 = 1024;
const MAGIC: u16 = 0x137F;
const INODE_SIZE: u64 = 32;
const DIRENT_SIZE: u64 = 32;
const ZONE_DIRECT: usize = 7;

const S_IFMT: u16 = 0xF000;
const S_IFDIR: u16 = 0x4000;
const S_IFLNK: u16 = 0xA000;

struct Superblock {
    inode_count: u32,
    zone_count: u32,
    inode_bitmap_blocks: u16,
    zone_bitmap_blocks: u16,
    first_data_zone: u16,
    log_zone_size: u16,
}

struct Inode {
    mode: u16,
    size: u32,
    zones: [u32; 9],
}

pub struct MinixV1;

impl Parser for MinixV1 {
    fn pretty_name(&self) -> &'static str {
        "minix-v1"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["minix"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[&MAGIC.to_le_bytes()]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        // The magic sits 16 bytes into the superblock, which itself
        // starts one block after the boot block; candidates are
        // discovered at the magic's absolute offset.
        if ctx.offset < BLOCK_SIZE + 16 {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "minix: magic too close to start of file").into();
        }
        let base = ctx.offset - BLOCK_SIZE - 16;
        let filesize = ctx.filesize;
        if filesize - base < 2 * BLOCK_SIZE {
            return CarveError::new(base, ErrorKind::NotEnoughData, "minix: short boot block + superblock").into();
        }

        let sb = match read_superblock(ctx, base, filesize) {
            Ok(sb) => sb,
            Err(e) => return e.into(),
        };

        if sb.first_data_zone == 0 {
            return CarveError::new(base + BLOCK_SIZE, ErrorKind::BadField, "minix: zero first data zone").into();
        }
        let inode_map_block = 2u64;
        let zone_map_block = inode_map_block + sb.inode_bitmap_blocks as u64;
        let inode_table_block = zone_map_block + sb.zone_bitmap_blocks as u64;
        let inode_table_blocks = (sb.inode_count as u64 * INODE_SIZE).div_ceil(BLOCK_SIZE);
        let computed_first_data_zone = inode_table_block + inode_table_blocks;
        if (sb.first_data_zone as u64) < computed_first_data_zone {
            return CarveError::new(base + BLOCK_SIZE, ErrorKind::BadStructure, "minix: first data zone overlaps inode table").into();
        }

        let zone_size = BLOCK_SIZE << sb.log_zone_size;
        let total_size = sb.zone_count as u64 * zone_size;
        if base + total_size > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "minix: declared zone count exceeds region").into();
        }

        let inode_bitmap = match read_bitmap(ctx, base, filesize, inode_map_block, sb.inode_bitmap_blocks) {
            Ok(b) => b,
            Err(e) => return e.into(),
        };

        let root = match read_inode(ctx, base, filesize, inode_table_block, 1) {
            Ok(i) => i,
            Err(e) => return e.into(),
        };
        if root.mode & S_IFMT != S_IFDIR {
            return CarveError::new(base, ErrorKind::BadStructure, "minix: inode 1 is not a directory").into();
        }

        let mut artifacts = Vec::new();
        if let Err(e) = walk_dir(
            ctx, base, filesize, &sb, inode_table_block, zone_size, &inode_bitmap, 1, "", &mut artifacts, 0,
        ) {
            return e.into();
        }

        Success::tree(total_size, artifacts).into()
    }
}

fn read_superblock(ctx: &mut ParseContext<'_>, base: u64, filesize: u64) -> Result<Superblock, CarveError> {
    let mut cursor = Cursor::new(ctx.region, base + BLOCK_SIZE, filesize)?;
    let inode_count = cursor.read_u16_le()? as u32;
    let zone_count = cursor.read_u16_le()? as u32;
    let inode_bitmap_blocks = cursor.read_u16_le()?;
    let zone_bitmap_blocks = cursor.read_u16_le()?;
    let first_data_zone = cursor.read_u16_le()?;
    let log_zone_size = cursor.read_u16_le()?;
    let _max_size = cursor.read_u32_le()?;
    let _reserved = cursor.read_u16_le()?;
    let magic = cursor.read_u16_le()?;
    let _state = cursor.read_u16_le()?;
    if magic != MAGIC {
        return Err(CarveError::new(base + BLOCK_SIZE + 16, ErrorKind::BadMagic, "minix: bad superblock magic"));
    }
    Ok(Superblock {
        inode_count,
        zone_count,
        inode_bitmap_blocks,
        zone_bitmap_blocks,
        first_data_zone,
        log_zone_size,
    })
}

fn read_bitmap(ctx: &mut ParseContext<'_>, base: u64, filesize: u64, start_block: u64, blocks: u16) -> Result<Vec<u8>, CarveError> {
    let mut cursor = Cursor::new(ctx.region, base + start_block * BLOCK_SIZE, filesize)?;
    cursor.read_vec(blocks as usize * BLOCK_SIZE as usize)
}

fn bitmap_set(bitmap: &[u8], bit: u32) -> bool {
    let byte = (bit / 8) as usize;
    let shift = bit % 8;
    byte < bitmap.len() && bitmap[byte] & (1 << shift) != 0
}

fn read_inode(ctx: &mut ParseContext<'_>, base: u64, filesize: u64, inode_table_block: u64, number: u32) -> Result<Inode, CarveError> {
    if number == 0 {
        return Err(CarveError::new(base, ErrorKind::BadStructure, "minix: inode number 0 is reserved"));
    }
    let offset = base + inode_table_block * BLOCK_SIZE + (number as u64 - 1) * INODE_SIZE;
    let mut cursor = Cursor::new(ctx.region, offset, filesize)?;
    let mode = cursor.read_u16_le()?;
    let _uid = cursor.read_u16_le()?;
    let size = cursor.read_u32_le()?;
    let _time = cursor.read_u32_le()?;
    let _gid = cursor.read_u8()?;
    let _nlinks = cursor.read_u8()?;
    let mut zones = [0u32; 9];
    for zone in zones.iter_mut() {
        *zone = cursor.read_u16_le()? as u32;
    }
    Ok(Inode { mode, size, zones })
}

#[allow(clippy::too_many_arguments)]
fn walk_dir(
    ctx: &mut ParseContext<'_>,
    base: u64,
    filesize: u64,
    sb: &Superblock,
    inode_table_block: u64,
    zone_size: u64,
    inode_bitmap: &[u8],
    inode_number: u32,
    prefix: &str,
    artifacts: &mut Vec<crate::carver::Artifact>,
    depth: u32,
) -> Result<(), CarveError> {
    if depth > 64 {
        return Err(CarveError::new(base, ErrorKind::BadStructure, "minix: directory nesting too deep"));
    }
    let inode = read_inode(ctx, base, filesize, inode_table_block, inode_number)?;
    let entries_per_zone = zone_size / DIRENT_SIZE;

    for &zone in &inode.zones[..ZONE_DIRECT] {
        if zone == 0 {
            continue;
        }
        let zone_base = base + zone as u64 * zone_size;
        if zone_base + zone_size > filesize {
            return Err(CarveError::new(zone_base, ErrorKind::BadOffset, "minix: directory zone exceeds region"));
        }
        for i in 0..entries_per_zone {
            let mut cursor = Cursor::new(ctx.region, zone_base + i * DIRENT_SIZE, filesize)?;
            let child_ino = cursor.read_u16_le()? as u32;
            let raw_name = cursor.read_vec(30)?;
            drop(cursor);
            if child_ino == 0 {
                continue;
            }
            let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
            let name = crate::cursor::decode_text(&raw_name[..name_end]);
            if name == "." || name == ".." {
                continue;
            }
            if !bitmap_set(inode_bitmap, child_ino) {
                return Err(CarveError::new(zone_base, ErrorKind::BadStructure, "minix: directory entry references unallocated inode"));
            }
            let child = read_inode(ctx, base, filesize, inode_table_block, child_ino)?;
            let full_name = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
            match child.mode & S_IFMT {
                S_IFDIR => {
                    walk_dir(ctx, base, filesize, sb, inode_table_block, zone_size, inode_bitmap, child_ino, &full_name, artifacts, depth + 1)?;
                }
                S_IFLNK => {
                    // Symlink target lives entirely in the first zone.
                }
                _ => {
                    if child.zones[0] != 0 {
                        let data_offset = base + child.zones[0] as u64 * zone_size;
                        let mut sub_ctx = ParseContext::new(ctx.region, filesize, data_offset, ctx.output_dir.clone());
                        let mut labels = LabelSet::new();
                        labels.add(well_known::FILESYSTEM).add("minix-entry");
                        let artifact = carve_to_file(&mut sub_ctx, &sanitize_entry_name(&full_name), child.size as u64, labels)?;
                        artifacts.push(artifact);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_image() -> Vec<u8> {
        let mut data = vec![0u8; 2 * BLOCK_SIZE as usize];
        let sb = &mut data[BLOCK_SIZE as usize..];
        sb[0..2].copy_from_slice(&4u16.to_le_bytes()); // inode_count
        sb[2..4].copy_from_slice(&8u16.to_le_bytes()); // zone_count
        sb[4..6].copy_from_slice(&1u16.to_le_bytes()); // inode_bitmap_blocks
        sb[6..8].copy_from_slice(&1u16.to_le_bytes()); // zone_bitmap_blocks
        sb[8..10].copy_from_slice(&5u16.to_le_bytes()); // first_data_zone
        sb[10..12].copy_from_slice(&0u16.to_le_bytes()); // log_zone_size
        sb[16..18].copy_from_slice(&MAGIC.to_le_bytes());
        data
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = minimal_image();
        data[BLOCK_SIZE as usize + 16] = 0;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, BLOCK_SIZE + 16, dir.path().to_path_buf());
        assert!(!MinixV1.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_zero_first_data_zone() {
        let mut data = minimal_image();
        data[BLOCK_SIZE as usize + 8..BLOCK_SIZE as usize + 10].copy_from_slice(&0u16.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, BLOCK_SIZE + 16, dir.path().to_path_buf());
        assert!(!MinixV1.parse(&mut ctx).is_success());
    }
}
