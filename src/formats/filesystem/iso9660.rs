//! ISO 9660, with the System Use Sharing Protocol (SUSP) extensions
//! Rock Ridge layers on top of it: long names (`NM`), symlinks (`SL`),
//! per-block zlib compression (`ZF`/zisofs), and the `CL`/`PL`
//! directory-relocation pair used when a deep path would otherwise
//! exceed the plain ISO 9660 depth limit.
//!
//! Relocation is resolved in two passes rather than during the walk
//! itself (§9 "Cyclic references in ISO relocations"): pass one walks
//! every directory extent exactly as the on-disk tree presents it,
//! recording each node's nominal parent extent plus, where present, the
//! `PL` extent a relocated directory's own `.` entry names as its
//! *original* parent. Pass two reparents any node whose `PL` fired,
//! then resolves every node's final path by walking parent links up to
//! the root — so a directory is placed under its original parent even
//! though the walk first reached it through `/RR_MOVED`.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::decompress::{self, ZlibDecoder};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;
use std::collections::HashMap;
use std::io::Write as _;

const SECTOR: u64 = 2048;
const SYSTEM_AREA_SECTORS: u64 = 16;
const VD_MAGIC: &[u8] = b"CD001";
const VD_PRIMARY: u8 = 1;
const VD_TERMINATOR: u8 = 255;
const ZISOFS_MAGIC: &[u8] = &[0x37, 0xe4, 0x53, 0x96, 0xc9, 0xdb, 0xd6, 0x07];

struct Node {
    extent: u64,
    parent_extent: u64,
    name: String,
    is_dir: bool,
    size: u64,
    symlink_target: Option<String>,
    zisofs: bool,
}

pub struct Iso9660;

impl Parser for Iso9660 {
    fn pretty_name(&self) -> &'static str {
        "iso9660"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["iso"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[VD_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        // A volume descriptor's `CD001` magic sits one byte into its
        // 2048-byte sector; candidates are discovered at the magic.
        if ctx.offset < 1 {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "iso9660: magic too close to start of file").into();
        }
        let sector_start = ctx.offset - 1;
        if (sector_start) % SECTOR != 0 {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "iso9660: volume descriptor not sector-aligned").into();
        }
        if sector_start < SYSTEM_AREA_SECTORS * SECTOR {
            return CarveError::new(ctx.offset, ErrorKind::BadOffset, "iso9660: volume descriptor precedes the system area").into();
        }
        let base = sector_start - SYSTEM_AREA_SECTORS * SECTOR;
        let filesize = ctx.filesize;

        if filesize - base < (SYSTEM_AREA_SECTORS + 2) * SECTOR {
            return CarveError::new(base, ErrorKind::NotEnoughData, "iso9660: too short for system area plus descriptors").into();
        }

        let mut pvd_sector = None;
        let mut saw_terminator = false;
        let mut sector = SYSTEM_AREA_SECTORS;
        loop {
            let sec_base = base + sector * SECTOR;
            if sec_base + SECTOR > filesize {
                return CarveError::new(sec_base, ErrorKind::NotEnoughData, "iso9660: truncated volume descriptor sequence").into();
            }
            let mut cursor = match Cursor::new(ctx.region, sec_base, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let ty = match cursor.read_u8() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let magic = match cursor.read_vec(5) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            drop(cursor);
            if magic != VD_MAGIC {
                return CarveError::new(sec_base, ErrorKind::BadMagic, "iso9660: bad volume descriptor magic").into();
            }
            if ty == VD_PRIMARY && pvd_sector.is_none() {
                pvd_sector = Some(sec_base);
            }
            if ty == VD_TERMINATOR {
                saw_terminator = true;
                sector += 1;
                break;
            }
            sector += 1;
            if sector > SYSTEM_AREA_SECTORS + 256 {
                return CarveError::new(base, ErrorKind::BadStructure, "iso9660: volume descriptor sequence never terminates").into();
            }
        }
        let Some(pvd_base) = pvd_sector else {
            return CarveError::new(base, ErrorKind::BadStructure, "iso9660: no Primary Volume Descriptor").into();
        };
        if !saw_terminator {
            return CarveError::new(base, ErrorKind::BadStructure, "iso9660: no Volume Descriptor Set Terminator").into();
        }

        let (volume_space_size, logical_block_size) = match read_pvd_sizes(ctx, pvd_base, filesize) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if logical_block_size == 0 {
            return CarveError::new(pvd_base + 128, ErrorKind::BadField, "iso9660: zero logical block size").into();
        }
        let total_size = volume_space_size * logical_block_size as u64;
        if base + total_size > filesize || total_size == 0 {
            return CarveError::new(pvd_base, ErrorKind::BadOffset, "iso9660: declared volume space exceeds region").into();
        }

        let (root_extent, root_size) = match read_root_directory_record(ctx, pvd_base, filesize, logical_block_size as u64) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };

        let mut nodes: Vec<Node> = Vec::new();
        let mut self_pl: HashMap<u64, u64> = HashMap::new(); // directory's own extent -> original parent extent
        if let Err(e) = walk_directory(
            ctx, base, filesize, logical_block_size as u64, root_extent, root_size, root_extent, true, &mut nodes, &mut self_pl, 0,
        ) {
            return e.into();
        }

        // Pass two: reparent any directory whose own `.` entry carried
        // a `PL` field, then resolve final paths bottom-up.
        for node in &mut nodes {
            if node.is_dir {
                if let Some(&original_parent) = self_pl.get(&node.extent) {
                    node.parent_extent = original_parent;
                }
            }
        }
        let by_extent: HashMap<u64, usize> = nodes.iter().enumerate().map(|(i, n)| (n.extent, i)).collect();

        let mut artifacts = Vec::new();
        for i in 0..nodes.len() {
            if nodes[i].is_dir {
                continue;
            }
            let path = resolve_path(i, &nodes, &by_extent, root_extent);
            let rel_name = sanitize_entry_name(&path);
            if rel_name.is_empty() {
                continue;
            }
            let node = &nodes[i];
            if let Some(target) = &node.symlink_target {
                // Recorded as metadata rather than a real symlink on
                // disk: this crate never follows or creates symlinks
                // that could point outside the output directory.
                let dest_path = ctx.output_dir.join(&rel_name);
                if let Some(parent) = dest_path.parent() {
                    if let Err(e) = std::fs::create_dir_all(parent).map_err(|e| CarveError::io(base, e.to_string())) {
                        return e.into();
                    }
                }
                let guard = match PartialFileGuard::create(&dest_path) {
                    Ok(g) => g,
                    Err(e) => return e.into(),
                };
                let mut file = guard.file();
                if let Err(e) = file.write_all(target.as_bytes()).map_err(|e| CarveError::io(base, e.to_string())) {
                    return e.into();
                }
                drop(file);
                guard.commit();
                let mut labels = LabelSet::new();
                labels.add(well_known::FILESYSTEM).add("iso9660-entry").add("symlink");
                artifacts.push(Artifact::new(rel_name, labels));
                continue;
            }

            let content = if node.zisofs {
                match read_zisofs(ctx, base + node.extent * logical_block_size as u64, filesize, node.size) {
                    Ok(c) => c,
                    Err(e) => return e.into(),
                }
            } else {
                let mut cursor = match Cursor::new(ctx.region, base + node.extent * logical_block_size as u64, filesize) {
                    Ok(c) => c,
                    Err(e) => return e.into(),
                };
                match cursor.read_vec(node.size as usize) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                }
            };

            let dest_path = ctx.output_dir.join(&rel_name);
            if let Some(parent) = dest_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent).map_err(|e| CarveError::io(base, e.to_string())) {
                    return e.into();
                }
            }
            let guard = match PartialFileGuard::create(&dest_path) {
                Ok(g) => g,
                Err(e) => return e.into(),
            };
            let mut file = guard.file();
            if let Err(e) = file.write_all(&content).map_err(|e| CarveError::io(base, e.to_string())) {
                return e.into();
            }
            drop(file);
            guard.commit();
            let mut labels = LabelSet::new();
            labels.add(well_known::FILESYSTEM).add("iso9660-entry");
            artifacts.push(Artifact::new(rel_name, labels));
        }

        Success::tree(total_size, artifacts).into()
    }
}

fn resolve_path(index: usize, nodes: &[Node], by_extent: &HashMap<u64, usize>, root_extent: u64) -> String {
    let mut components = vec![nodes[index].name.clone()];
    let mut parent_extent = nodes[index].parent_extent;
    let mut guard = 0;
    while parent_extent != root_extent && guard < 256 {
        guard += 1;
        match by_extent.get(&parent_extent) {
            Some(&parent_idx) => {
                components.push(nodes[parent_idx].name.clone());
                parent_extent = nodes[parent_idx].parent_extent;
            }
            None => break,
        }
    }
    components.reverse();
    components.join("/")
}

fn read_pvd_sizes(ctx: &mut ParseContext<'_>, pvd_base: u64, filesize: u64) -> Result<(u64, u16), CarveError> {
    let mut cursor = Cursor::new(ctx.region, pvd_base + 80, filesize)?;
    let space_le = cursor.read_u32_le()?;
    let space_be = cursor.read_u32_be()?;
    if space_le != space_be {
        return Err(CarveError::new(pvd_base + 80, ErrorKind::BadField, "iso9660: volume space size LE/BE mismatch"));
    }
    drop(cursor);
    let mut cursor = Cursor::new(ctx.region, pvd_base + 128, filesize)?;
    let block_le = cursor.read_u16_le()?;
    let block_be = cursor.read_u16_be()?;
    if block_le != block_be {
        return Err(CarveError::new(pvd_base + 128, ErrorKind::BadField, "iso9660: logical block size LE/BE mismatch"));
    }
    Ok((space_le as u64, block_le))
}

fn read_root_directory_record(ctx: &mut ParseContext<'_>, pvd_base: u64, filesize: u64, block_size: u64) -> Result<(u64, u64), CarveError> {
    let mut cursor = Cursor::new(ctx.region, pvd_base + 156, filesize)?;
    let _len = cursor.read_u8()?;
    let _ext_attr_len = cursor.read_u8()?;
    let extent_le = cursor.read_u32_le()?;
    let extent_be = cursor.read_u32_be()?;
    if extent_le != extent_be {
        return Err(CarveError::new(pvd_base + 158, ErrorKind::BadField, "iso9660: root extent LE/BE mismatch"));
    }
    let size_le = cursor.read_u32_le()?;
    let size_be = cursor.read_u32_be()?;
    if size_le != size_be {
        return Err(CarveError::new(pvd_base + 166, ErrorKind::BadField, "iso9660: root size LE/BE mismatch"));
    }
    let _ = block_size;
    Ok((extent_le as u64, size_le as u64))
}

/// Reads one directory's data and recurses into subdirectories.
/// `dir_extent`/`dir_size` locate this directory's own extent;
/// `enclosing_extent` is the extent callers should record as the
/// *parent* for entries discovered here (normally `dir_extent` itself,
/// but left as a parameter so the root's self-reference works out).
#[allow(clippy::too_many_arguments)]
fn walk_directory(
    ctx: &mut ParseContext<'_>,
    base: u64,
    filesize: u64,
    block_size: u64,
    dir_extent: u64,
    dir_size: u64,
    _enclosing_extent: u64,
    is_root: bool,
    nodes: &mut Vec<Node>,
    self_pl: &mut HashMap<u64, u64>,
    depth: u32,
) -> Result<(), CarveError> {
    if depth > 64 {
        return Err(CarveError::new(base, ErrorKind::BadStructure, "iso9660: directory nesting too deep"));
    }
    let dir_base = base + dir_extent * block_size;
    if dir_base + dir_size > filesize {
        return Err(CarveError::new(dir_base, ErrorKind::BadOffset, "iso9660: directory extent exceeds region"));
    }
    let block_count = dir_size.div_ceil(block_size);
    let mut susp_skip = 0u8;
    let mut first_record = true;

    for block in 0..block_count {
        let mut pos = dir_base + block * block_size;
        let block_end = pos + block_size;
        while pos + 1 <= block_end {
            let mut len_cursor = Cursor::new(ctx.region, pos, filesize)?;
            let record_len = len_cursor.read_u8()? as u64;
            drop(len_cursor);
            if record_len == 0 {
                break; // padding to end of block
            }
            if pos + record_len > block_end {
                return Err(CarveError::new(pos, ErrorKind::BadStructure, "iso9660: directory record crosses block boundary"));
            }

            let mut cursor = Cursor::new(ctx.region, pos + 1, filesize)?;
            let _ext_attr_len = cursor.read_u8()?;
            let extent_le = cursor.read_u32_le()?;
            let _extent_be = cursor.read_u32_be()?;
            let size_le = cursor.read_u32_le()?;
            let _size_be = cursor.read_u32_be()?;
            cursor.skip(7)?; // recording date and time
            let flags = cursor.read_u8()?;
            let _file_unit_size = cursor.read_u8()?;
            let _interleave_gap = cursor.read_u8()?;
            let _vol_seq_le = cursor.read_u16_le()?;
            let _vol_seq_be = cursor.read_u16_be()?;
            let ident_len = cursor.read_u8()? as u64;
            let ident_raw = cursor.read_vec(ident_len as usize)?;
            drop(cursor);

            let mut ident_pos = pos + 1 + 1 + 8 + 8 + 7 + 1 + 1 + 1 + 4 + ident_len;
            if ident_len % 2 == 0 {
                ident_pos += 1; // padding byte
            }
            let su_end = pos + record_len;

            let is_dot = ident_raw == [0u8];
            let is_dotdot = ident_raw == [1u8];
            let is_dir = flags & 0x02 != 0;

            let mut susp_start = ident_pos;
            if first_record && is_root {
                // The first directory record of the first extent may
                // carry SUSP's `SP` indicator before any other entry.
                if let Some(skip) = try_read_sp(ctx, susp_start, su_end, filesize)? {
                    susp_skip = skip;
                }
                first_record = false;
            }
            susp_start += susp_skip as u64;

            let susp = if susp_start < su_end {
                read_susp(ctx, susp_start, su_end, filesize)?
            } else {
                Susp::default()
            };

            if is_dot && susp.pl_extent.is_some() {
                self_pl.insert(dir_extent, susp.pl_extent.unwrap());
            }

            if is_dot || is_dotdot {
                pos += record_len;
                continue;
            }

            let name = susp.name.clone().unwrap_or_else(|| crate::cursor::decode_text(&ident_raw));
            let effective_extent = susp.cl_extent.unwrap_or(extent_le as u64);
            let size = size_le as u64;

            nodes.push(Node {
                extent: effective_extent,
                parent_extent: dir_extent,
                name: name.clone(),
                is_dir: is_dir || susp.cl_extent.is_some(),
                size,
                symlink_target: susp.symlink_target.clone(),
                zisofs: susp.zisofs,
            });

            if (is_dir || susp.cl_extent.is_some()) && susp.symlink_target.is_none() {
                walk_directory(ctx, base, filesize, block_size, effective_extent, size, effective_extent, false, nodes, self_pl, depth + 1)?;
            }

            pos += record_len;
        }
    }
    Ok(())
}

#[derive(Default)]
struct Susp {
    name: Option<String>,
    symlink_target: Option<String>,
    cl_extent: Option<u64>,
    pl_extent: Option<u64>,
    zisofs: bool,
}

fn try_read_sp(ctx: &mut ParseContext<'_>, start: u64, end: u64, filesize: u64) -> Result<Option<u8>, CarveError> {
    if start + 7 > end {
        return Ok(None);
    }
    let mut cursor = Cursor::new(ctx.region, start, filesize)?;
    let sig = cursor.read_vec(2)?;
    if sig != b"SP" {
        return Ok(None);
    }
    let _len = cursor.read_u8()?;
    let _version = cursor.read_u8()?;
    let check = cursor.read_vec(2)?;
    let skip = cursor.read_u8()?;
    if check != [0xBE, 0xEF] {
        return Ok(None);
    }
    Ok(Some(skip))
}

fn read_susp(ctx: &mut ParseContext<'_>, mut pos: u64, end: u64, filesize: u64) -> Result<Susp, CarveError> {
    let mut susp = Susp::default();
    let mut name_continuing = false;
    let mut symlink_continuing = false;
    while pos + 4 <= end {
        let mut cursor = Cursor::new(ctx.region, pos, filesize)?;
        let sig = cursor.read_vec(2)?;
        let len = cursor.read_u8()? as u64;
        let _version = cursor.read_u8()?;
        drop(cursor);
        if len < 4 || pos + len > end {
            break;
        }
        let payload_len = len - 4;
        match &sig[..] {
            b"NM" => {
                let mut c = Cursor::new(ctx.region, pos + 4, filesize)?;
                let flags = c.read_u8()?;
                let chunk = if flags & 0x02 != 0 {
                    ".".to_string()
                } else if flags & 0x04 != 0 {
                    "..".to_string()
                } else {
                    let name_bytes = c.read_vec((payload_len - 1) as usize)?;
                    crate::cursor::decode_text(&name_bytes)
                };
                if name_continuing {
                    let prefix = susp.name.take().unwrap_or_default();
                    susp.name = Some(prefix + &chunk);
                } else {
                    susp.name = Some(chunk);
                }
                name_continuing = flags & 0x01 != 0;
            }
            b"SL" => {
                let mut c = Cursor::new(ctx.region, pos + 4, filesize)?;
                let flags = c.read_u8()?;
                let mut remaining = payload_len - 1;
                let mut parts: Vec<String> = Vec::new();
                while remaining >= 2 {
                    let comp_flags = c.read_u8()?;
                    let comp_len = c.read_u8()? as u64;
                    remaining -= 2;
                    if comp_flags & 0x02 != 0 {
                        parts.push(".".to_string());
                    } else if comp_flags & 0x04 != 0 {
                        parts.push("..".to_string());
                    } else if comp_flags & 0x08 != 0 {
                        parts.push("".to_string()); // root
                    } else {
                        let bytes = c.read_vec(comp_len as usize)?;
                        remaining -= comp_len;
                        parts.push(crate::cursor::decode_text(&bytes));
                    }
                }
                let chunk = parts.join("/");
                if symlink_continuing {
                    let prefix = susp.symlink_target.take().unwrap_or_default();
                    susp.symlink_target = Some(prefix + &chunk);
                } else {
                    susp.symlink_target = Some(chunk);
                }
                symlink_continuing = flags & 0x01 != 0;
            }
            b"CL" => {
                let mut c = Cursor::new(ctx.region, pos + 4, filesize)?;
                let extent_le = c.read_u32_le()?;
                susp.cl_extent = Some(extent_le as u64);
            }
            b"PL" => {
                let mut c = Cursor::new(ctx.region, pos + 4, filesize)?;
                let extent_le = c.read_u32_le()?;
                susp.pl_extent = Some(extent_le as u64);
            }
            b"ZF" => {
                susp.zisofs = true;
            }
            b"CE" => {
                // Continuation area: one level is followed, no deeper.
                let mut c = Cursor::new(ctx.region, pos + 4, filesize)?;
                let block_le = c.read_u32_le()?;
                let _block_be = c.read_u32_be()?;
                let off_le = c.read_u32_le()?;
                let _off_be = c.read_u32_be()?;
                let clen_le = c.read_u32_le()?;
                let _clen_be = c.read_u32_be()?;
                drop(c);
                let ce_start = block_le as u64 * 2048 + off_le as u64;
                let ce_end = ce_start + clen_le as u64;
                if ce_end <= filesize {
                    if let Ok(extra) = read_susp(ctx, ce_start, ce_end, filesize) {
                        if susp.name.is_none() {
                            susp.name = extra.name;
                        }
                        if susp.symlink_target.is_none() {
                            susp.symlink_target = extra.symlink_target;
                        }
                        susp.cl_extent = susp.cl_extent.or(extra.cl_extent);
                        susp.pl_extent = susp.pl_extent.or(extra.pl_extent);
                        susp.zisofs = susp.zisofs || extra.zisofs;
                    }
                }
            }
            _ => {
                // RR, PX, TF, PD, PN, SF and anything unrecognized:
                // presence-only or not needed to place files on disk.
            }
        }
        pos += len;
    }
    Ok(susp)
}

/// Decodes a zisofs-compressed file: an 8-byte magic, a little-endian
/// uncompressed size, header size and block-size-log fields, then a
/// block-pointer table whose equal consecutive entries denote an
/// all-zero block.
fn read_zisofs(ctx: &mut ParseContext<'_>, file_base: u64, filesize: u64, compressed_size: u64) -> Result<Vec<u8>, CarveError> {
    let mut cursor = Cursor::new(ctx.region, file_base, filesize)?;
    let magic = cursor.read_vec(8)?;
    if magic != ZISOFS_MAGIC {
        return Err(CarveError::new(file_base, ErrorKind::BadMagic, "iso9660: bad zisofs magic"));
    }
    let uncompressed_size = cursor.read_u32_le()? as u64;
    let header_size_div4 = cursor.read_u8()? as u64;
    let log2_block_size = cursor.read_u8()? as u64;
    let _reserved = cursor.read_vec(2)?;
    drop(cursor);

    let header_size = header_size_div4 * 4;
    let block_size = 1u64 << log2_block_size;
    let block_count = uncompressed_size.div_ceil(block_size) + 1;
    let mut cursor = Cursor::new(ctx.region, file_base + header_size, filesize)?;
    let mut pointers = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        pointers.push(cursor.read_u32_le()? as u64);
    }
    drop(cursor);

    let mut out = Vec::with_capacity(uncompressed_size as usize);
    for i in 0..pointers.len() - 1 {
        let start = pointers[i];
        let end = pointers[i + 1];
        if end == start {
            out.extend(std::iter::repeat(0u8).take(block_size as usize));
            continue;
        }
        if file_base + end > filesize || end < start {
            return Err(CarveError::new(file_base + start, ErrorKind::BadOffset, "iso9660: zisofs block pointer outside file"));
        }
        let mut block_cursor = Cursor::new(ctx.region, file_base + start, filesize)?;
        let compressed = block_cursor.read_vec((end - start) as usize)?;
        let (decoded, _) = decompress::decode_all(ZlibDecoder::default(), &compressed)?;
        out.extend(decoded);
    }
    out.truncate(uncompressed_size as usize);
    let _ = compressed_size;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn pad_sector(data: &mut Vec<u8>) {
        while data.len() % SECTOR as usize != 0 {
            data.push(0);
        }
    }

    fn minimal_iso() -> Vec<u8> {
        let mut data = vec![0u8; SYSTEM_AREA_SECTORS as usize * SECTOR as usize];

        // Root directory record embedded directly after the PVD's own
        // data, at extent 17 (one block after the PVD), sized to a
        // single empty directory block.
        let root_extent = 17u32;
        let root_size = SECTOR as u32;

        let mut pvd = vec![0u8; SECTOR as usize];
        pvd[0] = 1;
        pvd[1..6].copy_from_slice(VD_MAGIC);
        pvd[6] = 1;
        let total_size = 18u32;
        pvd[80..84].copy_from_slice(&total_size.to_le_bytes());
        pvd[84..88].copy_from_slice(&total_size.to_be_bytes());
        let block_size = SECTOR as u16;
        pvd[128..130].copy_from_slice(&block_size.to_le_bytes());
        pvd[130..132].copy_from_slice(&block_size.to_be_bytes());
        // Root directory record at 156..190.
        pvd[156] = 34;
        pvd[158..162].copy_from_slice(&root_extent.to_le_bytes());
        pvd[162..166].copy_from_slice(&root_extent.to_be_bytes());
        pvd[166..170].copy_from_slice(&root_size.to_le_bytes());
        pvd[170..174].copy_from_slice(&root_size.to_be_bytes());
        pvd[181] = 0x02; // directory flag
        pvd[188] = 1; // ident length
        pvd[189] = 0; // ident "\0" (self)
        data.extend(pvd);

        let mut term = vec![0u8; SECTOR as usize];
        term[0] = 255;
        term[1..6].copy_from_slice(VD_MAGIC);
        term[6] = 1;
        data.extend(term);

        // Root directory extent (block 17): "." and ".." records only.
        let mut root_block = vec![0u8; SECTOR as usize];
        let dot = dir_record(root_extent, root_size, 0x02, &[0u8]);
        root_block[0..dot.len()].copy_from_slice(&dot);
        let dotdot = dir_record(root_extent, root_size, 0x02, &[1u8]);
        root_block[dot.len()..dot.len() + dotdot.len()].copy_from_slice(&dotdot);
        data.extend(root_block);

        pad_sector(&mut data);
        data
    }

    fn dir_record(extent: u32, size: u32, flags: u8, ident: &[u8]) -> Vec<u8> {
        let mut ident_field = ident.to_vec();
        let mut len = 33 + ident_field.len();
        if ident_field.len() % 2 == 0 {
            ident_field.push(0);
            len += 1;
        }
        let mut rec = Vec::new();
        rec.push(len as u8);
        rec.push(0); // ext attr len
        rec.extend(extent.to_le_bytes());
        rec.extend(extent.to_be_bytes());
        rec.extend(size.to_le_bytes());
        rec.extend(size.to_be_bytes());
        rec.extend([0u8; 7]);
        rec.push(flags);
        rec.push(0);
        rec.push(0);
        rec.extend(1u16.to_le_bytes());
        rec.extend(1u16.to_be_bytes());
        rec.push(ident.len() as u8);
        rec.extend(ident_field);
        rec
    }

    #[test]
    fn accepts_minimal_volume_with_pvd_and_terminator() {
        let data = minimal_iso();
        let pvd_magic_offset = SYSTEM_AREA_SECTORS * SECTOR + 1;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, pvd_magic_offset, dir.path().to_path_buf());
        match Iso9660.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, 18 * SECTOR),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_endian_mirrors() {
        let mut data = minimal_iso();
        let pvd_base = SYSTEM_AREA_SECTORS as usize * SECTOR as usize;
        data[pvd_base + 84] ^= 0xFF; // corrupt the big-endian mirror
        let pvd_magic_offset = SYSTEM_AREA_SECTORS * SECTOR + 1;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, pvd_magic_offset, dir.path().to_path_buf());
        assert!(!Iso9660.parse(&mut ctx).is_success());
    }
}
