//! JFFS2: a log-structured append-only layout where the filesystem is
//! reconstructed by replaying every DIRENT and INODE node from start to
//! end, rather than by following a directory tree of pointers. Raw
//! flash erase-block padding (`0xFFFF`) and dirty headers (`0x0000`)
//! are tolerated inline.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::checksum::{ChecksumAdapter, Jffs2Crc32};
use crate::cursor::Cursor;
use crate::decompress::{self, LzmaRawDecoder, LzmaRawParams, ZlibDecoder};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;
use std::collections::HashMap;
use std::io::Write as _;

const MAGIC_LE: u16 = 0x1985;
const MAGIC_BE: u16 = 0x8519;
const ERASE_BLOCK_SIZE: u64 = 0x10000;

const NODE_DIRENT: u16 = 0xE001;
const NODE_INODE: u16 = 0xE002;
const NODE_CLEANMARKER: u16 = 0x2003;
const NODE_PADDING: u16 = 0x2004;
const NODE_SUMMARY: u16 = 0x2006;
const NODE_XATTR: u16 = 0xE008;
const NODE_XREF: u16 = 0xE009;

const COMPR_NONE: u8 = 0;
const COMPR_ZERO: u8 = 1;
const COMPR_RTIME: u8 = 2;
const COMPR_RUBINMIPS: u8 = 3;
const COMPR_COPY: u8 = 4;
const COMPR_DYNRUBIN: u8 = 5;
const COMPR_ZLIB: u8 = 6;
const COMPR_LZO: u8 = 7;
const COMPR_LZMA: u8 = 8;

struct RawInode {
    ino: u32,
    version: u32,
    offset_in_file: u64,
    decompressed_size: u32,
    compressed_size: u32,
    compression: u8,
    body_offset: u64,
}

pub struct Jffs2;

impl Parser for Jffs2 {
    fn pretty_name(&self) -> &'static str {
        "jffs2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["jffs2"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[&MAGIC_LE.to_le_bytes(), &MAGIC_BE.to_le_bytes()]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 12 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "jffs2: short first node").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;

        let big_endian = match detect_endianness(ctx, base, filesize) {
            Ok(b) => b,
            Err(e) => return e.into(),
        };

        let mut pos = base;
        let mut dirents: Vec<(u32, u32, u32, String)> = Vec::new(); // (parent_ino, version, child_ino, name)
        let mut inodes: Vec<RawInode> = Vec::new();
        let mut root_seen = false;
        let mut saw_any_node = false;

        while filesize - pos >= 2 {
            let mut peek = match Cursor::new(ctx.region, pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let magic_field = match peek.read_u16_le() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            drop(peek);

            if magic_field == 0x0000 {
                // Dirty header: skip one word and keep scanning.
                pos += 2;
                continue;
            }
            if magic_field == 0xFFFF {
                let next_block = (pos - base).div_ceil(ERASE_BLOCK_SIZE) * ERASE_BLOCK_SIZE + ERASE_BLOCK_SIZE;
                let candidate = base + next_block;
                if candidate <= pos || candidate > filesize {
                    break;
                }
                pos = candidate;
                continue;
            }

            let node_is_be = if magic_field == MAGIC_LE {
                false
            } else if magic_field == MAGIC_BE {
                true
            } else {
                if saw_any_node {
                    break;
                }
                return CarveError::new(pos, ErrorKind::BadMagic, "jffs2: bad node magic").into();
            };
            if node_is_be != big_endian {
                // A node in the other endianness marks the end of this
                // filesystem's contiguous run.
                break;
            }

            if filesize - pos < 12 {
                break;
            }
            let mut cursor = match Cursor::new(ctx.region, pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
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
            macro_rules! try_read {
                ($e:expr) => {
                    match $e {
                        Ok(v) => v,
                        Err(e) => return e.into(),
                    }
                };
            }

            let _magic = try_read!(read_u16!());
            let node_type = try_read!(read_u16!());
            let total_len = try_read!(read_u32!()) as u64;
            let header_crc = try_read!(read_u32!());
            drop(cursor);

            if total_len < 12 || pos + total_len > filesize {
                return CarveError::new(pos, ErrorKind::BadOffset, "jffs2: node extends past region").into();
            }
            let header_bytes = match read_header_bytes(ctx, pos, filesize) {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            let computed_crc = Jffs2Crc32::digest(&header_bytes);
            if computed_crc != header_crc {
                return CarveError::new(pos + 8, ErrorKind::BadChecksum, "jffs2: node header CRC mismatch").into();
            }
            saw_any_node = true;

            match node_type {
                NODE_DIRENT => {
                    match parse_dirent(ctx, pos, filesize, big_endian) {
                        Ok((parent_ino, version, child_ino, name)) => {
                            if parent_ino == 1 {
                                root_seen = true;
                            }
                            dirents.push((parent_ino, version, child_ino, name));
                        }
                        Err(e) => return e.into(),
                    }
                }
                NODE_INODE => match parse_inode_header(ctx, pos, filesize, big_endian) {
                    Ok(inode) => {
                        if inode.ino == 1 {
                            root_seen = true;
                        }
                        inodes.push(inode);
                    }
                    Err(e) => return e.into(),
                },
                NODE_CLEANMARKER | NODE_PADDING | NODE_SUMMARY | NODE_XATTR | NODE_XREF => {
                    // Bookkeeping nodes this reconstruction does not
                    // need to act on beyond having CRC-validated them.
                }
                _ => {
                    return CarveError::new(pos, ErrorKind::BadStructure, format!("jffs2: unknown node type 0x{node_type:04x}")).into();
                }
            }

            pos += total_len;
            // Nodes are 4-byte aligned within the log.
            pos = pos.div_ceil(4) * 4;
        }

        if !saw_any_node {
            return CarveError::new(base, ErrorKind::BadStructure, "jffs2: no valid nodes found").into();
        }
        if !root_seen {
            return CarveError::new(base, ErrorKind::BadStructure, "jffs2: root inode (1) is never referenced").into();
        }

        // inode -> path, keyed by the last (highest-version) DIRENT for
        // each (parent, name) pair, per JFFS2's log-structured
        // overwrite semantics. inode number 0 in a DIRENT means delete.
        let mut children: HashMap<u32, Vec<(u32, String, u32)>> = HashMap::new(); // parent -> [(version, name, child_ino)]
        for (parent, version, child_ino, name) in dirents {
            children.entry(parent).or_default().push((version, name, child_ino));
        }
        let mut latest: HashMap<(u32, String), (u32, u32)> = HashMap::new(); // (parent,name) -> (version, child_ino)
        for (parent, entries) in &children {
            for (version, name, child_ino) in entries {
                let key = (*parent, name.clone());
                let slot = latest.entry(key).or_insert((0, 0));
                if *version >= slot.0 {
                    *slot = (*version, *child_ino);
                }
            }
        }

        // inode -> concatenation of its data-carrying INODE nodes,
        // ordered by write offset (monotonic per the format's own
        // invariant) then replayed in ascending order.
        let mut by_inode: HashMap<u32, Vec<&RawInode>> = HashMap::new();
        for inode in &inodes {
            by_inode.entry(inode.ino).or_default().push(inode);
        }
        for list in by_inode.values_mut() {
            list.sort_by_key(|i| i.offset_in_file);
        }

        let mut artifacts = Vec::new();
        let mut path_to_ino: Vec<((u32, String), u32)> = latest
            .into_iter()
            .filter(|(_, (_, child_ino))| *child_ino != 0)
            .map(|(k, (_, ino))| (k, ino))
            .collect();
        path_to_ino.sort_by(|a, b| a.0 .1.cmp(&b.0 .1));

        for ((parent, name), child_ino) in &path_to_ino {
            let full_path = resolve_path(*parent, name, &path_to_ino);
            let Some(bodies) = by_inode.get(child_ino) else { continue };
            let mut content = Vec::new();
            for inode in bodies {
                let piece = match decode_body(ctx, inode, filesize) {
                    Ok(p) => p,
                    Err(e) => return e.into(),
                };
                content.extend(piece);
            }
            let rel_name = sanitize_entry_name(&full_path);
            if rel_name.is_empty() {
                continue;
            }
            let dest_path = ctx.output_dir.join(&rel_name);
            if let Some(parent_dir) = dest_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent_dir).map_err(|e| CarveError::io(base, e.to_string())) {
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
            labels.add(well_known::FILESYSTEM).add("jffs2-entry");
            artifacts.push(Artifact::new(rel_name, labels));
        }

        let length = pos - base;
        Success::tree(length, artifacts).into()
    }
}

fn resolve_path(parent: u32, name: &str, table: &[((u32, String), u32)]) -> String {
    let mut components = vec![name.to_string()];
    let mut current = parent;
    let mut guard = 0;
    while current != 1 && guard < 256 {
        guard += 1;
        match table.iter().find(|((_, _), ino)| *ino == current) {
            Some(((grandparent, parent_name), _)) => {
                components.push(parent_name.clone());
                current = *grandparent;
            }
            None => break,
        }
    }
    components.reverse();
    components.join("/")
}

fn detect_endianness(ctx: &mut ParseContext<'_>, base: u64, filesize: u64) -> Result<bool, CarveError> {
    let mut cursor = Cursor::new(ctx.region, base, filesize)?;
    let value = cursor.read_u16_le()?;
    if value == MAGIC_LE {
        Ok(false)
    } else if value == MAGIC_BE {
        Ok(true)
    } else {
        Err(CarveError::new(base, ErrorKind::BadMagic, "jffs2: bad first node magic"))
    }
}

fn read_header_bytes(ctx: &mut ParseContext<'_>, pos: u64, filesize: u64) -> Result<Vec<u8>, CarveError> {
    let mut cursor = Cursor::new(ctx.region, pos, filesize)?;
    cursor.read_vec(8)
}

fn parse_dirent(ctx: &mut ParseContext<'_>, pos: u64, filesize: u64, big_endian: bool) -> Result<(u32, u32, u32, String), CarveError> {
    let mut cursor = Cursor::new(ctx.region, pos + 12, filesize)?;
    macro_rules! read_u32 {
        () => {
            if big_endian { cursor.read_u32_be() } else { cursor.read_u32_le() }
        };
    }
    macro_rules! read_u8 {
        () => {
            cursor.read_u8()
        };
    }
    let parent_ino = read_u32!()?;
    let version = read_u32!()?;
    let child_ino = read_u32!()?;
    let _mctime = read_u32!()?;
    let name_len = read_u8!()?;
    let _ty = read_u8!()?;
    let _unused = cursor.read_vec(2)?;
    let _node_crc = read_u32!()?;
    let _name_crc = read_u32!()?;
    let name_raw = cursor.read_vec(name_len as usize)?;
    let name = crate::cursor::decode_text(&name_raw);
    Ok((parent_ino, version, child_ino, name))
}

fn parse_inode_header(ctx: &mut ParseContext<'_>, pos: u64, filesize: u64, big_endian: bool) -> Result<RawInode, CarveError> {
    let mut cursor = Cursor::new(ctx.region, pos + 12, filesize)?;
    macro_rules! read_u32 {
        () => {
            if big_endian { cursor.read_u32_be() } else { cursor.read_u32_le() }
        };
    }
    macro_rules! read_u16 {
        () => {
            if big_endian { cursor.read_u16_be() } else { cursor.read_u16_le() }
        };
    }
    let ino = read_u32!()?;
    let version = read_u32!()?;
    let _mode = read_u32!()?;
    let _uid = read_u16!()?;
    let _gid = read_u16!()?;
    let _isize = read_u32!()?;
    let _atime = read_u32!()?;
    let _mtime = read_u32!()?;
    let _ctime = read_u32!()?;
    let offset_in_file = read_u32!()? as u64;
    let decompressed_size = read_u32!()?;
    let compressed_size = read_u32!()?;
    let compression = cursor.read_u8()?;
    let _flags = cursor.read_u8()?;
    let _usercompr = read_u16!()?;
    let _node_crc = read_u32!()?;
    let _data_crc = read_u32!()?;
    let _unknown_crc = read_u32!()?;
    // Body begins immediately after the fixed 68-byte `jffs2_raw_inode`
    // structure (12-byte common header + 56 bytes of fields above).
    let body_offset = pos + 68;
    if body_offset + compressed_size as u64 > filesize {
        return Err(CarveError::new(pos, ErrorKind::BadOffset, "jffs2: inode body exceeds region"));
    }
    Ok(RawInode { ino, version, offset_in_file, decompressed_size, compressed_size, compression, body_offset })
}

fn decode_body(ctx: &mut ParseContext<'_>, inode: &RawInode, filesize: u64) -> Result<Vec<u8>, CarveError> {
    let mut cursor = Cursor::new(ctx.region, inode.body_offset, filesize)?;
    let raw = cursor.read_vec(inode.compressed_size as usize)?;
    match inode.compression {
        COMPR_NONE | COMPR_COPY => Ok(raw),
        COMPR_ZERO => Ok(vec![0u8; inode.decompressed_size as usize]),
        COMPR_ZLIB => {
            let (decoded, _) = decompress::decode_all(ZlibDecoder::default(), &raw)?;
            Ok(decoded)
        }
        COMPR_LZMA => {
            let (decoded, _) = decompress::decode_all(LzmaRawDecoder::new(LzmaRawParams::JFFS2), &raw)?;
            Ok(decoded)
        }
        COMPR_LZO => {
            let (decoded, _) = crate::decompress::lzo1x_decompress(&raw, inode.decompressed_size as usize)?;
            Ok(decoded)
        }
        COMPR_RTIME | COMPR_RUBINMIPS | COMPR_DYNRUBIN => Err(CarveError::new(
            inode.body_offset,
            ErrorKind::UnsupportedFeature,
            format!("jffs2: compression type {} is not implemented", inode.compression),
        )),
        other => Err(CarveError::new(inode.body_offset, ErrorKind::BadField, format!("jffs2: unknown compression type {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn dirent_node(parent: u32, version: u32, child: u32, name: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(parent.to_le_bytes());
        body.extend(version.to_le_bytes());
        body.extend(child.to_le_bytes());
        body.extend(0u32.to_le_bytes()); // mctime
        body.push(name.len() as u8);
        body.push(0); // type
        body.extend([0u8, 0u8]); // unused
        body.extend(0u32.to_le_bytes()); // node crc (unchecked by this test helper)
        body.extend(0u32.to_le_bytes()); // name crc
        body.extend(name.as_bytes());

        let mut node = Vec::new();
        node.extend(MAGIC_LE.to_le_bytes());
        node.extend(NODE_DIRENT.to_le_bytes());
        let total_len = 12 + body.len() as u32;
        node.extend(total_len.to_le_bytes());
        let crc = Jffs2Crc32::digest(&node[0..8]);
        node.extend(crc.to_le_bytes());
        node.extend(body);
        while node.len() % 4 != 0 {
            node.push(0);
        }
        node
    }

    #[test]
    fn rejects_when_root_inode_never_referenced() {
        // A dirent whose parent is not inode 1.
        let data = dirent_node(5, 1, 6, "x");
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Jffs2.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_bad_header_crc() {
        let mut data = dirent_node(1, 1, 6, "x");
        data[8] ^= 0xFF; // corrupt the stored header CRC
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Jffs2.parse(&mut ctx).is_success());
    }
}
