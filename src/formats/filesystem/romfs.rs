//! Linux RomFS: a big-endian magic/size/checksum header, a NUL-padded
//! volume name, then a flat run of file headers each carrying the
//! offset of the next header in the same directory packed into the
//! same word as the entry's type and `exec` bit.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::carve_to_file;
use crate::label::{well_known, LabelSet};
use crate::path_policy::sanitize_entry_name;

const MAGIC: &[u8] = b"-rom1fs-";
const ALIGNMENT: u64 = 16;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    HardLink,
    Directory,
    File,
    SymLink,
    BlockDev,
    CharDev,
    Socket,
    Fifo,
}

impl Kind {
    fn from_mode(mode: u8) -> Option<Kind> {
        Some(match mode {
            0 => Kind::HardLink,
            1 => Kind::Directory,
            2 => Kind::File,
            3 => Kind::SymLink,
            4 => Kind::BlockDev,
            5 => Kind::CharDev,
            6 => Kind::Socket,
            7 => Kind::Fifo,
            _ => return None,
        })
    }
}

struct Entry {
    name: String,
    kind: Kind,
    data_offset: u64,
    size: u64,
}

pub struct Romfs;

impl Parser for Romfs {
    fn pretty_name(&self) -> &'static str {
        "romfs"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["romfs"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 16 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "romfs: short header").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
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

        if let Err(e) = cursor.expect_magic(MAGIC) {
            return e.into();
        }
        let rom_size = try_read!(cursor.read_u32_be()) as u64;
        let _checksum = try_read!(cursor.read_u32_be());
        // NUL-padded volume name, 16-byte aligned from the start of the
        // header (i.e. from `base`).
        let mut name_end = base + 16;
        loop {
            if name_end >= filesize {
                return CarveError::new(base, ErrorKind::NotEnoughData, "romfs: unterminated volume name").into();
            }
            let mut probe = match Cursor::new(ctx.region, name_end, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let byte = try_read!(probe.read_u8());
            drop(probe);
            name_end += 1;
            if byte == 0 {
                break;
            }
        }
        drop(cursor);
        let header_end = name_end.div_ceil(ALIGNMENT) * ALIGNMENT;
        if base + rom_size > filesize || rom_size < header_end - base {
            return CarveError::new(base, ErrorKind::BadOffset, "romfs: declared size exceeds region").into();
        }

        let mut entries = Vec::new();
        let mut max_end = header_end;
        if let Err(e) = walk_dir(ctx, base, filesize, header_end, "", &mut entries, &mut max_end, 0) {
            return e.into();
        }

        let length = (base + rom_size - base).max(max_end - base);
        let mut artifacts = Vec::new();
        for entry in entries {
            if entry.kind != Kind::File {
                continue;
            }
            let mut sub_ctx = ParseContext::new(ctx.region, filesize, entry.data_offset, ctx.output_dir.clone());
            let mut labels = LabelSet::new();
            labels.add(well_known::FILESYSTEM).add("romfs-entry");
            match carve_to_file(&mut sub_ctx, &sanitize_entry_name(&entry.name), entry.size, labels) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => return e.into(),
            }
        }

        Success::tree(length, artifacts).into()
    }
}

/// Walks one directory's linked list of file headers starting at
/// `first_offset`, recursing into sub-directories. `depth` is a simple
/// cycle guard since a malformed image could point a directory's first
/// entry back at an ancestor.
#[allow(clippy::too_many_arguments)]
fn walk_dir(
    ctx: &mut ParseContext<'_>,
    base: u64,
    filesize: u64,
    first_offset: u64,
    prefix: &str,
    entries: &mut Vec<Entry>,
    max_end: &mut u64,
    depth: u32,
) -> Result<(), CarveError> {
    if depth > 64 {
        return Err(CarveError::new(first_offset, ErrorKind::BadStructure, "romfs: directory nesting too deep"));
    }
    let mut pos = first_offset;
    if pos == 0 {
        return Ok(());
    }
    loop {
        if pos >= filesize {
            return Err(CarveError::new(pos, ErrorKind::BadOffset, "romfs: file header outside region"));
        }
        let mut cursor = Cursor::new(ctx.region, pos, filesize)?;
        let next_word = cursor.read_u32_be()?;
        let spec_info = cursor.read_u32_be()?;
        let size = cursor.read_u32_be()? as u64;
        let _checksum = cursor.read_u32_be()?;
        let name_start = pos + 16;
        drop(cursor);

        let next_offset = (next_word & !0xF) as u64;
        let mode = (next_word & 0x7) as u8;
        let exec = next_word & 0x8 != 0;
        let _ = exec;
        let kind = Kind::from_mode(mode)
            .ok_or_else(|| CarveError::new(pos, ErrorKind::BadStructure, "romfs: bad file type nibble"))?;

        let mut name_end = name_start;
        loop {
            if name_end >= filesize {
                return Err(CarveError::new(pos, ErrorKind::NotEnoughData, "romfs: unterminated entry name"));
            }
            let mut probe = Cursor::new(ctx.region, name_end, filesize)?;
            let byte = probe.read_u8()?;
            drop(probe);
            name_end += 1;
            if byte == 0 {
                break;
            }
        }
        let mut probe = Cursor::new(ctx.region, name_start, filesize)?;
        let raw_name = probe.read_vec((name_end - name_start - 1) as usize)?;
        drop(probe);
        let name = crate::cursor::decode_text(&raw_name);
        let data_offset = name_end.div_ceil(ALIGNMENT) * ALIGNMENT;

        let full_name = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };

        match kind {
            Kind::File => {
                if data_offset + size > filesize {
                    return Err(CarveError::new(pos, ErrorKind::BadOffset, "romfs: file body exceeds region"));
                }
                let end = (data_offset + size).div_ceil(ALIGNMENT) * ALIGNMENT;
                *max_end = (*max_end).max(end);
                entries.push(Entry { name: full_name, kind, data_offset, size });
            }
            Kind::SymLink => {
                if data_offset + size > filesize {
                    return Err(CarveError::new(pos, ErrorKind::BadOffset, "romfs: symlink target exceeds region"));
                }
                *max_end = (*max_end).max(data_offset + size);
            }
            Kind::Directory => {
                if name != "." && name != ".." {
                    *max_end = (*max_end).max(data_offset);
                    walk_dir(ctx, base, filesize, spec_info as u64, &full_name, entries, max_end, depth + 1)?;
                }
            }
            Kind::HardLink | Kind::BlockDev | Kind::CharDev | Kind::Socket | Kind::Fifo => {
                *max_end = (*max_end).max(data_offset);
            }
        }

        if next_offset == 0 || next_offset == pos {
            break;
        }
        pos = next_offset;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    #[test]
    fn rejects_short_header() {
        let data = vec![0u8; 8];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Romfs.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_declared_size_past_region() {
        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(0xFFFF_FFFFu32.to_be_bytes());
        data.extend(0u32.to_be_bytes());
        data.extend(b"vol\0");
        data.extend(vec![0u8; 16]);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Romfs.parse(&mut ctx).is_success());
    }
}
