//! Dalvik Executable (DEX) bytecode container: a 112-byte header
//! (`0x70`) addressing nine fixed-shape tables (strings, types, protos,
//! fields, methods, class defs, plus the variable-length data section
//! and the map list), each declared as a `(size, offset)` pair that
//! must resolve inside the file.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::checksum::{Adler32, ChecksumAdapter, Sha1Adapter};
use crate::cursor::{Cursor, ReadSeek};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::LabelSet;
use std::collections::HashSet;
use std::io::{Seek, SeekFrom};

pub const HEADER_SIZE: u32 = 0x70;
const SUPPORTED_VERSIONS: &[&[u8; 4]] = &[b"035\0", b"037\0", b"038\0", b"039\0"];
const ENDIAN_TAG: u32 = 0x1234_5678;

pub struct Dex;

impl Parser for Dex {
    fn pretty_name(&self) -> &'static str {
        "dex"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["dex"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"dex\n035\0", b"dex\n037\0", b"dex\n038\0", b"dex\n039\0"]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        let base = ctx.offset;
        let length = match validate_dex(ctx.region, base, ctx.filesize, true) {
            Ok(info) => info.length,
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add("android").add("dex").add(crate::label::well_known::RESOURCE);
        match finish_region(ctx, length, labels, "dex", "dex") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

pub(crate) struct DexInfo {
    pub length: u64,
}

struct Header {
    checksum: u32,
    signature: [u8; 20],
    file_size: u32,
    map_off: u32,
    string_ids_size: u32,
    string_ids_off: u32,
    type_ids_size: u32,
    type_ids_off: u32,
    proto_ids_size: u32,
    proto_ids_off: u32,
    field_ids_size: u32,
    field_ids_off: u32,
    method_ids_size: u32,
    method_ids_off: u32,
    data_size: u32,
    data_off: u32,
}

/// Validates a DEX header and its table of contents starting at `base`,
/// reading the whole declared `file_size` into memory once so every
/// sub-table walk below is plain slice indexing rather than repeated
/// seeks. When `verify_checksums` is false (ODEX's dry-run mode,
/// §4.5), the Adler-32/SHA-1 recomputation is skipped since ODEX stores
/// its own Adler-32 over the *deps*+*opt* sections instead.
pub(crate) fn validate_dex(
    region: &mut dyn ReadSeek,
    base: u64,
    filesize: u64,
    verify_checksums: bool,
) -> Result<DexInfo, CarveError> {
    if filesize - base < 70 {
        return Err(CarveError::new(base, ErrorKind::NotEnoughData, "dex: short header"));
    }
    let mut cursor = Cursor::new(region, base, filesize)?;
    cursor.expect_magic(b"dex\n")?;
    let version = cursor.read_vec(4)?;
    if !SUPPORTED_VERSIONS.iter().any(|v| v.as_slice() == version.as_slice()) {
        return Err(CarveError::new(base + 4, ErrorKind::BadVersion, "dex: unsupported version"));
    }
    let header_fields_start = 8u64;
    let checksum = cursor.read_u32_le()?;
    let mut signature = [0u8; 20];
    cursor.read_exact(&mut signature)?;
    let file_size = cursor.read_u32_le()?;
    let header_size = cursor.read_u32_le()?;
    if header_size != HEADER_SIZE {
        return Err(CarveError::new(base + 36, ErrorKind::BadField, "dex: header_size must be 0x70"));
    }
    let endian_tag = cursor.read_u32_le()?;
    if endian_tag != ENDIAN_TAG {
        return Err(CarveError::new(base + 40, ErrorKind::BadField, "dex: unsupported endian tag"));
    }
    let _link_size = cursor.read_u32_le()?;
    let _link_off = cursor.read_u32_le()?;
    let map_off = cursor.read_u32_le()?;
    let string_ids_size = cursor.read_u32_le()?;
    let string_ids_off = cursor.read_u32_le()?;
    let type_ids_size = cursor.read_u32_le()?;
    let type_ids_off = cursor.read_u32_le()?;
    let proto_ids_size = cursor.read_u32_le()?;
    let proto_ids_off = cursor.read_u32_le()?;
    let field_ids_size = cursor.read_u32_le()?;
    let field_ids_off = cursor.read_u32_le()?;
    let method_ids_size = cursor.read_u32_le()?;
    let method_ids_off = cursor.read_u32_le()?;
    let class_defs_size = cursor.read_u32_le()?;
    let class_defs_off = cursor.read_u32_le()?;
    let data_size = cursor.read_u32_le()?;
    let data_off = cursor.read_u32_le()?;
    let _ = header_fields_start;

    if base + file_size as u64 > filesize {
        return Err(CarveError::new(base, ErrorKind::BadOffset, "dex: declared file_size exceeds region"));
    }

    let header = Header {
        checksum,
        signature,
        file_size,
        map_off,
        string_ids_size,
        string_ids_off,
        type_ids_size,
        type_ids_off,
        proto_ids_size,
        proto_ids_off,
        field_ids_size,
        field_ids_off,
        method_ids_size,
        method_ids_off,
        data_size,
        data_off,
    };

    let sections: &[(&str, u32, u32)] = &[
        ("map", 0, header.map_off),
        ("string_ids", header.string_ids_size, header.string_ids_off),
        ("type_ids", header.type_ids_size, header.type_ids_off),
        ("proto_ids", header.proto_ids_size, header.proto_ids_off),
        ("field_ids", header.field_ids_size, header.field_ids_off),
        ("method_ids", header.method_ids_size, header.method_ids_off),
        ("class_defs", class_defs_size, class_defs_off),
        ("data", header.data_size, header.data_off),
    ];
    for (name, size, off) in sections {
        if *size == 0 && *off == 0 {
            continue;
        }
        if (*off) < header_size || (*off as u64) > header.file_size as u64 {
            return Err(CarveError::new(base + *off as u64, ErrorKind::BadOffset, format!("dex: {name} section starts outside [header_size, file_size)")));
        }
    }

    // Read the whole declared instance into memory: every remaining
    // check below is plain slice indexing.
    drop(cursor);
    let mut io = Cursor::new(region, base, filesize)?;
    let bytes = io.read_vec(header.file_size as usize)?;
    drop(io);
    // Leave the caller's seek position sane for whatever it does next.
    region.seek(SeekFrom::Start(base)).map_err(|e| CarveError::io(base, e.to_string()))?;

    if verify_checksums {
        let computed_sha1 = {
            let mut hasher = Sha1Adapter::new();
            hasher.update(&bytes[32..]);
            hasher.finalize()
        };
        if computed_sha1 != header.signature {
            return Err(CarveError::new(base + 12, ErrorKind::BadChecksum, "dex: SHA-1 signature mismatch"));
        }
        let computed_adler = Adler32::digest(&bytes[12..]);
        if computed_adler != header.checksum {
            return Err(CarveError::new(base + 8, ErrorKind::BadChecksum, "dex: Adler-32 checksum mismatch"));
        }
    }

    validate_type_ids(&bytes, &header)?;
    validate_proto_ids(&bytes, &header)?;
    validate_field_ids(&bytes, &header)?;
    validate_method_ids(&bytes, &header)?;
    validate_map(&bytes, header.map_off)?;

    Ok(DexInfo {
        length: header.data_off as u64 + header.data_size as u64,
    })
}

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
}

fn u16_at(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap())
}

fn validate_type_ids(bytes: &[u8], h: &Header) -> Result<(), CarveError> {
    for i in 0..h.type_ids_size as usize {
        let descriptor_idx = u32_at(bytes, h.type_ids_off as usize + i * 4);
        if descriptor_idx >= h.string_ids_size {
            return Err(CarveError::new(0, ErrorKind::BadStructure, "dex: type_id descriptor index out of range"));
        }
    }
    Ok(())
}

fn validate_proto_ids(bytes: &[u8], h: &Header) -> Result<(), CarveError> {
    for i in 0..h.proto_ids_size as usize {
        let entry = h.proto_ids_off as usize + i * 12;
        let shorty_idx = u32_at(bytes, entry);
        if shorty_idx >= h.string_ids_size {
            return Err(CarveError::new(0, ErrorKind::BadStructure, "dex: proto_id shorty index out of range"));
        }
    }
    Ok(())
}

fn validate_field_ids(bytes: &[u8], h: &Header) -> Result<(), CarveError> {
    for i in 0..h.field_ids_size as usize {
        let entry = h.field_ids_off as usize + i * 8;
        let class_idx = u16_at(bytes, entry) as u32;
        let type_idx = u16_at(bytes, entry + 2) as u32;
        let name_idx = u32_at(bytes, entry + 4);
        if class_idx >= h.type_ids_size || type_idx >= h.type_ids_size || name_idx >= h.string_ids_size {
            return Err(CarveError::new(0, ErrorKind::BadStructure, "dex: field_id index out of range"));
        }
    }
    Ok(())
}

fn validate_method_ids(bytes: &[u8], h: &Header) -> Result<(), CarveError> {
    for i in 0..h.method_ids_size as usize {
        let entry = h.method_ids_off as usize + i * 8;
        let class_idx = u16_at(bytes, entry) as u32;
        let proto_idx = u16_at(bytes, entry + 2) as u32;
        let name_idx = u32_at(bytes, entry + 4);
        if class_idx >= h.type_ids_size || proto_idx >= h.proto_ids_size || name_idx >= h.string_ids_size {
            return Err(CarveError::new(0, ErrorKind::BadStructure, "dex: method_id index out of range"));
        }
    }
    Ok(())
}

fn validate_map(bytes: &[u8], map_off: u32) -> Result<(), CarveError> {
    let off = map_off as usize;
    if off + 4 > bytes.len() {
        return Err(CarveError::new(map_off as u64, ErrorKind::BadOffset, "dex: map list offset out of range"));
    }
    let size = u32_at(bytes, off);
    let mut seen = HashSet::new();
    for i in 0..size as usize {
        let item = off + 4 + i * 12;
        if item + 12 > bytes.len() {
            return Err(CarveError::new(item as u64, ErrorKind::BadOffset, "dex: map item out of range"));
        }
        let item_type = u16_at(bytes, item);
        let in_range = (0x0000..=0x0008).contains(&item_type) || (0x1000..=0x1003).contains(&item_type) || (0x2000..=0x2006).contains(&item_type);
        if !in_range {
            return Err(CarveError::new(item as u64, ErrorKind::BadStructure, format!("dex: unknown map item type 0x{item_type:04x}")));
        }
        if !seen.insert(item_type) {
            return Err(CarveError::new(item as u64, ErrorKind::BadStructure, format!("dex: map item type 0x{item_type:04x} appears more than once")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn minimal_dex() -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(b"dex\n035\0");
        h.extend(0u32.to_le_bytes()); // checksum placeholder
        h.extend([0u8; 20]); // signature placeholder
        let header_size = 0x70u32;
        let map_off = header_size;
        let map_size_bytes = 4 + 12;
        let file_size = header_size + map_size_bytes as u32;
        h.extend(file_size.to_le_bytes());
        h.extend(header_size.to_le_bytes());
        h.extend(ENDIAN_TAG.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(map_off.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(map_off.to_le_bytes());
        assert_eq!(h.len(), header_size as usize);
        h.extend(1u32.to_le_bytes());
        h.extend(0x0000u16.to_le_bytes());
        h.extend(0u16.to_le_bytes());
        h.extend(1u32.to_le_bytes());
        h.extend(0u32.to_le_bytes());

        // Patch in real checksum/signature now that file_size bytes exist.
        let sha1 = {
            let mut hasher = Sha1Adapter::new();
            hasher.update(&h[32..]);
            hasher.finalize()
        };
        h[12..32].copy_from_slice(&sha1);
        let adler = Adler32::digest(&h[12..]);
        h[8..12].copy_from_slice(&adler.to_le_bytes());
        h
    }

    #[test]
    fn accepts_a_minimal_valid_dex() {
        let data = minimal_dex();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match Dex.parse(&mut ctx) {
            ParseOutcome::Success(success) => assert_eq!(success.length, data.len() as u64),
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_bad_endian_tag() {
        let mut data = minimal_dex();
        data[40] = 0;
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Dex.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_unknown_map_item_type() {
        let mut data = minimal_dex();
        let map_item_type_offset = 0x70 + 4;
        data[map_item_type_offset] = 0xFF;
        data[map_item_type_offset + 1] = 0xFF;
        // Recompute checksums over the corrupted body so the test
        // exercises the map-type check, not an incidental checksum fail.
        let sha1 = {
            let mut hasher = Sha1Adapter::new();
            hasher.update(&data[32..]);
            hasher.finalize()
        };
        data[12..32].copy_from_slice(&sha1);
        let adler = Adler32::digest(&data[12..]);
        data[8..12].copy_from_slice(&adler.to_le_bytes());

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Dex.parse(&mut ctx).is_success());
    }
}
