//! VDI/VMDK/qcow2 virtual disk images: full-file only. Fixed-offset
//! header fields are validated natively; conversion to a raw image is
//! delegated to `qemu-img convert` (§6.3).

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::external::{ExternalTool, Gateway};
use crate::label::{well_known, LabelSet};

const VDI_PREFIX: &[u8] = b"<<< ";
const VDI_SIGNATURE_OFFSET: u64 = 64;
const VDI_SIGNATURE: u32 = 0xbeda_107f;
const VMDK_MAGIC: &[u8] = b"KDMV";
const QCOW2_MAGIC: &[u8] = &[0x51, 0x46, 0x49, 0xfb];

enum Kind {
    Vdi,
    Vmdk,
    Qcow2,
}

pub struct VmImage;

impl Parser for VmImage {
    fn pretty_name(&self) -> &'static str {
        "vm-image"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["raw"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[VDI_PREFIX, VMDK_MAGIC, QCOW2_MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 512 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "vm-image: region too short for a header").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let prefix = match cursor.read_vec(4) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        drop(cursor);

        let (kind, extension) = match prefix.as_slice() {
            p if p == VDI_PREFIX => (Kind::Vdi, "vdi"),
            p if p == VMDK_MAGIC => (Kind::Vmdk, "vmdk"),
            p if p == QCOW2_MAGIC => (Kind::Qcow2, "qcow2"),
            _ => return CarveError::new(base, ErrorKind::BadMagic, "vm-image: unrecognized disk image magic").into(),
        };

        if let Err(e) = match kind {
            Kind::Vdi => validate_vdi(ctx, base, filesize),
            Kind::Vmdk => validate_vmdk(ctx, base, filesize),
            Kind::Qcow2 => validate_qcow2(ctx, base, filesize),
        } {
            return e.into();
        }

        let length = filesize - base;

        let gateway = Gateway::default();
        if !gateway.is_available(ExternalTool::QemuImg) {
            return CarveError::new(base, ErrorKind::ExternalToolUnavailable, "vm-image: qemu-img not installed").into();
        }
        let staging = match super::stage_region(ctx, length, extension) {
            Ok(path) => path,
            Err(e) => return e.into(),
        };
        let dest = ctx.output_dir.join("disk.raw");
        let staging_str = staging.to_string_lossy().into_owned();
        let dest_str = dest.to_string_lossy().into_owned();
        if let Err(e) = gateway.run(ExternalTool::QemuImg, &["convert", "-O", "raw", &staging_str, &dest_str], base) {
            return e.into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::FILESYSTEM).add("vm-image-raw");
        Success::carved(length, Artifact::new("disk.raw", labels)).into()
    }
}

fn validate_vdi(ctx: &mut ParseContext<'_>, base: u64, filesize: u64) -> Result<(), CarveError> {
    if base + VDI_SIGNATURE_OFFSET + 4 > filesize {
        return Err(CarveError::new(base, ErrorKind::NotEnoughData, "vdi: header too short"));
    }
    let mut cursor = Cursor::new(ctx.region, base + VDI_SIGNATURE_OFFSET, filesize)?;
    let signature = cursor.read_u32_le()?;
    if signature != VDI_SIGNATURE {
        return Err(CarveError::new(base + VDI_SIGNATURE_OFFSET, ErrorKind::BadMagic, "vdi: bad structure signature"));
    }
    let _version = cursor.read_u32_le()?;
    let header_size = cursor.read_u32_le()?;
    if header_size == 0 || header_size as u64 > filesize - base {
        return Err(CarveError::new(base, ErrorKind::BadField, "vdi: implausible header size"));
    }
    Ok(())
}

fn validate_vmdk(ctx: &mut ParseContext<'_>, base: u64, filesize: u64) -> Result<(), CarveError> {
    let mut cursor = Cursor::new(ctx.region, base + 4, filesize)?;
    let version = cursor.read_u32_le()?;
    if version == 0 || version > 3 {
        return Err(CarveError::new(base + 4, ErrorKind::BadVersion, "vmdk: unsupported sparse-extent version"));
    }
    let _flags = cursor.read_u32_le()?;
    let capacity = cursor.read_u64_le()?;
    let grain_size = cursor.read_u64_le()?;
    if grain_size == 0 || !grain_size.is_power_of_two() {
        return Err(CarveError::new(base + 20, ErrorKind::BadField, "vmdk: grain size must be a power of two"));
    }
    if capacity == 0 {
        return Err(CarveError::new(base + 12, ErrorKind::BadField, "vmdk: zero capacity"));
    }
    Ok(())
}

fn validate_qcow2(ctx: &mut ParseContext<'_>, base: u64, filesize: u64) -> Result<(), CarveError> {
    let mut cursor = Cursor::new(ctx.region, base + 4, filesize)?;
    let version = cursor.read_u32_be()?;
    if !(2..=3).contains(&version) {
        return Err(CarveError::new(base + 4, ErrorKind::BadVersion, "qcow2: unsupported version"));
    }
    let _backing_file_offset = cursor.read_u64_be()?;
    let _backing_file_size = cursor.read_u32_be()?;
    let cluster_bits = cursor.read_u32_be()?;
    if !(9..=21).contains(&cluster_bits) {
        return Err(CarveError::new(base + 20, ErrorKind::BadField, "qcow2: implausible cluster size"));
    }
    let size = cursor.read_u64_be()?;
    if size == 0 {
        return Err(CarveError::new(base + 24, ErrorKind::BadField, "qcow2: zero virtual disk size"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn minimal_qcow2() -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(QCOW2_MAGIC);
        h.extend(2u32.to_be_bytes()); // version
        h.extend(0u64.to_be_bytes()); // backing_file_offset
        h.extend(0u32.to_be_bytes()); // backing_file_size
        h.extend(16u32.to_be_bytes()); // cluster_bits (64KiB)
        h.extend((1u64 << 30).to_be_bytes()); // size
        h.extend(vec![0u8; 512 - h.len()]);
        h
    }

    #[test]
    fn rejects_zero_size_qcow2() {
        let mut data = minimal_qcow2();
        for b in &mut data[24..32] {
            *b = 0;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!VmImage.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_implausible_cluster_bits() {
        let mut data = minimal_qcow2();
        data[20..24].copy_from_slice(&99u32.to_be_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!VmImage.parse(&mut ctx).is_success());
    }
}
