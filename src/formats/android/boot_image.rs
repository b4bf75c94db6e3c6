//! Android boot image (`boot.img` / `bootimg.h`): a page-aligned header
//! addressing up to three page-padded blobs — kernel, ramdisk, and an
//! optional second-stage loader.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use std::io::Write as _;

const MAGIC: &[u8] = b"ANDROID!";
const HEADER_MIN_SIZE: u64 = 8 + 4 * 8 + 4 + 4 + 4 + 16 + 512 + 32 + 1024;

pub struct BootImage;

impl Parser for BootImage {
    fn pretty_name(&self) -> &'static str {
        "android-boot-image"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["img"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < HEADER_MIN_SIZE {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "boot image: short header").into();
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
        let kernel_size = try_read!(cursor.read_u32_le());
        let kernel_addr = try_read!(cursor.read_u32_le());
        let ramdisk_size = try_read!(cursor.read_u32_le());
        let ramdisk_addr = try_read!(cursor.read_u32_le());
        let second_size = try_read!(cursor.read_u32_le());
        let second_addr = try_read!(cursor.read_u32_le());
        let _tags_addr = try_read!(cursor.read_u32_le());
        let page_size = try_read!(cursor.read_u32_le());
        let header_version = try_read!(cursor.read_u32_le());
        let _os_version = try_read!(cursor.read_u32_le());
        let _name = try_read!(cursor.read_vec(16));
        let _cmdline = try_read!(cursor.read_vec(512));
        let _ids = try_read!(cursor.read_vec(32));
        let _extra_cmdline = try_read!(cursor.read_vec(1024));
        drop(cursor);

        let _ = (kernel_addr, ramdisk_addr, second_addr);

        if page_size == 0 || !page_size.is_power_of_two() {
            return CarveError::new(base + 36, ErrorKind::BadField, "boot image: page size is not a power of two").into();
        }
        if header_version > 2 {
            return CarveError::new(base + 44, ErrorKind::BadVersion, "boot image: unsupported header version").into();
        }
        if kernel_size == 0 {
            return CarveError::new(base, ErrorKind::BadStructure, "boot image: kernel size is zero").into();
        }
        if ramdisk_size == 0 {
            return CarveError::new(base, ErrorKind::BadStructure, "boot image: ramdisk size is zero").into();
        }

        let page_size = page_size as u64;
        let pages = |n: u64| -> u64 { n.div_ceil(page_size) * page_size };

        let header_pages = pages(HEADER_MIN_SIZE);
        let mut pos = base + header_pages;
        let mut artifacts = Vec::new();

        for (name, size) in [("kernel", kernel_size as u64), ("ramdisk", ramdisk_size as u64), ("second", second_size as u64)] {
            if size == 0 {
                continue;
            }
            if pos + size > filesize {
                return CarveError::new(pos, ErrorKind::BadOffset, format!("boot image: {name} extends past region")).into();
            }
            let mut body_cursor = match Cursor::new(ctx.region, pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let body = try_read!(body_cursor.read_vec(size as usize));
            drop(body_cursor);

            let mut labels = LabelSet::new();
            labels.add(well_known::ANDROID).add("boot-image-part");
            match write_named_artifact(ctx, name, &body, labels) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => return e.into(),
            }
            pos += pages(size);
        }

        Success::tree(pos - base, artifacts).into()
    }
}

fn write_named_artifact(ctx: &mut ParseContext<'_>, relative_name: &str, content: &[u8], labels: LabelSet) -> Result<Artifact, CarveError> {
    let dest_path = ctx.output_dir.join(relative_name);
    let guard = PartialFileGuard::create(&dest_path)?;
    let mut file = guard.file();
    file.write_all(content).map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
    drop(file);
    guard.commit();
    Ok(Artifact::new(relative_name, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn build(kernel: &[u8], ramdisk: &[u8], page_size: u32) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(MAGIC);
        h.extend((kernel.len() as u32).to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend((ramdisk.len() as u32).to_le_bytes());
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes()); // second_size
        h.extend(0u32.to_le_bytes());
        h.extend(0u32.to_le_bytes()); // tags_addr
        h.extend(page_size.to_le_bytes());
        h.extend(0u32.to_le_bytes()); // header_version
        h.extend(0u32.to_le_bytes()); // os_version
        h.extend([0u8; 16]);
        h.extend([0u8; 512]);
        h.extend([0u8; 32]);
        h.extend([0u8; 1024]);
        while (h.len() as u64) % page_size as u64 != 0 {
            h.push(0);
        }
        h.extend_from_slice(kernel);
        while (h.len() as u64) % page_size as u64 != 0 {
            h.push(0);
        }
        h.extend_from_slice(ramdisk);
        while (h.len() as u64) % page_size as u64 != 0 {
            h.push(0);
        }
        h
    }

    #[test]
    fn extracts_kernel_and_ramdisk() {
        let data = build(b"kernel-bytes", b"ramdisk-bytes", 2048);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match BootImage.parse(&mut ctx) {
            ParseOutcome::Success(success) => {
                assert_eq!(success.artifacts.len(), 2);
                assert_eq!(std::fs::read(dir.path().join("kernel")).unwrap(), b"kernel-bytes");
                assert_eq!(std::fs::read(dir.path().join("ramdisk")).unwrap(), b"ramdisk-bytes");
            }
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_zero_kernel_size() {
        let data = build(b"", b"ramdisk-bytes", 2048);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!BootImage.parse(&mut ctx).is_success());
    }
}
