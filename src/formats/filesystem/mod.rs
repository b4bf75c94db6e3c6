//! Filesystem image parsers (§4.5 "Filesystems"). `squashfs`, `ext2/3/4`,
//! and `cramfs` delegate content extraction to the external tool gateway
//! (§6.3); the rest are parsed natively.

mod cbfs;
mod cramfs;
mod dlink_romfs;
mod ext234;
mod fat1216;
mod iso9660;
mod jffs2;
mod minix;
mod romfs;
mod squashfs;
mod vm_image;

pub use cbfs::Cbfs;
pub use cramfs::Cramfs;
pub use dlink_romfs::DlinkRomfs;
pub use ext234::Ext234;
pub use fat1216::Fat1216;
pub use iso9660::Iso9660;
pub use jffs2::Jffs2;
pub use minix::MinixV1;
pub use romfs::Romfs;
pub use squashfs::Squashfs;
pub use vm_image::VmImage;

use crate::carver::ParseContext;
use crate::error::CarveError;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Copies `length` bytes of the candidate region starting at `ctx.offset`
/// into a scoped temp file under `ctx.environment.temporary_directory`
/// (falling back to `ctx.output_dir` when no scan environment was
/// configured), for parsers that shell out to an external tool expecting
/// a real file path rather than an in-memory region (§6.3).
pub(crate) fn stage_region(ctx: &mut ParseContext<'_>, length: u64, suffix: &str) -> Result<PathBuf, CarveError> {
    let dir = ctx.environment.temporary_directory.clone().unwrap_or_else(|| ctx.output_dir.clone());
    std::fs::create_dir_all(&dir).map_err(|e| CarveError::io(ctx.offset, format!("creating {}: {e}", dir.display())))?;
    let path = dir.join(format!("staged-{:x}.{suffix}", ctx.offset));

    ctx.region.seek(SeekFrom::Start(ctx.offset)).map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
    let mut file = std::fs::File::create(&path).map_err(|e| CarveError::io(ctx.offset, format!("creating {}: {e}", path.display())))?;
    let mut remaining = length;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        ctx.region.read_exact(&mut buf[..chunk]).map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
        file.write_all(&buf[..chunk]).map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
        remaining -= chunk as u64;
    }
    Ok(path)
}
