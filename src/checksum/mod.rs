//! Checksum adapters (§4.3): Adler-32, CRC-32 (standard and the
//! JFFS2-labeled variant), SHA-1, MD5 — all exposed as incremental
//! `update(bytes)` / `finalize()` updaters so parsers can fold a
//! checksum over a region while streaming it, rather than buffering the
//! whole region just to checksum it.

mod adler32;
mod crc32;
mod md5_adapter;
mod sha1_adapter;

pub use adler32::Adler32;
pub use crc32::{Crc32, Jffs2Crc32};
pub use md5_adapter::Md5;
pub use sha1_adapter::Sha1Adapter;

/// Common shape for every checksum adapter in this module.
pub trait ChecksumAdapter {
    type Digest;
    fn update(&mut self, bytes: &[u8]);
    fn finalize(self) -> Self::Digest;
}
