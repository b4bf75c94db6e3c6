//! CRC-32 checksum adapters.
//!
//! [`Crc32`] is the ordinary IEEE CRC-32 used by ZIP/PNG/gzip. [`Jffs2Crc32`]
//! computes the identical polynomial with the identical initial value and
//! final XOR — JFFS2 nodes use plain CRC-32 — but is kept as a distinct
//! type per §4.3 so call sites inside the JFFS2 parser read as
//! format-accurate rather than incidentally reusing an unrelated adapter.

use super::ChecksumAdapter;

#[derive(Debug, Clone)]
pub struct Crc32(crc32fast::Hasher);

impl Default for Crc32 {
    fn default() -> Self {
        Crc32(crc32fast::Hasher::new())
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(bytes: &[u8]) -> u32 {
        crc32fast::hash(bytes)
    }
}

impl ChecksumAdapter for Crc32 {
    type Digest = u32;

    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

#[derive(Debug, Clone)]
pub struct Jffs2Crc32(crc32fast::Hasher);

impl Default for Jffs2Crc32 {
    fn default() -> Self {
        Jffs2Crc32(crc32fast::Hasher::new())
    }
}

impl Jffs2Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(bytes: &[u8]) -> u32 {
        let mut crc = Jffs2Crc32::new();
        crc.update(bytes);
        crc.finalize()
    }
}

impl ChecksumAdapter for Jffs2Crc32 {
    type Digest = u32;

    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        assert_eq!(Crc32::digest(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn jffs2_variant_agrees_with_standard_crc32() {
        assert_eq!(Jffs2Crc32::digest(b"123456789"), Crc32::digest(b"123456789"));
    }
}
