//! MD5 adapter, used by a handful of archive formats for content digests.

use super::ChecksumAdapter;

#[derive(Debug, Clone, Default)]
pub struct Md5(md5::Context);

impl Md5 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(bytes: &[u8]) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        hasher.finalize()
    }
}

impl ChecksumAdapter for Md5 {
    type Digest = [u8; 16];

    fn update(&mut self, bytes: &[u8]) {
        self.0.consume(bytes);
    }

    fn finalize(self) -> [u8; 16] {
        self.0.compute().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // MD5("") == d41d8cd98f00b204e9800998ecf8427e
        let digest = Md5::digest(b"");
        assert_eq!(
            digest,
            [
                0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
                0x42, 0x7e
            ]
        );
    }
}
