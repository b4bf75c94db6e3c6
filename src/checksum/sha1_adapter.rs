//! SHA-1 adapter, used by DEX's header signature.

use super::ChecksumAdapter;
use sha1::{Digest, Sha1};

#[derive(Debug, Clone, Default)]
pub struct Sha1Adapter(Sha1);

impl Sha1Adapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1Adapter::new();
        hasher.update(bytes);
        hasher.finalize()
    }
}

impl ChecksumAdapter for Sha1Adapter {
    type Digest = [u8; 20];

    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self) -> [u8; 20] {
        self.0.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // SHA-1("abc") per FIPS 180-1 test vector.
        let digest = Sha1Adapter::digest(b"abc");
        assert_eq!(
            digest,
            [
                0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50,
                0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d
            ]
        );
    }
}
