//! Adler-32, used by zlib-framed sections and by DEX's header checksum.

use super::ChecksumAdapter;

const MOD_ADLER: u32 = 65521;

#[derive(Debug, Clone)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Adler32 { a: 1, b: 0 }
    }
}

impl Adler32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digest(bytes: &[u8]) -> u32 {
        let mut adler = Adler32::new();
        adler.update(bytes);
        adler.finalize()
    }
}

impl ChecksumAdapter for Adler32 {
    type Digest = u32;

    fn update(&mut self, bytes: &[u8]) {
        // Classic byte-at-a-time update with periodic reduction mod
        // MOD_ADLER to keep `a`/`b` from overflowing u32, same shape
        // zlib itself uses (NMAX-style chunking).
        for chunk in bytes.chunks(4096) {
            for &byte in chunk {
                self.a = self.a.wrapping_add(byte as u32);
                self.b = self.b.wrapping_add(self.a);
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    fn finalize(self) -> u32 {
        (self.b << 16) | self.a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_one() {
        assert_eq!(Adler32::digest(b""), 1);
    }

    #[test]
    fn matches_known_vector() {
        // "Wikipedia" -> 0x11E60398 per the Adler-32 Wikipedia example.
        assert_eq!(Adler32::digest(b"Wikipedia"), 0x11E60398);
    }
}
