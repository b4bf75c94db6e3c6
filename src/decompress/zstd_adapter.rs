use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use std::io::{Cursor, Read};

/// Zstandard frame (`.zst`).
#[derive(Default)]
pub struct ZstdDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for ZstdDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = zstd::stream::read::Decoder::new(&mut cursor)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("zstd: {e}")))?;
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("zstd: {e}")))?;
        let consumed = cursor.position() as usize;
        self.unused = self.buffer.len() - consumed;
        Ok(out)
    }

    fn bytes_unused(&self) -> usize {
        self.unused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompress::decode_all;

    #[test]
    fn zstd_round_trips() {
        let framed = zstd::stream::encode_all(&b"zstandard payload"[..], 3).unwrap();
        let (decoded, consumed) = decode_all(ZstdDecoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"zstandard payload");
        assert_eq!(consumed, framed.len());
    }
}
