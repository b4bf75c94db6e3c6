use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use snap::read::FrameDecoder as SnapFrameDecoder;
use std::io::{Cursor, Read};

/// Snappy framing format (distinct from the raw unframed block format,
/// which carries no self-terminating marker and so cannot be carved by
/// length alone).
#[derive(Default)]
pub struct SnappyDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for SnappyDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = SnapFrameDecoder::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("snappy: {e}")))?;
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
    use snap::write::FrameEncoder;
    use std::io::Write;

    #[test]
    fn snappy_round_trips() {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(b"snappy frame payload").unwrap();
        let framed = encoder.into_inner().unwrap();

        let (decoded, consumed) = decode_all(SnappyDecoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"snappy frame payload");
        assert_eq!(consumed, framed.len());
    }
}
