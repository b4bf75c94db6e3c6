use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use lz4_flex::frame::FrameDecoder as Lz4FrameDecoder;
use std::io::{Cursor, Read};

/// LZ4 frame format (`.lz4`), distinct from the legacy unframed block
/// format which this crate does not claim to carve.
#[derive(Default)]
pub struct Lz4Decoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for Lz4Decoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = Lz4FrameDecoder::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("lz4: {e}")))?;
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
    use lz4_flex::frame::FrameEncoder;
    use std::io::Write;

    #[test]
    fn lz4_round_trips() {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(b"lz4 frame payload").unwrap();
        let framed = encoder.finish().unwrap();

        let (decoded, consumed) = decode_all(Lz4Decoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"lz4 frame payload");
        assert_eq!(consumed, framed.len());
    }
}
