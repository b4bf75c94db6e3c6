use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use bzip2::read::BzDecoder;
use std::io::{Cursor, Read};

/// bzip2 stream (`.bz2`, BZIP2 member of XAR's compressed ToC, ZIP
/// method 12).
#[derive(Default)]
pub struct Bzip2Decoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for Bzip2Decoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = BzDecoder::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("bzip2: {e}")))?;
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
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    #[test]
    fn bzip2_round_trips() {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"forensic carving payload").unwrap();
        let framed = encoder.finish().unwrap();

        let (decoded, consumed) = decode_all(Bzip2Decoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"forensic carving payload");
        assert_eq!(consumed, framed.len());
    }
}
