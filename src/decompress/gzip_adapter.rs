use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};

/// A single RFC 1952 gzip member (header, deflate body, CRC32+ISIZE
/// trailer). `flate2::read::GzDecoder` stops at the end of one member,
/// which is exactly the carving boundary this format needs.
#[derive(Default)]
pub struct GzipDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for GzipDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = GzDecoder::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("gzip: {e}")))?;
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
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn gzip_round_trips_and_reports_trailing_garbage() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"member payload").unwrap();
        let mut framed = encoder.finish().unwrap();
        framed.extend_from_slice(b"NEXTMEMBER");

        let (decoded, consumed) = decode_all(GzipDecoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"member payload");
        assert_eq!(consumed, framed.len() - "NEXTMEMBER".len());
    }
}
