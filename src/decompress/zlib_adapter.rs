use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use flate2::read::{DeflateDecoder, ZlibDecoder as Flate2ZlibDecoder};
use std::io::{Cursor, Read};

/// RFC 1950 zlib-framed deflate (PNG `IDAT`, Android backup's tar
/// payload, zisofs blocks, …).
#[derive(Default)]
pub struct ZlibDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for ZlibDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = Flate2ZlibDecoder::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("zlib: {e}")))?;
        let consumed = cursor.position() as usize;
        self.unused = self.buffer.len() - consumed;
        Ok(out)
    }

    fn bytes_unused(&self) -> usize {
        self.unused
    }
}

/// RFC 1951 raw deflate with no zlib/gzip framing (ZIP method 8, gzip
/// member bodies after stripping the gzip wrapper).
#[derive(Default)]
pub struct DeflateRawDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for DeflateRawDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = DeflateDecoder::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("deflate: {e}")))?;
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
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn zlib_round_trips_and_reports_trailing_garbage() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello, carve").unwrap();
        let mut framed = encoder.finish().unwrap();
        framed.extend_from_slice(b"TRAILING");

        let (decoded, consumed) = decode_all(ZlibDecoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"hello, carve");
        assert_eq!(consumed, framed.len() - 8);
    }
}
