//! LZMA1 (framed "alone" and raw with an explicit filter tuple), LZMA2,
//! and XZ, all via `xz2`'s liblzma bindings.

use super::StreamDecoder;
use crate::error::{CarveError, ErrorKind};
use std::io::{Cursor, Read};
use xz2::read::XzDecoder as Xz2Reader;
use xz2::stream::{Filters, LzmaOptions, Stream};

const NO_MEMLIMIT: u64 = u64::MAX;

/// `dict_size`/`lc`/`lp`/`pb` tuple a raw LZMA1 stream needs since, unlike
/// the framed "alone" format, it carries no self-describing properties
/// byte (JFFS2's `LZMA` compression type uses this with the fixed tuple
/// `dict_size=0x2000, lc=0, lp=0, pb=0`, §4.5).
#[derive(Debug, Clone, Copy)]
pub struct LzmaRawParams {
    pub dict_size: u32,
    pub lc: u32,
    pub lp: u32,
    pub pb: u32,
}

impl LzmaRawParams {
    pub const JFFS2: LzmaRawParams = LzmaRawParams {
        dict_size: 0x2000,
        lc: 0,
        lp: 0,
        pb: 0,
    };

    fn options(&self) -> Result<LzmaOptions, CarveError> {
        let mut options = LzmaOptions::new_preset(6)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("lzma options: {e}")))?;
        options.dict_size(self.dict_size);
        options.literal_context_bits(self.lc);
        options.literal_position_bits(self.lp);
        options.position_bits(self.pb);
        Ok(options)
    }
}

/// The legacy `.lzma` "alone" container: a 13-byte header (properties
/// byte, dict size, uncompressed size) followed by the raw LZMA1 stream.
#[derive(Default)]
pub struct LzmaAloneDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for LzmaAloneDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let stream = Stream::new_lzma_decoder(NO_MEMLIMIT)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("lzma: {e}")))?;
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = Xz2Reader::new_stream(&mut cursor, stream);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("lzma: {e}")))?;
        let consumed = cursor.position() as usize;
        self.unused = self.buffer.len() - consumed;
        Ok(out)
    }

    fn bytes_unused(&self) -> usize {
        self.unused
    }
}

/// A raw LZMA1 stream with no header at all: properties are supplied out
/// of band by the caller (JFFS2, D-Link ROMFS).
pub struct LzmaRawDecoder {
    params: LzmaRawParams,
    buffer: Vec<u8>,
    unused: usize,
}

impl LzmaRawDecoder {
    pub fn new(params: LzmaRawParams) -> Self {
        LzmaRawDecoder {
            params,
            buffer: Vec::new(),
            unused: 0,
        }
    }
}

impl StreamDecoder for LzmaRawDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let options = self.params.options()?;
        let mut filters = Filters::new();
        filters.lzma1(&options);
        let stream = Stream::new_raw_decoder(&filters)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("lzma raw: {e}")))?;
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = Xz2Reader::new_stream(&mut cursor, stream);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("lzma raw: {e}")))?;
        let consumed = cursor.position() as usize;
        self.unused = self.buffer.len() - consumed;
        Ok(out)
    }

    fn bytes_unused(&self) -> usize {
        self.unused
    }
}

/// `.xz`-framed LZMA2, used directly by the XZ compression-stream parser
/// and wherever a format embeds an XZ container (some squashfs variants,
/// some AVB images).
#[derive(Default)]
pub struct XzFullDecoder {
    buffer: Vec<u8>,
    unused: usize,
}

impl StreamDecoder for XzFullDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
        self.buffer.extend_from_slice(bytes);
        Ok((Vec::new(), bytes.len()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, CarveError> {
        let mut cursor = Cursor::new(&self.buffer);
        let mut decoder = Xz2Reader::new(&mut cursor);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CarveError::new(0, ErrorKind::BadStructure, format!("xz: {e}")))?;
        let consumed = cursor.position() as usize;
        self.unused = self.buffer.len() - consumed;
        Ok(out)
    }

    fn bytes_unused(&self) -> usize {
        self.unused
    }
}

/// Alias kept for the "XZ" name used throughout §4.5's compression-stream
/// list; identical to [`XzFullDecoder`].
pub type XzDecoder = XzFullDecoder;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompress::decode_all;
    use xz2::write::XzEncoder;
    use std::io::Write;

    #[test]
    fn xz_round_trips() {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(b"lzma2 payload").unwrap();
        let framed = encoder.finish().unwrap();

        let (decoded, consumed) = decode_all(XzDecoder::default(), &framed).unwrap();
        assert_eq!(decoded, b"lzma2 payload");
        assert_eq!(consumed, framed.len());
    }
}
