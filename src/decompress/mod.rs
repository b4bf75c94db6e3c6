//! Decompression adapters (§4.3): one uniform streaming interface over
//! zlib, deflate-raw, LZMA1 (framed "alone" and raw with an explicit
//! filter), LZMA2/XZ, bzip2, zstd, LZ4 frame, snappy frame, and LZO1X.
//!
//! Every adapter buffers what it is fed and defers the actual decode to
//! [`StreamDecoder::finish`], where the underlying crate's `Read`-based
//! decoder is driven to completion over an in-memory cursor. This keeps
//! the trait genuinely uniform across codecs whose upstream crates
//! expose wildly different incremental APIs (some streaming, some only
//! buffer-to-buffer), while still reporting `bytes_unused` accurately:
//! every codec here is self-terminating (explicit frame/stream end
//! marker), so the cursor's position after a successful decode is
//! exactly the number of input bytes the format itself consumed.

mod bzip2_adapter;
mod gzip_adapter;
mod lz4_adapter;
mod lzma_adapter;
mod lzo_adapter;
mod snappy_adapter;
mod zlib_adapter;
mod zstd_adapter;

pub use bzip2_adapter::Bzip2Decoder;
pub use gzip_adapter::GzipDecoder;
pub use lz4_adapter::Lz4Decoder;
pub use lzma_adapter::{LzmaAloneDecoder, LzmaRawDecoder, LzmaRawParams, XzDecoder};
pub use lzo_adapter::decompress as lzo1x_decompress;
pub use snappy_adapter::SnappyDecoder;
pub use zlib_adapter::{DeflateRawDecoder, ZlibDecoder};
pub use zstd_adapter::ZstdDecoder;

use crate::error::CarveError;

/// Shared shape every decompression adapter in this module implements.
pub trait StreamDecoder {
    /// Accepts more compressed bytes. Returns any newly available
    /// decoded output plus how many of the fed bytes were accepted.
    fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError>;

    /// Flushes the decoder and returns the remaining decoded tail.
    fn finish(&mut self) -> Result<Vec<u8>, CarveError>;

    /// How many bytes handed to `feed` were never consumed by the
    /// codec (trailing garbage after the stream's own end marker).
    /// Meaningful only after [`StreamDecoder::finish`] has run.
    fn bytes_unused(&self) -> usize;
}

/// Convenience one-shot helper used by parsers that just want "decode
/// this whole buffer and tell me how much of it was the stream."
pub fn decode_all<D: StreamDecoder>(mut decoder: D, bytes: &[u8]) -> Result<(Vec<u8>, usize), CarveError> {
    let (mut out, _) = decoder.feed(bytes)?;
    out.extend(decoder.finish()?);
    let consumed = bytes.len() - decoder.bytes_unused();
    Ok((out, consumed))
}
