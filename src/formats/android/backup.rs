//! Android `adb backup` container (`.ab`): a small ASCII header
//! declaring version 1, no compression flag, no encryption, followed by
//! a zlib stream whose decompressed content is a POSIX tar archive.

use crate::carver::{ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::{Cursor, ReadSeek};
use crate::decompress::{StreamDecoder, ZlibDecoder};
use crate::error::{CarveError, ErrorKind};
use crate::formats::archive::walk_tar;
use crate::formats::support::{finish_region, STREAM_WINDOW};
use crate::label::LabelSet;

const MAGIC_PREFIX: &[u8] = b"ANDROID BACKUP\n";

pub struct Backup;

impl Parser for Backup {
    fn pretty_name(&self) -> &'static str {
        "android-backup"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ab"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC_PREFIX]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < MAGIC_PREFIX.len() as u64 + 20 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "android backup: short header").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let header_len;
        {
            let mut cursor = match Cursor::new(ctx.region, base, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            if cursor.expect_magic(MAGIC_PREFIX).is_err() {
                return CarveError::new(base, ErrorKind::BadMagic, "android backup: bad magic prefix").into();
            }
            let line_start = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let version = match read_ascii_line(&mut cursor) {
                Ok(Some(line)) => line,
                Ok(None) => return CarveError::new(line_start, ErrorKind::NotEnoughData, "android backup: missing version line").into(),
                Err(e) => return e.into(),
            };
            if version != "1" {
                return CarveError::new(line_start, ErrorKind::BadVersion, format!("android backup: unsupported version {version}")).into();
            }
            let line_start = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let compression = match read_ascii_line(&mut cursor) {
                Ok(Some(line)) => line,
                Ok(None) => return CarveError::new(line_start, ErrorKind::NotEnoughData, "android backup: missing compression line").into(),
                Err(e) => return e.into(),
            };
            if compression != "1" {
                return CarveError::new(line_start, ErrorKind::UnsupportedFeature, "android backup: only zlib-compressed backups are supported").into();
            }
            let line_start = match cursor.position() {
                Ok(p) => p,
                Err(e) => return e.into(),
            };
            let encryption = match read_ascii_line(&mut cursor) {
                Ok(Some(line)) => line,
                Ok(None) => return CarveError::new(line_start, ErrorKind::NotEnoughData, "android backup: missing encryption line").into(),
                Err(e) => return e.into(),
            };
            if encryption != "none" {
                return CarveError::new(line_start, ErrorKind::UnsupportedFeature, "android backup: encrypted backups are not supported").into();
            }
            header_len = match cursor.position() {
                Ok(p) => p - base,
                Err(e) => return e.into(),
            };
        }

        let (decoded, consumed) = match decode_zlib_streaming(ctx.region, base + header_len, filesize, ZlibDecoder::default()) {
            Ok(ok) => ok,
            Err(e) => return CarveError::new(base + header_len, ErrorKind::BadStructure, e.reason).into(),
        };
        if consumed == 0 {
            return CarveError::new(base + header_len, ErrorKind::BadStructure, "android backup: empty zlib stream").into();
        }

        let length = header_len + consumed as u64;

        // The decompressed payload is a tar stream; delegate to the tar
        // walker over an in-memory cursor anchored at its own start.
        let mut tar_io = std::io::Cursor::new(decoded);
        let tar_dir = ctx.output_dir.clone();
        let tar_len = tar_io.get_ref().len() as u64;
        let mut tar_ctx = ParseContext::new(&mut tar_io, tar_len, 0, tar_dir);
        let tar_outcome = walk_tar(&mut tar_ctx, 0);
        let mut artifacts = Vec::new();
        let mut labels = LabelSet::new();
        labels.add("android").add("archive");
        match tar_outcome {
            ParseOutcome::Success(tar_success) => artifacts = tar_success.artifacts,
            ParseOutcome::Failure(_) => {
                // The embedded tar failed to walk (e.g. a backup whose
                // payload isn't a vanilla tar stream); the backup
                // container itself is still valid, just without
                // extracted members.
            }
        }

        if !artifacts.is_empty() {
            Success::tree(length, artifacts).into()
        } else {
            match finish_region(ctx, length, labels, "ab", "android-backup") {
                Ok(success) => success.into(),
                Err(e) => e.into(),
            }
        }
    }
}

/// Reads one `\n`-terminated ASCII line from `cursor`. Returns `Ok(None)`
/// (not an error) on a missing terminator, invalid UTF-8, or a line
/// longer than a sane header field could ever be — the header lines
/// this format actually has are a handful of bytes each, so a no-match
/// here always means "this isn't an android backup header".
fn read_ascii_line(cursor: &mut Cursor<'_>) -> Result<Option<String>, CarveError> {
    let mut line = Vec::new();
    loop {
        match cursor.read_u8() {
            Ok(b'\n') => return Ok(std::str::from_utf8(&line).ok().map(str::to_string)),
            Ok(b) => line.push(b),
            Err(_) => return Ok(None),
        }
        if line.len() > 4096 {
            return Ok(None);
        }
    }
}

/// Feeds `decoder` from `region` starting at `start` through to EOF in
/// [`STREAM_WINDOW`]-sized chunks rather than reading the whole zlib
/// stream into memory up front; the decoded tar payload itself is still
/// materialized, since [`walk_tar`] needs random access over it.
fn decode_zlib_streaming<D: StreamDecoder>(
    region: &mut dyn ReadSeek,
    start: u64,
    filesize: u64,
    mut decoder: D,
) -> Result<(Vec<u8>, usize), CarveError> {
    let mut cursor = Cursor::new(region, start, filesize)?;
    let mut total_fed = 0u64;
    let mut out = Vec::new();
    loop {
        let remaining = cursor.remaining()?;
        if remaining == 0 {
            break;
        }
        let window = remaining.min(STREAM_WINDOW) as usize;
        let chunk = cursor.read_vec(window)?;
        let (chunk_out, _) = decoder.feed(&chunk)?;
        out.extend(chunk_out);
        total_fed += chunk.len() as u64;
    }
    out.extend(decoder.finish()?);
    let consumed = total_fed - decoder.bytes_unused() as u64;
    Ok((out, consumed as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::{Cursor as IoCursor, Write};

    fn make_tar(name: &str, body: &[u8]) -> Vec<u8> {
        let mut h = vec![0u8; 512];
        h[0..name.len()].copy_from_slice(name.as_bytes());
        let size_field = format!("{:011o}\0", body.len());
        h[124..124 + size_field.len()].copy_from_slice(size_field.as_bytes());
        h[156] = b'0';
        h[257..263].copy_from_slice(b"ustar\0");
        h[263..265].copy_from_slice(b"00");
        for b in h[148..156].iter_mut() {
            *b = b' ';
        }
        let mut sum: u64 = 0;
        for &b in &h {
            sum += b as u64;
        }
        let checksum_field = format!("{sum:06o}\0 ");
        h[148..148 + checksum_field.len()].copy_from_slice(checksum_field.as_bytes());
        let mut out = h;
        out.extend_from_slice(body);
        while out.len() % 512 != 0 {
            out.push(0);
        }
        out.extend(vec![0u8; 1024]);
        out
    }

    #[test]
    fn unpacks_header_and_embedded_tar() {
        let tar = make_tar("apps/com.example/_manifest", b"data");
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let zlib = encoder.finish().unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(MAGIC_PREFIX);
        data.extend_from_slice(b"1\n1\nnone\n");
        data.extend_from_slice(&zlib);

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match Backup.parse(&mut ctx) {
            ParseOutcome::Success(success) => {
                assert_eq!(success.length, data.len() as u64);
                assert_eq!(success.artifacts.len(), 1);
            }
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }

    #[test]
    fn rejects_encrypted_backup() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC_PREFIX);
        data.extend_from_slice(b"1\n1\nAES-256\n");
        data.extend(vec![0u8; 16]);

        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Backup.parse(&mut ctx).is_success());
    }
}
