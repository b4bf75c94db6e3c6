//! XG3D: a small fixed-header 3D resource container — magic, version,
//! mesh count, then per-file vertex/index counts that size a single flat
//! vertex buffer (12 bytes/vertex: 3 little-endian f32 coordinates)
//! followed by a flat index buffer (4 bytes/index). Same
//! fixed-header-then-bounds-checked-body shape the Android sparse-image
//! header uses, without any chunk walk: the whole extent is computable
//! straight from the header's two counts.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::finish_region;
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"XG3D";
const HEADER_LEN: u64 = 16;

pub struct Xg3d;

impl Parser for Xg3d {
    fn pretty_name(&self) -> &'static str {
        "xg3d"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xg3d"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < HEADER_LEN {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "xg3d: short header").into();
        }
        let base = ctx.offset;
        let filesize = ctx.filesize;
        let mut cursor = match Cursor::new(ctx.region, base, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        macro_rules! try_read {
            ($e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                }
            };
        }
        if try_read!(cursor.read_vec(4)) != MAGIC {
            return CarveError::new(base, ErrorKind::BadMagic, "xg3d: bad magic").into();
        }
        let version = try_read!(cursor.read_u16_le());
        if version != 1 {
            return CarveError::new(base + 4, ErrorKind::BadVersion, "xg3d: unsupported version").into();
        }
        let mesh_count = try_read!(cursor.read_u16_le());
        if mesh_count == 0 {
            return CarveError::new(base + 6, ErrorKind::BadField, "xg3d: zero mesh count").into();
        }
        let vertex_count = try_read!(cursor.read_u32_le()) as u64;
        let index_count = try_read!(cursor.read_u32_le()) as u64;
        drop(cursor);

        if vertex_count == 0 || index_count == 0 {
            return CarveError::new(base + 8, ErrorKind::BadField, "xg3d: zero-sized mesh data").into();
        }

        let body_len = match vertex_count
            .checked_mul(12)
            .and_then(|v| v.checked_add(index_count.checked_mul(4)?))
        {
            Some(v) => v,
            None => return CarveError::new(base, ErrorKind::BadStructure, "xg3d: declared size overflow").into(),
        };
        let length = HEADER_LEN + body_len;
        if base + length > filesize {
            return CarveError::new(base, ErrorKind::BadOffset, "xg3d: declared extent exceeds region").into();
        }

        let mut labels = LabelSet::new();
        labels.add(well_known::GRAPHICS).add("3d-model");
        match finish_region(ctx, length, labels, "xg3d", "xg3d") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_xg3d() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(1u16.to_le_bytes()); // version
        data.extend(1u16.to_le_bytes()); // mesh count
        data.extend(2u32.to_le_bytes()); // vertex count
        data.extend(3u32.to_le_bytes()); // index count
        data.extend(vec![0u8; 2 * 12]); // vertex buffer
        data.extend(vec![0u8; 3 * 4]); // index buffer
        data
    }

    #[test]
    fn accepts_minimal_xg3d() {
        let data = minimal_xg3d();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Xg3d.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_truncated_body() {
        let mut data = minimal_xg3d();
        let len = data.len();
        data.truncate(len - 4);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Xg3d.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_zero_mesh_count() {
        let mut data = minimal_xg3d();
        data[6..8].copy_from_slice(&0u16.to_le_bytes());
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Xg3d.parse(&mut ctx).is_success());
    }
}
