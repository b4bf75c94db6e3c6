//! Android tzdata bundle (`/system/usr/share/zoneinfo/tzdata`): a flat
//! index of named binary zoneinfo entries plus a trailing `zone.tab`.

use crate::carver::{Artifact, ParseContext, ParseOutcome, Parser, Success};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::PartialFileGuard;
use crate::label::{well_known, LabelSet};
use crate::path_policy;
use std::io::Write as _;

const MAGIC: &[u8] = b"tzdata20";
const HEADER_LEN: u64 = 12 + 12; // magic(8) + 2-digit year + letter + NUL(4), then 3 u32 offsets
const INDEX_ENTRY_LEN: u64 = 40 + 4 + 4 + 4;

pub struct TzData;

impl Parser for TzData {
    fn pretty_name(&self) -> &'static str {
        "android-tzdata"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < HEADER_LEN {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "tzdata: short header").into();
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

        if let Err(e) = cursor.expect_magic(MAGIC) {
            return e.into();
        }
        let version_tag = try_read!(cursor.read_vec(4)); // "YYL\0": two digits + a letter + NUL
        if version_tag[3] != 0 {
            return CarveError::new(base + 8, ErrorKind::BadField, "tzdata: version tag not NUL-terminated").into();
        }
        let index_offset = try_read!(cursor.read_u32_be()) as u64;
        let data_offset = try_read!(cursor.read_u32_be()) as u64;
        let zonetab_offset = try_read!(cursor.read_u32_be()) as u64;
        drop(cursor);

        for (name, off) in [("index", index_offset), ("data", data_offset), ("zone.tab", zonetab_offset)] {
            if base + off > filesize {
                return CarveError::new(base, ErrorKind::BadOffset, format!("tzdata: {name} offset out of range")).into();
            }
        }
        if index_offset >= zonetab_offset || data_offset >= zonetab_offset {
            return CarveError::new(base, ErrorKind::BadStructure, "tzdata: section offsets out of order").into();
        }

        let index_len = zonetab_offset.saturating_sub(index_offset).min(data_offset.saturating_sub(index_offset));
        let entry_count = index_len / INDEX_ENTRY_LEN;
        if entry_count == 0 {
            return CarveError::new(base + index_offset, ErrorKind::BadStructure, "tzdata: empty zone index").into();
        }

        let mut artifacts = Vec::new();
        let mut pos = base + index_offset;
        for _ in 0..entry_count {
            let mut entry_cursor = match Cursor::new(ctx.region, pos, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let raw_name = try_read!(entry_cursor.read_vec(40));
            let zone_offset = try_read!(entry_cursor.read_u32_be()) as u64;
            let zone_length = try_read!(entry_cursor.read_u32_be()) as u64;
            let _raw_gmt = try_read!(entry_cursor.read_u32_be());
            drop(entry_cursor);

            let name_end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
            let name = String::from_utf8_lossy(&raw_name[..name_end]).into_owned();
            if name.is_empty() {
                return CarveError::new(pos, ErrorKind::BadField, "tzdata: empty zone name").into();
            }
            let entry_start = base + data_offset + zone_offset;
            let entry_end = entry_start + zone_length;
            if entry_end > base + zonetab_offset {
                return CarveError::new(pos, ErrorKind::BadOffset, format!("tzdata: zone {name} extends past data section")).into();
            }

            let mut body_cursor = match Cursor::new(ctx.region, entry_start, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            let body = try_read!(body_cursor.read_vec(zone_length as usize));
            drop(body_cursor);

            let mut labels = LabelSet::new();
            labels.add(well_known::ANDROID).add("tzdata-entry");
            let safe_name = path_policy::sanitize_entry_name(&name);
            match write_named_artifact(ctx, &safe_name, &body, labels) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => return e.into(),
            }

            pos += INDEX_ENTRY_LEN;
        }

        let zonetab_start = base + zonetab_offset;
        let zonetab_len = filesize - zonetab_start;
        let mut zonetab_cursor = match Cursor::new(ctx.region, zonetab_start, filesize) {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let zonetab_body = try_read!(zonetab_cursor.read_vec(zonetab_len as usize));
        drop(zonetab_cursor);
        let mut zonetab_labels = LabelSet::new();
        zonetab_labels.add(well_known::ANDROID).add("zone-tab");
        match write_named_artifact(ctx, "zone.tab", &zonetab_body, zonetab_labels) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => return e.into(),
        }

        Success::tree(filesize - base, artifacts).into()
    }
}

/// Writes `content` under `ctx.output_dir/relative_name` verbatim,
/// bypassing the `unpacked.<ext>`/stem-reuse naming rules: tzdata
/// entries carry their own zone names, which take priority (§6.4 rule 1).
fn write_named_artifact(ctx: &mut ParseContext<'_>, relative_name: &str, content: &[u8], labels: LabelSet) -> Result<Artifact, CarveError> {
    let dest_path = ctx.output_dir.join(relative_name);
    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CarveError::io(ctx.offset, format!("creating {}: {e}", parent.display())))?;
    }
    let guard = PartialFileGuard::create(&dest_path)?;
    let mut file = guard.file();
    file.write_all(content).map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
    drop(file);
    guard.commit();
    Ok(Artifact::new(relative_name, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carver::ParseContext;
    use std::io::Cursor as IoCursor;

    fn build(zones: &[(&str, &[u8])], zonetab: &[u8]) -> Vec<u8> {
        let index_offset = 20u32;
        let index_len = zones.len() as u32 * INDEX_ENTRY_LEN as u32;
        let data_offset = index_offset + index_len;
        let mut data_section = Vec::new();
        let mut entries = Vec::new();
        for (name, body) in zones {
            let offset = data_section.len() as u32;
            entries.push((*name, offset, body.len() as u32));
            data_section.extend_from_slice(body);
        }
        let zonetab_offset = data_offset + data_section.len() as u32;

        let mut out = Vec::new();
        out.extend(MAGIC);
        out.extend(b"20a\0");
        out.extend(index_offset.to_be_bytes());
        out.extend(data_offset.to_be_bytes());
        out.extend(zonetab_offset.to_be_bytes());
        for (name, offset, length) in entries {
            let mut name_field = vec![0u8; 40];
            name_field[..name.len()].copy_from_slice(name.as_bytes());
            out.extend(name_field);
            out.extend(offset.to_be_bytes());
            out.extend(length.to_be_bytes());
            out.extend(0u32.to_be_bytes());
        }
        out.extend(&data_section);
        out.extend(zonetab);
        out
    }

    #[test]
    fn extracts_named_zones_and_zone_tab() {
        let data = build(&[("America/New_York", b"TZif2...ny"), ("Europe/Paris", b"TZif2...paris")], b"US\tAmerica/New_York\n");
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        match TzData.parse(&mut ctx) {
            ParseOutcome::Success(success) => {
                assert_eq!(success.artifacts.len(), 3);
                let ny = std::fs::read(dir.path().join("America/New_York")).unwrap();
                assert_eq!(ny, b"TZif2...ny");
                let zonetab = std::fs::read(dir.path().join("zone.tab")).unwrap();
                assert_eq!(zonetab, b"US\tAmerica/New_York\n");
            }
            ParseOutcome::Failure(e) => panic!("unexpected failure: {e:?}"),
        }
    }
}
