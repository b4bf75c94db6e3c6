//! One module per format family (§4.5). Every parser here implements
//! the shared [`crate::carver::Parser`] trait and is registered in
//! [`crate::registry`].

pub mod android;
pub mod archive;
pub mod compression;
pub mod filesystem;
pub mod media;
pub mod text;

/// Small shared helpers used across many format modules: carving a
/// region to a single output file, and the common
/// read-candidate-then-decide-whole-file-or-carve tail every parser
/// performs at step 6 of the shared skeleton (§4.4).
pub(crate) mod support {
    use crate::carver::{Artifact, ParseContext, Success};
    use crate::error::CarveError;
    use crate::label::LabelSet;
    use crate::path_policy;
    use std::io::{Read, Seek, SeekFrom, Write};

    /// Copies `length` bytes starting at `ctx.offset` byte-exactly into
    /// `output_dir/relative_name` (§3 invariant 4: no transcoding during
    /// carving), returning the artifact record.
    pub fn carve_to_file(
        ctx: &mut ParseContext<'_>,
        relative_name: &str,
        length: u64,
        labels: LabelSet,
    ) -> Result<Artifact, CarveError> {
        let dest_path = ctx.output_dir.join(relative_name);
        ctx.region
            .seek(SeekFrom::Start(ctx.offset))
            .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;

        let guard = PartialFileGuard::create(&dest_path)?;
        let mut remaining = length;
        let mut buf = [0u8; 64 * 1024];
        let mut file = guard.file();
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            ctx.region
                .read_exact(&mut buf[..chunk])
                .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
            file.write_all(&buf[..chunk])
                .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
            remaining -= chunk as u64;
        }
        drop(file);
        guard.commit();

        Ok(Artifact::new(relative_name, labels))
    }

    /// Decides whole-file labeling vs single-artifact carving (§4.4
    /// step 6, §3 "whole-file case") and builds the matching
    /// [`Success`] once a parser has computed `length` and `labels`.
    pub fn finish_region(
        ctx: &mut ParseContext<'_>,
        length: u64,
        labels: LabelSet,
        extension: &str,
        format_name: &str,
    ) -> Result<Success, CarveError> {
        if ctx.offset == 0 && length == ctx.filesize {
            return Ok(Success::whole_file(length, labels));
        }
        let name = if ctx.offset == 0 {
            path_policy::stem_or_fallback(ctx.input_filename.as_deref(), format_name)
                + "."
                + extension
        } else {
            path_policy::unpacked_name(extension)
        };
        let mut artifact_labels = labels;
        artifact_labels.add(crate::label::well_known::UNPACKED);
        let artifact = carve_to_file(ctx, &name, length, artifact_labels)?;
        Ok(Success::carved(length, artifact))
    }

    /// RAII guard that deletes a just-created output file unless
    /// [`PartialFileGuard::commit`] is called — the "no side effects on
    /// failure" rule (§4.1) realized structurally rather than via
    /// cleanup branches at every early return.
    pub struct PartialFileGuard {
        path: std::path::PathBuf,
        file: Option<std::fs::File>,
        committed: bool,
    }

    impl PartialFileGuard {
        pub fn create(path: &std::path::Path) -> Result<Self, CarveError> {
            let file = std::fs::File::create(path)
                .map_err(|e| CarveError::io(0, format!("creating {}: {e}", path.display())))?;
            Ok(PartialFileGuard {
                path: path.to_path_buf(),
                file: Some(file),
                committed: false,
            })
        }

        pub fn file(&self) -> std::fs::File {
            self.file.as_ref().unwrap().try_clone().expect("clone output handle")
        }

        pub fn commit(mut self) {
            self.committed = true;
        }
    }

    impl Drop for PartialFileGuard {
        fn drop(&mut self) {
            if !self.committed {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    /// Reads up to `max` bytes (or, with `None`, a single fixed ≤1 MiB
    /// scanning window — never the whole remaining region) into memory.
    /// Used for small fixed-size lookaheads; callers that need to walk a
    /// whole candidate region use [`crate::cursor::Cursor`] directly and
    /// consume it incrementally, per §5's memory discipline.
    pub fn read_region(ctx: &mut ParseContext<'_>, max: Option<u64>) -> Result<Vec<u8>, CarveError> {
        let available = ctx.remaining();
        let want = max.unwrap_or(STREAM_WINDOW).min(available);
        ctx.region
            .seek(SeekFrom::Start(ctx.offset))
            .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
        let mut buf = vec![0u8; want as usize];
        ctx.region
            .read_exact(&mut buf)
            .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
        Ok(buf)
    }

    /// The fixed scanning-window size named in §5 ("a fixed small read
    /// window (≤ 1 MiB) for scanning forward").
    pub const STREAM_WINDOW: u64 = 1024 * 1024;

    /// Feeds `decoder` from the candidate region in bounded
    /// [`STREAM_WINDOW`]-sized chunks via [`crate::cursor::Cursor`]
    /// rather than reading the whole compressed stream into one buffer
    /// up front, then drives it to completion exactly like
    /// [`crate::decompress::decode_all`].
    pub fn decode_region_streaming<D: crate::decompress::StreamDecoder>(
        ctx: &mut ParseContext<'_>,
        mut decoder: D,
    ) -> Result<(Vec<u8>, usize), CarveError> {
        use crate::cursor::Cursor;
        let mut cursor = Cursor::new(ctx.region, ctx.offset, ctx.filesize)?;
        let mut total_fed = 0u64;
        loop {
            let remaining = cursor.remaining()?;
            if remaining == 0 {
                break;
            }
            let window = remaining.min(STREAM_WINDOW) as usize;
            let chunk = cursor.read_vec(window)?;
            decoder.feed(&chunk)?;
            total_fed += chunk.len() as u64;
        }
        let out = decoder.finish()?;
        let consumed = total_fed - decoder.bytes_unused() as u64;
        Ok((out, consumed as usize))
    }

    /// Writes already-decoded bytes (not a verbatim region copy) as a
    /// single artifact, named per the same §6.4 rules `finish_region`
    /// applies. Used by formats whose carving step is inherently a
    /// reconstruction rather than a byte-exact copy (Android sparse
    /// image chunk replay, JFFS2 inode content, D-Link ROMFS LZMA
    /// bodies) — the source bytes consumed (`length`) and the decoded
    /// bytes written (`content`) are tracked separately on purpose.
    pub fn write_decoded_artifact(
        ctx: &mut ParseContext<'_>,
        content: &[u8],
        extension: &str,
        format_name: &str,
        mut labels: LabelSet,
    ) -> Result<Artifact, CarveError> {
        let name = if ctx.offset == 0 {
            path_policy::stem_or_fallback(ctx.input_filename.as_deref(), format_name)
                + "."
                + extension
        } else {
            path_policy::unpacked_name(extension)
        };
        labels.add(crate::label::well_known::UNPACKED);
        let dest_path = ctx.output_dir.join(&name);
        let guard = PartialFileGuard::create(&dest_path)?;
        let mut file = guard.file();
        file.write_all(content)
            .map_err(|e| CarveError::io(ctx.offset, e.to_string()))?;
        drop(file);
        guard.commit();
        Ok(Artifact::new(name, labels))
    }
}
