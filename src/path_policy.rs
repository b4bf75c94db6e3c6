//! Deterministic artifact naming and safe path composition (§6.4).
//!
//! Priority order, matching the specification exactly:
//! 1. per-entry filenames carried by the format itself (handled inline by
//!    the archive/filesystem parsers, not here);
//! 2. `unpacked.<ext>` for a single-file carve from a larger region;
//! 3. the input filename's stem, when it can be reused and is non-empty;
//! 4. `unpacked.<encoding>` for text-encoded decoders.

use std::path::{Component, Path, PathBuf};

/// Builds the `unpacked.<ext>` name for a single-file carve (rule 2).
pub fn unpacked_name(extension: &str) -> String {
    format!("unpacked.{extension}")
}

/// Builds the `unpacked-from-<format>` fallback name used when an input
/// stem is expected but turns out empty (rule 3).
pub fn unpacked_from_format(format: &str) -> String {
    format!("unpacked-from-{format}")
}

/// Reuses the input filename's stem when carving a single derived file
/// out of a sibling-named input (e.g. `x.new.dat` -> `x`), per rule 3.
/// Falls back to [`unpacked_from_format`] when the stem is empty or
/// unavailable.
pub fn stem_or_fallback(input_filename: Option<&str>, format: &str) -> String {
    match input_filename.map(Path::new).and_then(|p| p.file_stem()) {
        Some(stem) if !stem.is_empty() => stem.to_string_lossy().into_owned(),
        _ => unpacked_from_format(format),
    }
}

/// Builds the `unpacked.<encoding>` name used by base64/32/16 decoders
/// (rule 4).
pub fn unpacked_encoded_name(encoding: &str) -> String {
    format!("unpacked.{encoding}")
}

/// Hardens a per-entry filename carried inside an archive/filesystem
/// format (rule 1) against path traversal before it is joined onto an
/// output directory. Absolute paths are relativized; any `..` component
/// is dropped rather than preserved, since this crate has no
/// collaborator-declared policy that would need to honor it literally
/// (§6.4 leaves that choice to the invoking collaborator; dropping is
/// the conservative default inside this crate's own writes).
pub fn sanitize_entry_name(raw: &str) -> String {
    let path = Path::new(raw);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                // Traversal and absolute-path components are dropped,
                // not preserved: see doc comment above.
            }
        }
    }
    if out.as_os_str().is_empty() {
        return "_".to_string();
    }
    out.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacked_name_joins_extension() {
        assert_eq!(unpacked_name("png"), "unpacked.png");
    }

    #[test]
    fn stem_reuses_input_stem() {
        assert_eq!(stem_or_fallback(Some("x.new.dat"), "sparsedata"), "x");
    }

    #[test]
    fn stem_falls_back_when_empty() {
        assert_eq!(
            stem_or_fallback(Some(".new.dat"), "sparsedata"),
            "unpacked-from-sparsedata"
        );
    }

    #[test]
    fn sanitize_drops_traversal_and_absolute_components() {
        assert_eq!(sanitize_entry_name("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_entry_name("/etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_entry_name("a/b/c.txt"), "a/b/c.txt");
    }
}
