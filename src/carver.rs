//! The shared carver contract (§4.1): the `Parser` trait, its call
//! context, and the result sum type every format module returns.

use crate::cursor::ReadSeek;
use crate::error::CarveError;
use crate::label::LabelSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Small, plain-data environment record the orchestrator hands down with
/// every call (§6.1). Kept free of any orchestrator-owned state: this
/// crate never schedules, recurses, or remembers anything between calls.
#[derive(Debug, Clone, Default)]
pub struct ScanEnvironment {
    /// Directory the gateway and scoped temporaries should stage under.
    pub temporary_directory: Option<PathBuf>,
    /// Label set inherited from whatever candidate discovery already
    /// knows about the parent region (e.g. "this blob came from inside
    /// a zip member"). Parsers may read it but never need to.
    pub parent_labels: LabelSet,
}

impl ScanEnvironment {
    /// Resolves a relative artifact path to an absolute path under the
    /// configured output directory.
    pub fn unpack_path(&self, output_dir: &std::path::Path, relative: &str) -> PathBuf {
        output_dir.join(relative)
    }

    /// The inverse of [`ScanEnvironment::unpack_path`]: turns an absolute
    /// path back into the relative form recorded on an [`Artifact`].
    pub fn rel_unpack_path(
        &self,
        output_dir: &std::path::Path,
        absolute: &std::path::Path,
    ) -> Option<PathBuf> {
        absolute.strip_prefix(output_dir).ok().map(PathBuf::from)
    }
}

/// Everything a parser needs to evaluate one candidate placement.
pub struct ParseContext<'a> {
    pub region: &'a mut dyn ReadSeek,
    pub filesize: u64,
    pub offset: u64,
    pub output_dir: PathBuf,
    pub environment: ScanEnvironment,
    /// The input's own filename, if known, used by the stem-reuse naming
    /// rule (§6.4 rule 3). `None` when the caller has no filename (e.g.
    /// streaming input).
    pub input_filename: Option<String>,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        region: &'a mut dyn ReadSeek,
        filesize: u64,
        offset: u64,
        output_dir: PathBuf,
    ) -> Self {
        ParseContext {
            region,
            filesize,
            offset,
            output_dir,
            environment: ScanEnvironment::default(),
            input_filename: None,
        }
    }

    pub fn with_environment(mut self, environment: ScanEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_input_filename(mut self, name: impl Into<String>) -> Self {
        self.input_filename = Some(name.into());
        self
    }

    pub fn is_whole_file_candidate(&self) -> bool {
        self.offset == 0
    }

    pub fn remaining(&self) -> u64 {
        self.filesize.saturating_sub(self.offset)
    }
}

/// A produced output file: its path relative to the output directory and
/// its own label set (§3 "Artifact").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub relative_path: String,
    pub labels: LabelSet,
}

impl Artifact {
    pub fn new(relative_path: impl Into<String>, labels: LabelSet) -> Self {
        Artifact {
            relative_path: relative_path.into(),
            labels,
        }
    }
}

/// Per-format metadata bag (PNG chunk index, ZIP comment, …). Kept as a
/// loosely-typed JSON map rather than one struct per format, so the
/// result record stays a single concrete type (§9 "Result sum type").
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A successful parse (§3 "Result record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Success {
    pub length: u64,
    pub labels: LabelSet,
    pub artifacts: Vec<Artifact>,
    pub metadata: Metadata,
}

impl Success {
    /// The whole-file case (§3): no carving, the region itself is
    /// labeled directly.
    pub fn whole_file(length: u64, labels: LabelSet) -> Self {
        Success {
            length,
            labels,
            artifacts: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// The single-carved-artifact case: region-level labels are empty
    /// (tags move onto the artifact, per §3 "Labels").
    pub fn carved(length: u64, artifact: Artifact) -> Self {
        Success {
            length,
            labels: LabelSet::new(),
            artifacts: vec![artifact],
            metadata: Metadata::new(),
        }
    }

    /// The file-tree case: a parser that natively extracts many entries
    /// (squashfs, ext*, ZIP, TAR, …) records each as its own artifact.
    pub fn tree(length: u64, artifacts: Vec<Artifact>) -> Self {
        Success {
            length,
            labels: LabelSet::new(),
            artifacts,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// The tagged-union result every parser returns (§9 "Result sum type").
#[derive(Debug)]
pub enum ParseOutcome {
    Success(Success),
    Failure(CarveError),
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success(_))
    }
}

impl From<Success> for ParseOutcome {
    fn from(success: Success) -> Self {
        ParseOutcome::Success(success)
    }
}

impl From<CarveError> for ParseOutcome {
    fn from(error: CarveError) -> Self {
        ParseOutcome::Failure(error)
    }
}

/// The contract every format module implements (§4.1, §9 "Dynamic
/// dispatch across parsers"). A flat trait object rather than an
/// inheritance hierarchy: the registry dispatches on `signatures()`
/// alone, no per-format special-casing.
pub trait Parser: Send + Sync {
    /// Stable, human-readable format name (`"png"`, `"squashfs"`, …).
    fn pretty_name(&self) -> &'static str;

    /// Canonical extensions this format's carved artifacts use, most
    /// preferred first. Empty for formats that always carry their own
    /// per-entry names (ZIP, TAR, …).
    fn extensions(&self) -> &'static [&'static str];

    /// Magic byte sequences the registry can prefilter candidates on.
    /// A parser may still reject a candidate after a signature match.
    fn signatures(&self) -> &'static [&'static [u8]];

    /// Validates and, if necessary, carves the candidate region starting
    /// at `ctx.offset`. See §4.1 for the full contract.
    fn parse(&self, ctx: &mut ParseContext<'_>) -> ParseOutcome;
}
