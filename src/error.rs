//! Error taxonomy shared by every parser.
//!
//! All parser-level failures in this crate are non-fatal: they mean "the
//! region at this offset is not this format", and the orchestrator above
//! us is free to try something else at the same offset. `ErrorKind::Io`
//! is the sole fatal class — a host I/O failure the invocation cannot
//! recover from.

use thiserror::Error;

/// Discriminator for why a parser gave up on a candidate region.
///
/// These map directly onto §7 of the specification this crate
/// implements; they are kept as a flat enum rather than a trait object
/// hierarchy so callers can match on them without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("not enough data")]
    NotEnoughData,
    #[error("bad magic")]
    BadMagic,
    #[error("bad version")]
    BadVersion,
    #[error("bad field")]
    BadField,
    #[error("bad offset")]
    BadOffset,
    #[error("bad checksum")]
    BadChecksum,
    #[error("bad structure")]
    BadStructure,
    #[error("unsupported feature")]
    UnsupportedFeature,
    #[error("external tool unavailable")]
    ExternalToolUnavailable,
    #[error("external tool failed")]
    ExternalToolFailed,
    #[error("io failure")]
    Io,
}

/// A parse failure: where it was detected, whether it is fatal, and why.
///
/// The error offset is the last byte the parser agreed with, plus one —
/// i.e. the absolute position of the first byte that broke the format's
/// grammar.
#[derive(Debug, Error)]
#[error("{kind} at offset {offset}: {reason}")]
pub struct CarveError {
    pub offset: u64,
    pub kind: ErrorKind,
    pub reason: String,
}

impl CarveError {
    pub fn new(offset: u64, kind: ErrorKind, reason: impl Into<String>) -> Self {
        CarveError {
            offset,
            kind,
            reason: reason.into(),
        }
    }

    pub fn io(offset: u64, reason: impl Into<String>) -> Self {
        CarveError::new(offset, ErrorKind::Io, reason)
    }

    /// `ErrorKind::Io` is the only fatal class; everything else invites
    /// the orchestrator to keep trying other formats at this offset.
    pub fn fatal(&self) -> bool {
        self.kind == ErrorKind::Io
    }
}

impl From<std::io::Error> for CarveError {
    fn from(e: std::io::Error) -> Self {
        CarveError::new(0, ErrorKind::Io, e.to_string())
    }
}

pub type CarveResult<T> = Result<T, CarveError>;
