//! Archive parsers (§4.5 "Archives"): AR and CPIO are record-linked,
//! TAR is 512-byte-block oriented, XAR carries a compressed XML table
//! of contents, and ZIP gets its own detailed state machine (§4.6).

mod ar;
mod cpio;
mod tar;
mod xar;
mod zip;

pub use ar::Ar;
pub use cpio::{CpioNew, CpioOld};
pub use tar::Tar;
pub use xar::Xar;
pub use zip::Zip;

/// Re-exported for [`crate::formats::android::Backup`], which embeds a
/// tar stream starting at a known block boundary rather than at the
/// `ustar`-magic-relative offset [`Tar::parse`] expects.
pub(crate) use tar::walk_tar;
