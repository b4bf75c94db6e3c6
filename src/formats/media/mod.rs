//! Media and document format parsers (§4.5 "Media formats"). Most of
//! these are chunk- or box-walked in memory via [`crate::formats::support::read_region`];
//! none carry decompression beyond what their own container format
//! defines (PNG's deflate-compressed chunks are left encoded — this
//! crate carves the container byte-exactly, it does not re-encode
//! images).

mod ani;
mod au;
mod aiff;
mod bmp;
mod dds;
mod flv;
mod gif;
mod gimp_brush;
mod icns;
mod ico;
mod jpeg;
mod ktx;
mod midi;
mod mng;
mod pdf;
mod png;
mod pnm;
mod psd;
mod sgi;
mod sun_raster;
mod swf;
mod wav;
mod webp;
mod xg3d;

pub use ani::Ani;
pub use au::Au;
pub use aiff::Aiff;
pub use bmp::Bmp;
pub use dds::Dds;
pub use flv::Flv;
pub use gif::Gif;
pub use gimp_brush::GimpBrush;
pub use icns::Icns;
pub use ico::Ico;
pub use jpeg::Jpeg;
pub use ktx::Ktx;
pub use midi::Midi;
pub use mng::Mng;
pub use pdf::Pdf;
pub use png::Png;
pub use pnm::Pnm;
pub use psd::Psd;
pub use sgi::Sgi;
pub use sun_raster::SunRaster;
pub use swf::Swf;
pub use wav::Wav;
pub use webp::WebP;
pub use xg3d::Xg3d;
