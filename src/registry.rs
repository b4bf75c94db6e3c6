//! Parser registry (§9 "Dynamic dispatch across parsers"): maps magic
//! signatures to [`Parser`] implementations so the orchestrator's
//! candidate-discovery loop never special-cases a format by name.

use crate::carver::Parser;
use crate::formats;

/// Returns every parser this crate ships, in a stable order. The
/// registry itself performs no I/O and holds no state beyond this flat
/// list; `&'static [&'static dyn Parser]` is cheap to share across the
/// orchestrator's worker threads without synchronization (§5).
pub fn all_parsers() -> Vec<&'static dyn Parser> {
    vec![
        // Compression streams
        &formats::compression::Gzip,
        &formats::compression::Zlib,
        &formats::compression::XzStream,
        &formats::compression::LzmaAlone,
        &formats::compression::Bzip2Stream,
        &formats::compression::Lzip,
        &formats::compression::Lzop,
        &formats::compression::ZstdStream,
        &formats::compression::Lz4Stream,
        &formats::compression::SevenZip,
        &formats::compression::SnappyStream,
        // Archives
        &formats::archive::Ar,
        &formats::archive::CpioNew,
        &formats::archive::CpioOld,
        &formats::archive::Tar,
        &formats::archive::Xar,
        &formats::archive::Zip,
        // Android
        &formats::android::SparseImage,
        &formats::android::Backup,
        &formats::android::Dex,
        &formats::android::Odex,
        &formats::android::ResourceTable,
        &formats::android::TzData,
        &formats::android::Avb,
        &formats::android::BootImage,
        &formats::android::ChromePak,
        &formats::android::SnapdragonBoot,
        &formats::android::HuaweiBoot,
        &formats::android::Nb0,
        // Filesystems
        &formats::filesystem::Squashfs,
        &formats::filesystem::Iso9660,
        &formats::filesystem::Jffs2,
        &formats::filesystem::Ext234,
        &formats::filesystem::Cramfs,
        &formats::filesystem::DlinkRomfs,
        &formats::filesystem::Fat1216,
        &formats::filesystem::Cbfs,
        &formats::filesystem::MinixV1,
        &formats::filesystem::Romfs,
        &formats::filesystem::VmImage,
        // Media
        &formats::media::Png,
        &formats::media::Gif,
        &formats::media::Bmp,
        &formats::media::WebP,
        &formats::media::Jpeg,
        &formats::media::Ico,
        &formats::media::Icns,
        &formats::media::Sgi,
        &formats::media::SunRaster,
        &formats::media::Aiff,
        &formats::media::Au,
        &formats::media::Wav,
        &formats::media::Ani,
        &formats::media::Swf,
        &formats::media::Flv,
        &formats::media::Pdf,
        &formats::media::Dds,
        &formats::media::Ktx,
        &formats::media::Psd,
        &formats::media::Pnm,
        &formats::media::GimpBrush,
        &formats::media::Midi,
        &formats::media::Mng,
        &formats::media::Xg3d,
        // Text
        &formats::text::Srec,
        &formats::text::BaseEncoded,
    ]
}

/// Filters the registry down to parsers whose `signatures()` include one
/// that matches a byte prefix at the candidate offset. Multiple parsers
/// may claim the same magic (e.g. squashfs's two endiannesses); callers
/// try each in turn and keep the first success.
pub fn candidates_for<'a>(prefix: &[u8]) -> Vec<&'static dyn Parser> {
    all_parsers()
        .into_iter()
        .filter(|parser| {
            parser
                .signatures()
                .iter()
                .any(|sig| prefix.len() >= sig.len() && &prefix[..sig.len()] == *sig)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_parser_declares_at_least_one_signature_or_extension() {
        for parser in all_parsers() {
            assert!(
                !parser.signatures().is_empty() || !parser.extensions().is_empty(),
                "{} declares neither signatures nor extensions",
                parser.pretty_name()
            );
        }
    }

    #[test]
    fn candidates_for_png_magic_includes_png_parser() {
        let png_magic = [0x89u8, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let candidates = candidates_for(&png_magic);
        assert!(candidates.iter().any(|p| p.pretty_name() == "png"));
    }
}
