//! Android-specific parsers (§4.5): sparse images and sparse-data
//! reconstruction, the backup container, DEX/ODEX bytecode containers,
//! the compiled resource table, tzdata, Verified Boot, boot images, the
//! Chrome PAK resource pack (shipped inside many Android system
//! images), and the small index-driven boot containers used by
//! Qualcomm/Snapdragon, Huawei, and the generic `nb0` layout.

mod avb;
mod backup;
mod boot_image;
mod chrome_pak;
mod dex;
mod index_boot;
mod odex;
mod resources;
mod sparse_data;
mod sparse_image;
mod tzdata;

pub use avb::Avb;
pub use backup::Backup;
pub use boot_image::BootImage;
pub use chrome_pak::ChromePak;
pub use dex::Dex;
pub use index_boot::{HuaweiBoot, Nb0, SnapdragonBoot};
pub use odex::Odex;
pub use resources::ResourceTable;
pub use sparse_data::{unpack_sparse_data, SparseDataError};
pub use sparse_image::SparseImage;
pub use tzdata::TzData;
