pub mod archive;
pub mod compression;
pub mod config;
pub mod constants;
pub mod image;

use log::*;
use std::io::Write;

pub use crate::archive::{DataSource, PatchLibrary, SlfArchive};
pub use crate::config::CodecConfig;
pub use crate::image::format::{FrameDescriptor, IndexedSti, Palette, Rgb, StiImage, TrueColorSti};
pub use crate::image::tga::TgaImage;
pub use crate::image::{
    decode, decode_indexed, decode_true_color, encode_indexed, encode_indexed_with,
    encode_true_color,
};

/// Installs an `env_logger` writing to stderr, filtered to this crate at `level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .target(env_logger::Target::Stderr)
        .filter(Some("lib_sti"), level)
        .filter(Some("sti_tool"), level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}
