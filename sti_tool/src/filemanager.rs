use image::{ImageError, RgbaImage};
use lib_sti::archive::ArchiveError;
use lib_sti::compression::etrle::TruncatedStreamError;
use lib_sti::image::atlas::AtlasError;
use lib_sti::image::decoder::DecodeError;
use lib_sti::image::encoder::EncodingError;
use lib_sti::image::tga::TgaError;
use lib_sti::CodecConfig;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    #[error("STI decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("STI encode error: {0}")]
    Encode(#[from] EncodingError),

    #[error("Frame replacement rejected: {0}")]
    Atlas(#[from] AtlasError),

    #[error("Library error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("TGA error: {0}")]
    Tga(#[from] TgaError),

    #[error("Invalid config file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Image is too large for the container: {0}x{1}")]
    Dimensions(u32, u32),

    #[error("{0} is in neither the override library nor the archive")]
    MissingEntry(String),

    #[error("No portrait slot takes a {0}x{1} image")]
    Resolution(u16, u16),

    #[error("Not a PNG or STI file: {0}")]
    UnsupportedFile(String),

    #[error("Truncated data in {path}: {source}")]
    Truncated {
        path: String,
        #[source]
        source: TruncatedStreamError,
    },
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, ToolError> {
    let data = fs::read(path).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Read {} bytes from {}", data.len(), path.display());
    Ok(data)
}

/// Writes `data` to `path`, creating parent directories.
pub fn write_file(path: &Path, data: &[u8]) -> Result<(), ToolError> {
    let io_error = |source| ToolError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, data).map_err(io_error)?;
    info!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

pub fn remove_file(path: &Path) -> Result<(), ToolError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ToolError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Loads codec settings from a TOML file; defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<CodecConfig, ToolError> {
    let Some(path) = path else {
        return Ok(CodecConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = toml::from_str(&text)?;
    debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

pub fn save_png(path: &Path, width: u16, height: u16, rgba: Vec<u8>) -> Result<(), ToolError> {
    let image = RgbaImage::from_raw(width as u32, height as u32, rgba)
        .ok_or(ToolError::Dimensions(width as u32, height as u32))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ToolError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    image.save(path)?;
    debug!("Saved {}x{} PNG to {}", width, height, path.display());
    Ok(())
}

/// Opens any image the `image` crate understands as RGBA.
pub fn load_rgba(path: &Path) -> Result<(u16, u16, Vec<u8>), ToolError> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(ToolError::Dimensions(width, height));
    };
    Ok((w, h, image.into_raw()))
}

/// RGBA to packed RGB, dropping alpha.
pub fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect()
}

pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .flat_map(|p| [p[0], p[1], p[2], 255])
        .collect()
}
