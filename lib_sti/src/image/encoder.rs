use log::{debug, error, info};
use thiserror::Error;

use super::format::{ColorInfo, FrameEntry, IndexedSti, StiFlags, StiHeader, TrueColorSti};
use super::rgb565;
use crate::compression::{compress, CompressionError};
use crate::config::CodecConfig;
use crate::image::format::layout;

use bincode::Options;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Failed to compress image data")]
    CompressionFailed(#[from] CompressionError),
    #[error("Container has no frames")]
    NoFrames,
    #[error("Too many frames for the frame table: {0}")]
    TooManyFrames(usize),
    #[error("Pixel buffer holds {actual} bytes, {width}x{height} needs {expected}")]
    PixelDataLength {
        width: u16,
        height: u16,
        expected: usize,
        actual: usize,
    },
    #[error("Failed to write header record")]
    Layout(#[from] bincode::Error),
}

/// Encodes an indexed container with the default codec settings.
pub fn encode_indexed(sti: &mut IndexedSti) -> Result<Vec<u8>, EncodingError> {
    encode_indexed_with(sti, &CodecConfig::default())
}

/// Repalettizes, compresses and serializes `sti`.
///
/// On success `sti` holds the palette, pixels and frame table that were
/// written. On failure it is left as it was and no bytes are returned.
pub fn encode_indexed_with(
    sti: &mut IndexedSti,
    config: &CodecConfig,
) -> Result<Vec<u8>, EncodingError> {
    info!("Starting encoding");

    if sti.frames.is_empty() {
        error!("Refusing to encode a container without frames");
        return Err(EncodingError::NoFrames);
    }
    let num_frames =
        u16::try_from(sti.frames.len()).map_err(|_| EncodingError::TooManyFrames(sti.frames.len()))?;

    // Step 1: Quantize and compress into a scratch copy of the frames
    let mut frames = sti.frames.clone();
    let compressed = compress(&mut frames, &sti.palette, config)?;
    debug!(
        "Image data compressed: {} bytes for {} frames",
        compressed.data.len(),
        num_frames
    );

    // Step 2: Header
    let mut header = sti.header;
    header.flags.insert(StiFlags::INDEXED | StiFlags::ETRLE);
    header.flags.remove(StiFlags::ZLIB | StiFlags::HIGH_COLOR);
    header.uncompressed_size = header.width as u32 * header.height as u32;
    header.compressed_size = compressed.data.len() as u32;
    header.color = match header.color {
        ColorInfo::Indexed(mut info) => {
            info.num_frames = num_frames;
            ColorInfo::Indexed(info)
        }
        ColorInfo::TrueColor(_) => {
            StiHeader::indexed(header.width, header.height, num_frames).color
        }
    };
    header.bit_depth = 8;

    let mut encoded = header.to_bytes()?;
    debug!("Header written: {}x{}, {:?}", header.width, header.height, header.flags);

    // Step 3: Palette and frame table
    encoded.extend_from_slice(&compressed.palette.to_bytes());
    for descriptor in frames.descriptors() {
        encoded.extend(layout().serialize(&FrameEntry::from(descriptor))?);
    }
    debug!("Frame table written with {} entries", num_frames);

    // Step 4: Payload
    encoded.extend_from_slice(&compressed.data);

    sti.header = header;
    sti.palette = compressed.palette;
    sti.frames = frames;
    sti.truncated = None;

    info!("Encoding process completed successfully: {} bytes", encoded.len());
    Ok(encoded)
}

/// Serializes a 16-bit container. Channels lose their low bits.
pub fn encode_true_color(image: &TrueColorSti) -> Result<Vec<u8>, EncodingError> {
    let expected = image.width() as usize * image.height() as usize * 3;
    if image.rgb.len() != expected {
        return Err(EncodingError::PixelDataLength {
            width: image.width(),
            height: image.height(),
            expected,
            actual: image.rgb.len(),
        });
    }

    let payload = rgb565::pack(&image.rgb);
    let mut header = image.header;
    header.flags.insert(StiFlags::HIGH_COLOR);
    header.flags.remove(StiFlags::INDEXED | StiFlags::ETRLE | StiFlags::ZLIB);
    header.uncompressed_size = payload.len() as u32;
    header.compressed_size = payload.len() as u32;
    header.bit_depth = 16;
    if let ColorInfo::Indexed(_) = header.color {
        header.color = StiHeader::true_color(header.width, header.height).color;
    }

    let mut encoded = header.to_bytes()?;
    encoded.extend(payload);
    info!("Encoded 16-bit container: {} bytes", encoded.len());
    Ok(encoded)
}
