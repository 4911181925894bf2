pub mod etrle;
pub mod imagequant;
pub mod median_cut;
pub mod palette;

use etrle::EtrleCompressionError;
use log::{debug, info};
use palette::QuantizeError;
use thiserror::Error;

use crate::config::CodecConfig;
use crate::image::atlas::{AtlasError, FrameSet};
use crate::image::format::Palette;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Palette quantization failed")]
    QuantizationFailed(#[from] QuantizeError),
    #[error("ETRLE compression failed")]
    EtrleCompressionFailed(#[from] EtrleCompressionError),
    #[error("Frame layout is inconsistent")]
    AtlasFailed(#[from] AtlasError),
}

pub struct CompressionResult {
    pub palette: Palette,
    /// Concatenated frame streams; each frame's span is in its descriptor
    pub data: Vec<u8>,
}

/// Repalettizes and compresses a frame set in place.
///
/// On success the descriptors carry the new offsets and sizes and the frame
/// buffers hold the pixels as they were quantized. On failure `frames` is left
/// untouched.
pub fn compress(
    frames: &mut FrameSet,
    previous: &Palette,
    config: &CodecConfig,
) -> Result<CompressionResult, CompressionError> {
    info!("Starting compression of {} frames", frames.len());

    // Step 1: Join and quantize the whole atlas
    let atlas = frames.join();
    debug!("Atlas length: {} bytes", atlas.len());
    let quantized = palette::quantize_atlas(&atlas, previous, &config.quantize)?;
    debug!(
        "Palette ready (reduced: {}, kept previous: {})",
        quantized.reduced, quantized.kept_previous
    );

    // Step 2: Compress every frame against the final palette
    let mut staged = frames.clone();
    staged.resplit(&quantized.rgba)?;
    let encoded = etrle::etrle_compression(
        staged.buffers(),
        staged.descriptors(),
        &quantized.palette,
        config.parallel_frames,
    )?;

    // Step 3: Lay the streams out and record each frame's span
    let data = staged.record_layout(encoded);
    *frames = staged;

    info!(
        "Compression completed successfully: {} -> {} bytes",
        atlas.len(),
        data.len()
    );

    Ok(CompressionResult {
        palette: quantized.palette,
        data,
    })
}

/// Expands a payload into a frame set. A truncated payload still yields every
/// frame; the truncation is returned alongside.
pub fn decompress(
    data: &[u8],
    palette: &Palette,
    descriptors: Vec<crate::image::format::FrameDescriptor>,
) -> Result<(FrameSet, Option<etrle::TruncatedStreamError>), AtlasError> {
    info!("Starting decompression of {} frames", descriptors.len());

    let decoded = etrle::etrle_decompression(data, palette, &descriptors);
    debug!(
        "ETRLE decompression: {} of {} bytes consumed",
        decoded.consumed,
        data.len()
    );

    let frames = FrameSet::from_atlas(descriptors, &decoded.rgba)?;
    info!("Decompression completed successfully");
    Ok((frames, decoded.truncated))
}
