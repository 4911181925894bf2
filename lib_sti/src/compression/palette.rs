use std::collections::BTreeSet;

use log::{debug, info, warn};
use thiserror::Error;

use super::imagequant::ImageQuant;
use super::median_cut::MedianCut;
use crate::config::{QuantizeOptions, QuantizerBackend};
use crate::constants::{CONTENT_COLORS, FILLER_COLOR, NEAR_BLACK, PALETTE_SIZE};
use crate::image::format::{Palette, Rgb};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("Invalid pixel data length: expected multiple of 4 bytes, got {0}")]
    InvalidPixelDataLength(usize),
    #[error("{backend} quantizer failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("{0} quantizer is not available in this build")]
    Unavailable(&'static str),
    #[error("Palette overflow: {colors} colors remain, at most {max} fit")]
    PaletteOverflow { colors: usize, max: usize },
}

/// Output of a [`ColorReducer`]: a palette and one palette index per input pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub palette: Vec<Rgb>,
    pub indices: Vec<u8>,
}

/// Reduces a list of opaque colors to at most `max_colors` entries.
pub trait ColorReducer {
    fn name(&self) -> &'static str;
    fn reduce(&self, pixels: &[Rgb], max_colors: usize) -> Result<Reduction, QuantizeError>;
}

/// Result of repalettizing an atlas.
#[derive(Debug, Clone)]
pub struct Quantized {
    pub palette: Palette,
    /// The atlas after normalization and, if needed, color reduction
    pub rgba: Vec<u8>,
    /// Whether the previous palette was close enough to be kept
    pub kept_previous: bool,
    /// Whether colors had to be merged to fit the palette
    pub reduced: bool,
}

/// Forces transparent pixels to `(alpha_color, 0)` and lifts opaque black to
/// near-black.
pub fn normalize_alpha(rgba: &mut [u8], alpha_color: Rgb) {
    for pixel in rgba.chunks_exact_mut(4) {
        if pixel[3] == 0 {
            pixel[..3].copy_from_slice(&alpha_color);
        } else if pixel[..3] == [0, 0, 0] {
            pixel[..3].copy_from_slice(&NEAR_BLACK);
        }
    }
}

/// Distinct colors of a normalized atlas other than the two reserved ones,
/// in ascending order.
pub fn survey_colors(rgba: &[u8], alpha_color: Rgb, end_sentinel: Rgb) -> Vec<Rgb> {
    let colors: BTreeSet<Rgb> = rgba
        .chunks_exact(4)
        .map(|p| [p[0], p[1], p[2]])
        .filter(|c| *c != alpha_color && *c != end_sentinel)
        .collect();
    colors.into_iter().collect()
}

/// Reducers to try, most preferred first.
pub fn reducers(options: &QuantizeOptions) -> Vec<Box<dyn ColorReducer>> {
    let imagequant = ImageQuant {
        speed: options.speed,
        quality: options.quality,
    };
    match options.backend {
        QuantizerBackend::MedianCut => vec![Box::new(MedianCut)],
        QuantizerBackend::Auto if !ImageQuant::AVAILABLE => vec![Box::new(MedianCut)],
        QuantizerBackend::Auto | QuantizerBackend::ImageQuant => {
            vec![Box::new(imagequant), Box::new(MedianCut)]
        }
    }
}

fn reduce_with_fallback(
    pixels: &[Rgb],
    options: &QuantizeOptions,
) -> Result<Reduction, QuantizeError> {
    reduce_chain(&reducers(options), pixels)
}

fn reduce_chain(
    chain: &[Box<dyn ColorReducer>],
    pixels: &[Rgb],
) -> Result<Reduction, QuantizeError> {
    for reducer in chain {
        match reducer.reduce(pixels, CONTENT_COLORS) {
            Ok(reduction) if reduction.palette.len() <= CONTENT_COLORS => {
                info!(
                    "Quantized with {} to {} colors",
                    reducer.name(),
                    reduction.palette.len()
                );
                return Ok(reduction);
            }
            Ok(reduction) => warn!(
                "{} left {} colors, trying next quantizer",
                reducer.name(),
                reduction.palette.len()
            ),
            Err(err) => warn!("{}, trying next quantizer", err),
        }
    }
    let distinct: BTreeSet<&Rgb> = pixels.iter().collect();
    Err(QuantizeError::PaletteOverflow {
        colors: distinct.len(),
        max: CONTENT_COLORS,
    })
}

fn assemble(alpha_color: Rgb, mut content: Vec<Rgb>, end_sentinel: Rgb) -> Palette {
    content.resize(CONTENT_COLORS, FILLER_COLOR);
    let mut colors = [[0u8; 3]; PALETTE_SIZE];
    colors[0] = alpha_color;
    colors[1..PALETTE_SIZE - 1].copy_from_slice(&content);
    colors[PALETTE_SIZE - 1] = end_sentinel;
    Palette::new(colors)
}

/// Builds the palette an atlas will be saved with.
///
/// Slot 0 and slot 255 always come from `previous`. Atlases with at most 254
/// content colors keep them exactly; larger ones go through the configured
/// reducers. `previous` is kept when it already holds every content color of
/// the atlas and shares at least `options.stability_threshold` entries with
/// the new palette.
pub fn quantize_atlas(
    rgba: &[u8],
    previous: &Palette,
    options: &QuantizeOptions,
) -> Result<Quantized, QuantizeError> {
    if rgba.len() % 4 != 0 {
        return Err(QuantizeError::InvalidPixelDataLength(rgba.len()));
    }

    let alpha_color = previous.alpha_color();
    let end_sentinel = previous.end_sentinel();

    let mut atlas = rgba.to_vec();
    normalize_alpha(&mut atlas, alpha_color);

    let survey = survey_colors(&atlas, alpha_color, end_sentinel);
    debug!("Atlas uses {} content colors", survey.len());

    let reduced = survey.len() > CONTENT_COLORS;
    let content = if reduced {
        info!("Quantizing atlas with {} colors", survey.len());
        let targets: Vec<usize> = atlas
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, p)| {
                let color = [p[0], p[1], p[2]];
                p[3] != 0 && color != alpha_color && color != end_sentinel
            })
            .map(|(i, _)| i)
            .collect();
        let pixels: Vec<Rgb> = targets
            .iter()
            .map(|&i| [atlas[i * 4], atlas[i * 4 + 1], atlas[i * 4 + 2]])
            .collect();

        let mut reduction = reduce_with_fallback(&pixels, options)?;
        for color in reduction.palette.iter_mut() {
            if *color == [0, 0, 0] {
                *color = NEAR_BLACK;
            }
        }

        // Transparent pixels are left out of the reduction, so they keep
        // their normalized value.
        for (&i, &index) in targets.iter().zip(&reduction.indices) {
            let color = reduction.palette[index as usize];
            atlas[i * 4..i * 4 + 4].copy_from_slice(&[color[0], color[1], color[2], 255]);
        }
        reduction.palette
    } else {
        survey
    };

    let covered = previous.covers(&content);
    let palette = assemble(alpha_color, content, end_sentinel);
    let shared = palette.shared_entries(previous);
    let kept_previous = covered && shared >= options.stability_threshold;
    if kept_previous {
        debug!("New palette shares {} entries, keeping the previous one", shared);
    }

    Ok(Quantized {
        palette: if kept_previous { previous.clone() } else { palette },
        rgba: atlas,
        kept_previous,
        reduced,
    })
}
