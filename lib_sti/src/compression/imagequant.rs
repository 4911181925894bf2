//! libimagequant backend for the palette quantizer.
//!
//! Compiled in with the `quantize` feature. Without it the reducer still
//! exists but reports itself unavailable, so the quantizer moves on to
//! median cut.

use super::palette::{ColorReducer, QuantizeError, Reduction};
use crate::image::format::Rgb;

#[derive(Debug, Clone, Copy)]
pub struct ImageQuant {
    /// 1 (slowest, best) to 10 (fastest)
    pub speed: u8,
    /// Quality ceiling, 0-100
    pub quality: u8,
}

impl ImageQuant {
    pub const AVAILABLE: bool = cfg!(feature = "quantize");
}

#[cfg(feature = "quantize")]
impl ColorReducer for ImageQuant {
    fn name(&self) -> &'static str {
        "libimagequant"
    }

    fn reduce(&self, pixels: &[Rgb], max_colors: usize) -> Result<Reduction, QuantizeError> {
        let fail = |err: ::imagequant::Error| QuantizeError::Backend {
            backend: "libimagequant",
            message: err.to_string(),
        };
        if pixels.is_empty() {
            return Ok(Reduction {
                palette: Vec::new(),
                indices: Vec::new(),
            });
        }

        let bitmap: Vec<::imagequant::RGBA> = pixels
            .iter()
            .map(|p| ::imagequant::RGBA::new(p[0], p[1], p[2], 255))
            .collect();

        let mut attr = ::imagequant::Attributes::new();
        attr.set_max_colors(max_colors.clamp(2, 256) as u32).map_err(fail)?;
        attr.set_speed(self.speed.clamp(1, 10) as i32).map_err(fail)?;
        attr.set_quality(0, self.quality.min(100)).map_err(fail)?;

        // The atlas is handed over as one long strip; only colors matter here.
        let mut image = attr.new_image(bitmap, pixels.len(), 1, 0.0).map_err(fail)?;
        let mut result = attr.quantize(&mut image).map_err(fail)?;
        result.set_dithering_level(0.0).map_err(fail)?;
        let (palette, indices) = result.remapped(&mut image).map_err(fail)?;

        Ok(Reduction {
            palette: palette.iter().map(|c| [c.r, c.g, c.b]).collect(),
            indices,
        })
    }
}

#[cfg(not(feature = "quantize"))]
impl ColorReducer for ImageQuant {
    fn name(&self) -> &'static str {
        "libimagequant"
    }

    fn reduce(&self, _pixels: &[Rgb], _max_colors: usize) -> Result<Reduction, QuantizeError> {
        Err(QuantizeError::Unavailable(self.name()))
    }
}
