use serde::{Deserialize, Serialize};

use crate::constants::STABLE_PALETTE_MATCHES;

/// Which color reducer the quantizer tries first when an atlas has more
/// colors than the palette can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuantizerBackend {
    /// libimagequant when compiled in, median cut otherwise.
    #[default]
    Auto,
    MedianCut,
    ImageQuant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeOptions {
    pub backend: QuantizerBackend,
    /// libimagequant speed, 1 (slowest, best) to 10 (fastest).
    pub speed: u8,
    /// libimagequant quality ceiling, 0-100.
    pub quality: u8,
    /// Entries that must match the previous palette for it to be kept.
    pub stability_threshold: usize,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            backend: QuantizerBackend::Auto,
            speed: 1,
            quality: 100,
            stability_threshold: STABLE_PALETTE_MATCHES,
        }
    }
}

/// Knobs for saving indexed containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub quantize: QuantizeOptions,
    /// Compress frames on the rayon pool instead of one after another.
    pub parallel_frames: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            quantize: QuantizeOptions::default(),
            parallel_frames: true,
        }
    }
}
