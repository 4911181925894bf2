use std::collections::HashMap;

use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::constants::{ALPHA_RUN_FLAG, END_SLOT, MAX_RUN, ROW_TERMINATOR};
use crate::image::format::{FrameDescriptor, Palette, Rgb};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EtrleCompressionError {
    #[error("Got {buffers} frame buffers for {frames} frame descriptors")]
    FrameCountMismatch { frames: usize, buffers: usize },
    #[error("Frame {frame} holds {actual} bytes, its geometry needs {expected}")]
    FrameSize {
        frame: usize,
        expected: usize,
        actual: usize,
    },
}

/// The stream ran out before every frame was filled. Not fatal: the decoded
/// image is still returned, padded with transparent pixels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Compressed stream ended at byte {position} (frame {frame}, row {row})")]
pub struct TruncatedStreamError {
    pub frame: usize,
    pub row: usize,
    pub position: usize,
}

#[derive(Debug)]
pub struct EtrleDecoded {
    /// RGBA atlas covering every frame, in frame order
    pub rgba: Vec<u8>,
    /// Bytes of the stream that were consumed
    pub consumed: usize,
    pub truncated: Option<TruncatedStreamError>,
}

/// Maps colors to palette indices for the encoder.
///
/// Exact matches win; otherwise the nearest entry by squared RGB distance.
/// Slots 0 and 255 are only ever chosen on an exact match: index 0 stands for
/// transparency and index 255 is the end sentinel.
pub struct PaletteLookup<'a> {
    palette: &'a Palette,
    exact: HashMap<Rgb, u8>,
}

impl<'a> PaletteLookup<'a> {
    pub fn new(palette: &'a Palette) -> Self {
        let mut exact = HashMap::with_capacity(256);
        for (index, color) in palette.colors().iter().enumerate().skip(1).rev() {
            exact.insert(*color, index as u8);
        }
        exact.entry(palette.alpha_color()).or_insert(0);
        Self { palette, exact }
    }

    pub fn index_of(&self, color: Rgb) -> u8 {
        if let Some(&index) = self.exact.get(&color) {
            return index;
        }
        self.nearest(color)
    }

    fn nearest(&self, color: Rgb) -> u8 {
        let mut best = (u32::MAX, 1u8);
        for (index, entry) in self.palette.colors().iter().enumerate().take(END_SLOT).skip(1) {
            let distance = squared_distance(color, *entry);
            if distance < best.0 {
                best = (distance, index as u8);
            }
        }
        best.1
    }
}

pub fn squared_distance(a: Rgb, b: Rgb) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// Appends the run packets for one row of RGBA pixels to `out`.
///
/// Runs alternate between transparent (alpha 0) and opaque pixels and never
/// exceed 127 pixels. The row terminator is not written.
pub fn encode_row(row: &[u8], lookup: &PaletteLookup<'_>, out: &mut Vec<u8>) {
    let pixels: Vec<&[u8]> = row.chunks_exact(4).collect();
    let width = pixels.len();
    let mut col = 0;

    while col < width {
        let transparent = pixels[col][3] == 0;
        let mut len = 1;
        while col + len < width && len < MAX_RUN && (pixels[col + len][3] == 0) == transparent {
            len += 1;
        }

        if transparent {
            out.push(ALPHA_RUN_FLAG | len as u8);
        } else {
            out.push(len as u8);
            out.extend(
                pixels[col..col + len]
                    .iter()
                    .map(|p| lookup.index_of([p[0], p[1], p[2]])),
            );
        }
        col += len;
    }
}

/// Compresses one frame: every row's packets followed by the row terminator.
pub fn etrle_compress_frame(rgba: &[u8], width: u16, lookup: &PaletteLookup<'_>) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(rgba.len() / 4);
    if width == 0 {
        return encoded;
    }
    for row in rgba.chunks_exact(width as usize * 4) {
        encode_row(row, lookup, &mut encoded);
        encoded.push(ROW_TERMINATOR);
    }
    encoded
}

/// Compresses every frame independently and returns the streams in frame
/// order. With `parallel` set the frames are spread over the rayon pool.
pub fn etrle_compression(
    frames: &[Vec<u8>],
    geometry: &[FrameDescriptor],
    palette: &Palette,
    parallel: bool,
) -> Result<Vec<Vec<u8>>, EtrleCompressionError> {
    if frames.len() != geometry.len() {
        return Err(EtrleCompressionError::FrameCountMismatch {
            frames: geometry.len(),
            buffers: frames.len(),
        });
    }
    for (frame, (rgba, descriptor)) in frames.iter().zip(geometry).enumerate() {
        if rgba.len() != descriptor.rgba_len() {
            return Err(EtrleCompressionError::FrameSize {
                frame,
                expected: descriptor.rgba_len(),
                actual: rgba.len(),
            });
        }
    }

    let lookup = PaletteLookup::new(palette);
    let encoded: Vec<Vec<u8>> = if parallel {
        frames
            .par_iter()
            .zip(geometry.par_iter())
            .map(|(rgba, descriptor)| etrle_compress_frame(rgba, descriptor.width, &lookup))
            .collect()
    } else {
        frames
            .iter()
            .zip(geometry)
            .map(|(rgba, descriptor)| etrle_compress_frame(rgba, descriptor.width, &lookup))
            .collect()
    };

    debug!(
        "ETRLE compressed {} frames into {} bytes",
        encoded.len(),
        encoded.iter().map(Vec::len).sum::<usize>()
    );
    Ok(encoded)
}

/// Whether `len` bytes of stream could describe every pixel of `frames`.
///
/// A control byte yields at most 127 pixels, so anything beyond that is
/// geometry the payload can never have come from.
pub fn can_cover(len: usize, frames: &[FrameDescriptor]) -> bool {
    let pixels = frames
        .iter()
        .fold(0usize, |sum, frame| sum.saturating_add(frame.pixel_count()));
    pixels <= len.saturating_mul(MAX_RUN)
}

/// Expands an ETRLE stream into one RGBA atlas covering `frames`.
///
/// Alpha runs become `(palette[0], 0)`, literal indices `(palette[i], 255)`.
/// Every row yields exactly `width` pixels: runs that spill past the row end
/// are clipped. Reading stops at the end of `data`; whatever is missing is
/// left transparent and reported through [`EtrleDecoded::truncated`].
pub fn etrle_decompression(data: &[u8], palette: &Palette, frames: &[FrameDescriptor]) -> EtrleDecoded {
    let total: usize = frames.iter().map(FrameDescriptor::rgba_len).sum();
    let alpha = palette.alpha_color();
    let transparent = [alpha[0], alpha[1], alpha[2], 0];

    let mut rgba = Vec::with_capacity(total.min(data.len().saturating_mul(MAX_RUN * 4)));
    let mut cursor = 0;
    let mut clipped = 0usize;
    let mut truncated = None;

    'frames: for (frame_index, frame) in frames.iter().enumerate() {
        let width = frame.width as usize;
        for row in 0..frame.height as usize {
            let mut col = 0;
            while col < width {
                let Some(&control) = data.get(cursor) else {
                    truncated = Some(TruncatedStreamError {
                        frame: frame_index,
                        row,
                        position: cursor,
                    });
                    break 'frames;
                };
                cursor += 1;

                let run = (control & 0x7F) as usize;
                let fits = run.min(width - col);
                clipped += run - fits;

                if control & ALPHA_RUN_FLAG != 0 {
                    for _ in 0..fits {
                        rgba.extend_from_slice(&transparent);
                    }
                    col += fits;
                    continue;
                }

                let end = (cursor + run).min(data.len());
                let indices = &data[cursor..end];
                cursor = end;
                for &index in indices.iter().take(fits) {
                    let [r, g, b] = palette.get(index);
                    rgba.extend_from_slice(&[r, g, b, 255]);
                }
                col += indices.len().min(fits);

                if indices.len() < run {
                    truncated = Some(TruncatedStreamError {
                        frame: frame_index,
                        row,
                        position: cursor,
                    });
                    break 'frames;
                }
            }
        }
    }

    if clipped > 0 {
        warn!("{} pixels ran past their row end and were dropped", clipped);
    }
    if let Some(ref err) = truncated {
        warn!("{}", err);
        while rgba.len() < total {
            rgba.extend_from_slice(&transparent);
        }
    }

    EtrleDecoded {
        rgba,
        consumed: cursor,
        truncated,
    }
}
