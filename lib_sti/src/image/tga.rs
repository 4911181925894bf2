//! Run-length encoded truecolor TGA (image type 10).
//!
//! Packets: a header byte with bit 7 set repeats the following pixel
//! `(b & 0x7F) + 1` times, otherwise `b + 1` raw pixels follow. Pixels are
//! stored BGR or BGRA.

use bincode::Options;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::format::layout;
use crate::compression::etrle::TruncatedStreamError;

pub const RLE_TRUECOLOR: u8 = 10;
pub const FOOTER_SIGNATURE: &[u8; 18] = b"TRUEVISION-XFILE.\0";
const MAX_PACKET: usize = 128;
const ORIGIN_TOP: u8 = 0x20;

#[derive(Error, Debug)]
pub enum TgaError {
    #[error("TGA data too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("Unsupported TGA image type {0}")]
    UnsupportedType(u8),
    #[error("Unsupported TGA pixel depth {0}")]
    UnsupportedDepth(u8),
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    PixelDataLength { expected: usize, actual: usize },
    #[error("Unsupported TGA layout: {0}")]
    UnsupportedLayout(String),
    #[error("Malformed TGA record")]
    Layout(#[from] bincode::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TgaHeader {
    pub id_length: u8,
    pub color_map_type: u8,
    pub image_type: u8,
    pub color_map_origin: u16,
    pub color_map_length: u16,
    pub color_map_depth: u8,
    pub x_origin: u16,
    pub y_origin: u16,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    pub descriptor: u8,
}

impl TgaHeader {
    pub const SIZE: usize = 18;

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    pub fn alpha_bits(&self) -> u8 {
        self.descriptor & 0x0F
    }

    pub fn origin_top(&self) -> bool {
        self.descriptor & ORIGIN_TOP != 0
    }

    fn color_map_bytes(&self) -> usize {
        if self.color_map_type == 0 {
            return 0;
        }
        self.color_map_length as usize * (self.color_map_depth as usize).div_ceil(8)
    }
}

/// The 26-byte trailer of TGA 2.0 files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TgaFooter {
    pub extension_offset: u32,
    pub developer_offset: u32,
    pub signature: [u8; 18],
}

impl TgaFooter {
    pub const SIZE: usize = 26;

    fn parse(data: &[u8]) -> Option<Self> {
        let tail = data.get(data.len().checked_sub(Self::SIZE)?..)?;
        let footer: TgaFooter = layout().deserialize(tail).ok()?;
        (&footer.signature == FOOTER_SIGNATURE).then_some(footer)
    }

    /// Offsets of the extension and developer areas that are set.
    fn areas(&self) -> impl Iterator<Item = usize> {
        [self.extension_offset, self.developer_offset]
            .into_iter()
            .filter(|&offset| offset != 0)
            .map(|offset| offset as usize)
    }
}

#[derive(Debug, Clone)]
pub struct TgaImage {
    pub header: TgaHeader,
    pub image_id: Vec<u8>,
    pub color_map: Vec<u8>,
    /// Decoded pixels in file order and storage layout (BGR or BGRA)
    pub pixels: Vec<u8>,
    pub footer: Option<TgaFooter>,
    /// Extension and developer areas, kept verbatim between the pixel data
    /// and the footer
    pub extensions: Vec<u8>,
    /// File offset `extensions` was read from; footer offsets are relative to it
    pub extensions_offset: u32,
    /// Set when the packet stream ended before the image was complete
    pub truncated: Option<TruncatedStreamError>,
}

impl TgaImage {
    /// A top-left origin, 32-bit image from RGBA pixels.
    pub fn from_rgba(width: u16, height: u16, rgba: &[u8]) -> Result<Self, TgaError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(TgaError::PixelDataLength {
                expected,
                actual: rgba.len(),
            });
        }
        let pixels = rgba
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect();
        Ok(Self {
            header: TgaHeader {
                id_length: 0,
                color_map_type: 0,
                image_type: RLE_TRUECOLOR,
                color_map_origin: 0,
                color_map_length: 0,
                color_map_depth: 0,
                x_origin: 0,
                y_origin: 0,
                width,
                height,
                bits_per_pixel: 32,
                descriptor: ORIGIN_TOP | 8,
            },
            image_id: Vec::new(),
            color_map: Vec::new(),
            pixels,
            footer: None,
            extensions: Vec::new(),
            extensions_offset: 0,
            truncated: None,
        })
    }

    pub fn width(&self) -> u16 {
        self.header.width
    }

    pub fn height(&self) -> u16 {
        self.header.height
    }

    pub fn decode(data: &[u8]) -> Result<Self, TgaError> {
        if data.len() < TgaHeader::SIZE {
            return Err(TgaError::TooShort {
                needed: TgaHeader::SIZE,
                actual: data.len(),
            });
        }
        let header: TgaHeader = layout().deserialize(&data[..TgaHeader::SIZE])?;
        if header.image_type != RLE_TRUECOLOR {
            return Err(TgaError::UnsupportedType(header.image_type));
        }
        if !matches!(header.bits_per_pixel, 24 | 32) {
            return Err(TgaError::UnsupportedDepth(header.bits_per_pixel));
        }

        let id_end = TgaHeader::SIZE + header.id_length as usize;
        let map_end = id_end + header.color_map_bytes();
        if data.len() < map_end {
            return Err(TgaError::TooShort {
                needed: map_end,
                actual: data.len(),
            });
        }

        let footer = TgaFooter::parse(data);
        let (stream_end, areas_end) = match footer {
            Some(footer) => {
                let footer_start = (data.len() - TgaFooter::SIZE).max(map_end);
                let first_area = footer
                    .areas()
                    .filter(|&offset| offset >= map_end && offset < footer_start)
                    .min()
                    .unwrap_or(footer_start);
                (first_area, footer_start)
            }
            None => (data.len(), data.len()),
        };

        let stream = &data[map_end..stream_end];
        let pixel_count = header.width as usize * header.height as usize;
        if pixel_count > stream.len().saturating_mul(MAX_PACKET) {
            return Err(TgaError::UnsupportedLayout(format!(
                "{}x{} pixels cannot come from {} bytes of packets",
                header.width,
                header.height,
                stream.len()
            )));
        }

        let (pixels, truncated) = decode_packets(stream, &header);
        if let Some(ref err) = truncated {
            warn!("TGA packet stream is incomplete: {}", err);
        }
        debug!(
            "Decoded TGA {}x{} at {} bpp",
            header.width, header.height, header.bits_per_pixel
        );

        Ok(Self {
            header,
            image_id: data[TgaHeader::SIZE..id_end].to_vec(),
            color_map: data[id_end..map_end].to_vec(),
            pixels,
            footer,
            extensions: data[stream_end..areas_end].to_vec(),
            extensions_offset: stream_end as u32,
            truncated,
        })
    }

    /// Serializes as image type 10. Packets never cross a scanline. The
    /// extension areas and footer, if the source had them, are written back
    /// with the footer offsets moved to where the areas now start.
    pub fn encode(&self) -> Result<Vec<u8>, TgaError> {
        let bpp = self.header.bytes_per_pixel();
        if !matches!(self.header.bits_per_pixel, 24 | 32) {
            return Err(TgaError::UnsupportedDepth(self.header.bits_per_pixel));
        }
        let expected = self.width() as usize * self.height() as usize * bpp;
        if self.pixels.len() != expected {
            return Err(TgaError::PixelDataLength {
                expected,
                actual: self.pixels.len(),
            });
        }

        let mut header = self.header;
        header.image_type = RLE_TRUECOLOR;
        header.id_length = self.image_id.len() as u8;

        let mut out = layout().serialize(&header)?;
        out.extend_from_slice(&self.image_id);
        out.extend_from_slice(&self.color_map);
        if self.width() > 0 {
            for row in self.pixels.chunks_exact(self.width() as usize * bpp) {
                encode_packets(row, bpp, &mut out);
            }
        }
        if let Some(footer) = &self.footer {
            let start = self.extensions_offset as usize;
            let moved_to = out.len();
            let relocate = |offset: u32| -> u32 {
                let offset = offset as usize;
                if offset != 0 && offset >= start && offset < start + self.extensions.len() {
                    (offset - start + moved_to) as u32
                } else {
                    0
                }
            };
            let footer = TgaFooter {
                extension_offset: relocate(footer.extension_offset),
                developer_offset: relocate(footer.developer_offset),
                signature: footer.signature,
            };
            out.extend_from_slice(&self.extensions);
            out.extend(layout().serialize(&footer)?);
        }
        Ok(out)
    }

    /// Top-down RGBA, whatever the stored origin and depth.
    pub fn to_rgba(&self) -> Vec<u8> {
        let bpp = self.header.bytes_per_pixel();
        let width = self.width() as usize;
        let mut rgba: Vec<u8> = self
            .pixels
            .chunks_exact(bpp)
            .flat_map(|p| [p[2], p[1], p[0], if bpp == 4 { p[3] } else { 255 }])
            .collect();

        if !self.header.origin_top() && width > 0 {
            let rows: Vec<&[u8]> = rgba.chunks_exact(width * 4).rev().collect();
            rgba = rows.concat();
        }
        rgba
    }
}

fn decode_packets(data: &[u8], header: &TgaHeader) -> (Vec<u8>, Option<TruncatedStreamError>) {
    let bpp = header.bytes_per_pixel();
    let width = header.width as usize;
    let total = width * header.height as usize * bpp;
    let mut pixels = Vec::with_capacity(total.min(data.len().saturating_mul(bpp)));
    let mut cursor = 0;
    let mut truncated = None;

    while pixels.len() < total {
        let Some(&packet) = data.get(cursor) else {
            truncated = Some(cursor);
            break;
        };
        cursor += 1;
        let remaining = (total - pixels.len()) / bpp;

        if packet & 0x80 != 0 {
            let count = (packet & 0x7F) as usize + 1;
            let Some(pixel) = data.get(cursor..cursor + bpp) else {
                truncated = Some(cursor);
                break;
            };
            cursor += bpp;
            for _ in 0..count.min(remaining) {
                pixels.extend_from_slice(pixel);
            }
        } else {
            let count = packet as usize + 1;
            let wanted = count.min(remaining) * bpp;
            let available = data.len().saturating_sub(cursor);
            let raw = &data[cursor..cursor + (count * bpp).min(available)];
            cursor += raw.len();
            let whole = raw.len() - raw.len() % bpp;
            pixels.extend_from_slice(&raw[..whole.min(wanted)]);
            if raw.len() < count * bpp {
                truncated = Some(cursor);
                break;
            }
        }
    }

    let truncated = truncated.map(|position| {
        let done = pixels.len() / bpp.max(1);
        pixels.resize(total, 0);
        TruncatedStreamError {
            frame: 0,
            row: if width > 0 { done / width } else { 0 },
            position,
        }
    });
    (pixels, truncated)
}

fn encode_packets(row: &[u8], bpp: usize, out: &mut Vec<u8>) {
    let pixels: Vec<&[u8]> = row.chunks_exact(bpp).collect();
    let mut i = 0;

    while i < pixels.len() {
        let mut run = 1;
        while i + run < pixels.len() && run < MAX_PACKET && pixels[i + run] == pixels[i] {
            run += 1;
        }
        if run > 1 {
            out.push(0x80 | (run - 1) as u8);
            out.extend_from_slice(pixels[i]);
            i += run;
            continue;
        }

        // Raw packet up to the next pair of equal pixels
        let start = i;
        i += 1;
        while i < pixels.len() && i - start < MAX_PACKET {
            if i + 1 < pixels.len() && pixels[i] == pixels[i + 1] {
                break;
            }
            i += 1;
        }
        out.push((i - start - 1) as u8);
        for pixel in &pixels[start..i] {
            out.extend_from_slice(pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(width: u16, height: u16, bits: u8, descriptor: u8) -> Vec<u8> {
        let mut h = vec![0u8; 18];
        h[2] = RLE_TRUECOLOR;
        h[12..14].copy_from_slice(&width.to_le_bytes());
        h[14..16].copy_from_slice(&height.to_le_bytes());
        h[16] = bits;
        h[17] = descriptor;
        h
    }

    #[test]
    fn test_decode_repeat_and_raw_packets() {
        let mut data = header(4, 1, 24, ORIGIN_TOP);
        data.extend([0x81, 1, 2, 3]);
        data.extend([0x01, 4, 5, 6, 7, 8, 9]);

        let tga = TgaImage::decode(&data).unwrap();
        assert!(tga.truncated.is_none());
        assert_eq!(tga.pixels, vec![1, 2, 3, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(
            tga.to_rgba(),
            vec![3, 2, 1, 255, 3, 2, 1, 255, 6, 5, 4, 255, 9, 8, 7, 255]
        );
    }

    #[test]
    fn test_bottom_origin_is_flipped() {
        let mut data = header(1, 2, 32, 8);
        data.extend([0x00, 10, 20, 30, 40, 0x00, 50, 60, 70, 80]);

        let tga = TgaImage::decode(&data).unwrap();
        assert_eq!(tga.to_rgba(), vec![70, 60, 50, 80, 30, 20, 10, 40]);
    }

    #[test]
    fn test_truncated_packets_are_padded() {
        let mut data = header(3, 2, 24, ORIGIN_TOP);
        data.extend([0x82, 1, 2, 3, 0x02, 4, 5]);

        let tga = TgaImage::decode(&data).unwrap();
        let truncated = tga.truncated.unwrap();
        assert_eq!(truncated.row, 1);
        assert_eq!(tga.pixels.len(), 18);
        assert_eq!(&tga.pixels[..9], &[1, 2, 3, 1, 2, 3, 1, 2, 3]);
        assert!(tga.pixels[9..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_other_types_are_rejected() {
        let mut data = header(1, 1, 24, 0);
        data[2] = 2;
        assert!(matches!(
            TgaImage::decode(&data),
            Err(TgaError::UnsupportedType(2))
        ));
    }

    #[test]
    fn test_encode_round_trip_keeps_footer() {
        let mut data = header(5, 1, 24, ORIGIN_TOP);
        data.extend([0x82, 9, 9, 9, 0x01, 1, 1, 1, 2, 2, 2]);
        data.extend([0u8; 8]);
        data.extend_from_slice(FOOTER_SIGNATURE);

        let tga = TgaImage::decode(&data).unwrap();
        assert!(tga.footer.is_some());
        assert_eq!(tga.pixels.len(), 15);

        let encoded = tga.encode().unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_extension_area_follows_reencoded_pixels() {
        let mut data = header(2, 1, 24, ORIGIN_TOP);
        data.extend([0x81, 1, 2, 3]);
        let mut extension = vec![0xAB; 495];
        extension[..2].copy_from_slice(&495u16.to_le_bytes());
        data.extend_from_slice(&extension);
        data.extend(22u32.to_le_bytes());
        data.extend(0u32.to_le_bytes());
        data.extend_from_slice(FOOTER_SIGNATURE);

        let mut tga = TgaImage::decode(&data).unwrap();
        assert!(tga.truncated.is_none());
        assert_eq!(tga.pixels, vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(tga.extensions, extension);

        // A raw packet is longer, so the extension area moves back
        tga.pixels = vec![1, 2, 3, 4, 5, 6];
        let encoded = tga.encode().unwrap();
        assert_eq!(encoded.len(), 18 + 7 + 495 + 26);
        let footer = &encoded[encoded.len() - 26..];
        assert_eq!(u32::from_le_bytes(footer[..4].try_into().unwrap()), 25);
        assert_eq!(u32::from_le_bytes(footer[4..8].try_into().unwrap()), 0);
        assert_eq!(&encoded[25..25 + 495], extension.as_slice());

        let reloaded = TgaImage::decode(&encoded).unwrap();
        assert_eq!(reloaded.pixels, tga.pixels);
        assert_eq!(reloaded.extensions, extension);
    }

    #[test]
    fn test_oversized_geometry_is_rejected() {
        let mut data = header(60000, 60000, 32, ORIGIN_TOP);
        data.extend([0xFF, 1, 2, 3, 4]);
        assert!(matches!(
            TgaImage::decode(&data),
            Err(TgaError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn test_long_runs_split_at_128() {
        let image = TgaImage::from_rgba(130, 1, &[7u8, 8, 9, 255].repeat(130)).unwrap();
        let encoded = image.encode().unwrap();
        assert_eq!(encoded[18], 0xFF);
        assert_eq!(encoded[18 + 5], 0x81);
        assert_eq!(encoded.len(), 18 + 2 * 5);

        let decoded = TgaImage::decode(&encoded).unwrap();
        assert_eq!(decoded.to_rgba(), [7u8, 8, 9, 255].repeat(130));
    }
}
