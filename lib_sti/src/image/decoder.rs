use bincode::Options;
use log::{debug, error, info, warn};
use thiserror::Error;

use super::atlas::AtlasError;
use super::format::{
    layout, FrameDescriptor, FrameEntry, IndexedSti, Palette, RawHeader, StiFlags, StiHeader,
    StiImage, TrueColorSti, MAGIC_HEADER,
};
use super::rgb565;
use crate::compression::decompress;
use crate::compression::etrle::can_cover;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid format or header")]
    InvalidHeader,
    #[error("Unexpected end of data while reading {section}: need {needed} bytes, got {actual}")]
    TooShort {
        section: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("Frame table does not match the decoded image")]
    Atlas(#[from] AtlasError),
    #[error("Malformed header record")]
    Layout(#[from] bincode::Error),
}

fn take<'a>(
    data: &'a [u8],
    start: usize,
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], DecodeError> {
    data.get(start..start + len).ok_or_else(|| {
        error!("Unexpected end of data while reading {}", section);
        DecodeError::TooShort {
            section,
            needed: start + len,
            actual: data.len(),
        }
    })
}

/// Reads and validates the 64-byte header.
pub fn read_header(data: &[u8]) -> Result<StiHeader, DecodeError> {
    let bytes = take(data, 0, StiHeader::SIZE, "header")?;
    let raw: RawHeader = layout().deserialize(bytes)?;
    if raw.magic != MAGIC_HEADER {
        error!("Invalid format or missing magic number in header");
        return Err(DecodeError::InvalidHeader);
    }
    debug!("Magic number validated successfully");

    let header = StiHeader::from_raw(&raw)?;
    debug!(
        "Header read: {}x{}, flags {:?}, bit depth {}",
        header.width, header.height, header.flags, header.bit_depth
    );
    Ok(header)
}

/// Decodes an indexed, ETRLE-compressed container.
///
/// Frame offsets in the table are not trusted: the payload is read as one
/// sequential stream and the offsets are recomputed on the next save. A
/// payload that ends early still produces every frame, padded with
/// transparent pixels.
pub fn decode_indexed(data: &[u8]) -> Result<IndexedSti, DecodeError> {
    let header = read_header(data)?;
    if !header.is_indexed() {
        return Err(DecodeError::UnsupportedLayout(
            "not an indexed container".to_string(),
        ));
    }
    if header.flags.contains(StiFlags::ZLIB) {
        return Err(DecodeError::UnsupportedLayout(
            "zlib-compressed payload".to_string(),
        ));
    }
    if !header.flags.contains(StiFlags::ETRLE) {
        return Err(DecodeError::UnsupportedLayout(
            "indexed payload without ETRLE compression".to_string(),
        ));
    }

    // Read palette
    let mut cursor = StiHeader::SIZE;
    let palette_bytes = take(data, cursor, Palette::BYTES, "palette")?;
    let palette = Palette::from_bytes(palette_bytes).ok_or(DecodeError::InvalidHeader)?;
    cursor += Palette::BYTES;
    debug!("Palette read, alpha color {:?}", palette.alpha_color());

    // Read frame table
    let num_frames = header.num_frames() as usize;
    let table = take(data, cursor, num_frames * FrameEntry::SIZE, "frame table")?;
    let descriptors = table
        .chunks_exact(FrameEntry::SIZE)
        .map(|chunk| layout().deserialize::<FrameEntry>(chunk).map(FrameDescriptor::from))
        .collect::<Result<Vec<_>, _>>()?;
    cursor += num_frames * FrameEntry::SIZE;
    debug!("Frame table read: {} frames", descriptors.len());

    let payload = &data[cursor..];
    if payload.len() != header.compressed_size as usize {
        debug!(
            "Header claims {} compressed bytes, payload holds {}",
            header.compressed_size,
            payload.len()
        );
    }

    if !can_cover(payload.len(), &descriptors) {
        return Err(DecodeError::UnsupportedLayout(format!(
            "frame geometry needs more pixels than {} payload bytes can hold",
            payload.len()
        )));
    }

    let (frames, truncated) = decompress(payload, &palette, descriptors)?;
    if let Some(ref err) = truncated {
        warn!("Container payload is incomplete: {}", err);
    }
    info!("Decoded indexed container with {} frames", frames.len());

    Ok(IndexedSti {
        header,
        palette,
        frames,
        truncated,
    })
}

/// Decodes a 16-bit RGB565 container into packed RGB888.
pub fn decode_true_color(data: &[u8]) -> Result<TrueColorSti, DecodeError> {
    let header = read_header(data)?;
    if header.is_indexed() || !header.flags.contains(StiFlags::HIGH_COLOR) {
        return Err(DecodeError::UnsupportedLayout(
            "not a 16-bit container".to_string(),
        ));
    }

    let pixels = header.width as usize * header.height as usize;
    let payload = take(data, StiHeader::SIZE, pixels * 2, "pixel data")?;
    let rgb = rgb565::unpack(payload);
    info!("Decoded 16-bit container {}x{}", header.width, header.height);

    let mut image = TrueColorSti::new(header.width, header.height, rgb);
    image.header = header;
    Ok(image)
}

/// Decodes either container flavor, chosen by the header flags.
pub fn decode(data: &[u8]) -> Result<StiImage, DecodeError> {
    let header = read_header(data)?;
    if header.is_indexed() {
        decode_indexed(data).map(StiImage::Indexed)
    } else if header.flags.contains(StiFlags::HIGH_COLOR) {
        decode_true_color(data).map(StiImage::TrueColor)
    } else {
        Err(DecodeError::UnsupportedLayout(format!(
            "flags {:#x} describe neither variant",
            header.flags.bits()
        )))
    }
}
