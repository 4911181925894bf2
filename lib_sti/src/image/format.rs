use bincode::Options;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::atlas::{FrameSet, ResizePolicy};
use crate::compression::etrle::TruncatedStreamError;
use crate::constants::{ALPHA_SLOT, END_SLOT, PALETTE_SIZE};

pub const MAGIC_HEADER: [u8; 4] = *b"STCI";

pub type Rgb = [u8; 3];

/// Fixed-width little-endian encoding shared by every on-disk record.
pub(crate) fn layout() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StiFlags: u32 {
        const TRANSPARENT = 1 << 0;
        const HIGH_COLOR = 1 << 2;
        const INDEXED = 1 << 3;
        /// Never produced; payloads carrying it are rejected.
        const ZLIB = 1 << 4;
        const ETRLE = 1 << 5;
    }
}

/// The 64-byte STCI header exactly as laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    pub magic: [u8; 4],
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub reserved_key: [u8; 4],
    pub flags: u32,
    pub height: u16,
    pub width: u16,
    pub color_info: [u8; 20],
    pub bit_depth: u8,
    pub reserved: [u8; 19],
}

/// Color description of an indexed container (bytes 24..44 of the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedColorInfo {
    pub num_colors: u32,
    pub num_frames: u16,
    pub r_depth: u8,
    pub g_depth: u8,
    pub b_depth: u8,
    pub reserved: [u8; 11],
}

/// Color description of a 16-bit container (bytes 24..44 of the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrueColorInfo {
    pub r_mask: u32,
    pub g_mask: u32,
    pub b_mask: u32,
    pub alpha_mask: u32,
    pub r_depth: u8,
    pub g_depth: u8,
    pub b_depth: u8,
    pub alpha_depth: u8,
}

impl Default for IndexedColorInfo {
    fn default() -> Self {
        Self {
            num_colors: PALETTE_SIZE as u32,
            num_frames: 0,
            r_depth: 8,
            g_depth: 8,
            b_depth: 8,
            reserved: [0; 11],
        }
    }
}

impl Default for TrueColorInfo {
    fn default() -> Self {
        Self {
            r_mask: 0xF800,
            g_mask: 0x07E0,
            b_mask: 0x001F,
            alpha_mask: 0,
            r_depth: 5,
            g_depth: 6,
            b_depth: 5,
            alpha_depth: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorInfo {
    Indexed(IndexedColorInfo),
    TrueColor(TrueColorInfo),
}

/// Parsed header. Reserved bytes are kept so a load/save cycle does not
/// disturb them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StiHeader {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub flags: StiFlags,
    pub height: u16,
    pub width: u16,
    pub color: ColorInfo,
    pub bit_depth: u8,
    pub reserved_key: [u8; 4],
    pub reserved: [u8; 19],
}

impl StiHeader {
    pub const SIZE: usize = 64;

    pub fn indexed(width: u16, height: u16, num_frames: u16) -> Self {
        Self {
            uncompressed_size: 0,
            compressed_size: 0,
            flags: StiFlags::INDEXED | StiFlags::ETRLE,
            height,
            width,
            color: ColorInfo::Indexed(IndexedColorInfo {
                num_frames,
                ..Default::default()
            }),
            bit_depth: 8,
            reserved_key: [0; 4],
            reserved: [0; 19],
        }
    }

    pub fn true_color(width: u16, height: u16) -> Self {
        Self {
            uncompressed_size: 0,
            compressed_size: 0,
            flags: StiFlags::HIGH_COLOR,
            height,
            width,
            color: ColorInfo::TrueColor(TrueColorInfo::default()),
            bit_depth: 16,
            reserved_key: [0; 4],
            reserved: [0; 19],
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.flags.contains(StiFlags::INDEXED)
    }

    pub fn num_frames(&self) -> u16 {
        match self.color {
            ColorInfo::Indexed(info) => info.num_frames,
            ColorInfo::TrueColor(_) => 1,
        }
    }

    /// Interprets the color-info block according to the flags.
    pub fn from_raw(raw: &RawHeader) -> bincode::Result<Self> {
        let flags = StiFlags::from_bits_retain(raw.flags);
        let color = if flags.contains(StiFlags::INDEXED) {
            ColorInfo::Indexed(layout().deserialize(&raw.color_info)?)
        } else {
            ColorInfo::TrueColor(layout().deserialize(&raw.color_info)?)
        };
        Ok(Self {
            uncompressed_size: raw.uncompressed_size,
            compressed_size: raw.compressed_size,
            flags,
            height: raw.height,
            width: raw.width,
            color,
            bit_depth: raw.bit_depth,
            reserved_key: raw.reserved_key,
            reserved: raw.reserved,
        })
    }

    pub fn to_raw(&self) -> bincode::Result<RawHeader> {
        let block = match &self.color {
            ColorInfo::Indexed(info) => layout().serialize(info)?,
            ColorInfo::TrueColor(info) => layout().serialize(info)?,
        };
        let mut color_info = [0u8; 20];
        color_info.copy_from_slice(&block);
        Ok(RawHeader {
            magic: MAGIC_HEADER,
            uncompressed_size: self.uncompressed_size,
            compressed_size: self.compressed_size,
            reserved_key: self.reserved_key,
            flags: self.flags.bits(),
            height: self.height,
            width: self.width,
            color_info,
            bit_depth: self.bit_depth,
            reserved: self.reserved,
        })
    }

    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        layout().serialize(&self.to_raw()?)
    }
}

/// One row of the frame table as laid out on disk. Height precedes width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub offset: u32,
    pub size: u32,
    pub x: u16,
    pub y: u16,
    pub height: u16,
    pub width: u16,
}

impl FrameEntry {
    pub const SIZE: usize = 16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDescriptor {
    /// Start of this frame's stream within the compressed payload
    pub offset: u32,
    /// Length of this frame's stream within the compressed payload
    pub size: u32,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FrameDescriptor {
    pub fn with_geometry(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn geometry(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes this frame occupies in an RGBA atlas.
    pub fn rgba_len(&self) -> usize {
        self.pixel_count() * 4
    }
}

impl From<FrameEntry> for FrameDescriptor {
    fn from(entry: FrameEntry) -> Self {
        Self {
            offset: entry.offset,
            size: entry.size,
            x: entry.x,
            y: entry.y,
            width: entry.width,
            height: entry.height,
        }
    }
}

impl From<&FrameDescriptor> for FrameEntry {
    fn from(frame: &FrameDescriptor) -> Self {
        Self {
            offset: frame.offset,
            size: frame.size,
            x: frame.x,
            y: frame.y,
            height: frame.height,
            width: frame.width,
        }
    }
}

/// Exactly 256 RGB entries. Slot 0 is the alpha color, slot 255 the end
/// sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [Rgb; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: [[0; 3]; PALETTE_SIZE],
        }
    }
}

impl Palette {
    pub const BYTES: usize = PALETTE_SIZE * 3;

    pub fn new(colors: [Rgb; PALETTE_SIZE]) -> Self {
        Self { colors }
    }

    /// Reads 256 packed RGB triples. Returns `None` if `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::BYTES)?;
        let mut colors = [[0; 3]; PALETTE_SIZE];
        for (color, chunk) in colors.iter_mut().zip(bytes.chunks_exact(3)) {
            color.copy_from_slice(chunk);
        }
        Some(Self { colors })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.colors.iter().flatten().copied().collect()
    }

    pub fn colors(&self) -> &[Rgb; PALETTE_SIZE] {
        &self.colors
    }

    pub fn get(&self, index: u8) -> Rgb {
        self.colors[index as usize]
    }

    pub fn alpha_color(&self) -> Rgb {
        self.colors[ALPHA_SLOT]
    }

    pub fn end_sentinel(&self) -> Rgb {
        self.colors[END_SLOT]
    }

    /// Whether every color in `content` has a slot between the reserved ones.
    pub fn covers(&self, content: &[Rgb]) -> bool {
        let slots: std::collections::HashSet<&Rgb> =
            self.colors[1..PALETTE_SIZE - 1].iter().collect();
        content.iter().all(|color| slots.contains(color))
    }

    /// Number of entries the two palettes have in common, counted as multisets.
    pub fn shared_entries(&self, other: &Palette) -> usize {
        let mut ours = self.colors.to_vec();
        let mut theirs = other.colors.to_vec();
        ours.sort_unstable();
        theirs.sort_unstable();

        let (mut i, mut j, mut shared) = (0, 0, 0);
        while i < ours.len() && j < theirs.len() {
            match ours[i].cmp(&theirs[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        shared
    }
}

/// An indexed, ETRLE-compressed multi-frame container (STI8).
#[derive(Debug, Clone)]
pub struct IndexedSti {
    pub header: StiHeader,
    pub palette: Palette,
    pub frames: FrameSet,
    /// Set when the payload ended early on load
    pub truncated: Option<TruncatedStreamError>,
}

impl IndexedSti {
    /// Builds a container from already split frames. The header describes a
    /// single atlas the size of the first frame.
    pub fn new(palette: Palette, frames: FrameSet) -> Self {
        let (width, height) = frames
            .descriptors()
            .first()
            .map(FrameDescriptor::geometry)
            .unwrap_or((0, 0));
        let header = StiHeader::indexed(width, height, frames.len() as u16);
        Self {
            header,
            palette,
            frames,
            truncated: None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Replaces one frame's pixels, see [`FrameSet::replace_frame`].
    ///
    /// A single-frame container keeps its header geometry in step with the
    /// frame.
    pub fn replace_frame(
        &mut self,
        index: usize,
        rgba: Vec<u8>,
        width: u16,
        height: u16,
    ) -> Result<(), super::atlas::AtlasError> {
        let previous = self.frames.descriptor(index).map(FrameDescriptor::geometry);
        self.frames.replace_frame(index, rgba, width, height)?;

        if self.frames.len() == 1 && previous == Some((self.header.width, self.header.height)) {
            self.header.width = width;
            self.header.height = height;
        }
        Ok(())
    }
}

/// A raw 16-bit container (STI16). Pixels are held as packed RGB888.
#[derive(Debug, Clone)]
pub struct TrueColorSti {
    pub header: StiHeader,
    pub rgb: Vec<u8>,
    pub policy: ResizePolicy,
}

impl TrueColorSti {
    pub fn new(width: u16, height: u16, rgb: Vec<u8>) -> Self {
        Self {
            header: StiHeader::true_color(width, height),
            rgb,
            policy: ResizePolicy::for_geometry(width, height),
        }
    }

    pub fn width(&self) -> u16 {
        self.header.width
    }

    pub fn height(&self) -> u16 {
        self.header.height
    }

    /// Swaps the image for `rgb`, subject to the same geometry rules as
    /// indexed frames.
    pub fn replace_image(
        &mut self,
        rgb: Vec<u8>,
        width: u16,
        height: u16,
    ) -> Result<(), super::atlas::AtlasError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(super::atlas::AtlasError::BufferSize {
                expected,
                actual: rgb.len(),
            });
        }
        let current = (self.width(), self.height());
        if !self.policy.permits(current, (width, height)) {
            return Err(super::atlas::AtlasError::UnsupportedLayout {
                index: 0,
                current,
                requested: (width, height),
            });
        }
        self.header.width = width;
        self.header.height = height;
        self.rgb = rgb;
        Ok(())
    }
}

/// Either flavor of STCI container.
#[derive(Debug, Clone)]
pub enum StiImage {
    Indexed(IndexedSti),
    TrueColor(TrueColorSti),
}
