//! Conversion between packed RGB888 and the little-endian RGB565 payload of
//! 16-bit containers.

/// Packs one pixel, dropping the low bits of each channel.
pub fn pack_pixel(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Unpacks one pixel. Low bits come back as zero.
pub fn unpack_pixel(value: u16) -> [u8; 3] {
    [
        ((value >> 11) << 3) as u8,
        (((value >> 5) & 0x3F) << 2) as u8,
        ((value & 0x1F) << 3) as u8,
    ]
}

pub fn pack(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .flat_map(|p| pack_pixel(p[0], p[1], p[2]).to_le_bytes())
        .collect()
}

pub fn unpack(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(2)
        .flat_map(|p| unpack_pixel(u16::from_le_bytes([p[0], p[1]])))
        .collect()
}
