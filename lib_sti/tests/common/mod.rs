#![allow(dead_code)]

use lib_sti::image::atlas::FrameSet;
use lib_sti::{IndexedSti, Palette};

pub const SPRITE_WIDTH: u16 = 8;
pub const SPRITE_HEIGHT: u16 = 6;

/// A sprite with a transparent border and a few opaque colors inside.
/// `seed` shifts the colors so frames differ.
pub fn sprite(width: u16, height: u16, seed: u8) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            if x == 0 || y == 0 || x == width - 1 {
                rgba.extend([0, 0, 0, 0]);
            } else {
                let shade = ((x + y) % 5) as u8;
                rgba.extend([20 + seed * 10 + shade * 30, 40 + shade, 200 - seed, 255]);
            }
        }
    }
    rgba
}

/// Every pixel a distinct opaque color, except for a transparent diagonal.
pub fn gradient(width: u16, height: u16) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            if x == y {
                rgba.extend([0, 0, 0, 0]);
            } else {
                rgba.extend([(x * 6) as u8, (y * 6) as u8, ((x + y) * 3) as u8, 255]);
            }
        }
    }
    rgba
}

/// Alpha color magenta, end sentinel green, content a dull ramp.
pub fn game_palette() -> Palette {
    let mut colors = [[0u8; 3]; 256];
    for (i, color) in colors.iter_mut().enumerate() {
        *color = [i as u8, i as u8, 90];
    }
    colors[0] = [255, 0, 255];
    colors[255] = [0, 255, 0];
    Palette::new(colors)
}

pub fn sprite_sheet(frames: u8) -> IndexedSti {
    let frames = FrameSet::from_frames(
        (0..frames).map(|seed| (SPRITE_WIDTH, SPRITE_HEIGHT, sprite(SPRITE_WIDTH, SPRITE_HEIGHT, seed))),
    )
    .unwrap();
    IndexedSti::new(Palette::default(), frames)
}

pub fn distinct_colors(rgba: &[u8]) -> usize {
    let mut colors: Vec<[u8; 3]> = rgba
        .chunks_exact(4)
        .filter(|p| p[3] != 0)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    colors.sort_unstable();
    colors.dedup();
    colors.len()
}
