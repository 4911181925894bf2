use std::collections::HashMap;

use super::etrle::squared_distance;
use super::palette::{ColorReducer, QuantizeError, Reduction};
use crate::image::format::Rgb;

/// Median-cut reducer. Always available; used when libimagequant is not
/// compiled in or fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct MedianCut;

#[derive(Debug, Clone, Copy)]
enum Channel {
    Red,
    Green,
    Blue,
}

/// A box of distinct colors with their pixel counts.
#[derive(Debug, Clone)]
struct ColorBox {
    colors: Vec<(Rgb, u32)>,
}

impl ColorBox {
    fn widest_channel(&self) -> Channel {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for (color, _) in &self.colors {
            for c in 0..3 {
                min[c] = min[c].min(color[c]);
                max[c] = max[c].max(color[c]);
            }
        }
        let range = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];

        if range[0] >= range[1] && range[0] >= range[2] {
            Channel::Red
        } else if range[1] >= range[2] {
            Channel::Green
        } else {
            Channel::Blue
        }
    }

    /// Splits along the widest channel at the pixel-weighted median.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let channel = self.widest_channel() as usize;
        self.colors.sort_by_key(|(color, _)| color[channel]);

        let total: u64 = self.pixel_count();
        let mut running = 0u64;
        let mut split_idx = self.colors.len() / 2;
        for (i, (_, count)) in self.colors.iter().enumerate() {
            running += *count as u64;
            if running * 2 >= total {
                split_idx = i + 1;
                break;
            }
        }
        // Neither half may be empty
        split_idx = split_idx.clamp(1, self.colors.len() - 1);

        let right = self.colors.split_off(split_idx);
        (ColorBox { colors: self.colors }, ColorBox { colors: right })
    }

    fn average_color(&self) -> Rgb {
        let total = self.pixel_count().max(1);
        let mut sums = [0u64; 3];
        for (color, count) in &self.colors {
            for c in 0..3 {
                sums[c] += color[c] as u64 * *count as u64;
            }
        }
        [
            (sums[0] / total) as u8,
            (sums[1] / total) as u8,
            (sums[2] / total) as u8,
        ]
    }

    fn pixel_count(&self) -> u64 {
        self.colors.iter().map(|(_, count)| *count as u64).sum()
    }
}

/// Chooses at most `max_colors` representative colors from a histogram.
pub fn median_cut_palette(histogram: HashMap<Rgb, u32>, max_colors: usize) -> Vec<Rgb> {
    let mut colors: Vec<(Rgb, u32)> = histogram.into_iter().collect();
    colors.sort_unstable();
    if colors.len() <= max_colors {
        return colors.into_iter().map(|(color, _)| color).collect();
    }
    if max_colors == 0 {
        return Vec::new();
    }

    let mut boxes = vec![ColorBox { colors }];
    while boxes.len() < max_colors {
        let Some(idx) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| b.pixel_count())
            .map(|(i, _)| i)
        else {
            break;
        };

        let (left, right) = boxes.swap_remove(idx).split();
        boxes.push(left);
        boxes.push(right);
    }

    boxes.iter().map(ColorBox::average_color).collect()
}

fn nearest_index(color: Rgb, palette: &[Rgb]) -> u8 {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(_, entry)| squared_distance(color, **entry))
        .map(|(i, _)| i as u8)
        .unwrap_or(0)
}

impl ColorReducer for MedianCut {
    fn name(&self) -> &'static str {
        "median-cut"
    }

    fn reduce(&self, pixels: &[Rgb], max_colors: usize) -> Result<Reduction, QuantizeError> {
        let mut histogram: HashMap<Rgb, u32> = HashMap::new();
        for pixel in pixels {
            *histogram.entry(*pixel).or_insert(0) += 1;
        }

        let palette = median_cut_palette(histogram, max_colors.min(256));
        let mut cache: HashMap<Rgb, u8> = HashMap::with_capacity(palette.len() * 4);
        let indices = pixels
            .iter()
            .map(|pixel| {
                *cache
                    .entry(*pixel)
                    .or_insert_with(|| nearest_index(*pixel, &palette))
            })
            .collect();

        Ok(Reduction { palette, indices })
    }
}
