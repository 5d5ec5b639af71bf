use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, info};

use super::FrequencyMap;

/// Turns a non-empty frequency map into an encoded image
pub trait CloudRenderer: Send + Sync {
    fn render(&self, words: &FrequencyMap) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub max_words: usize,
    pub min_font_size: f32,
    pub max_font_size: f32,
    /// How much word size follows frequency; 0 ranks only, 1 is linear
    pub relative_scaling: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            max_words: 200,
            min_font_size: 4.0,
            max_font_size: 160.0,
            relative_scaling: 0.5,
        }
    }
}

/// A word positioned on the canvas; `x`/`y` is the top-left corner
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub word: String,
    pub size: f32,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    fn overlaps(&self, x: i32, y: i32, width: u32, height: u32) -> bool {
        x < self.x + self.width as i32
            && self.x < x + width as i32
            && y < self.y + self.height as i32
            && self.y < y + height as i32
    }
}

/// Rank words and place them on a spiral around the canvas centre.
///
/// The most frequent word is tried first at `max_font_size`; each following
/// word's size is derived from the previous one by the frequency ratio. Words
/// that do not fit shrink until they do or fall below `min_font_size`, in
/// which case they are left out. `measure` returns the pixel box of a word at
/// a given font size.
pub fn layout<F>(words: &FrequencyMap, options: &RenderOptions, mut measure: F) -> Vec<Placement>
where
    F: FnMut(&str, f32) -> (u32, u32),
{
    let mut ranked: Vec<(&str, u64)> = words.iter().map(|(w, c)| (w.as_str(), *c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(options.max_words);

    let mut placed: Vec<Placement> = Vec::with_capacity(ranked.len());
    let mut size = options.max_font_size;
    let mut last_count = match ranked.first() {
        Some((_, count)) => *count,
        None => return placed,
    };

    for (word, count) in ranked {
        let ratio = count as f32 / last_count as f32;
        size = (options.relative_scaling * ratio + (1.0 - options.relative_scaling)) * size;
        last_count = count;

        while size >= options.min_font_size {
            let (w, h) = measure(word, size);
            if let Some((x, y)) = find_spot(&placed, options, w, h) {
                placed.push(Placement {
                    word: word.to_string(),
                    size,
                    x,
                    y,
                    width: w,
                    height: h,
                });
                break;
            }
            size -= 2.0;
        }
        if size < options.min_font_size {
            // Everything after this word is at most as large; stop trying
            break;
        }
    }

    debug!("Placed {} of {} words", placed.len(), words.len());
    placed
}

fn find_spot(placed: &[Placement], options: &RenderOptions, w: u32, h: u32) -> Option<(i32, i32)> {
    if w > options.width || h > options.height {
        return None;
    }
    let cx = options.width as f32 / 2.0;
    let cy = options.height as f32 / 2.0;
    let max_radius = (cx * cx + cy * cy).sqrt();

    let mut theta = 0.0f32;
    loop {
        let radius = 2.0 * theta;
        if radius > max_radius {
            return None;
        }
        let x = (cx + radius * theta.cos() - w as f32 / 2.0) as i32;
        let y = (cy + radius * theta.sin() - h as f32 / 2.0) as i32;
        let inside = x >= 0
            && y >= 0
            && x as u32 + w <= options.width
            && y as u32 + h <= options.height;
        if inside && !placed.iter().any(|p| p.overlaps(x, y, w, h)) {
            return Some((x, y));
        }
        theta += 0.1;
    }
}

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([68, 1, 84]),
    Rgb([59, 82, 139]),
    Rgb([33, 145, 140]),
    Rgb([94, 201, 98]),
    Rgb([253, 231, 37]),
    Rgb([190, 190, 190]),
];

/// Rasterizes word clouds with a TrueType/OpenType font.
pub struct ImageRenderer {
    font: FontVec,
    options: RenderOptions,
}

impl ImageRenderer {
    /// Load the first face of a font file (`.ttf`, `.otf` or `.ttc`)
    pub fn from_file(path: &Path, options: RenderOptions) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read font file: {}", path.display()))?;
        let font = FontVec::try_from_vec_and_index(data, 0)
            .map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.display(), e))?;
        info!("Word cloud font loaded from {}", path.display());
        Ok(Self { font, options })
    }
}

impl CloudRenderer for ImageRenderer {
    fn render(&self, words: &FrequencyMap) -> Result<Vec<u8>> {
        let placements = layout(words, &self.options, |word, size| {
            text_size(PxScale::from(size), &self.font, word)
        });

        let mut canvas = RgbImage::from_pixel(self.options.width, self.options.height, Rgb([0, 0, 0]));
        for (i, p) in placements.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            draw_text_mut(&mut canvas, color, p.x, p.y, PxScale::from(p.size), &self.font, &p.word);
        }

        let mut png = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("Failed to encode word cloud as PNG")?;
        Ok(png)
    }
}
