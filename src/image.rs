//! CPU-side RGBA8 images: PPM input/output and a synthetic test pattern

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use rayon::prelude::*;

use crate::plan::Size;

#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid image: {0}")]
    Format(String),
}

/// Convert a float value (0.0-1.0) to a byte (0-255)
#[inline]
pub fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// Tightly packed RGBA8, row-major, top row first
#[derive(Clone, Debug, PartialEq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImageError> {
        let expected = pixel_count(width, height)?
            .checked_mul(4)
            .ok_or_else(|| too_large(width, height))?;
        if pixels.len() != expected {
            return Err(ImageError::Format(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Checkerboard with a bright cross, plenty of hard edges to blur
    pub fn test_pattern(width: u32, height: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut image = Self::new(width, height);
        image
            .pixels
            .par_chunks_mut(width as usize * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for x in 0..width {
                    let checker = ((x / cell) + (y / cell)) % 2 == 0;
                    let cross = x.abs_diff(width / 2) < 2 || y.abs_diff(height / 2) < 2;
                    let u = x as f32 / width.max(1) as f32;
                    let v = y as f32 / height.max(1) as f32;
                    let rgb = if cross {
                        [1.0, 1.0, 1.0]
                    } else if checker {
                        [u, 0.3, v]
                    } else {
                        [0.05, 0.05, 0.1]
                    };
                    let i = (x * 4) as usize;
                    row[i] = to_byte(rgb[0]);
                    row[i + 1] = to_byte(rgb[1]);
                    row[i + 2] = to_byte(rgb[2]);
                    row[i + 3] = 255;
                }
            });
        image
    }

    /// Nearest-neighbour resample to `size`
    pub fn scaled_to(&self, size: Size) -> RgbaImage {
        if size == self.size() {
            return self.clone();
        }
        let mut scaled = Self::new(size.width, size.height);
        if self.pixels.is_empty() {
            return scaled;
        }
        scaled
            .pixels
            .par_chunks_mut(size.width as usize * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = (y as u64 * self.height as u64 / size.height as u64) as u32;
                for x in 0..size.width {
                    let sx = (x as u64 * self.width as u64 / size.width as u64) as u32;
                    let i = x as usize * 4;
                    row[i..i + 4].copy_from_slice(&self.pixel(sx, sy));
                }
            });
        scaled
    }

    /// 0RGB words for a minifb window buffer
    pub fn to_argb(&self) -> Vec<u32> {
        self.pixels
            .par_chunks(4)
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32)
            .collect()
    }

    /// Mean absolute per-channel difference over RGB, in 0-255 units
    pub fn mean_abs_difference(&self, other: &RgbaImage) -> Option<f32> {
        if self.size() != other.size() {
            return None;
        }
        let total: u64 = self
            .pixels
            .par_chunks(4)
            .zip(other.pixels.par_chunks(4))
            .map(|(a, b)| (0..3).map(|c| a[c].abs_diff(b[c]) as u64).sum::<u64>())
            .sum();
        let samples = (self.width as u64 * self.height as u64 * 3).max(1);
        Some(total as f32 / samples as f32)
    }

    /// Save as binary PPM (P6); alpha is dropped
    pub fn save_ppm(&self, path: impl AsRef<Path>) -> Result<(), ImageError> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "P6")?;
        writeln!(file, "{} {}", self.width, self.height)?;
        writeln!(file, "255")?;
        for pixel in self.pixels.chunks(4) {
            file.write_all(&pixel[..3])?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn load_ppm(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        Self::parse_ppm(&bytes)
    }

    /// Parse ASCII (P3) or binary (P6) PPM with a max value of 255
    pub fn parse_ppm(bytes: &[u8]) -> Result<Self, ImageError> {
        let mut cursor = 0usize;
        let magic = next_token(bytes, &mut cursor)?;
        let binary = match magic {
            "P6" => true,
            "P3" => false,
            other => return Err(ImageError::Format(format!("unsupported magic {:?}", other))),
        };
        let width = parse_number(next_token(bytes, &mut cursor)?)?;
        let height = parse_number(next_token(bytes, &mut cursor)?)?;
        let max = parse_number(next_token(bytes, &mut cursor)?)?;
        if max != 255 {
            return Err(ImageError::Format(format!("max value {} (only 255 supported)", max)));
        }
        if width == 0 || height == 0 {
            return Err(ImageError::Format("empty image".to_string()));
        }

        // every sample takes at least one byte, so a header promising more
        // samples than the file holds is rejected before allocating
        let count = pixel_count(width, height)?;
        let samples = count.checked_mul(3).ok_or_else(|| too_large(width, height))?;
        if samples > bytes.len().saturating_sub(cursor) {
            return Err(ImageError::Format("truncated raster".to_string()));
        }
        let mut pixels = Vec::with_capacity(count * 4);
        if binary {
            // exactly one whitespace byte separates the header from the raster
            let start = cursor + 1;
            let raster = bytes
                .get(start..start + samples)
                .ok_or_else(|| ImageError::Format("truncated raster".to_string()))?;
            for rgb in raster.chunks(3) {
                pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        } else {
            for _ in 0..count {
                for _ in 0..3 {
                    let value = parse_number(next_token(bytes, &mut cursor)?)?;
                    pixels.push(value.min(255) as u8);
                }
                pixels.push(255);
            }
        }

        Self::from_pixels(width, height, pixels)
    }
}

fn pixel_count(width: u32, height: u32) -> Result<usize, ImageError> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| too_large(width, height))
}

fn too_large(width: u32, height: u32) -> ImageError {
    ImageError::Format(format!("{}x{} is too large", width, height))
}

fn next_token<'a>(bytes: &'a [u8], cursor: &mut usize) -> Result<&'a str, ImageError> {
    loop {
        while *cursor < bytes.len() && bytes[*cursor].is_ascii_whitespace() {
            *cursor += 1;
        }
        if *cursor < bytes.len() && bytes[*cursor] == b'#' {
            while *cursor < bytes.len() && bytes[*cursor] != b'\n' {
                *cursor += 1;
            }
            continue;
        }
        break;
    }
    let start = *cursor;
    while *cursor < bytes.len() && !bytes[*cursor].is_ascii_whitespace() {
        *cursor += 1;
    }
    if start == *cursor {
        return Err(ImageError::Format("unexpected end of header".to_string()));
    }
    std::str::from_utf8(&bytes[start..*cursor]).map_err(|e| ImageError::Format(e.to_string()))
}

fn parse_number(token: &str) -> Result<u32, ImageError> {
    token
        .parse()
        .map_err(|_| ImageError::Format(format!("expected a number, got {:?}", token)))
}
