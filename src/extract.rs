//! Per-image dominant color extraction.
//!
//! Steps performed:
//! 1. Optionally downscale so the longest side equals `resize` (nearest-neighbour).
//! 2. Collect the opaque pixels.
//! 3. Quantize them (median cut or Lab k-means) into candidate colors ranked
//!    by how many pixels each represents.
//! 4. Optionally curate the candidates, dropping dull or near-duplicate ones.
//! 5. Keep the first K; fewer than K distinct colors is an extraction error.

use std::collections::{HashMap, HashSet};

use image::{DynamicImage, GenericImageView, imageops::FilterType};
use kmeans_colors::{Sort, get_kmeans};
use palette::{IntoColor, Lab, Srgb};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::color::Color;
use crate::config::{ExtractionConfig, PipelineConfig, Quantizer};
use crate::error::{PaletteError, Result};

/// Colors per image palette.
pub const DEFAULT_PALETTE_SIZE: usize = 6;

const KMEANS_CONVERGENCE: f32 = 1e-4;

/// Dominant colors of one image, most prominent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImagePalette {
    colors: Vec<Color>,
}

impl ImagePalette {
    pub fn new(colors: Vec<Color>) -> Self {
        Self { colors }
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn hex(&self) -> Vec<String> {
        self.colors.iter().map(Color::hex).collect()
    }
}

/// Decode an encoded image (JPEG, PNG, ...).
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| PaletteError::decode("unable to decode image bytes", e))
}

/// Open and decode an image file.
#[cfg(not(target_arch = "wasm32"))]
pub fn open(path: &std::path::Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| PaletteError::decode(format!("unable to read {}", path.display()), e))
}

/// Reduces one image to its K dominant colors.
#[derive(Debug, Clone)]
pub struct Extractor {
    palette_size: usize,
    config: ExtractionConfig,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE_SIZE, ExtractionConfig::default())
    }
}

impl Extractor {
    pub fn new(palette_size: usize, config: ExtractionConfig) -> Self {
        Self {
            palette_size,
            config,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.palette_size, config.extraction.clone())
    }

    pub fn palette_size(&self) -> usize {
        self.palette_size
    }

    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<ImagePalette> {
        self.extract(&decode(bytes)?)
    }

    pub fn extract(&self, img: &DynamicImage) -> Result<ImagePalette> {
        let working = match self.config.resize {
            Some(scale) => downscale(img, scale),
            None => img.clone(),
        };
        let pixels = opaque_pixels(&working);

        let wanted = if self.config.curate {
            self.palette_size + self.config.extra_candidates
        } else {
            self.palette_size
        };

        let candidates = dedup(match self.config.quantizer {
            Quantizer::MedianCut => median_cut(&pixels, wanted),
            Quantizer::KMeans => kmeans(
                &pixels,
                wanted,
                self.config.kmeans_max_iter,
                self.config.kmeans_seed,
            ),
        });
        trace!(candidates = candidates.len(), "quantized image");

        let mut colors = if self.config.curate {
            curate(&candidates, self.palette_size, &self.config)
        } else {
            candidates
        };

        if colors.len() < self.palette_size {
            return Err(PaletteError::Extraction {
                found: colors.len(),
                needed: self.palette_size,
            });
        }
        colors.truncate(self.palette_size);
        Ok(ImagePalette::new(colors))
    }
}

fn downscale(img: &DynamicImage, scale: u32) -> DynamicImage {
    let (orig_w, orig_h) = img.dimensions();
    let max_side = orig_w.max(orig_h);
    if max_side <= scale {
        return img.clone();
    }
    let ratio = scale as f32 / max_side as f32;
    let w = ((orig_w as f32) * ratio).round().max(1.0) as u32;
    let h = ((orig_h as f32) * ratio).round().max(1.0) as u32;
    DynamicImage::ImageRgba8(image::imageops::resize(img, w, h, FilterType::Nearest))
}

fn opaque_pixels(img: &DynamicImage) -> Vec<Color> {
    img.to_rgba8()
        .pixels()
        .filter(|p| p.0[3] != 0)
        .map(|p| Color::new(p.0[0], p.0[1], p.0[2]))
        .collect()
}

fn dedup(colors: Vec<Color>) -> Vec<Color> {
    let mut seen = HashSet::with_capacity(colors.len());
    colors.into_iter().filter(|c| seen.insert(*c)).collect()
}

// ------------------------------------------------------------
// Median cut
// ------------------------------------------------------------

#[derive(Debug, Clone)]
struct ColorBox {
    entries: Vec<([u8; 3], u32)>,
}

impl ColorBox {
    fn weight(&self) -> u64 {
        self.entries.iter().map(|(_, w)| *w as u64).sum()
    }

    fn ranges(&self) -> [u32; 3] {
        let mut lo = [u8::MAX; 3];
        let mut hi = [u8::MIN; 3];
        for (c, _) in &self.entries {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(c[axis]);
                hi[axis] = hi[axis].max(c[axis]);
            }
        }
        [0, 1, 2].map(|axis| hi[axis].saturating_sub(lo[axis]) as u32)
    }

    /// Pixel weight times cell volume; heavy, spread-out boxes split first.
    fn priority(&self) -> u64 {
        let volume: u64 = self.ranges().iter().map(|r| *r as u64 + 1).product();
        self.weight() * volume
    }

    fn centroid(&self) -> Color {
        let mut sums = [0u64; 3];
        let mut total = 0u64;
        for (c, w) in &self.entries {
            for axis in 0..3 {
                sums[axis] += c[axis] as u64 * *w as u64;
            }
            total += *w as u64;
        }
        let total = total.max(1);
        let round = |s: u64| ((s + total / 2) / total).min(255) as u8;
        Color::new(round(sums[0]), round(sums[1]), round(sums[2]))
    }

    /// Split along the widest axis at the weighted median.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let ranges = self.ranges();
        let axis = if ranges[0] >= ranges[1] && ranges[0] >= ranges[2] {
            0
        } else if ranges[1] >= ranges[2] {
            1
        } else {
            2
        };

        self.entries.sort_unstable_by_key(|(c, _)| (c[axis], *c));

        let half = self.weight() / 2;
        let mut accumulated = 0u64;
        let mut split_idx = 1;
        for (i, (_, w)) in self.entries.iter().enumerate() {
            accumulated += *w as u64;
            if accumulated >= half && i + 1 < self.entries.len() {
                split_idx = i + 1;
                break;
            }
        }
        split_idx = split_idx.clamp(1, self.entries.len() - 1);

        let right = self.entries.split_off(split_idx);
        (self, ColorBox { entries: right })
    }
}

/// Weighted median cut. Returns up to `max_colors` box centroids, heaviest first.
fn median_cut(pixels: &[Color], max_colors: usize) -> Vec<Color> {
    if pixels.is_empty() || max_colors == 0 {
        return Vec::new();
    }

    let mut histogram: HashMap<[u8; 3], u32> = HashMap::new();
    for c in pixels {
        *histogram.entry(c.channels()).or_insert(0) += 1;
    }
    let mut entries: Vec<([u8; 3], u32)> = histogram.into_iter().collect();
    entries.sort_unstable();

    let mut boxes = if entries.len() <= max_colors {
        entries
            .into_iter()
            .map(|e| ColorBox { entries: vec![e] })
            .collect()
    } else {
        let mut boxes = Vec::with_capacity(max_colors);
        boxes.push(ColorBox { entries });
        while boxes.len() < max_colors {
            let best = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.entries.len() >= 2)
                .max_by_key(|(i, b)| (b.priority(), std::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            let Some(idx) = best else {
                break;
            };
            let (left, right) = boxes.remove(idx).split();
            boxes.push(left);
            boxes.push(right);
        }
        boxes
    };

    boxes.sort_by_key(|b| (std::cmp::Reverse(b.weight()), b.centroid().channels()));
    boxes.iter().map(ColorBox::centroid).collect()
}

// ------------------------------------------------------------
// k-means
// ------------------------------------------------------------

/// k-means in Lab space; clusters ordered by share of pixels.
fn kmeans(pixels: &[Color], k: usize, max_iter: usize, seed: u64) -> Vec<Color> {
    let distinct: HashSet<Color> = pixels.iter().copied().collect();
    let k = k.min(distinct.len());
    if k == 0 {
        return Vec::new();
    }

    let lab_pixels: Vec<Lab> = pixels
        .iter()
        .map(|c| Srgb::new(c.r, c.g, c.b).into_format::<f32>().into_color())
        .collect();

    let result = get_kmeans(k, max_iter, KMEANS_CONVERGENCE, false, &lab_pixels, seed);

    let mut clusters = Lab::sort_indexed_colors(&result.centroids, &result.indices);
    clusters.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    clusters
        .iter()
        .filter(|cluster| cluster.percentage > 0.0)
        .map(|cluster| {
            let rgb: Srgb = cluster.centroid.into_color();
            Color::from(rgb.into_format::<u8>())
        })
        .collect()
}

// ------------------------------------------------------------
// Curation
// ------------------------------------------------------------

/// Too dark, too light, or too gray to say much about a place.
fn is_dull(saturation: f64, lightness: f64) -> bool {
    lightness < 15.0
        || lightness > 85.0
        || saturation < 20.0
        || (saturation < 30.0 && lightness > 25.0 && lightness < 75.0)
}

fn is_brown(hue: f64, saturation: f64, lightness: f64) -> bool {
    (15.0..=45.0).contains(&hue) && saturation < 55.0 && lightness > 25.0 && lightness < 65.0
}

/// Filter candidates down to `needed` vivid, mutually distinct colors.
///
/// Candidates that fail the vividness rules are only used to top the
/// palette up when too few survive. Output keeps prominence order.
fn curate(candidates: &[Color], needed: usize, config: &ExtractionConfig) -> Vec<Color> {
    let mut preferred = Vec::with_capacity(candidates.len());
    let mut browns = 0;
    for (idx, c) in candidates.iter().enumerate() {
        let (h, s, l) = c.hsl();
        if is_dull(s, l) {
            continue;
        }
        if is_brown(h, s, l) {
            if browns >= config.max_browns {
                continue;
            }
            browns += 1;
        }
        preferred.push(idx);
    }

    let mut kept: Vec<usize> = Vec::with_capacity(needed);
    let distinct_from_kept = |kept: &[usize], idx: usize| {
        kept.iter()
            .all(|&k| candidates[k].distance(&candidates[idx]) > config.min_distance)
    };

    for idx in preferred {
        if distinct_from_kept(&kept, idx) {
            kept.push(idx);
        }
    }
    if kept.len() < needed {
        for idx in 0..candidates.len() {
            if kept.len() >= needed {
                break;
            }
            if !kept.contains(&idx) && distinct_from_kept(&kept, idx) {
                kept.push(idx);
            }
        }
    }

    kept.sort_unstable();
    kept.into_iter().map(|i| candidates[i]).collect()
}
