//! City palette aggregation.
//!
//! Every color of every image palette is dropped into a quantization bucket
//! and counted. Buckets are ranked by count; the top `palette_size` buckets
//! are reported by the mean of the raw colors that landed in them.
//!
//! Ranking ties are broken first by how close a bucket's centroid sits to the
//! middle of its cell (a tight cluster beats one straddling a cell edge), then
//! by the order in which buckets were first seen. The accumulator therefore
//! has to be fed in a canonical order for the output to be reproducible.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bucket::{BucketKey, DEFAULT_BUCKET_WIDTH};
use crate::color::Color;
use crate::config::PipelineConfig;
use crate::error::{PaletteError, Result};
use crate::extract::{DEFAULT_PALETTE_SIZE, ImagePalette};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketStats {
    count: usize,
    sums: [u64; 3],
    first_seen: usize,
}

impl BucketStats {
    fn mean(&self) -> [f64; 3] {
        let n = self.count.max(1) as f64;
        [
            self.sums[0] as f64 / n,
            self.sums[1] as f64 / n,
            self.sums[2] as f64 / n,
        ]
    }

    /// Mean of the contributing colors, rounded to the nearest channel value.
    fn centroid(&self) -> Color {
        let n = self.count.max(1) as u64;
        let round = |sum: u64| ((sum + n / 2) / n).min(255) as u8;
        Color::new(round(self.sums[0]), round(self.sums[1]), round(self.sums[2]))
    }
}

/// One bucket of a ranked accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedBucket {
    pub key: BucketKey,
    pub count: usize,
    pub centroid: Color,
    /// Distance from the cell midpoint to the unrounded centroid.
    pub offset: f64,
    pub first_seen: usize,
}

/// Per-city bucket counts. Scoped to a single aggregation.
#[derive(Debug, Clone)]
pub struct CityPaletteAccumulator {
    width: u8,
    buckets: HashMap<BucketKey, BucketStats>,
    total: usize,
}

impl CityPaletteAccumulator {
    pub fn new(bucket_width: u8) -> Self {
        Self {
            width: bucket_width.max(1),
            buckets: HashMap::new(),
            total: 0,
        }
    }

    pub fn bucket_width(&self) -> u8 {
        self.width
    }

    /// Count one occurrence of `color`.
    pub fn add_color(&mut self, color: Color) {
        let key = BucketKey::of(color, self.width);
        let next = self.buckets.len();
        let stats = self.buckets.entry(key).or_insert(BucketStats {
            count: 0,
            sums: [0; 3],
            first_seen: next,
        });
        stats.count += 1;
        for (sum, channel) in stats.sums.iter_mut().zip(color.channels()) {
            *sum += channel as u64;
        }
        self.total += 1;
    }

    /// Fold one image palette in. Repeated colors within a palette each count.
    pub fn add_palette(&mut self, palette: &ImagePalette) {
        for &color in palette.colors() {
            self.add_color(color);
        }
    }

    /// Combine two partial accumulators. Counts and sums add; buckets only
    /// present in `other` are ordered after every bucket already in `self`.
    pub fn merge(&mut self, other: CityPaletteAccumulator) {
        debug_assert_eq!(self.width, other.width, "merging mismatched bucket widths");
        let mut incoming: Vec<_> = other.buckets.into_iter().collect();
        incoming.sort_by_key(|(_, stats)| stats.first_seen);

        for (key, theirs) in incoming {
            let next = self.buckets.len();
            let ours = self.buckets.entry(key).or_insert(BucketStats {
                count: 0,
                sums: [0; 3],
                first_seen: next,
            });
            ours.count += theirs.count;
            for (a, b) in ours.sums.iter_mut().zip(theirs.sums) {
                *a += b;
            }
        }
        self.total += other.total;
    }

    /// Total increments so far (images x colors per image).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Occurrences recorded for the bucket containing `color`.
    pub fn count_of(&self, color: Color) -> usize {
        self.buckets
            .get(&BucketKey::of(color, self.width))
            .map_or(0, |s| s.count)
    }

    /// All buckets, best first.
    pub fn ranked(&self) -> Vec<RankedBucket> {
        let mut ranked: Vec<RankedBucket> = self
            .buckets
            .iter()
            .map(|(key, stats)| {
                let center = key.center(self.width);
                let mean = stats.mean();
                let offset = center
                    .iter()
                    .zip(mean.iter())
                    .map(|(c, m)| (c - m) * (c - m))
                    .sum::<f64>()
                    .sqrt();
                RankedBucket {
                    key: *key,
                    count: stats.count,
                    centroid: stats.centroid(),
                    offset,
                    first_seen: stats.first_seen,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.offset.total_cmp(&b.offset))
                .then(a.first_seen.cmp(&b.first_seen))
        });
        ranked
    }
}

/// Final ranked palette for one city. At most `palette_size` colors, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityPalette {
    colors: Vec<Color>,
}

impl CityPalette {
    /// Build a palette from explicit colors, e.g. fixtures or a palette
    /// edited on the web page.
    pub fn new(colors: Vec<Color>) -> Result<Self> {
        if colors.is_empty() {
            return Err(PaletteError::EmptyInput);
        }
        Ok(Self { colors })
    }

    pub fn from_hex<S: AsRef<str>>(hex: &[S]) -> Result<Self> {
        let colors = hex
            .iter()
            .map(|s| Color::from_hex(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(colors)
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

/// Folds image palettes into a city palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregator {
    bucket_width: u8,
    palette_size: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH,
            palette_size: DEFAULT_PALETTE_SIZE,
        }
    }
}

impl Aggregator {
    pub fn new(bucket_width: u8, palette_size: usize) -> Result<Self> {
        if bucket_width == 0 {
            return Err(PaletteError::invalid_config("bucket_width", bucket_width));
        }
        if palette_size == 0 {
            return Err(PaletteError::invalid_config("palette_size", palette_size));
        }
        Ok(Self {
            bucket_width,
            palette_size,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(config.bucket_width, config.palette_size)
    }

    pub fn bucket_width(&self) -> u8 {
        self.bucket_width
    }

    pub fn palette_size(&self) -> usize {
        self.palette_size
    }

    /// Count every color of every palette, in the order given.
    pub fn accumulate<'a, I>(&self, palettes: I) -> CityPaletteAccumulator
    where
        I: IntoIterator<Item = &'a ImagePalette>,
    {
        let mut acc = CityPaletteAccumulator::new(self.bucket_width);
        for palette in palettes {
            acc.add_palette(palette);
        }
        acc
    }

    /// Aggregate a city's image palettes into its top colors.
    pub fn aggregate(&self, palettes: &[ImagePalette]) -> Result<CityPalette> {
        if palettes.is_empty() {
            return Err(PaletteError::EmptyInput);
        }
        let acc = self.accumulate(palettes);
        self.finish(&acc)
    }

    /// Rank an already-filled accumulator.
    pub fn finish(&self, acc: &CityPaletteAccumulator) -> Result<CityPalette> {
        let colors: Vec<Color> = acc
            .ranked()
            .into_iter()
            .take(self.palette_size)
            .map(|b| b.centroid)
            .collect();

        debug!(
            buckets = acc.len(),
            increments = acc.total(),
            kept = colors.len(),
            "aggregated city palette"
        );
        CityPalette::new(colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::new(255, 0, 0);
    const ORANGE: Color = Color::new(255, 165, 0);
    const BLUE: Color = Color::new(0, 0, 255);
    const GREEN: Color = Color::new(0, 255, 0);

    fn palette(colors: &[Color]) -> ImagePalette {
        ImagePalette::new(colors.to_vec())
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let agg = Aggregator::default();
        assert!(matches!(agg.aggregate(&[]), Err(PaletteError::EmptyInput)));
    }

    #[test]
    fn test_palettes_without_colors_are_an_error() {
        let agg = Aggregator::default();
        let empty = ImagePalette::new(Vec::new());
        assert!(matches!(
            agg.aggregate(&[empty]),
            Err(PaletteError::EmptyInput)
        ));
    }

    #[test]
    fn test_zero_width_rejected() {
        assert!(Aggregator::new(0, 6).is_err());
        assert!(Aggregator::new(32, 0).is_err());
    }

    #[test]
    fn test_repeats_within_a_palette_all_count() {
        let agg = Aggregator::default();
        let acc = agg.accumulate(&[palette(&[RED, RED, RED, RED, RED, BLUE])]);
        assert_eq!(acc.count_of(RED), 5);
        assert_eq!(acc.count_of(BLUE), 1);
        assert_eq!(acc.total(), 6);
    }

    #[test]
    fn test_identical_colors_collapse_to_one() {
        let agg = Aggregator::default();
        let teal = Color::new(20, 140, 150);
        let palettes = vec![palette(&[teal; 6]); 4];
        let city = agg.aggregate(&palettes).unwrap();
        assert_eq!(city.colors(), &[teal]);
    }

    #[test]
    fn test_centroid_is_reported_not_the_cell() {
        let agg = Aggregator::new(32, 6).unwrap();
        let palettes = [palette(&[Color::new(200, 10, 10), Color::new(210, 20, 30)])];
        let city = agg.aggregate(&palettes).unwrap();
        assert_eq!(city.colors(), &[Color::new(205, 15, 20)]);
    }

    #[test]
    fn test_short_palette_when_few_buckets() {
        let agg = Aggregator::default();
        let palettes = vec![palette(&[RED, RED, ORANGE, BLUE, BLUE, GREEN]); 3];
        let city = agg.aggregate(&palettes).unwrap();
        assert_eq!(city.len(), 4);
        // red and blue tie at 6, both sit at the same offset; red was seen first
        assert_eq!(city.colors(), &[RED, BLUE, ORANGE, GREEN]);
    }

    #[test]
    fn test_tight_bucket_wins_a_count_tie() {
        let agg = Aggregator::new(32, 6).unwrap();
        // both buckets get two hits; the second one hugs its cell center
        let loose = [Color::new(0, 0, 0), Color::new(4, 4, 4)];
        let tight = [Color::new(111, 111, 111), Color::new(112, 112, 112)];
        let palettes = [palette(&[loose[0], loose[1], tight[0], tight[1]])];
        let city = agg.aggregate(&palettes).unwrap();
        assert_eq!(city.colors()[0], Color::new(112, 112, 112));
    }

    #[test]
    fn test_top_k_truncates() {
        let agg = Aggregator::new(1, 2).unwrap();
        let palettes = [palette(&[RED, RED, RED, BLUE, BLUE, GREEN])];
        let city = agg.aggregate(&palettes).unwrap();
        assert_eq!(city.colors(), &[RED, BLUE]);
    }

    #[test]
    fn test_merge_matches_sequential_fold() {
        let agg = Aggregator::default();
        let a = palette(&[RED, ORANGE, BLUE, BLUE, GREEN, RED]);
        let b = palette(&[GREEN, GREEN, BLUE, RED, ORANGE, ORANGE]);

        let sequential = agg.accumulate([&a, &b]);
        let mut left = agg.accumulate([&a]);
        left.merge(agg.accumulate([&b]));

        assert_eq!(left.total(), sequential.total());
        assert_eq!(left.ranked(), sequential.ranked());
        assert_eq!(agg.finish(&left).unwrap(), agg.finish(&sequential).unwrap());
    }

    #[test]
    fn test_city_palette_from_hex() {
        let city = CityPalette::from_hex(&["#ff0000", "0000ff"]).unwrap();
        assert_eq!(city.hex(), vec!["#ff0000", "#0000ff"]);
        assert!(CityPalette::from_hex::<&str>(&[]).is_err());
    }
}
