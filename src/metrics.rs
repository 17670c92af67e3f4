//! Descriptive statistics over a city palette.
//!
//! - temperature: 0 (all cool) .. 100 (all warm), 50 neutral
//! - saturation: mean HSV saturation, percent
//! - contrast: mean pairwise RGB distance as a percent of black-to-white
//! - hue diversity: `1 - largest family / K`, K being the configured palette
//!   size, so a short palette still has room for the families it lacks
//!
//! Grays have no hue. They count as neutral for temperature and are left out
//! of the hue families.

use serde::{Deserialize, Serialize};

use crate::aggregate::CityPalette;
use crate::color::{Color, MAX_RGB_DISTANCE};

/// Temperature above which a palette reads as warm.
pub const NEUTRAL_TEMPERATURE: f64 = 50.0;

/// Angular width of one hue family.
pub const HUE_FAMILY_WIDTH: f64 = 60.0;

/// Hue windows centred on the RGB primaries and secondaries.
///
/// Orange (around 30-40 degrees) lands in `Yellow`; only red-oranges below
/// 30 degrees count as `Red`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HueFamily {
    /// [330, 30)
    Red,
    /// [30, 90), includes orange
    Yellow,
    /// [90, 150)
    Green,
    /// [150, 210)
    Cyan,
    /// [210, 270)
    Blue,
    /// [270, 330)
    Magenta,
}

impl HueFamily {
    pub const ALL: [HueFamily; 6] = [
        HueFamily::Red,
        HueFamily::Yellow,
        HueFamily::Green,
        HueFamily::Cyan,
        HueFamily::Blue,
        HueFamily::Magenta,
    ];

    pub fn of(hue: f64) -> Self {
        let shifted = (hue + HUE_FAMILY_WIDTH / 2.0).rem_euclid(360.0);
        let idx = (shifted / HUE_FAMILY_WIDTH) as usize;
        Self::ALL[idx.min(Self::ALL.len() - 1)]
    }

    pub fn name(&self) -> &'static str {
        match self {
            HueFamily::Red => "red",
            HueFamily::Yellow => "yellow",
            HueFamily::Green => "green",
            HueFamily::Cyan => "cyan",
            HueFamily::Blue => "blue",
            HueFamily::Magenta => "magenta",
        }
    }
}

/// Metrics derived from one city palette.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityMetrics {
    pub temperature: f64,
    pub saturation: f64,
    pub contrast: f64,
    pub hue_diversity: f64,
    pub dominant_family: Option<HueFamily>,
}

impl CityMetrics {
    pub fn is_warm(&self) -> bool {
        self.temperature > NEUTRAL_TEMPERATURE
    }
}

/// Warm/cool score of a hue in `[-1, 1]`.
///
/// Red through yellow (330..90) is +1, cyan through blue (150..270) is -1,
/// and the two gaps between are linear ramps. Undefined hue scores 0.
pub fn warmth(hue: Option<f64>) -> f64 {
    let Some(h) = hue else {
        return 0.0;
    };
    let h = h.rem_euclid(360.0);
    if h <= 90.0 || h >= 330.0 {
        1.0
    } else if (150.0..=270.0).contains(&h) {
        -1.0
    } else if h < 150.0 {
        1.0 - 2.0 * (h - 90.0) / 60.0
    } else {
        -1.0 + 2.0 * (h - 270.0) / 60.0
    }
}

/// Compute all metrics for a palette aggregated to at most `palette_size`
/// colors. A palette longer than `palette_size` is measured against its own
/// length.
///
/// # Panics
///
/// On an empty palette. `CityPalette` cannot be built empty, so this only
/// fires on a broken invariant.
pub fn compute_metrics(palette: &CityPalette, palette_size: usize) -> CityMetrics {
    let colors = palette.colors();
    assert!(!colors.is_empty(), "compute_metrics called on an empty palette");

    let n = colors.len() as f64;
    let hues: Vec<Option<f64>> = colors.iter().map(Color::hue).collect();

    let mean_warmth = hues.iter().map(|&h| warmth(h)).sum::<f64>() / n;
    let temperature = (NEUTRAL_TEMPERATURE + 50.0 * mean_warmth).clamp(0.0, 100.0);

    let saturation =
        (colors.iter().map(Color::hsv_saturation).sum::<f64>() / n * 100.0).clamp(0.0, 100.0);

    let (families, dominant_family) = family_counts(&hues);
    let largest = families.iter().copied().max().unwrap_or(0);
    let slots = palette_size.max(colors.len()) as f64;
    let hue_diversity = (1.0 - largest as f64 / slots).clamp(0.0, 1.0);

    CityMetrics {
        temperature,
        saturation,
        contrast: contrast(colors),
        hue_diversity,
        dominant_family,
    }
}

/// Mean pairwise distance, normalised to 0..100. A single color has no contrast.
fn contrast(colors: &[Color]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in colors.iter().enumerate() {
        for b in &colors[i + 1..] {
            total += a.distance(b);
            pairs += 1;
        }
    }
    if pairs == 0 {
        return 0.0;
    }
    (total / pairs as f64 / MAX_RGB_DISTANCE * 100.0).clamp(0.0, 100.0)
}

/// Members per family, plus the largest family. Ties go to the family whose
/// first member appears earliest in the palette.
fn family_counts(hues: &[Option<f64>]) -> ([usize; 6], Option<HueFamily>) {
    let mut counts = [0usize; 6];
    let mut first = [usize::MAX; 6];
    for (pos, hue) in hues.iter().enumerate() {
        if let Some(h) = hue {
            let idx = HueFamily::of(*h) as usize;
            counts[idx] += 1;
            first[idx] = first[idx].min(pos);
        }
    }

    let dominant = (0..counts.len())
        .filter(|&i| counts[i] > 0)
        .min_by(|&a, &b| counts[b].cmp(&counts[a]).then(first[a].cmp(&first[b])))
        .map(|i| HueFamily::ALL[i]);

    (counts, dominant)
}
