//! Data handed to the static page, and the files it is written to.
//!
//! One `<city>_colors.json` per analysed city plus a combined report. Cities
//! that produced no palette are listed under `missing` with the reason.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregate::CityPalette;
use crate::color::Color;
use crate::error::{PaletteError, Result};
use crate::metrics::{CityMetrics, HueFamily};

/// Extracted palette of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image: String,
    pub colors: Vec<String>,
}

/// An image left out of its city's aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub image: String,
    pub reason: String,
}

/// Everything the page shows for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityReport {
    pub city: String,
    pub image_count: usize,
    pub extracted_count: usize,
    pub skipped: Vec<SkippedImage>,
    pub individual_palettes: Vec<ImageRecord>,
    pub palette: Vec<Color>,
    pub palette_hex: Vec<String>,
    pub metrics: CityMetrics,
}

impl CityReport {
    pub fn city_palette(&self) -> Result<CityPalette> {
        CityPalette::new(self.palette.clone())
    }
}

/// A configured city with no usable palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCity {
    pub city: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Report {
    pub cities: Vec<CityReport>,
    pub missing: Vec<MissingCity>,
}

impl Report {
    /// Analysed cities, warmest first.
    pub fn by_temperature(&self) -> Vec<&CityReport> {
        let mut sorted: Vec<&CityReport> = self.cities.iter().collect();
        sorted.sort_by(|a, b| b.metrics.temperature.total_cmp(&a.metrics.temperature));
        sorted
    }

    pub fn warmest(&self) -> Option<&CityReport> {
        self.by_temperature().first().copied()
    }

    pub fn coolest(&self) -> Option<&CityReport> {
        self.by_temperature().last().copied()
    }

    /// Cities whose largest hue family is `family`.
    pub fn dominated_by(&self, family: HueFamily) -> Vec<&CityReport> {
        self.cities
            .iter()
            .filter(|c| c.metrics.dominant_family == Some(family))
            .collect()
    }
}

/// File name used for a city's color file. Spaces become underscores.
pub fn city_file_name(city: &str) -> String {
    format!("{}_colors.json", city.trim().replace(' ', "_"))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PaletteError::io(parent, e))?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| PaletteError::io(path, e))
}

/// Write `<dir>/<city>_colors.json`; returns the path written.
pub fn write_city(dir: &Path, record: &CityReport) -> Result<PathBuf> {
    let path = dir.join(city_file_name(&record.city));
    write_json(&path, record)?;
    Ok(path)
}

pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    write_json(path, report)
}

pub fn read_report(path: &Path) -> Result<Report> {
    let content = std::fs::read_to_string(path).map_err(|e| PaletteError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}
