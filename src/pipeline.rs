//! Batch driver: images on disk to per-city palettes and metrics.
//!
//! Images are extracted on the rayon pool but always handed to the
//! aggregator in file-name order, so worker scheduling never changes the
//! ranking of tied buckets.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::Aggregator;
use crate::config::PipelineConfig;
use crate::error::{PaletteError, Result};
use crate::extract::{self, Extractor, ImagePalette};
use crate::metrics::compute_metrics;
use crate::report::{CityReport, ImageRecord, MissingCity, Report, SkippedImage};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Result of analysing one city.
#[derive(Debug, Clone, PartialEq)]
pub enum CityOutcome {
    Analyzed(CityReport),
    Missing(MissingCity),
}

/// An image palette tagged with the image it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPalette {
    pub image: String,
    pub palette: ImagePalette,
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: Extractor,
    aggregator: Aggregator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let extractor = Extractor::from_config(&config);
        let aggregator = Aggregator::from_config(&config)?;
        Ok(Self {
            config,
            extractor,
            aggregator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse every configured city.
    pub fn run(&self) -> Report {
        let names: Vec<&str> = self.config.cities.iter().map(|c| c.name.as_str()).collect();
        self.run_cities(&names)
    }

    /// Analyse the named cities, keeping their order in the report.
    pub fn run_cities(&self, names: &[&str]) -> Report {
        let outcomes: Vec<CityOutcome> = names.par_iter().map(|c| self.analyze_city(c)).collect();

        let mut report = Report::default();
        for outcome in outcomes {
            match outcome {
                CityOutcome::Analyzed(city) => report.cities.push(city),
                CityOutcome::Missing(missing) => report.missing.push(missing),
            }
        }
        info!(
            analyzed = report.cities.len(),
            missing = report.missing.len(),
            "run complete"
        );
        report
    }

    /// Extract, aggregate and measure one city's images.
    pub fn analyze_city(&self, city: &str) -> CityOutcome {
        let dir = self.config.city_images_dir(city);
        let images = match discover_images(&dir) {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => {
                return missing(city, format!("no images in {}", dir.display()));
            }
            Err(e) => return missing(city, e.to_string()),
        };
        info!(city, images = images.len(), "analyzing city");

        let (palettes, skipped) = self.extract_images(city, &images);
        match self.analyze_palettes(city, images.len(), palettes, skipped) {
            Ok(report) => CityOutcome::Analyzed(report),
            Err(PaletteError::EmptyInput) => missing(
                city,
                format!("none of {} images yielded a palette", images.len()),
            ),
            Err(e) => missing(city, e.to_string()),
        }
    }

    /// Extract every image in parallel. Output keeps the order of `images`.
    pub fn extract_images(
        &self,
        city: &str,
        images: &[PathBuf],
    ) -> (Vec<ExtractedPalette>, Vec<SkippedImage>) {
        let results: Vec<(String, Result<ImagePalette>)> = images
            .par_iter()
            .map(|path| {
                let name = image_name(path);
                let result = extract::open(path).and_then(|img| self.extractor.extract(&img));
                (name, result)
            })
            .collect();

        let mut palettes = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (image, result) in results {
            match result {
                Ok(palette) => {
                    debug!(city, image = %image, colors = ?palette.hex(), "extracted");
                    palettes.push(ExtractedPalette { image, palette });
                }
                Err(e) => {
                    warn!(city, image = %image, error = %e, "skipping image");
                    skipped.push(SkippedImage {
                        image,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (palettes, skipped)
    }

    /// Aggregate already-extracted palettes and compute metrics.
    pub fn analyze_palettes(
        &self,
        city: &str,
        image_count: usize,
        palettes: Vec<ExtractedPalette>,
        skipped: Vec<SkippedImage>,
    ) -> Result<CityReport> {
        let image_palettes: Vec<ImagePalette> =
            palettes.iter().map(|p| p.palette.clone()).collect();
        let city_palette = self.aggregator.aggregate(&image_palettes)?;
        let metrics = compute_metrics(&city_palette, self.aggregator.palette_size());

        info!(
            city,
            palette = ?city_palette.hex(),
            temperature = metrics.temperature,
            saturation = metrics.saturation,
            "city palette ready"
        );

        Ok(CityReport {
            city: city.to_string(),
            image_count,
            extracted_count: palettes.len(),
            skipped,
            individual_palettes: palettes
                .into_iter()
                .map(|p| ImageRecord {
                    image: p.image,
                    colors: p.palette.hex(),
                })
                .collect(),
            palette_hex: city_palette.hex(),
            palette: city_palette.colors().to_vec(),
            metrics,
        })
    }
}

fn missing(city: &str, reason: String) -> CityOutcome {
    warn!(city, reason = %reason, "city has no palette");
    CityOutcome::Missing(MissingCity {
        city: city.to_string(),
        reason,
    })
}

fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Image files directly inside `dir`, sorted by file name.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PaletteError::io(dir, e))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PaletteError::io(dir, e))?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}
