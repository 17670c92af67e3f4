//! Configuration for a collection-and-analysis run.
//!
//! Every stage receives its settings from here explicitly. Configuration can
//! be loaded from JSON or built from defaults:
//!
//! ```no_run
//! use chromatic_geography::PipelineConfig;
//! use std::path::Path;
//!
//! let config = PipelineConfig::from_json_file(Path::new("chromatic.json"))?;
//! let defaults = PipelineConfig::default();
//! # Ok::<(), chromatic_geography::PaletteError>(())
//! ```
//!
//! The Unsplash access key is not part of it; the fetch client reads it from
//! the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bucket::DEFAULT_BUCKET_WIDTH;
use crate::error::{PaletteError, Result};
use crate::extract::DEFAULT_PALETTE_SIZE;

/// Complete configuration for fetch, extraction and aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root holding one sub-directory of images per city
    pub images_dir: PathBuf,

    /// Where photo metadata from the image API is saved
    pub metadata_dir: PathBuf,

    /// Where per-city color files and the combined report are written
    pub output_dir: PathBuf,

    /// Colors per image palette and per city palette (K)
    pub palette_size: usize,

    /// Channel width of one aggregation bucket
    pub bucket_width: u8,

    pub extraction: ExtractionConfig,

    pub fetch: FetchConfig,

    pub cities: Vec<CityQuery>,
}

/// Color quantizer used on each image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantizer {
    /// Weighted median cut over the pixel histogram
    MedianCut,
    /// k-means in CIE Lab
    KMeans,
}

/// Per-image extraction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub quantizer: Quantizer,

    /// Longest side after downscaling; `None` keeps full resolution
    pub resize: Option<u32>,

    /// Drop dull, near-black, near-white and excess brown candidates
    pub curate: bool,

    /// Extra candidates quantized beyond K when curating
    pub extra_candidates: usize,

    /// Brown tones allowed through curation
    pub max_browns: usize,

    /// Minimum RGB distance between kept colors when curating
    pub min_distance: f64,

    /// k-means iteration cap
    pub kmeans_max_iter: usize,

    /// k-means seed; fixed so reruns give the same palettes
    pub kmeans_seed: u64,
}

/// Image API settings. Counts and pauses mirror the API's free tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub images_per_query: u32,
    pub pages_per_query: u32,
    pub request_delay_ms: u64,
    pub download_delay_ms: u64,
    pub rate_limit_wait_secs: u64,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

/// A city and the search queries used to collect its photographs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityQuery {
    pub name: String,
    pub queries: Vec<String>,
}

impl CityQuery {
    pub fn new(name: &str, queries: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("data/images/cities"),
            metadata_dir: PathBuf::from("data/metadata"),
            output_dir: PathBuf::from("data/colors"),
            palette_size: DEFAULT_PALETTE_SIZE,
            bucket_width: DEFAULT_BUCKET_WIDTH,
            extraction: ExtractionConfig::default(),
            fetch: FetchConfig::default(),
            cities: default_cities(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            quantizer: Quantizer::MedianCut,
            resize: Some(150),
            curate: true,
            extra_candidates: 10,
            max_browns: 2,
            min_distance: 30.0,
            kmeans_max_iter: 20,
            kmeans_seed: 0,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.unsplash.com".to_string(),
            images_per_query: 25,
            pages_per_query: 1,
            request_delay_ms: 2000,
            download_delay_ms: 500,
            rate_limit_wait_secs: 60,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

/// The twelve cities of the published study.
pub fn default_cities() -> Vec<CityQuery> {
    vec![
        CityQuery::new("tokyo", &["tokyo neon signs night", "tokyo temples"]),
        CityQuery::new("marrakech", &["marrakech", "morocco architecture tiles"]),
        CityQuery::new(
            "copenhagen",
            &["copenhagen nyhavn colorful", "copenhagen architecture"],
        ),
        CityQuery::new(
            "santorini",
            &["santorini blue domes", "santorini white buildings greece"],
        ),
        CityQuery::new(
            "havana",
            &["havana cuba colorful buildings", "havana vintage cars streets"],
        ),
        CityQuery::new(
            "mexico city",
            &["mexico city colorful buildings", "coyoacan mexico streets"],
        ),
        CityQuery::new("istanbul", &["istanbul grand bazaar", "istanbul"]),
        CityQuery::new("jaipur", &["jaipur pink city india", "jaipur palace"]),
        CityQuery::new("bangkok", &["bangkok", "bangkok street market"]),
        CityQuery::new("melbourne", &["melbourne", "melbourne architecture"]),
        CityQuery::new(
            "singapore",
            &["singapore green city", "singapore skyline", "singapore"],
        ),
        CityQuery::new(
            "rio de janeiro",
            &["rio brazil carnival", "rio brazil iconic", "rio favellas"],
        ),
    ]
}

impl PipelineConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PaletteError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| PaletteError::io(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.palette_size == 0 {
            return Err(PaletteError::invalid_config("palette_size", self.palette_size));
        }
        if self.bucket_width == 0 {
            return Err(PaletteError::invalid_config("bucket_width", self.bucket_width));
        }
        if self.extraction.resize == Some(0) {
            return Err(PaletteError::invalid_config("extraction.resize", 0));
        }
        if !self.extraction.min_distance.is_finite() || self.extraction.min_distance < 0.0 {
            return Err(PaletteError::invalid_config(
                "extraction.min_distance",
                self.extraction.min_distance,
            ));
        }
        Ok(())
    }

    /// Look up a configured city by name, case-insensitively.
    pub fn city(&self, name: &str) -> Option<&CityQuery> {
        self.cities
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn city_images_dir(&self, city: &str) -> PathBuf {
        self.images_dir.join(city)
    }
}
