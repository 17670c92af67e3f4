//! # Chromatic Geography
//!
//! Dominant-color palettes of cities, from photographs.
//!
//! Each photo is reduced to a few dominant colors, the palettes of a city's
//! photos are folded into one ranked city palette, and a handful of
//! descriptive statistics (temperature, saturation, contrast, hue diversity)
//! are computed from it. The results feed a static scrollytelling page.
//!
//! ```rust
//! use chromatic_geography::{Aggregator, Color, ImagePalette, compute_metrics};
//!
//! let red = Color::new(255, 0, 0);
//! let orange = Color::new(255, 165, 0);
//! let palettes = vec![ImagePalette::new(vec![red, red, orange]); 3];
//!
//! let city = Aggregator::default().aggregate(&palettes)?;
//! let metrics = compute_metrics(&city, 6);
//! assert_eq!(city.colors(), &[red, orange]);
//! assert!(metrics.is_warm());
//! # Ok::<(), chromatic_geography::PaletteError>(())
//! ```

use js_sys::{Array, Object, Reflect};
use wasm_bindgen::prelude::*;

pub mod aggregate;
pub mod bucket;
pub mod color;
pub mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod report;

#[cfg(not(target_arch = "wasm32"))]
pub mod pipeline;

#[cfg(all(feature = "fetch", not(target_arch = "wasm32")))]
pub mod fetch;

pub use aggregate::{Aggregator, CityPalette, CityPaletteAccumulator};
pub use color::Color;
pub use config::{ExtractionConfig, PipelineConfig, Quantizer};
pub use error::{PaletteError, Result};
pub use extract::{Extractor, ImagePalette};
pub use metrics::{CityMetrics, HueFamily, compute_metrics};
pub use report::{CityReport, Report};

// ------------------------------------------------------------
// WebAssembly surface for the static page
// ------------------------------------------------------------

fn js_err(e: PaletteError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn hex_list(values: &Array) -> std::result::Result<Vec<String>, JsValue> {
    values
        .iter()
        .map(|v| {
            v.as_string()
                .ok_or_else(|| JsValue::from_str("Palette values must be strings"))
        })
        .collect()
}

fn hex_array<S: AsRef<str>>(hex: &[S]) -> Array {
    let out = Array::new();
    for h in hex {
        out.push(&JsValue::from_str(h.as_ref()));
    }
    out
}

fn metrics_object(m: &CityMetrics) -> std::result::Result<Object, JsValue> {
    let obj = Object::new();
    Reflect::set(&obj, &"temperature".into(), &m.temperature.into())?;
    Reflect::set(&obj, &"saturation".into(), &m.saturation.into())?;
    Reflect::set(&obj, &"contrast".into(), &m.contrast.into())?;
    Reflect::set(&obj, &"hueDiversity".into(), &m.hue_diversity.into())?;
    let family = match m.dominant_family {
        Some(f) => JsValue::from_str(f.name()),
        None => JsValue::NULL,
    };
    Reflect::set(&obj, &"dominantFamily".into(), &family)?;
    Ok(obj)
}

/// Extract the `n_colors` dominant colors of an encoded image, as hex strings.
#[wasm_bindgen]
pub fn extract_palette(input: Vec<u8>, n_colors: usize) -> std::result::Result<Array, JsValue> {
    let config = ExtractionConfig {
        curate: false,
        ..ExtractionConfig::default()
    };
    let palette = Extractor::new(n_colors, config)
        .extract_bytes(&input)
        .map_err(js_err)?;
    Ok(hex_array(&palette.hex()))
}

/// Metrics of an explicit palette (array of hex strings).
#[wasm_bindgen]
pub fn palette_metrics(palette: Array) -> std::result::Result<Object, JsValue> {
    let hex = hex_list(&palette)?;
    let city = CityPalette::from_hex(&hex).map_err(js_err)?;
    metrics_object(&compute_metrics(&city, extract::DEFAULT_PALETTE_SIZE))
}

/// Aggregate image palettes (array of arrays of hex strings) into a city
/// palette and its metrics: `{ palette: string[], metrics: {...} }`.
#[wasm_bindgen]
pub fn aggregate_palettes(
    palettes: Array,
    bucket_width: u8,
    n_colors: usize,
) -> std::result::Result<Object, JsValue> {
    let mut images = Vec::with_capacity(palettes.length() as usize);
    for entry in palettes.iter() {
        let list: Array = entry
            .dyn_into()
            .map_err(|_| JsValue::from_str("Each image palette must be an array"))?;
        let colors = hex_list(&list)?
            .iter()
            .map(|h| Color::from_hex(h))
            .collect::<Result<Vec<_>>>()
            .map_err(js_err)?;
        images.push(ImagePalette::new(colors));
    }

    let aggregator = Aggregator::new(bucket_width, n_colors).map_err(js_err)?;
    let city = aggregator.aggregate(&images).map_err(js_err)?;
    let metrics = compute_metrics(&city, aggregator.palette_size());

    let metrics: JsValue = metrics_object(&metrics)?.into();
    let result = Object::new();
    Reflect::set(&result, &JsValue::from_str("palette"), &hex_array(&city.hex()))?;
    Reflect::set(&result, &JsValue::from_str("metrics"), &metrics)?;
    Ok(result)
}
