//! Error types for the chromatic_geography library

use thiserror::Error;

/// Result type alias for palette operations
pub type Result<T> = std::result::Result<T, PaletteError>;

/// Errors raised while extracting, aggregating or reporting palettes
#[derive(Error, Debug)]
pub enum PaletteError {
    /// Image bytes or file could not be decoded
    #[error("Failed to decode image: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// Quantization could not produce the requested number of distinct colors
    #[error("Palette extraction failed: found {found} distinct colors, needed {needed}")]
    Extraction { found: usize, needed: usize },

    /// Aggregation was asked to fold zero palettes
    #[error("No palettes to aggregate")]
    EmptyInput,

    /// Malformed color literal
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {parameter} = {value}")]
    InvalidConfig { parameter: String, value: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaletteError {
    /// Create a decode error with the underlying codec error attached
    pub fn decode(message: impl Into<String>, source: image::ImageError) -> Self {
        Self::Decode {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an I/O error tagged with the path that failed
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn invalid_config(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidConfig {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    /// Per-image failures skip the image; everything else aborts the city or run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PaletteError::Decode { .. } | PaletteError::Extraction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_image_errors_are_recoverable() {
        assert!(PaletteError::Extraction { found: 2, needed: 6 }.is_recoverable());
        assert!(!PaletteError::EmptyInput.is_recoverable());
        assert!(!PaletteError::invalid_config("bucket_width", 0).is_recoverable());
    }

    #[test]
    fn test_extraction_message() {
        let err = PaletteError::Extraction { found: 3, needed: 6 };
        assert_eq!(
            err.to_string(),
            "Palette extraction failed: found 3 distinct colors, needed 6"
        );
    }
}
