//! RGB color value type and the color-space views the pipeline needs.

use std::fmt;
use std::str::FromStr;

use palette::{Hsl, Hsv, IntoColor, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::{PaletteError, Result};

/// Largest possible Euclidean distance between two RGB colors (black to white).
pub const MAX_RGB_DISTANCE: f64 = 441.672_955_930_063_7;

/// An 8-bit sRGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(PaletteError::InvalidColor(format!(
                "hex color must be 6 characters: {s:?}"
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| PaletteError::InvalidColor(format!("invalid hex: {s:?}")))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Lowercase `#rrggbb`.
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    fn srgb(&self) -> Srgb<f32> {
        Srgb::new(self.r, self.g, self.b).into_format::<f32>()
    }

    /// True when all three channels are equal, i.e. the hue is undefined.
    pub fn is_achromatic(&self) -> bool {
        self.r == self.g && self.g == self.b
    }

    /// HSV hue in degrees `[0, 360)`, or `None` for grays.
    pub fn hue(&self) -> Option<f64> {
        if self.is_achromatic() {
            return None;
        }
        let hsv: Hsv = self.srgb().into_color();
        Some(hsv.hue.into_positive_degrees() as f64 % 360.0)
    }

    /// HSV saturation in `[0, 1]`.
    pub fn hsv_saturation(&self) -> f64 {
        let hsv: Hsv = self.srgb().into_color();
        (hsv.saturation as f64).clamp(0.0, 1.0)
    }

    /// HSL as (hue degrees, saturation percent, lightness percent).
    ///
    /// Grays report a hue of 0.
    pub fn hsl(&self) -> (f64, f64, f64) {
        let hsl: Hsl = self.srgb().into_color();
        (
            self.hue().unwrap_or(0.0),
            hsl.saturation as f64 * 100.0,
            hsl.lightness as f64 * 100.0,
        )
    }

    pub fn distance(&self, other: &Color) -> f64 {
        let dr = self.r as f64 - other.r as f64;
        let dg = self.g as f64 - other.g as f64;
        let db = self.b as f64 - other.b as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

impl From<Srgb<u8>> for Color {
    fn from(c: Srgb<u8>) -> Self {
        Self::new(c.red, c.green, c.blue)
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl FromStr for Color {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let c = Color::from_hex("#FF6b6b").unwrap();
        assert_eq!(c, Color::new(255, 107, 107));
        assert_eq!(c.hex(), "#ff6b6b");
        assert_eq!("00ff00".parse::<Color>().unwrap(), Color::new(0, 255, 0));
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(Color::from_hex("#fff").is_err());
        assert!(Color::from_hex("#gg0000").is_err());
        assert!(Color::from_hex("#ff00000").is_err());
    }

    #[test]
    fn test_primary_hues() {
        assert!((Color::new(255, 0, 0).hue().unwrap() - 0.0).abs() < 1e-3);
        assert!((Color::new(0, 255, 0).hue().unwrap() - 120.0).abs() < 1e-3);
        assert!((Color::new(0, 0, 255).hue().unwrap() - 240.0).abs() < 1e-3);
        assert!((Color::new(255, 165, 0).hue().unwrap() - 38.82).abs() < 0.05);
    }

    #[test]
    fn test_gray_has_no_hue() {
        assert_eq!(Color::new(128, 128, 128).hue(), None);
        assert_eq!(Color::new(0, 0, 0).hue(), None);
        assert_eq!(Color::new(128, 128, 128).hsv_saturation(), 0.0);
    }

    #[test]
    fn test_hsl_of_pure_red() {
        let (h, s, l) = Color::new(255, 0, 0).hsl();
        assert!(h.abs() < 1e-3);
        assert!((s - 100.0).abs() < 1e-3);
        assert!((l - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_distance_bounds() {
        let black = Color::new(0, 0, 0);
        let white = Color::new(255, 255, 255);
        assert!((black.distance(&white) - MAX_RGB_DISTANCE).abs() < 1e-9);
        assert_eq!(white.distance(&white), 0.0);
    }
}
