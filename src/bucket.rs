//! Color bucketing: collapse near-identical colors into one quantization cell.

use crate::color::Color;

/// Default cell width per channel; 256 / 32 gives an 8x8x8 grid.
pub const DEFAULT_BUCKET_WIDTH: u8 = 32;

/// Quantized color cell. Two colors share a key when every channel falls in
/// the same `width`-wide interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey([u8; 3]);

impl BucketKey {
    /// `width` must be non-zero; config validation guarantees it.
    pub fn of(color: Color, width: u8) -> Self {
        debug_assert!(width > 0, "bucket width must be non-zero");
        let w = width.max(1);
        Self([color.r / w, color.g / w, color.b / w])
    }

    /// Midpoint of the cell in RGB space.
    pub fn center(&self, width: u8) -> [f64; 3] {
        let w = width.max(1) as f64;
        let mut out = [0.0; 3];
        for (o, &k) in out.iter_mut().zip(self.0.iter()) {
            let lo = k as f64 * w;
            let hi = (lo + w).min(256.0);
            *o = (lo + hi - 1.0) / 2.0;
        }
        out
    }

    pub fn cell(&self) -> [u8; 3] {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_duplicates_share_a_bucket() {
        let a = BucketKey::of(Color::new(250, 10, 12), 32);
        let b = BucketKey::of(Color::new(230, 0, 31), 32);
        assert_eq!(a, b);
        assert_ne!(a, BucketKey::of(Color::new(255, 165, 0), 32));
    }

    #[test]
    fn test_width_one_is_identity() {
        let c = Color::new(17, 99, 254);
        assert_eq!(BucketKey::of(c, 1).cell(), [17, 99, 254]);
    }

    #[test]
    fn test_center_of_top_cell() {
        let key = BucketKey::of(Color::new(255, 0, 0), 32);
        let center = key.center(32);
        assert_eq!(center, [239.5, 15.5, 15.5]);

        // 256 is not a multiple of 100: the last cell is truncated at 255
        let key = BucketKey::of(Color::new(255, 255, 255), 100);
        assert_eq!(key.center(100), [227.5, 227.5, 227.5]);
    }
}
