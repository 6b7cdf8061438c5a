//! Per-pixel color filters

use crate::types::ImageBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 4x5 color matrix in row-major order
///
/// Each output channel is `row · [R, G, B, A, 1]` with the offset column in
/// 0..=255 units, the same convention as Android's `ColorMatrix`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [[f32; 5]; 4]);

impl ColorMatrix {
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
    ]);

    /// Saturation 0: every color channel becomes the same luma value
    pub const GRAYSCALE: Self = Self([
        [0.213, 0.715, 0.072, 0.0, 0.0],
        [0.213, 0.715, 0.072, 0.0, 0.0],
        [0.213, 0.715, 0.072, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
    ]);

    /// `255 - c` on RGB
    pub const INVERT: Self = Self([
        [-1.0, 0.0, 0.0, 0.0, 255.0],
        [0.0, -1.0, 0.0, 0.0, 255.0],
        [0.0, 0.0, -1.0, 0.0, 255.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
    ]);

    /// Transform one pixel
    #[must_use]
    pub fn transform(&self, pixel: [u8; 4]) -> [u8; 4] {
        let input = pixel.map(f32::from);
        let mut out = [0u8; 4];
        for (slot, row) in out.iter_mut().zip(self.0.iter()) {
            let value: f32 = row
                .iter()
                .zip(input.iter())
                .map(|(k, v)| k * v)
                .sum::<f32>()
                + row[4];
            *slot = value.round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    /// New buffer with the matrix applied to every pixel
    #[must_use]
    pub fn apply(&self, image: &ImageBuffer) -> ImageBuffer {
        image.map_pixels(|pixel| self.transform(pixel))
    }
}

/// Requested `filterType`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Grayscale,
    ColorReverse,
    /// Model-backed style transfer
    PopArt,
    /// Unrecognized filter name; the image passes through unchanged
    Passthrough(String),
}

impl FilterKind {
    /// Parse a filter name; never fails, unknown names become `Passthrough`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "grayscale" => Self::Grayscale,
            "color_reverse" | "colorInvert" | "color_invert" => Self::ColorReverse,
            "popart" => Self::PopArt,
            other => Self::Passthrough(other.to_string()),
        }
    }

    /// Matrix for filters that need no model
    #[must_use]
    pub fn matrix(&self) -> Option<ColorMatrix> {
        match self {
            Self::Grayscale => Some(ColorMatrix::GRAYSCALE),
            Self::ColorReverse => Some(ColorMatrix::INVERT),
            Self::PopArt | Self::Passthrough(_) => None,
        }
    }

    #[must_use]
    pub fn requires_model(&self) -> bool {
        matches!(self, Self::PopArt)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grayscale => f.write_str("grayscale"),
            Self::ColorReverse => f.write_str("color_reverse"),
            Self::PopArt => f.write_str("popart"),
            Self::Passthrough(name) => write!(f, "passthrough({name})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    #[test]
    fn test_grayscale_equalizes_channels() {
        for pixel in [[255, 0, 0, 255], [12, 200, 99, 40], [0, 0, 0, 0]] {
            let [r, g, b, a] = ColorMatrix::GRAYSCALE.transform(pixel);
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert_eq!(a, pixel[3]);
        }
        assert_eq!(
            ColorMatrix::GRAYSCALE.transform([255, 0, 0, 255]),
            [54, 54, 54, 255]
        );
    }

    #[test]
    fn test_invert() {
        assert_eq!(
            ColorMatrix::INVERT.transform([255, 10, 0, 77]),
            [0, 245, 255, 77]
        );
        assert_eq!(ColorMatrix::IDENTITY.transform([1, 2, 3, 4]), [1, 2, 3, 4]);
    }

    #[test]
    fn test_apply_is_deterministic() {
        let image = ImageBuffer::from_pixel(7, 5, Color::rgba(30, 60, 90, 255));
        let a = ColorMatrix::GRAYSCALE.apply(&image);
        let b = ColorMatrix::GRAYSCALE.apply(&image);
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (7, 5));
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(FilterKind::parse("grayscale"), FilterKind::Grayscale);
        assert_eq!(FilterKind::parse("colorInvert"), FilterKind::ColorReverse);
        assert_eq!(FilterKind::parse("color_reverse"), FilterKind::ColorReverse);
        assert_eq!(FilterKind::parse("popart"), FilterKind::PopArt);
        assert!(FilterKind::PopArt.requires_model());
        assert_eq!(
            FilterKind::parse("sepia"),
            FilterKind::Passthrough("sepia".to_string())
        );
        assert!(FilterKind::parse("sepia").matrix().is_none());
    }
}
