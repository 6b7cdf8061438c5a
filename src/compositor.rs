//! Buffer-to-buffer compositing
//!
//! Every function takes the base buffer by reference and returns a new one.
//! Geometry that misses the buffer is never an error: the painting helpers
//! report a [`GeometryOutcome`] and hand back the base unchanged.

use crate::error::{PhotoOpsError, Result};
use crate::types::{Color, ImageBuffer, Mask, Point, Rect};
use serde::{Deserialize, Serialize};

/// How a geometric operation related to the buffer bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum GeometryOutcome {
    /// Drawn as requested
    Applied,
    /// Partially outside the buffer; the visible part was drawn
    Clamped,
    /// Nothing drawn; the base is returned unchanged
    Skipped(String),
}

impl GeometryOutcome {
    /// Warning text for result metadata, if this outcome deserves one
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Applied => None,
            Self::Clamped => Some("geometry clamped to image bounds".to_string()),
            Self::Skipped(reason) => Some(format!("geometry skipped: {reason}")),
        }
    }
}

/// Output buffer of a geometric operation plus what happened to its bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Painted {
    pub image: ImageBuffer,
    pub outcome: GeometryOutcome,
}

impl Painted {
    fn unchanged(base: &ImageBuffer, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::warn!("⚠️ Geometry skipped: {}", reason);
        Self {
            image: base.clone(),
            outcome: GeometryOutcome::Skipped(reason),
        }
    }
}

/// Stateless compositing operations
pub struct Compositor;

impl Compositor {
    /// Per pixel and channel: `overlay * mask + base * (1 - mask)`
    ///
    /// The result is a convex combination, so every channel lies between the
    /// base and overlay values.
    ///
    /// # Errors
    /// - Base, mask, and overlay dimensions differ
    pub fn blend(base: &ImageBuffer, mask: &Mask, overlay: &ImageBuffer) -> Result<ImageBuffer> {
        if base.dimensions() != mask.dimensions() || base.dimensions() != overlay.dimensions() {
            return Err(PhotoOpsError::processing_stage_error(
                "blend",
                "base, mask and overlay must share dimensions",
                Some(&format!(
                    "base {:?}, mask {:?}, overlay {:?}",
                    base.dimensions(),
                    mask.dimensions(),
                    overlay.dimensions()
                )),
            ));
        }

        let (width, height) = base.dimensions();
        let pixels: Vec<u8> = base
            .pixels()
            .chunks_exact(4)
            .zip(overlay.pixels().chunks_exact(4))
            .zip(mask.values())
            .flat_map(|((b, o), &m)| {
                let mut out = [0u8; 4];
                for ((slot, &bv), &ov) in out.iter_mut().zip(b).zip(o) {
                    *slot = mix(bv, ov, m);
                }
                out
            })
            .collect();

        ImageBuffer::new(width, height, pixels)
    }

    /// Fill `region` with `color` at `opacity`
    ///
    /// The region is clamped to the buffer. Zero-area regions and regions
    /// entirely outside the buffer leave the base unchanged.
    #[must_use]
    pub fn paint_region(base: &ImageBuffer, region: &Rect, color: Color, opacity: f32) -> Painted {
        if region.is_empty() {
            return Painted {
                image: base.clone(),
                outcome: GeometryOutcome::Skipped(format!("zero-area region {region}")),
            };
        }
        let (width, height) = base.dimensions();
        let Some(visible) = region.clamp_to(width, height) else {
            return Painted::unchanged(
                base,
                format!("region {region} lies outside {width}x{height} image"),
            );
        };

        let opacity = if opacity.is_nan() { 0.0 } else { opacity.clamp(0.0, 1.0) };
        let fill = color.to_array();
        let image = Self::map_inside(base, |x, y| visible.contains(x, y), |pixel| {
            let mut out = pixel;
            for (slot, &c) in out.iter_mut().zip(fill.iter()) {
                *slot = mix(*slot, c, opacity);
            }
            out
        });

        Painted {
            image,
            outcome: if visible == *region {
                GeometryOutcome::Applied
            } else {
                GeometryOutcome::Clamped
            },
        }
    }

    /// Draw a filled disc of `radius` around `center`
    ///
    /// A center outside the buffer is clamped to the nearest edge pixel as long
    /// as the requested disc would have touched the buffer at all; otherwise
    /// the base comes back unchanged. The color's alpha acts as opacity.
    #[must_use]
    pub fn paint_marker(base: &ImageBuffer, center: Point, radius: u32, color: Color) -> Painted {
        let (width, height) = base.dimensions();
        if base.is_empty() {
            return Painted::unchanged(base, "cannot draw on an empty image");
        }
        if Rect::around(center, radius).clamp_to(width, height).is_none() {
            return Painted::unchanged(
                base,
                format!(
                    "marker at ({}, {}) radius {} lies outside {}x{} image",
                    center.x, center.y, radius, width, height
                ),
            );
        }

        let clamped = Point::new(
            center.x.clamp(0, i64::from(width) - 1),
            center.y.clamp(0, i64::from(height) - 1),
        );
        let r_sq = i64::from(radius).saturating_mul(i64::from(radius));
        let opacity = f32::from(color.a) / 255.0;
        let fill = color.to_array();

        let image = Self::map_inside(
            base,
            |x, y| {
                let (dx, dy) = (x - clamped.x, y - clamped.y);
                dx * dx + dy * dy <= r_sq
            },
            |pixel| {
                let mut out = pixel;
                for (slot, &c) in out.iter_mut().zip(fill.iter()) {
                    *slot = mix(*slot, c, opacity);
                }
                out
            },
        );

        let fully_visible = Rect::around(clamped, radius).clamp_to(width, height)
            == Some(Rect::around(clamped, radius));
        let outcome = if clamped == center && fully_visible {
            GeometryOutcome::Applied
        } else {
            log::warn!(
                "⚠️ Marker at ({}, {}) clamped to ({}, {})",
                center.x,
                center.y,
                clamped.x,
                clamped.y
            );
            GeometryOutcome::Clamped
        };
        Painted { image, outcome }
    }

    /// Copy `patch` onto `base` with its top-left corner at `origin`, clipped
    #[must_use]
    pub fn paste(base: &ImageBuffer, patch: &ImageBuffer, origin: Point) -> Painted {
        let (width, height) = base.dimensions();
        let footprint = Rect::new(origin.x, origin.y, patch.width(), patch.height());
        if footprint.is_empty() {
            return Painted::unchanged(base, "empty patch");
        }
        let Some(visible) = footprint.clamp_to(width, height) else {
            return Painted::unchanged(
                base,
                format!("patch {footprint} lies outside {width}x{height} image"),
            );
        };

        let mut canvas = base.as_rgba().clone();
        image::imageops::replace(&mut canvas, patch.as_rgba(), origin.x, origin.y);
        Painted {
            image: ImageBuffer::from_rgba(canvas),
            outcome: if visible == footprint {
                GeometryOutcome::Applied
            } else {
                GeometryOutcome::Clamped
            },
        }
    }

    fn map_inside<P, F>(base: &ImageBuffer, inside: P, mut f: F) -> ImageBuffer
    where
        P: Fn(i64, i64) -> bool,
        F: FnMut([u8; 4]) -> [u8; 4],
    {
        let mut canvas = base.as_rgba().clone();
        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            if inside(i64::from(x), i64::from(y)) {
                pixel.0 = f(pixel.0);
            }
        }
        ImageBuffer::from_rgba(canvas)
    }
}

/// `over * weight + under * (1 - weight)`, rounded into the byte range
fn mix(under: u8, over: u8, weight: f32) -> u8 {
    let w = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
    (f32::from(over) * w + f32::from(under) * (1.0 - w))
        .round()
        .clamp(0.0, 255.0) as u8
}
