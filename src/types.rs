//! Core types shared by every pipeline stage

use crate::error::{PhotoOpsError, Result};
use chrono::{DateTime, Utc};
use image::{DynamicImage, Rgba, RgbaImage};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Number of interleaved channels in an [`ImageBuffer`]
pub const RGBA_CHANNELS: usize = 4;

/// Immutable RGBA8 pixel buffer, the common currency between stages.
///
/// Every transform produces a new buffer; nothing mutates a buffer that another
/// stage might still hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    image: RgbaImage,
}

impl ImageBuffer {
    /// Build a buffer from raw interleaved RGBA bytes
    ///
    /// # Errors
    /// - `pixels.len()` differs from `width * height * 4`
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if pixels.len() != expected {
            return Err(PhotoOpsError::processing(format!(
                "Pixel buffer length {} does not match {}x{} RGBA ({} bytes)",
                pixels.len(),
                width,
                height,
                expected
            )));
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(Self::from_rgba)
            .ok_or_else(|| PhotoOpsError::internal("Failed to wrap RGBA pixel data"))
    }

    /// Buffer filled with a single color
    #[must_use]
    pub fn from_pixel(width: u32, height: u32, color: Color) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(width, height, color.to_rgba()))
    }

    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Convert any decoded image to RGBA8
    #[must_use]
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::from_rgba(image.to_rgba8())
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Bytes per row
    #[must_use]
    pub fn stride(&self) -> usize {
        self.width() as usize * RGBA_CHANNELS
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    #[must_use]
    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// New buffer with `f` applied to every pixel
    #[must_use]
    pub fn map_pixels<F>(&self, mut f: F) -> Self
    where
        F: FnMut([u8; 4]) -> [u8; 4],
    {
        let mut out = self.image.clone();
        for pixel in out.pixels_mut() {
            pixel.0 = f(pixel.0);
        }
        Self::from_rgba(out)
    }

    /// Copy of the pixels inside `rect`, which must already lie within bounds
    ///
    /// # Errors
    /// - `rect` extends past the buffer
    pub fn crop(&self, rect: &Rect) -> Result<Self> {
        let (width, height) = self.dimensions();
        if rect.x < 0
            || rect.y < 0
            || rect.right() > i64::from(width)
            || rect.bottom() > i64::from(height)
        {
            return Err(PhotoOpsError::processing(format!(
                "Crop {rect} exceeds {width}x{height} buffer"
            )));
        }
        let view = image::imageops::crop_imm(
            &self.image,
            rect.x as u32,
            rect.y as u32,
            rect.width,
            rect.height,
        );
        Ok(Self::from_rgba(view.to_image()))
    }

    /// Deterministic resize using the given filter
    #[must_use]
    pub fn resize(&self, width: u32, height: u32, filter: ResizeFilter) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self::from_rgba(image::imageops::resize(
            &self.image,
            width,
            height,
            filter.to_filter_type(),
        ))
    }
}

/// Resize kernel; both options are deterministic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Bilinear,
}

impl ResizeFilter {
    #[must_use]
    pub fn to_filter_type(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Bilinear => image::imageops::FilterType::Triangle,
        }
    }
}

/// RGBA color, parsed from and rendered as `#RRGGBB` / `#RRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);
    pub const RED: Self = Self::rgba(255, 0, 0, 255);

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    #[must_use]
    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Color {
    type Err = PhotoOpsError;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PhotoOpsError::invalid_argument(format!(
                "Invalid color '{s}', expected #RRGGBB or #RRGGBBAA"
            )));
        }
        let channel = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| PhotoOpsError::invalid_argument(format!("Invalid color '{s}'")))
        };
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

impl TryFrom<String> for Color {
    type Error = PhotoOpsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        format!(
            "#{:02x}{:02x}{:02x}{:02x}",
            color.r, color.g, color.b, color.a
        )
    }
}

/// Pixel coordinate; may lie outside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle; the origin may lie outside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square of side `2 * radius + 1` centered on `center`
    #[must_use]
    pub fn around(center: Point, radius: u32) -> Self {
        let r = i64::from(radius);
        let side = radius.saturating_mul(2).saturating_add(1);
        Self::new(center.x.saturating_sub(r), center.y.saturating_sub(r), side, side)
    }

    #[must_use]
    pub fn right(&self) -> i64 {
        self.x.saturating_add(i64::from(self.width))
    }

    #[must_use]
    pub fn bottom(&self) -> i64 {
        self.y.saturating_add(i64::from(self.height))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersection with a `width x height` buffer, `None` when nothing overlaps
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let left = self.x.max(0);
        let top = self.y.max(0);
        let right = self.right().min(i64::from(width));
        let bottom = self.bottom().min(i64::from(height));
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self::new(
            left,
            top,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Grow by `margin` on every side
    #[must_use]
    pub fn expand(&self, margin: u32) -> Self {
        let m = i64::from(margin);
        Self::new(
            self.x.saturating_sub(m),
            self.y.saturating_sub(m),
            self.width.saturating_add(margin.saturating_mul(2)),
            self.height.saturating_add(margin.saturating_mul(2)),
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@({},{})",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Per-pixel weight map with values in `[0, 1]`.
///
/// Masks decoded from segmentation carry "keep original" (foreground) weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Mask {
    /// Build a mask, clamping every weight into `[0, 1]` (NaN becomes 0)
    ///
    /// # Errors
    /// - `values.len()` differs from `width * height`
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(PhotoOpsError::processing(format!(
                "Mask has {} values, expected {} for {}x{}",
                values.len(),
                expected,
                width,
                height
            )));
        }
        let values = values.into_iter().map(clamp_unit).collect();
        Ok(Self {
            width,
            height,
            values,
        })
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![clamp_unit(value); width as usize * height as usize],
        }
    }

    /// Hard mask that is 1 inside `rect` and 0 elsewhere
    #[must_use]
    pub fn from_rect(width: u32, height: u32, rect: &Rect) -> Self {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let inside = rect.contains(i64::from(x), i64::from(y));
                values.push(if inside { 1.0 } else { 0.0 });
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// `1 - w` for every weight
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            values: self.values.iter().map(|v| 1.0 - v).collect(),
        }
    }

    /// Hard mask: 1 where the weight is at or above `threshold`, else 0
    #[must_use]
    pub fn thresholded(&self, threshold: f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            values: self
                .values
                .iter()
                .map(|&v| if v >= threshold { 1.0 } else { 0.0 })
                .collect(),
        }
    }

    /// Mean weight over the whole mask
    #[must_use]
    pub fn coverage(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Element type of a model tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    #[default]
    Float32,
}

/// Typed tensor storage
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float32(ArrayD<f32>),
    Uint8(ArrayD<u8>),
}

/// Fixed-shape numeric array exchanged with an interpreter.
///
/// Backed by `ndarray`, so `data.len() == product(shape)` holds by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: TensorData,
}

impl Tensor {
    /// # Errors
    /// - `data.len()` differs from the product of `shape`
    pub fn from_f32(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| PhotoOpsError::processing(format!("Invalid f32 tensor: {e}")))?;
        Ok(Self::from_array_f32(array))
    }

    /// # Errors
    /// - `data.len()` differs from the product of `shape`
    pub fn from_u8(shape: &[usize], data: Vec<u8>) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| PhotoOpsError::processing(format!("Invalid u8 tensor: {e}")))?;
        Ok(Self::from_array_u8(array))
    }

    #[must_use]
    pub fn from_array_f32(array: ArrayD<f32>) -> Self {
        Self {
            data: TensorData::Float32(array),
        }
    }

    #[must_use]
    pub fn from_array_u8(array: ArrayD<u8>) -> Self {
        Self {
            data: TensorData::Uint8(array),
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match &self.data {
            TensorData::Float32(a) => a.shape(),
            TensorData::Uint8(a) => a.shape(),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DataType {
        match &self.data {
            TensorData::Float32(_) => DataType::Float32,
            TensorData::Uint8(_) => DataType::Uint8,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            TensorData::Float32(a) => a.len(),
            TensorData::Uint8(a) => a.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Values widened to f32 (u8 values are not rescaled)
    #[must_use]
    pub fn to_f32(&self) -> ArrayD<f32> {
        match &self.data {
            TensorData::Float32(a) => a.clone(),
            TensorData::Uint8(a) => a.mapv(f32::from),
        }
    }
}

/// Operations accepted at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    InitializeModels,
    RemoveBackground,
    ApplyFilter,
    AddObject,
    RemoveObject,
}

impl Operation {
    pub const ALL: [Self; 5] = [
        Self::InitializeModels,
        Self::RemoveBackground,
        Self::ApplyFilter,
        Self::AddObject,
        Self::RemoveObject,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitializeModels => "initializeModels",
            Self::RemoveBackground => "removeBackground",
            Self::ApplyFilter => "applyFilter",
            Self::AddObject => "addObject",
            Self::RemoveObject => "removeObject",
        }
    }

    /// Whether the request must carry an `imagePath`
    #[must_use]
    pub fn requires_image(self) -> bool {
        !matches!(self, Self::InitializeModels)
    }
}

impl FromStr for Operation {
    type Err = PhotoOpsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| PhotoOpsError::unknown_operation(s))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request pipeline states; `Failed` is reachable from any state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    ImageLoaded,
    ModelInvoked,
    Composited,
    Persisted,
    Done,
    Failed(String),
}

/// Placeholder path taken because no generative model was available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    PlaceholderMarker,
    PlaceholderRegion,
}

/// Timing breakdown for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTimings {
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub compositing_ms: u64,
    pub persist_ms: u64,
    pub total_ms: u64,
}

/// Metadata attached to every persisted result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub operation: Operation,
    pub dimensions: (u32, u32),
    /// Model consulted for this result, if any
    pub model: Option<String>,
    /// Set when a documented placeholder replaced model output
    pub fallback: Option<FallbackKind>,
    /// Recovered geometry problems and similar non-fatal notes
    pub warnings: Vec<String>,
    pub states: Vec<PipelineState>,
    pub timings: OperationTimings,
    pub completed_at: DateTime<Utc>,
}

impl OperationMetadata {
    #[must_use]
    pub fn new(operation: Operation, dimensions: (u32, u32)) -> Self {
        Self {
            operation,
            dimensions,
            model: None,
            fallback: None,
            warnings: Vec::new(),
            states: vec![PipelineState::Received],
            timings: OperationTimings::default(),
            completed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Successful image operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub output_path: PathBuf,
    pub metadata: OperationMetadata,
}
