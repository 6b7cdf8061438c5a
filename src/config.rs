//! Configuration types for photo operations

use crate::error::{PhotoOpsError, Result};
use crate::models::{ModelDescriptor, ModelKind};
use crate::types::{Color, ResizeFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File naming strategy for persisted results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// `processed_image_<unix_millis>.png`
    #[default]
    Timestamped,
    /// `processed_image_<sha256 prefix>.png`; identical pixels map to the same file
    ContentAddressed,
}

/// What add/remove object do when no inpainting model is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Paint a deterministic placeholder and flag it in the result metadata
    #[default]
    Placeholder,
    /// Fail with `MODEL_NOT_FOUND`
    Strict,
}

/// How segmentation output becomes a mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskDecodeOptions {
    /// Hard-mask cutoff; `None` keeps soft weights
    pub threshold: Option<f32>,
    /// Kernel used to resize the mask to the source resolution
    pub filter: ResizeFilter,
}

impl Default for MaskDecodeOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            filter: ResizeFilter::Bilinear,
        }
    }
}

/// Appearance of the placeholder marks drawn without an inpainting model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackStyle {
    pub marker_color: Color,
    pub marker_radius: u32,
    pub region_color: Color,
    pub region_opacity: f32,
    /// Side length range `[min, max)` of generated removal regions; `min == max` pins it
    pub region_size: (u32, u32),
}

impl Default for FallbackStyle {
    fn default() -> Self {
        Self {
            marker_color: Color::RED,
            marker_radius: 50,
            region_color: Color::BLACK,
            region_opacity: 1.0,
            region_size: (50, 200),
        }
    }
}

/// Configuration for the operation dispatcher and its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Read-only bundled model assets
    pub assets_dir: PathBuf,

    /// Application-private directory for processed images
    pub output_dir: PathBuf,

    pub naming: OutputNaming,

    /// Layer that replaces the background in `removeBackground`
    pub background_color: Color,

    pub mask: MaskDecodeOptions,

    pub fallback: FallbackStyle,

    pub fallback_policy: FallbackPolicy,

    /// Context pixels around an edit region fed to the inpainting model
    pub inpaint_margin: u32,

    /// Tensor contracts, one per model name
    pub models: Vec<ModelDescriptor>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            output_dir: default_output_dir(),
            naming: OutputNaming::default(),
            background_color: Color::TRANSPARENT,
            mask: MaskDecodeOptions::default(),
            fallback: FallbackStyle::default(),
            fallback_policy: FallbackPolicy::default(),
            inpaint_margin: 32,
            models: ModelKind::ALL
                .iter()
                .map(|kind| kind.default_descriptor())
                .collect(),
        }
    }
}

/// `<local data dir>/photo-ops/processed`, or the temp dir when there is none
#[must_use]
pub fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("photo-ops")
        .join("processed")
}

impl EditorConfig {
    #[must_use]
    pub fn builder() -> EditorConfigBuilder {
        EditorConfigBuilder::default()
    }

    /// Load a JSON configuration file; missing fields take their defaults
    ///
    /// # Errors
    /// - File unreadable, malformed JSON, or failed validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PhotoOpsError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PhotoOpsError::invalid_config(format!(
                "Failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Declared contract for a model name
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|d| d.name == name)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Opacity or threshold outside `[0, 1]`
    /// - Zero marker radius or inverted region size range
    /// - Invalid or duplicate model descriptors
    pub fn validate(&self) -> Result<()> {
        let opacity = self.fallback.region_opacity;
        if !(0.0..=1.0).contains(&opacity) {
            return Err(PhotoOpsError::config_value_error(
                "region_opacity",
                opacity,
                "0.0-1.0",
            ));
        }
        if let Some(threshold) = self.mask.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(PhotoOpsError::config_value_error(
                    "mask threshold",
                    threshold,
                    "0.0-1.0",
                ));
            }
        }
        if self.fallback.marker_radius == 0 {
            return Err(PhotoOpsError::invalid_config(
                "Marker radius must be positive",
            ));
        }
        let (min, max) = self.fallback.region_size;
        if min == 0 || min > max {
            return Err(PhotoOpsError::invalid_config(format!(
                "Region size range ({min}, {max}) must satisfy 0 < min <= max"
            )));
        }

        let mut seen = HashSet::new();
        for descriptor in &self.models {
            descriptor.validate()?;
            if !seen.insert(descriptor.name.as_str()) {
                return Err(PhotoOpsError::invalid_config(format!(
                    "Model '{}' is declared more than once",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }
}

/// Builder for `EditorConfig`
#[derive(Debug, Default)]
pub struct EditorConfigBuilder {
    config: EditorConfig,
}

impl EditorConfigBuilder {
    #[must_use]
    pub fn assets_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.assets_dir = dir.into();
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn naming(mut self, naming: OutputNaming) -> Self {
        self.config.naming = naming;
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: Color) -> Self {
        self.config.background_color = color;
        self
    }

    #[must_use]
    pub fn mask_threshold(mut self, threshold: Option<f32>) -> Self {
        self.config.mask.threshold = threshold;
        self
    }

    #[must_use]
    pub fn mask_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.mask.filter = filter;
        self
    }

    #[must_use]
    pub fn fallback_style(mut self, style: FallbackStyle) -> Self {
        self.config.fallback = style;
        self
    }

    #[must_use]
    pub fn fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback_policy = policy;
        self
    }

    #[must_use]
    pub fn inpaint_margin(mut self, margin: u32) -> Self {
        self.config.inpaint_margin = margin;
        self
    }

    /// Replace the declaration for `descriptor.name`, or add it
    #[must_use]
    pub fn model(mut self, descriptor: ModelDescriptor) -> Self {
        self.config.models.retain(|d| d.name != descriptor.name);
        self.config.models.push(descriptor);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any failure reported by [`EditorConfig::validate`]
    pub fn build(self) -> Result<EditorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
