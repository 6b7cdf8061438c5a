//! Model declarations: names, asset files, and tensor contracts
//!
//! The core never looks inside a model binary. Everything it needs to feed an
//! interpreter and read its output comes from the [`ModelDescriptor`] declared
//! for a model name.

use crate::error::{PhotoOpsError, Result};
use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// The three model roles the dispatcher knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    Segmentation,
    StyleTransfer,
    Inpainting,
}

impl ModelKind {
    pub const ALL: [Self; 3] = [Self::Segmentation, Self::StyleTransfer, Self::Inpainting];

    /// Registry key
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Segmentation => "segmentation",
            Self::StyleTransfer => "styleTransfer",
            Self::Inpainting => "inpainting",
        }
    }

    /// Bundled asset file stem
    #[must_use]
    pub fn asset_stem(self) -> &'static str {
        match self {
            Self::Segmentation => "segmentation_model",
            Self::StyleTransfer => "style_transfer_model",
            Self::Inpainting => "inpainting_model",
        }
    }

    /// Default tensor contract for this role
    #[must_use]
    pub fn default_descriptor(self) -> ModelDescriptor {
        match self {
            Self::Segmentation => ModelDescriptor {
                name: self.name().to_string(),
                asset: format!("{}.onnx", self.asset_stem()),
                input: TensorSpec {
                    shape: vec![1, 3, 320, 320],
                    dtype: DataType::Float32,
                    layout: TensorLayout::Nchw,
                    channel_order: ChannelOrder::Rgb,
                    normalization: Normalization::MeanStd {
                        mean: [0.485, 0.456, 0.406],
                        std: [0.229, 0.224, 0.225],
                    },
                },
                output: TensorSpec {
                    shape: vec![1, 1, 320, 320],
                    dtype: DataType::Float32,
                    layout: TensorLayout::Nchw,
                    channel_order: ChannelOrder::Rgb,
                    normalization: Normalization::ZeroToOne,
                },
            },
            Self::StyleTransfer => ModelDescriptor {
                name: self.name().to_string(),
                asset: format!("{}.onnx", self.asset_stem()),
                input: TensorSpec::image(&[1, 3, 256, 256], Normalization::ZeroToOne),
                output: TensorSpec::image(&[1, 3, 256, 256], Normalization::ZeroToOne),
            },
            Self::Inpainting => ModelDescriptor {
                name: self.name().to_string(),
                asset: format!("{}.onnx", self.asset_stem()),
                input: TensorSpec::image(&[1, 4, 512, 512], Normalization::MinusOneToOne),
                output: TensorSpec::image(&[1, 3, 512, 512], Normalization::MinusOneToOne),
            },
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dimension ordering of a 4-D image tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nchw,
    Nhwc,
}

/// Color channel ordering inside the channel dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Value mapping between 8-bit pixels and tensor values
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Normalization {
    /// Pixel values as-is, 0..=255
    Raw,
    /// `p / 255`
    #[default]
    ZeroToOne,
    /// `p / 127.5 - 1`
    MinusOneToOne,
    /// `(p / 255 - mean) / std` per channel, channel index in RGB order
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    /// Map an 8-bit channel value into tensor space
    #[must_use]
    pub fn apply(&self, value: u8, channel: usize) -> f32 {
        let v = f32::from(value);
        match self {
            Self::Raw => v,
            Self::ZeroToOne => v / 255.0,
            Self::MinusOneToOne => v / 127.5 - 1.0,
            Self::MeanStd { mean, std } => {
                let c = channel.min(2);
                let m = mean.get(c).copied().unwrap_or(0.0);
                let s = std.get(c).copied().unwrap_or(1.0);
                (v / 255.0 - m) / s
            },
        }
    }

    /// Map a tensor value back to an 8-bit channel, clamping to the pixel range
    #[must_use]
    pub fn invert(&self, value: f32, channel: usize) -> u8 {
        let v = match self {
            Self::Raw => value,
            Self::ZeroToOne => value * 255.0,
            Self::MinusOneToOne => (value + 1.0) * 127.5,
            Self::MeanStd { mean, std } => {
                let c = channel.min(2);
                let m = mean.get(c).copied().unwrap_or(0.0);
                let s = std.get(c).copied().unwrap_or(1.0);
                (value * s + m) * 255.0
            },
        };
        if v.is_nan() {
            0
        } else {
            v.round().clamp(0.0, 255.0) as u8
        }
    }

    fn validate(&self) -> Result<()> {
        if let Self::MeanStd { std, .. } = self {
            if std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
                return Err(PhotoOpsError::invalid_config(
                    "Normalization std values must be positive and finite",
                ));
            }
        }
        Ok(())
    }
}

/// Declared shape, dtype, and pixel mapping of one model tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    /// Rank-4 shape in `layout` order
    pub shape: Vec<usize>,
    #[serde(default)]
    pub dtype: DataType,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default)]
    pub channel_order: ChannelOrder,
    #[serde(default)]
    pub normalization: Normalization,
}

impl TensorSpec {
    /// Float32 NCHW RGB spec with the given normalization
    #[must_use]
    pub fn image(shape: &[usize], normalization: Normalization) -> Self {
        Self {
            shape: shape.to_vec(),
            dtype: DataType::Float32,
            layout: TensorLayout::Nchw,
            channel_order: ChannelOrder::Rgb,
            normalization,
        }
    }

    /// `(height, width, channels)` read according to the layout
    ///
    /// # Errors
    /// - Shape is not rank 4
    pub fn spatial(&self) -> Result<(usize, usize, usize)> {
        match (self.layout, self.shape.as_slice()) {
            (TensorLayout::Nchw, [_, c, h, w]) | (TensorLayout::Nhwc, [_, h, w, c]) => {
                Ok((*h, *w, *c))
            },
            _ => Err(PhotoOpsError::processing(format!(
                "Expected rank-4 tensor shape, got {:?}",
                self.shape
            ))),
        }
    }

    /// Shape with the batch dimension forced to 1
    ///
    /// # Errors
    /// - Shape is not rank 4
    pub fn batch_one_shape(&self) -> Result<Vec<usize>> {
        let (h, w, c) = self.spatial()?;
        Ok(match self.layout {
            TensorLayout::Nchw => vec![1, c, h, w],
            TensorLayout::Nhwc => vec![1, h, w, c],
        })
    }

    /// # Errors
    /// - Rank other than 4, zero-sized spatial dims, unsupported channel count,
    ///   or invalid normalization constants
    pub fn validate(&self, what: &str) -> Result<()> {
        let (h, w, c) = self
            .spatial()
            .map_err(|e| PhotoOpsError::invalid_config(format!("{what}: {e}")))?;
        if h == 0 || w == 0 {
            return Err(PhotoOpsError::invalid_config(format!(
                "{what}: spatial dimensions must be non-zero, got {h}x{w}"
            )));
        }
        if !matches!(c, 1 | 3 | 4) {
            return Err(PhotoOpsError::invalid_config(format!(
                "{what}: unsupported channel count {c} (expected 1, 3 or 4)"
            )));
        }
        self.normalization.validate()
    }
}

/// Everything the core knows about one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Registry key, e.g. `segmentation`
    pub name: String,
    /// File name inside the bundled asset directory
    pub asset: String,
    pub input: TensorSpec,
    pub output: TensorSpec,
}

impl ModelDescriptor {
    /// # Errors
    /// - Empty name or asset, or an invalid input/output spec
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PhotoOpsError::invalid_config("Model name must not be empty"));
        }
        if self.asset.trim().is_empty() {
            return Err(PhotoOpsError::invalid_config(format!(
                "Model '{}' has no asset file",
                self.name
            )));
        }
        self.input.validate(&format!("{} input", self.name))?;
        self.output.validate(&format!("{} output", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptors_are_valid() {
        for kind in ModelKind::ALL {
            let descriptor = kind.default_descriptor();
            assert_eq!(descriptor.name, kind.name());
            assert!(descriptor.asset.starts_with(kind.asset_stem()));
            descriptor.validate().unwrap();
        }
    }

    #[test]
    fn test_spatial_respects_layout() {
        let mut spec = TensorSpec::image(&[1, 3, 64, 32], Normalization::Raw);
        assert_eq!(spec.spatial().unwrap(), (64, 32, 3));
        spec.layout = TensorLayout::Nhwc;
        spec.shape = vec![2, 64, 32, 3];
        assert_eq!(spec.spatial().unwrap(), (64, 32, 3));
        assert_eq!(spec.batch_one_shape().unwrap(), vec![1, 64, 32, 3]);
        spec.shape = vec![64, 32, 3];
        assert!(spec.spatial().is_err());
    }

    #[test]
    fn test_normalization_round_trip() {
        let policies = [
            Normalization::Raw,
            Normalization::ZeroToOne,
            Normalization::MinusOneToOne,
            Normalization::MeanStd {
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            },
        ];
        for policy in policies {
            for value in [0u8, 1, 127, 128, 254, 255] {
                for channel in 0..3 {
                    assert_eq!(policy.invert(policy.apply(value, channel), channel), value);
                }
            }
        }
        assert!((Normalization::MinusOneToOne.apply(0, 0) + 1.0).abs() < 1e-6);
        assert!((Normalization::MinusOneToOne.apply(255, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invert_clamps() {
        assert_eq!(Normalization::ZeroToOne.invert(2.0, 0), 255);
        assert_eq!(Normalization::ZeroToOne.invert(-1.0, 0), 0);
        assert_eq!(Normalization::Raw.invert(f32::NAN, 0), 0);
    }

    #[test]
    fn test_validation_rejects_bad_specs() {
        let mut descriptor = ModelKind::Segmentation.default_descriptor();
        descriptor.input.shape = vec![1, 5, 320, 320];
        assert!(descriptor.validate().is_err());

        let mut descriptor = ModelKind::Segmentation.default_descriptor();
        descriptor.input.normalization = Normalization::MeanStd {
            mean: [0.0; 3],
            std: [0.0, 1.0, 1.0],
        };
        assert!(descriptor.validate().is_err());

        let mut descriptor = ModelKind::Segmentation.default_descriptor();
        descriptor.asset = String::new();
        assert!(descriptor.validate().is_err());
    }
}
