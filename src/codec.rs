//! Conversion between image buffers and model tensors
//!
//! Encoding stretches the buffer to the declared spatial size with a bilinear
//! kernel, reorders channels, and applies the declared normalization. Decoding
//! is the inverse: masks come back as `[0, 1]` weights at the caller's
//! resolution, generated images come back as clamped RGBA8 buffers.
//!
//! `uint8` tensors carry raw pixel values; normalization applies to `float32`
//! tensors only.

use crate::config::MaskDecodeOptions;
use crate::error::{PhotoOpsError, Result};
use crate::models::{ChannelOrder, TensorLayout, TensorSpec};
use crate::types::{DataType, ImageBuffer, Mask, ResizeFilter, Tensor, TensorData};
use image::{ImageBuffer as RawImage, Luma, Rgba, RgbaImage};
use ndarray::{Array4, ArrayD, Axis, Ix4};

/// Rec. 601 luma weights for single-channel inputs
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Stateless tensor encoder/decoder
pub struct TensorCodec;

impl TensorCodec {
    /// Encode an image into the tensor a model declares as its input
    ///
    /// A fourth channel, when declared, carries the image alpha.
    ///
    /// # Errors
    /// - Empty image
    /// - Spec is not a rank-4 image spec
    pub fn encode(image: &ImageBuffer, spec: &TensorSpec) -> Result<Tensor> {
        Self::encode_inner(image, None, spec)
    }

    /// Encode an image plus a hole mask for inpainting models
    ///
    /// With a four-channel input the fourth channel carries `mask`
    /// (1 inside the hole); otherwise the mask is not part of the input.
    ///
    /// # Errors
    /// - Empty image, or mask dimensions differing from the image
    /// - Spec is not a rank-4 image spec
    pub fn encode_with_mask(image: &ImageBuffer, mask: &Mask, spec: &TensorSpec) -> Result<Tensor> {
        if mask.dimensions() != image.dimensions() {
            return Err(PhotoOpsError::processing_stage_error(
                "encode",
                "hole mask does not match image dimensions",
                Some(&format!(
                    "image {:?}, mask {:?}",
                    image.dimensions(),
                    mask.dimensions()
                )),
            ));
        }
        Self::encode_inner(image, Some(mask), spec)
    }

    fn encode_inner(image: &ImageBuffer, mask: Option<&Mask>, spec: &TensorSpec) -> Result<Tensor> {
        if image.is_empty() {
            return Err(PhotoOpsError::processing_stage_error(
                "encode",
                "cannot encode an empty image",
                Some(&format!("{}x{}", image.width(), image.height())),
            ));
        }
        let (height, width, channels) = spec.spatial()?;
        let target_w = u32::try_from(width)
            .map_err(|_| PhotoOpsError::processing("Tensor width exceeds u32"))?;
        let target_h = u32::try_from(height)
            .map_err(|_| PhotoOpsError::processing("Tensor height exceeds u32"))?;

        let resized = image.resize(target_w, target_h, ResizeFilter::Bilinear);
        let hole = mask.map(|m| resize_mask(m, target_w, target_h, ResizeFilter::Bilinear));
        let rgba = resized.as_rgba();

        let sample = |y: usize, x: usize, ch: usize| -> f32 {
            let pixel = rgba.get_pixel(x as u32, y as u32).0;
            match (channels, ch) {
                (1, _) => {
                    let luma: f32 = LUMA_WEIGHTS
                        .iter()
                        .zip(pixel.iter())
                        .map(|(w, v)| w * f32::from(*v))
                        .sum();
                    let luma = luma.round().clamp(0.0, 255.0) as u8;
                    encode_value(spec, luma, 0)
                },
                (4, 3) => match &hole {
                    Some(hole) => {
                        let weight = hole.value(x as u32, y as u32).unwrap_or(0.0);
                        match spec.dtype {
                            DataType::Float32 => weight,
                            DataType::Uint8 => (weight * 255.0).round(),
                        }
                    },
                    None => encode_value(spec, pixel[3], 3),
                },
                _ => {
                    let source = source_channel(spec.channel_order, ch);
                    encode_value(spec, pixel.get(source).copied().unwrap_or(0), source)
                },
            }
        };

        let array: ArrayD<f32> = match spec.layout {
            TensorLayout::Nchw => {
                Array4::from_shape_fn((1, channels, height, width), |(_, c, y, x)| sample(y, x, c))
                    .into_dyn()
            },
            TensorLayout::Nhwc => {
                Array4::from_shape_fn((1, height, width, channels), |(_, y, x, c)| sample(y, x, c))
                    .into_dyn()
            },
        };

        Ok(match spec.dtype {
            DataType::Float32 => Tensor::from_array_f32(array),
            DataType::Uint8 => Tensor::from_array_u8(array.mapv(|v| v.clamp(0.0, 255.0) as u8)),
        })
    }

    /// Decode a single-channel probability tensor into a mask of the given size
    ///
    /// Accepted shapes: `[1, 1, H, W]`, `[1, H, W, 1]`, `[1, H, W]`, `[H, W]`.
    /// `uint8` tensors are scaled by `1/255`.
    ///
    /// # Errors
    /// - Any other shape, or a zero target size
    pub fn decode_mask(
        tensor: &Tensor,
        target_width: u32,
        target_height: u32,
        options: &MaskDecodeOptions,
    ) -> Result<Mask> {
        if target_width == 0 || target_height == 0 {
            return Err(PhotoOpsError::processing_stage_error(
                "decode mask",
                "target size must be non-zero",
                Some(&format!("{target_width}x{target_height}")),
            ));
        }
        let (height, width) = match *tensor.shape() {
            [1, 1, h, w] | [1, h, w, 1] | [1, h, w] | [h, w] => (h, w),
            _ => {
                return Err(PhotoOpsError::processing(format!(
                    "Expected a single-channel mask tensor, got shape {:?}",
                    tensor.shape()
                )))
            },
        };
        let values: Vec<f32> = match tensor.data() {
            TensorData::Float32(array) => array.iter().copied().collect(),
            TensorData::Uint8(array) => array.iter().map(|v| f32::from(*v) / 255.0).collect(),
        };

        let source = Mask::new(
            u32::try_from(width).map_err(|_| PhotoOpsError::processing("Mask width exceeds u32"))?,
            u32::try_from(height)
                .map_err(|_| PhotoOpsError::processing("Mask height exceeds u32"))?,
            values,
        )?;
        let resized = resize_mask(&source, target_width, target_height, options.filter);

        Ok(match options.threshold {
            Some(threshold) => resized.thresholded(threshold),
            None => resized,
        })
    }

    /// Decode a generated image tensor, clamping to the pixel range
    ///
    /// The tensor's own shape decides the output size; `spec` supplies layout,
    /// channel order, and normalization. Missing alpha becomes opaque.
    ///
    /// # Errors
    /// - Rank other than 3 or 4, batch size other than 1, or channel count
    ///   outside {1, 3, 4}
    pub fn decode_image(tensor: &Tensor, spec: &TensorSpec) -> Result<ImageBuffer> {
        let raw_u8 = tensor.dtype() == DataType::Uint8;
        let mut array = tensor.to_f32();
        if array.ndim() == 3 {
            array.insert_axis_inplace(Axis(0));
        }
        let array = array.into_dimensionality::<Ix4>().map_err(|_| {
            PhotoOpsError::processing(format!(
                "Expected a rank-3 or rank-4 image tensor, got shape {:?}",
                tensor.shape()
            ))
        })?;

        let (batch, height, width, channels) = match spec.layout {
            TensorLayout::Nchw => {
                let (n, c, h, w) = array.dim();
                (n, h, w, c)
            },
            TensorLayout::Nhwc => array.dim(),
        };
        if batch != 1 {
            return Err(PhotoOpsError::processing(format!(
                "Expected batch size 1, got {batch}"
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(PhotoOpsError::processing(format!(
                "Unsupported channel count {channels} in image tensor"
            )));
        }

        let at = |y: usize, x: usize, c: usize| -> f32 {
            let index = match spec.layout {
                TensorLayout::Nchw => (0, c, y, x),
                TensorLayout::Nhwc => (0, y, x, c),
            };
            array.get(index).copied().unwrap_or(0.0)
        };
        let to_pixel = |value: f32, channel: usize| -> u8 {
            if raw_u8 {
                value.clamp(0.0, 255.0) as u8
            } else {
                spec.normalization.invert(value, channel)
            }
        };

        let out_w =
            u32::try_from(width).map_err(|_| PhotoOpsError::processing("Image width exceeds u32"))?;
        let out_h = u32::try_from(height)
            .map_err(|_| PhotoOpsError::processing("Image height exceeds u32"))?;

        let image = RgbaImage::from_fn(out_w, out_h, |x, y| {
            let (x, y) = (x as usize, y as usize);
            if channels == 1 {
                let v = to_pixel(at(y, x, 0), 0);
                return Rgba([v, v, v, 255]);
            }
            let mut rgba = [0u8, 0, 0, 255];
            for (ch, slot) in (0..3).zip(rgba.iter_mut()) {
                let source = source_channel(spec.channel_order, ch);
                *slot = to_pixel(at(y, x, source), ch);
            }
            if channels == 4 {
                rgba[3] = to_pixel(at(y, x, 3), 3);
            }
            Rgba(rgba)
        });

        Ok(ImageBuffer::from_rgba(image))
    }
}

/// RGB index feeding tensor channel `ch` (and vice versa; the mapping is its own inverse)
fn source_channel(order: ChannelOrder, ch: usize) -> usize {
    match (order, ch) {
        (ChannelOrder::Bgr, 0..=2) => 2 - ch,
        _ => ch,
    }
}

fn encode_value(spec: &TensorSpec, value: u8, channel: usize) -> f32 {
    match spec.dtype {
        DataType::Float32 => spec.normalization.apply(value, channel),
        DataType::Uint8 => f32::from(value),
    }
}

/// Deterministic mask resize through a single-channel float image
pub(crate) fn resize_mask(mask: &Mask, width: u32, height: u32, filter: ResizeFilter) -> Mask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    let Some(source) =
        RawImage::<Luma<f32>, Vec<f32>>::from_raw(mask.width(), mask.height(), mask.values().to_vec())
    else {
        return Mask::filled(width, height, 0.0);
    };
    let resized = image::imageops::resize(&source, width, height, filter.to_filter_type());
    Mask::new(width, height, resized.into_raw())
        .unwrap_or_else(|_| Mask::filled(width, height, 0.0))
}
