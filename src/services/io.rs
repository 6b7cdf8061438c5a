//! Image I/O operations service
//!
//! Decoding and encoding are delegated to the `image` crate; this module only
//! maps their failures onto the pipeline's error taxonomy.

use crate::{
    error::{PhotoOpsError, Result},
    types::ImageBuffer,
};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path as RGBA8
    ///
    /// Extension-based format detection is tried first, then content sniffing.
    ///
    /// # Errors
    /// - `DecodeFailed` when the file is missing, unreadable, or not an image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use photo_ops::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageBuffer> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(PhotoOpsError::decode_failed(format!(
                "Image '{}' does not exist",
                path_ref.display()
            )));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(ImageBuffer::from_dynamic(&img)),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    PhotoOpsError::decode_failed(format!(
                        "Failed to read '{}': {}",
                        path_ref.display(),
                        io_err
                    ))
                })?;
                Self::load_from_bytes(&data).map_err(|content_err| {
                    PhotoOpsError::decode_failed(format!(
                        "Failed to decode '{}' ({} bytes). Extension error: {}. {}",
                        path_ref.display(),
                        data.len(),
                        e,
                        content_err.message()
                    ))
                })
            },
        }
    }

    /// Decode an in-memory encoded image as RGBA8
    ///
    /// # Errors
    /// - `DecodeFailed` when the bytes are not a supported image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<ImageBuffer> {
        image::load_from_memory(bytes)
            .map(|img| ImageBuffer::from_dynamic(&img))
            .map_err(|e| PhotoOpsError::decode_failed(format!("Content error: {e}")))
    }

    /// Encode a buffer as lossless PNG
    ///
    /// # Errors
    /// - `SaveFailed` when the encoder rejects the buffer
    pub fn encode_png(image: &ImageBuffer) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image.as_rgba().clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| PhotoOpsError::save_failed(format!("PNG encoding failed: {e}")))?;
        Ok(bytes)
    }

    /// Check whether a path has an extension this crate can decode
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| matches!(ext.as_str(), "png" | "jpg" | "jpeg"))
    }
}
