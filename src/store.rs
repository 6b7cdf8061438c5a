//! Persistence of processed images
//!
//! Results are encoded to PNG in memory, written to a temp file inside the
//! output directory, and atomically moved into place. A failed write never
//! leaves a partial file under the final name.

use crate::config::OutputNaming;
use crate::error::{PhotoOpsError, Result};
use crate::services::ImageIOService;
use crate::types::ImageBuffer;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name prefix shared by all persisted results
pub const OUTPUT_PREFIX: &str = "processed_image_";

/// Hex digits of the content hash used in content-addressed names
const CONTENT_HASH_LEN: usize = 16;

/// Upper bound on `_<n>` suffixes tried for one base name
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes result images into an application-private directory
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    naming: OutputNaming,
}

impl ResultStore {
    pub fn new<P: Into<PathBuf>>(dir: P, naming: OutputNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn naming(&self) -> OutputNaming {
        self.naming
    }

    /// Persist `image` as PNG and return the final path
    ///
    /// # Errors
    /// - `SaveFailed` when the directory cannot be created, encoding fails,
    ///   or the atomic rename fails
    pub fn save(&self, image: &ImageBuffer) -> Result<PathBuf> {
        let png = ImageIOService::encode_png(image)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            PhotoOpsError::save_failed(format!(
                "Failed to create output directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let stem = match self.naming {
            OutputNaming::Timestamped => timestamp_stem(),
            OutputNaming::ContentAddressed => content_stem(image),
        };

        let candidate = self.dir.join(format!("{stem}.png"));
        if self.naming == OutputNaming::ContentAddressed && candidate.is_file() {
            log::debug!("♻️ Reusing identical result {}", candidate.display());
            return Ok(candidate);
        }

        let mut temp = tempfile::Builder::new()
            .prefix(".photo-ops-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| self.write_error("create temp file in", &self.dir, &e))?;
        temp.write_all(&png)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| self.write_error("write", temp.path(), &e))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = if attempt == 0 {
                candidate.clone()
            } else {
                self.dir.join(format!("{stem}_{attempt}.png"))
            };
            match temp.persist_noclobber(&path) {
                Ok(_) => {
                    log::debug!("💾 Saved {} ({} bytes)", path.display(), png.len());
                    return Ok(path);
                },
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    temp = e.file;
                },
                Err(e) => return Err(self.write_error("persist", &path, &e.error)),
            }
        }

        Err(PhotoOpsError::save_failed(format!(
            "No free file name for '{stem}' in '{}'",
            self.dir.display()
        )))
    }

    fn write_error(&self, op: &str, path: &Path, e: &std::io::Error) -> PhotoOpsError {
        PhotoOpsError::save_failed(format!(
            "Failed to {} '{}' (output dir '{}'): {}",
            op,
            path.display(),
            self.dir.display(),
            e
        ))
    }
}

fn timestamp_stem() -> String {
    format!("{OUTPUT_PREFIX}{}", chrono::Utc::now().timestamp_millis())
}

fn content_stem(image: &ImageBuffer) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.pixels());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{OUTPUT_PREFIX}{}", hex.get(..CONTENT_HASH_LEN).unwrap_or(&hex))
}
