//! Model registry: load-once, shared, explicitly released model handles
//!
//! The registry is the only component that constructs or destroys inference
//! sessions. Handles are shared (`Arc`) between concurrent requests; each
//! handle serializes its own invocations, and loading or releasing one model
//! never blocks work on another.

use crate::config::EditorConfig;
use crate::error::{PhotoOpsError, Result};
use crate::inference::{InferenceSession, ModelLoader};
use crate::models::ModelDescriptor;
use crate::types::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Read-only source of model binaries
pub trait AssetSource: Send + Sync {
    /// Raw bytes of a named asset
    ///
    /// # Errors
    /// - `ModelNotFound` when the asset does not exist
    /// - I/O errors while reading an existing asset
    fn read(&self, asset: &str) -> Result<Vec<u8>>;

    /// Human readable location for log messages
    fn describe(&self) -> String;
}

/// Assets bundled in a directory on disk
#[derive(Debug, Clone)]
pub struct BundledAssets {
    root: PathBuf,
}

impl BundledAssets {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for BundledAssets {
    fn read(&self, asset: &str) -> Result<Vec<u8>> {
        let path = self.root.join(asset);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                PhotoOpsError::model_not_found(format!("Asset '{}' not found", path.display())),
            ),
            Err(e) => Err(PhotoOpsError::file_io_error("read model asset", &path, &e)),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// In-memory assets, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_asset<S: Into<String>>(mut self, name: S, bytes: Vec<u8>) -> Self {
        self.assets.insert(name.into(), bytes);
        self
    }
}

impl AssetSource for MemoryAssets {
    fn read(&self, asset: &str) -> Result<Vec<u8>> {
        self.assets
            .get(asset)
            .cloned()
            .ok_or_else(|| PhotoOpsError::model_not_found(format!("Asset '{asset}' not found")))
    }

    fn describe(&self) -> String {
        format!("memory ({} assets)", self.assets.len())
    }
}

/// Last recorded lifecycle outcome for a model name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum ModelStatus {
    Loaded,
    Missing,
    Failed(String),
    Released,
}

/// Per-model outcome of [`ModelRegistry::load_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoadReport {
    pub outcomes: Vec<(String, ModelStatus)>,
}

impl ModelLoadReport {
    #[must_use]
    pub fn all_loaded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, status)| *status == ModelStatus::Loaded)
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<&ModelStatus> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, status)| status)
    }

    /// Names whose load did not succeed
    #[must_use]
    pub fn failures(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, status)| *status != ModelStatus::Loaded)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// A loaded model. Invocations on one handle are serialized.
pub struct ModelHandle {
    name: String,
    descriptor: ModelDescriptor,
    backend: &'static str,
    session: Mutex<Option<Box<dyn InferenceSession>>>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn input_shape(&self) -> &[usize] {
        &self.descriptor.input.shape
    }

    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        &self.descriptor.output.shape
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Run one inference, waiting for any in-flight call on this handle
    ///
    /// # Errors
    /// - `ModelNotFound` once the handle has been released
    /// - Interpreter failures
    pub fn run(&self, input: &Tensor) -> Result<Tensor> {
        let mut guard = lock(&self.session, "model session")?;
        let session = guard.as_mut().ok_or_else(|| {
            PhotoOpsError::model_not_found(format!("Model '{}' has been released", self.name))
        })?;
        session.run(input)
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.session.lock().map_or(true, |guard| guard.is_none())
    }

    /// Drop the interpreter after in-flight inference finishes
    fn shutdown(&self) -> Result<()> {
        let mut guard = lock(&self.session, "model session")?;
        guard.take();
        Ok(())
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| PhotoOpsError::internal(format!("{what} lock poisoned")))
}

/// Lazily loads and caches model handles by name
pub struct ModelRegistry {
    descriptors: HashMap<String, ModelDescriptor>,
    assets: Box<dyn AssetSource>,
    loader: Arc<dyn ModelLoader>,
    handles: RwLock<HashMap<String, Arc<ModelHandle>>>,
    lifecycle: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    statuses: Mutex<HashMap<String, ModelStatus>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("assets", &self.assets.describe())
            .field("backend", &self.loader.backend_name())
            .field("loaded", &self.loaded_models())
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    pub fn new(
        descriptors: Vec<ModelDescriptor>,
        assets: Box<dyn AssetSource>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            assets,
            loader,
            handles: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over the configured asset directory and model declarations
    #[must_use]
    pub fn from_config(config: &EditorConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self::new(
            config.models.clone(),
            Box::new(BundledAssets::new(&config.assets_dir)),
            loader,
        )
    }

    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ModelDescriptor> {
        self.descriptors.get(name)
    }

    /// Declared model names, sorted
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cached handle, or load it now
    ///
    /// # Errors
    /// - `ModelNotFound` for an undeclared name or a missing asset
    /// - `ModelLoadFailed` when the interpreter rejects the asset
    pub fn load(&self, name: &str) -> Result<Arc<ModelHandle>> {
        if let Some(handle) = self.get(name) {
            return Ok(handle);
        }

        let descriptor = self.descriptors.get(name).ok_or_else(|| {
            PhotoOpsError::model_not_found(format!("No model declared with name '{name}'"))
        })?;

        let gate = self.lifecycle_gate(name)?;
        let _guard = lock(&gate, "model lifecycle")?;

        // Another caller may have finished loading while we waited
        if let Some(handle) = self.get(name) {
            return Ok(handle);
        }

        let load_start = Instant::now();
        log::info!(
            "📦 Loading model '{}' from {} ({} backend)",
            name,
            self.assets.describe(),
            self.loader.backend_name()
        );

        let bytes = match self.assets.read(&descriptor.asset) {
            Ok(bytes) => bytes,
            Err(e) => {
                let status = if matches!(e, PhotoOpsError::ModelNotFound(_)) {
                    ModelStatus::Missing
                } else {
                    ModelStatus::Failed(e.message())
                };
                log::warn!("⚠️ Model '{}' unavailable: {}", name, e);
                self.record_status(name, status)?;
                return Err(e);
            },
        };

        let session = match self.loader.load(descriptor, &bytes) {
            Ok(session) => session,
            Err(e) => {
                let e = match e {
                    PhotoOpsError::ModelLoadFailed(_) => e,
                    other => PhotoOpsError::model_load_failed(format!(
                        "Model '{}': {}",
                        name,
                        other.message()
                    )),
                };
                log::error!("❌ {}", e);
                self.record_status(name, ModelStatus::Failed(e.message()))?;
                return Err(e);
            },
        };

        let handle = Arc::new(ModelHandle {
            name: name.to_string(),
            descriptor: descriptor.clone(),
            backend: session.backend_name(),
            session: Mutex::new(Some(session)),
        });

        self.handles
            .write()
            .map_err(|_| PhotoOpsError::internal("model registry lock poisoned"))?
            .insert(name.to_string(), Arc::clone(&handle));
        self.record_status(name, ModelStatus::Loaded)?;

        log::info!(
            "✅ Model '{}' loaded in {}ms ({} bytes)",
            name,
            load_start.elapsed().as_millis(),
            bytes.len()
        );
        Ok(handle)
    }

    /// Cached handle without loading
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModelHandle>> {
        self.handles
            .read()
            .ok()
            .and_then(|handles| handles.get(name).cloned())
    }

    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of currently loaded models, sorted
    #[must_use]
    pub fn loaded_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handles
            .read()
            .map(|handles| handles.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<ModelStatus> {
        self.statuses
            .lock()
            .ok()
            .and_then(|statuses| statuses.get(name).cloned())
    }

    /// Attempt every load, recording each outcome; never fails as a whole
    pub fn load_all<S: AsRef<str>>(&self, names: &[S]) -> ModelLoadReport {
        let outcomes = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let status = match self.load(name) {
                    Ok(_) => ModelStatus::Loaded,
                    Err(PhotoOpsError::ModelNotFound(_)) => ModelStatus::Missing,
                    Err(e) => ModelStatus::Failed(e.message()),
                };
                (name.to_string(), status)
            })
            .collect();
        let report = ModelLoadReport { outcomes };
        if report.all_loaded() {
            log::info!("✅ All {} models loaded", report.outcomes.len());
        } else {
            log::warn!(
                "⚠️ Models unavailable after initialization: {}",
                report.failures().join(", ")
            );
        }
        report
    }

    /// Run inference on a loaded model
    ///
    /// # Errors
    /// - `ModelNotFound` when the model is not loaded
    /// - Interpreter failures
    pub fn infer(&self, name: &str, input: &Tensor) -> Result<Tensor> {
        let handle = self.get(name).ok_or_else(|| {
            PhotoOpsError::model_not_found(format!("Model '{name}' is not loaded"))
        })?;
        handle.run(input)
    }

    /// Evict and destroy a model's interpreter
    ///
    /// Waits for in-flight inference on that model. Returns whether a model
    /// was actually loaded.
    ///
    /// # Errors
    /// - Poisoned registry locks
    pub fn release(&self, name: &str) -> Result<bool> {
        let gate = self.lifecycle_gate(name)?;
        let _guard = lock(&gate, "model lifecycle")?;

        let removed = self
            .handles
            .write()
            .map_err(|_| PhotoOpsError::internal("model registry lock poisoned"))?
            .remove(name);

        match removed {
            Some(handle) => {
                handle.shutdown()?;
                self.record_status(name, ModelStatus::Released)?;
                log::info!("🗑️ Released model '{}'", name);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Release every loaded model
    ///
    /// # Errors
    /// - Poisoned registry locks
    pub fn release_all(&self) -> Result<()> {
        for name in self.loaded_models() {
            self.release(&name)?;
        }
        Ok(())
    }

    fn lifecycle_gate(&self, name: &str) -> Result<Arc<Mutex<()>>> {
        let mut gates = lock(&self.lifecycle, "model lifecycle table")?;
        Ok(Arc::clone(gates.entry(name.to_string()).or_default()))
    }

    fn record_status(&self, name: &str, status: ModelStatus) -> Result<()> {
        lock(&self.statuses, "model status table")?.insert(name.to_string(), status);
        Ok(())
    }
}
