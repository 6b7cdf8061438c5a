#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Photo Operations Library
//!
//! Semantic photo edits (background removal, color and style filters, object
//! insertion and removal) built from a small set of composable stages:
//!
//! - **`ModelRegistry`**: lazily loads named models from bundled assets and
//!   hands out shared, thread-safe handles
//! - **`TensorCodec`**: image ↔ tensor conversion per a model's declared
//!   shape, layout, channel order, and normalization
//! - **`Compositor`**: mask blending, region and marker painting, patch pasting
//! - **`ResultStore`**: atomic, lossless PNG persistence
//! - **`OperationDispatcher`**: one pipeline per request, from source path to
//!   persisted output path
//!
//! The interpreter is pluggable through [`ModelLoader`]: Tract (pure Rust,
//! default) or ONNX Runtime (feature `onnx`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_ops::{create_dispatcher, EditorConfig, OperationRequest, Operation};
//!
//! # fn example() -> photo_ops::Result<()> {
//! let config = EditorConfig::builder()
//!     .assets_dir("assets")
//!     .output_dir("/tmp/processed")
//!     .build()?;
//! let dispatcher = create_dispatcher(config)?;
//!
//! let request = OperationRequest::new(Operation::ApplyFilter)
//!     .with_image("photo.jpg")
//!     .with_param("filterType", "grayscale");
//! let response = dispatcher.dispatch(&request)?;
//! if let Some(result) = response.result() {
//!     println!("saved to {}", result.output_path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust interpreter
//! - `onnx`: ONNX Runtime interpreter
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod channel;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filters;
pub mod inference;
pub mod models;
pub mod registry;
pub mod services;
pub mod store;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use std::sync::Arc;

// Public API exports
pub use backends::*;
pub use channel::{MethodCall, MethodHandler, MethodResponse, OperationChannel};
pub use codec::TensorCodec;
pub use compositor::{Compositor, GeometryOutcome, Painted};
pub use config::{EditorConfig, EditorConfigBuilder, FallbackPolicy, OutputNaming};
pub use dispatcher::{
    CoordinateSource, FixedCoordinates, OperationDispatcher, OperationRequest, OperationResponse,
    RandomCoordinates,
};
pub use error::{PhotoOpsError, Result};
pub use filters::{ColorMatrix, FilterKind};
pub use inference::{InferenceSession, ModelLoader};
pub use models::{ModelDescriptor, ModelKind, Normalization, TensorSpec};
pub use registry::{
    AssetSource, BundledAssets, MemoryAssets, ModelHandle, ModelLoadReport, ModelRegistry,
    ModelStatus,
};
pub use services::ImageIOService;
pub use store::ResultStore;
pub use types::{
    Color, ImageBuffer, Mask, Operation, OperationMetadata, OperationResult, Point, Rect, Tensor,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Loader for the preferred interpreter compiled into this build
///
/// Tract is preferred when both backends are enabled.
///
/// # Errors
/// - `InvalidConfig` when the crate was built without any backend feature
pub fn default_loader() -> Result<Arc<dyn ModelLoader>> {
    #[cfg(feature = "tract")]
    {
        Ok(Arc::new(backends::TractLoader::new()))
    }
    #[cfg(all(not(feature = "tract"), feature = "onnx"))]
    {
        Ok(Arc::new(backends::OnnxLoader::new()))
    }
    #[cfg(not(any(feature = "tract", feature = "onnx")))]
    {
        Err(PhotoOpsError::invalid_config(
            "No inference backend compiled in; enable the `tract` or `onnx` feature",
        ))
    }
}

/// Dispatcher over bundled assets in `config.assets_dir` and the default loader
///
/// Models are not loaded here; they load on first use or through
/// `initializeModels`.
pub fn create_dispatcher(config: EditorConfig) -> Result<OperationDispatcher> {
    let registry = Arc::new(ModelRegistry::from_config(&config, default_loader()?));
    OperationDispatcher::new(config, registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_loader_matches_features() {
        let loader = default_loader();
        if cfg!(feature = "tract") {
            assert_eq!(loader.unwrap().backend_name(), "tract");
        } else if cfg!(feature = "onnx") {
            assert_eq!(loader.unwrap().backend_name(), "onnx");
        } else {
            assert_eq!(loader.err().unwrap().code(), "INVALID_CONFIG");
        }
    }

    #[cfg(any(feature = "tract", feature = "onnx"))]
    #[test]
    fn test_create_dispatcher_loads_nothing_eagerly() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EditorConfig::builder()
            .assets_dir(dir.path().join("assets"))
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let dispatcher = create_dispatcher(config).unwrap();
        assert!(dispatcher.registry().loaded_models().is_empty());
    }
}
