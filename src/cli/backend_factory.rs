//! Backend factory for the CLI: maps `--backend` onto a compiled-in model loader

use crate::inference::ModelLoader;
use anyhow::Result;
use clap::ValueEnum;
use std::sync::Arc;

/// Interpreter selectable from the command line
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    /// Pure-Rust Tract interpreter
    Tract,
    /// ONNX Runtime
    Onnx,
}

/// CLI backend factory that provides access to the compiled-in loaders
#[derive(Debug)]
pub(crate) struct CliBackendFactory;

impl CliBackendFactory {
    /// Create the loader for `backend`; `threads == 0` lets the runtime decide
    pub(crate) fn create_loader(backend: CliBackend, threads: usize) -> Result<Arc<dyn ModelLoader>> {
        match backend {
            CliBackend::Tract => Self::tract(threads),
            CliBackend::Onnx => Self::onnx(threads),
        }
    }

    /// Backends compiled into this binary
    pub(crate) fn available_backends() -> Vec<CliBackend> {
        let mut backends = Vec::new();
        if cfg!(feature = "tract") {
            backends.push(CliBackend::Tract);
        }
        if cfg!(feature = "onnx") {
            backends.push(CliBackend::Onnx);
        }
        backends
    }

    #[cfg(feature = "tract")]
    fn tract(threads: usize) -> Result<Arc<dyn ModelLoader>> {
        if threads > 0 {
            log::debug!("Tract runs single-threaded; ignoring --threads {}", threads);
        }
        Ok(Arc::new(crate::backends::TractLoader::new()))
    }

    #[cfg(not(feature = "tract"))]
    fn tract(_threads: usize) -> Result<Arc<dyn ModelLoader>> {
        anyhow::bail!("Tract backend not compiled in; rebuild with --features tract")
    }

    #[cfg(feature = "onnx")]
    fn onnx(threads: usize) -> Result<Arc<dyn ModelLoader>> {
        Ok(Arc::new(
            crate::backends::OnnxLoader::new().with_intra_threads(threads),
        ))
    }

    #[cfg(not(feature = "onnx"))]
    fn onnx(_threads: usize) -> Result<Arc<dyn ModelLoader>> {
        anyhow::bail!("ONNX backend not compiled in; rebuild with --features onnx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_backends_match_features() {
        let backends = CliBackendFactory::available_backends();
        assert_eq!(backends.contains(&CliBackend::Tract), cfg!(feature = "tract"));
        assert_eq!(backends.contains(&CliBackend::Onnx), cfg!(feature = "onnx"));
    }

    #[test]
    fn test_create_loader_respects_features() {
        for backend in [CliBackend::Tract, CliBackend::Onnx] {
            let created = CliBackendFactory::create_loader(backend, 0);
            let compiled = CliBackendFactory::available_backends().contains(&backend);
            assert_eq!(created.is_ok(), compiled, "{backend:?}");
        }
    }

    #[cfg(feature = "tract")]
    #[test]
    fn test_tract_loader_name() {
        let loader = CliBackendFactory::create_loader(CliBackend::Tract, 0).unwrap();
        assert_eq!(loader.backend_name(), "tract");
    }
}
