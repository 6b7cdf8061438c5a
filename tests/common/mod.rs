//! Shared helpers for integration tests
//!
//! Model assets are fake byte blobs; [`ScriptedLoader`] implements the public
//! [`ModelLoader`] trait so no interpreter is involved.

#![allow(dead_code)]

use photo_ops::{
    BundledAssets, Color, EditorConfig, FallbackPolicy, ImageBuffer, ImageIOService,
    InferenceSession, ModelDescriptor, ModelKind, ModelLoader, ModelRegistry,
    OperationDispatcher, PhotoOpsError, Result, Tensor,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// What every session built by [`ScriptedLoader`] returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Script {
    /// Echo the input
    Echo,
    /// Output of the declared output shape, every element set to the value
    Fill(f32),
    /// Fail every `run`
    Broken,
}

#[derive(Debug, Clone)]
pub struct ScriptedLoader {
    script: Script,
    loads: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

struct ScriptedSession {
    script: Script,
    output_shape: Vec<usize>,
}

impl InferenceSession for ScriptedSession {
    fn run(&mut self, input: &Tensor) -> Result<Tensor> {
        match self.script {
            Script::Echo => Ok(input.clone()),
            Script::Fill(value) => {
                let len = self.output_shape.iter().product();
                Tensor::from_f32(&self.output_shape, vec![value; len])
            },
            Script::Broken => Err(PhotoOpsError::inference("scripted failure")),
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, descriptor: &ModelDescriptor, bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if bytes.starts_with(b"corrupt") {
            return Err(PhotoOpsError::model_load_failed(format!(
                "'{}' is not a model",
                descriptor.name
            )));
        }
        Ok(Box::new(ScriptedSession {
            script: self.script,
            output_shape: descriptor.output.shape.clone(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Temp workspace with an assets directory, an output directory, and inputs
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        Self { dir }
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Place a fake asset for `kind`
    pub fn install_model(&self, kind: ModelKind) -> &Self {
        let asset = kind.default_descriptor().asset;
        std::fs::write(self.assets_dir().join(asset), b"weights").unwrap();
        self
    }

    pub fn install_corrupt_model(&self, kind: ModelKind) -> &Self {
        let asset = kind.default_descriptor().asset;
        std::fs::write(self.assets_dir().join(asset), b"corrupt").unwrap();
        self
    }

    /// Write `image` as PNG and return its path as a string
    pub fn write_input(&self, name: &str, image: &ImageBuffer) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, ImageIOService::encode_png(image).unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    pub fn config(&self, policy: FallbackPolicy) -> EditorConfig {
        EditorConfig::builder()
            .assets_dir(self.assets_dir())
            .output_dir(self.output_dir())
            .fallback_policy(policy)
            .build()
            .unwrap()
    }

    pub fn dispatcher(&self, loader: &ScriptedLoader, policy: FallbackPolicy) -> OperationDispatcher {
        let config = self.config(policy);
        let registry = Arc::new(ModelRegistry::new(
            config.models.clone(),
            Box::new(BundledAssets::new(self.assets_dir())),
            Arc::new(loader.clone()),
        ));
        OperationDispatcher::new(config, registry).unwrap()
    }

    pub fn output_files(&self) -> Vec<PathBuf> {
        list_files(&self.output_dir())
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries.map(|e| e.unwrap().path()).collect();
    files.sort();
    files
}

/// Gradient test image with an opaque alpha channel
pub fn gradient(width: u32, height: u32) -> ImageBuffer {
    ImageBuffer::from_rgba(image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
            255,
        ])
    }))
}

pub fn solid(width: u32, height: u32, color: Color) -> ImageBuffer {
    ImageBuffer::from_pixel(width, height, color)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
