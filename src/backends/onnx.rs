//! ONNX Runtime backend implementation
//!
//! Runs models through the native ONNX Runtime on the CPU execution provider.
//! Sessions are built once per model and reused for every request.

use crate::error::{PhotoOpsError, Result};
use crate::inference::{InferenceSession, ModelLoader};
use crate::models::ModelDescriptor;
use crate::types::{Tensor, TensorData};
use log;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};

/// Builds [`OnnxSession`]s from ONNX model bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader {
    /// Threads within operations; 0 picks from available parallelism
    intra_threads: usize,
}

impl OnnxLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    fn resolved_intra_threads(self) -> usize {
        if self.intra_threads > 0 {
            return self.intra_threads;
        }
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self, descriptor: &ModelDescriptor, bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        let intra_threads = self.resolved_intra_threads();
        let to_load_error = |stage: &str, e: &dyn std::fmt::Display| {
            PhotoOpsError::model_error_with_context(
                stage,
                &descriptor.name,
                &e.to_string(),
                &["check that the asset is a valid ONNX graph"],
            )
        };

        let session = Session::builder()
            .map_err(|e| to_load_error("create session builder for", &e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| to_load_error("set optimization level for", &e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| to_load_error("set intra threads for", &e))?
            .commit_from_memory(bytes)
            .map_err(|e| to_load_error("create session from", &e))?;

        log::info!(
            "✅ ONNX Runtime session for '{}' created ({} intra threads)",
            descriptor.name,
            intra_threads
        );

        Ok(Box::new(OnnxSession {
            name: descriptor.name.clone(),
            session,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "onnx"
    }
}

/// An ONNX Runtime session for one model
#[derive(Debug)]
pub struct OnnxSession {
    name: String,
    session: Session,
}

impl InferenceSession for OnnxSession {
    fn run(&mut self, input: &Tensor) -> Result<Tensor> {
        use std::time::Instant;

        let inference_start = Instant::now();
        log::debug!(
            "🚀 Starting ONNX inference for '{}' with input shape: {:?}",
            self.name,
            input.shape()
        );

        let outputs = match input.data() {
            TensorData::Float32(array) => {
                let value = Value::from_array(array.clone()).map_err(|e| {
                    PhotoOpsError::processing(format!("Failed to convert input tensor: {e}"))
                })?;
                self.session.run(ort::inputs![value])
            },
            TensorData::Uint8(array) => {
                let value = Value::from_array(array.clone()).map_err(|e| {
                    PhotoOpsError::processing(format!("Failed to convert input tensor: {e}"))
                })?;
                self.session.run(ort::inputs![value])
            },
        }
        .map_err(|e| PhotoOpsError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: the first output is the result tensor
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| PhotoOpsError::inference("No output tensors found"))?;
        let value = outputs
            .get(first_key)
            .ok_or_else(|| PhotoOpsError::inference("First output tensor not found"))?;

        let output = if let Ok(array) = value.try_extract_array::<f32>() {
            Tensor::from_array_f32(array.to_owned())
        } else {
            let array = value.try_extract_array::<u8>().map_err(|e| {
                PhotoOpsError::inference(format!("Failed to extract output tensor: {e}"))
            })?;
            Tensor::from_array_u8(array.to_owned())
        };

        log::debug!(
            "📊 Inference complete: {:.2}ms, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );

        Ok(output)
    }

    fn backend_name(&self) -> &'static str {
        "onnx"
    }
}
