//! Tract backend implementation
//!
//! Tract is a pure Rust neural network inference library, so this backend
//! runs anywhere the crate compiles without native runtime libraries.

use crate::error::{PhotoOpsError, Result};
use crate::inference::{InferenceSession, ModelLoader};
use crate::models::ModelDescriptor;
use crate::types::{DataType, Tensor, TensorData};
use log;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Builds [`TractSession`]s from ONNX model bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct TractLoader;

impl TractLoader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for TractLoader {
    fn load(&self, descriptor: &ModelDescriptor, bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        let load_start = Instant::now();
        log::debug!(
            "Creating Tract model '{}' from {} bytes of ONNX data",
            descriptor.name,
            bytes.len()
        );

        let shape = descriptor.input.batch_one_shape()?;
        let input_fact: InferenceFact = match descriptor.input.dtype {
            DataType::Float32 => f32::fact(shape).into(),
            DataType::Uint8 => u8::fact(shape).into(),
        };

        let to_load_error = |stage: &str, e: &dyn std::fmt::Display| {
            PhotoOpsError::model_error_with_context(
                stage,
                &descriptor.name,
                &e.to_string(),
                &["check that the asset is a valid ONNX graph", "verify the declared input shape"],
            )
        };

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .map_err(|e| to_load_error("parse", &e))?
            .with_input_fact(0, input_fact)
            .map_err(|e| to_load_error("declare input of", &e))?
            .into_optimized()
            .map_err(|e| to_load_error("optimize", &e))?
            .into_runnable()
            .map_err(|e| to_load_error("prepare", &e))?;

        log::info!(
            "✅ Tract model '{}' ready in {}ms",
            descriptor.name,
            load_start.elapsed().as_millis()
        );

        Ok(Box::new(TractSession {
            name: descriptor.name.clone(),
            model,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "tract"
    }
}

/// A runnable tract plan for one model
pub struct TractSession {
    name: String,
    model: TractModel,
}

impl std::fmt::Debug for TractSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractSession")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl InferenceSession for TractSession {
    fn run(&mut self, input: &Tensor) -> Result<Tensor> {
        log::debug!("🔮 Running Tract inference for '{}'", self.name);
        log::debug!("  - Input tensor: {:?}", input.shape());

        let inference_start = Instant::now();

        let input_tensor: tract_onnx::prelude::Tensor = match input.data() {
            TensorData::Float32(array) => array.clone().into(),
            TensorData::Uint8(array) => array.clone().into(),
        };

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| PhotoOpsError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PhotoOpsError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output = if output_tensor.datum_type() == u8::datum_type() {
            let view = output_tensor.to_array_view::<u8>().map_err(|e| {
                PhotoOpsError::inference(format!("Failed to convert output tensor: {e}"))
            })?;
            Tensor::from_array_u8(view.to_owned())
        } else {
            let view = output_tensor.to_array_view::<f32>().map_err(|e| {
                PhotoOpsError::inference(format!("Failed to convert output tensor: {e}"))
            })?;
            Tensor::from_array_f32(view.to_owned())
        };

        log::debug!(
            "✅ Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );
        log::debug!("  - Output tensor: {:?}", output.shape());

        Ok(output)
    }

    fn backend_name(&self) -> &'static str {
        "tract"
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;
    use crate::models::ModelKind;

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        let loader = TractLoader::new();
        let descriptor = ModelKind::Segmentation.default_descriptor();
        let err = loader
            .load(&descriptor, b"definitely not a protobuf")
            .err()
            .unwrap();
        assert_eq!(err.code(), "MODEL_LOAD_FAILED");
        assert!(err.to_string().contains("segmentation"));
    }

    #[test]
    fn test_loader_name() {
        assert_eq!(TractLoader::new().backend_name(), "tract");
    }
}
