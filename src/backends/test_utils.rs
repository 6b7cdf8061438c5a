//! Test utilities and mock backends for testing inference functionality
//!
//! Mock implementations of [`ModelLoader`] and [`InferenceSession`] so the
//! registry and dispatcher can be exercised without model files or a real
//! interpreter.

use crate::{
    error::{PhotoOpsError, Result},
    inference::{InferenceSession, ModelLoader},
    models::{ModelDescriptor, TensorSpec},
    types::Tensor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a mock session returns from `run`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockSessionBehavior {
    /// Echo the input tensor
    Identity,
    /// Output shaped like the descriptor's output spec, every value set
    Constant(f32),
    /// Always fail with an inference error
    Fail,
    /// Sleep, then behave like `Constant`
    Slow(Duration, f32),
}

/// Mock loader that counts how often it builds a session
#[derive(Debug, Clone)]
pub struct MockModelLoader {
    behavior: MockSessionBehavior,
    fail_load: bool,
    loads: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
}

impl MockModelLoader {
    #[must_use]
    pub fn new(behavior: MockSessionBehavior) -> Self {
        Self {
            behavior,
            fail_load: false,
            loads: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Loader whose every `load` fails with `MODEL_LOAD_FAILED`
    #[must_use]
    pub fn failing() -> Self {
        let mut loader = Self::new(MockSessionBehavior::Identity);
        loader.fail_load = true;
        loader
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockModelLoader {
    fn load(&self, descriptor: &ModelDescriptor, _bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(PhotoOpsError::model_load_failed(format!(
                "Mock loader rejected '{}'",
                descriptor.name
            )));
        }
        Ok(Box::new(MockSession {
            behavior: self.behavior,
            output: descriptor.output.clone(),
            runs: Arc::clone(&self.runs),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Session created by [`MockModelLoader`]
#[derive(Debug)]
pub struct MockSession {
    behavior: MockSessionBehavior,
    output: TensorSpec,
    runs: Arc<AtomicUsize>,
}

impl MockSession {
    fn constant_output(&self, value: f32) -> Result<Tensor> {
        let shape = self.output.batch_one_shape()?;
        let len = shape.iter().product();
        Tensor::from_f32(&shape, vec![value; len])
    }
}

impl InferenceSession for MockSession {
    fn run(&mut self, input: &Tensor) -> Result<Tensor> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockSessionBehavior::Identity => Ok(input.clone()),
            MockSessionBehavior::Constant(value) => self.constant_output(value),
            MockSessionBehavior::Fail => Err(PhotoOpsError::inference("Mock inference failed")),
            MockSessionBehavior::Slow(delay, value) => {
                std::thread::sleep(delay);
                self.constant_output(value)
            },
        }
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;

    #[test]
    fn test_constant_output_follows_descriptor() {
        let loader = MockModelLoader::new(MockSessionBehavior::Constant(0.25));
        let descriptor = ModelKind::Segmentation.default_descriptor();
        let mut session = loader.load(&descriptor, &[]).unwrap();
        let input = Tensor::from_f32(&[1, 3, 320, 320], vec![0.0; 3 * 320 * 320]).unwrap();
        let output = session.run(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 320, 320]);
        assert_eq!(loader.run_count(), 1);
    }

    #[test]
    fn test_failing_session() {
        let loader = MockModelLoader::new(MockSessionBehavior::Fail);
        let descriptor = ModelKind::Inpainting.default_descriptor();
        let mut session = loader.load(&descriptor, &[]).unwrap();
        let input = Tensor::from_f32(&[1], vec![0.0]).unwrap();
        assert_eq!(session.run(&input).unwrap_err().code(), "INFERENCE_FAILED");
    }
}
