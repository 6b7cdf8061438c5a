//! Inference backend abstraction
//!
//! A [`ModelLoader`] turns the raw bytes of a bundled model asset into a
//! runnable [`InferenceSession`]. Backends (tract, ONNX Runtime, test mocks)
//! implement both traits; the registry and the dispatcher only ever see the
//! trait objects.

use crate::{error::Result, models::ModelDescriptor, types::Tensor};

/// A loaded model that maps one input tensor to one output tensor
pub trait InferenceSession: Send {
    /// Run inference on the input tensor
    ///
    /// The caller guarantees `input` matches the descriptor's input spec.
    ///
    /// # Errors
    /// - Interpreter invocation failures
    /// - Output tensor conversion errors
    fn run(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Short backend identifier used in logs
    fn backend_name(&self) -> &'static str;
}

/// Factory for inference sessions
pub trait ModelLoader: Send + Sync {
    /// Build a session from model bytes
    ///
    /// # Errors
    /// - Malformed model data or a graph the interpreter cannot run
    fn load(&self, descriptor: &ModelDescriptor, bytes: &[u8]) -> Result<Box<dyn InferenceSession>>;

    /// Short backend identifier used in logs
    fn backend_name(&self) -> &'static str;
}
