//! Backend implementations for different inference engines
//!
//! - Tract backend (pure Rust, no external dependencies)
//! - ONNX Runtime backend (native runtime, feature `onnx`)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxLoader, OnnxSession};

#[cfg(feature = "tract")]
pub use self::tract::{TractLoader, TractSession};
