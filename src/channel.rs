//! Request/response boundary in front of the dispatcher
//!
//! Calls arrive as a method name plus a JSON argument map, the shape a mobile
//! host's method channel delivers. Every call resolves to exactly one
//! [`MethodResponse`]; errors are reported as `(code, message)` pairs and never
//! escape as panics.

use crate::dispatcher::{OperationDispatcher, OperationRequest, OperationResponse};
use crate::error::PhotoOpsError;
use crate::types::Operation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;

/// One incoming call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl MethodCall {
    pub fn new<S: Into<String>>(method: S) -> Self {
        Self {
            method: method.into(),
            arguments: Map::new(),
        }
    }

    #[must_use]
    pub fn with_argument<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum MethodResponse {
    /// Output path for image operations, per-model report for `initializeModels`
    Success(Value),
    Error {
        code: String,
        message: String,
        details: Option<Value>,
    },
    /// The method name is not served by this channel
    NotImplemented,
}

impl MethodResponse {
    pub fn from_error(error: &PhotoOpsError, details: Option<Value>) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.message(),
            details,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Asynchronous method handler
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, call: MethodCall) -> MethodResponse;
}

/// [`MethodHandler`] serving the photo operations
#[derive(Debug, Clone)]
pub struct OperationChannel {
    dispatcher: Arc<OperationDispatcher>,
}

impl OperationChannel {
    pub fn new(dispatcher: Arc<OperationDispatcher>) -> Self {
        Self { dispatcher }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<OperationDispatcher> {
        &self.dispatcher
    }

    /// Translate a call into a dispatcher request
    ///
    /// `Ok(None)` means the method is unknown. Scalar arguments are accepted
    /// as strings, numbers, or booleans; `null` counts as absent.
    fn to_request(call: &MethodCall) -> Result<Option<OperationRequest>, PhotoOpsError> {
        let Ok(operation) = Operation::from_str(&call.method) else {
            return Ok(None);
        };
        let mut request = OperationRequest::new(operation);
        for (key, value) in &call.arguments {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(PhotoOpsError::invalid_argument(format!(
                        "Argument '{key}' must be a scalar value"
                    )))
                },
            };
            if key == crate::dispatcher::params::IMAGE_PATH {
                request.image_path = Some(text);
            } else {
                request.params.insert(key.clone(), text);
            }
        }
        Ok(Some(request))
    }

    fn success_value(response: OperationResponse) -> Result<Value, PhotoOpsError> {
        match response {
            OperationResponse::Processed(result) => {
                Ok(Value::String(result.output_path.to_string_lossy().into_owned()))
            },
            OperationResponse::ModelsInitialized(report) => serde_json::to_value(&report)
                .map_err(|e| PhotoOpsError::internal(format!("Failed to encode model report: {e}"))),
        }
    }
}

#[async_trait]
impl MethodHandler for OperationChannel {
    async fn handle(&self, call: MethodCall) -> MethodResponse {
        let details = Some(serde_json::json!({ "method": call.method }));
        let request = match Self::to_request(&call) {
            Ok(Some(request)) => request,
            Ok(None) => {
                log::warn!("Method '{}' is not implemented", call.method);
                return MethodResponse::NotImplemented;
            },
            Err(e) => return MethodResponse::from_error(&e, details),
        };

        let outcome = Arc::clone(&self.dispatcher)
            .dispatch_async(request)
            .await
            .and_then(Self::success_value);
        match outcome {
            Ok(value) => MethodResponse::Success(value),
            Err(e) => MethodResponse::from_error(&e, details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockModelLoader, MockSessionBehavior};
    use crate::config::EditorConfig;
    use crate::registry::{MemoryAssets, ModelRegistry};
    use crate::services::ImageIOService;
    use crate::types::{Color, ImageBuffer};
    use tempfile::TempDir;

    fn channel(dir: &TempDir) -> OperationChannel {
        let config = EditorConfig::builder()
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let registry = Arc::new(ModelRegistry::new(
            config.models.clone(),
            Box::new(MemoryAssets::new()),
            Arc::new(MockModelLoader::new(MockSessionBehavior::Identity)),
        ));
        OperationChannel::new(Arc::new(OperationDispatcher::new(config, registry).unwrap()))
    }

    fn input(dir: &TempDir) -> String {
        let path = dir.path().join("input.png");
        let image = ImageBuffer::from_pixel(6, 6, Color::rgba(200, 10, 10, 255));
        std::fs::write(&path, ImageIOService::encode_png(&image).unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_implemented() {
        let dir = TempDir::new().unwrap();
        let response = channel(&dir).handle(MethodCall::new("rotateImage")).await;
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[tokio::test]
    async fn test_missing_image_path_is_invalid_argument() {
        let dir = TempDir::new().unwrap();
        let response = channel(&dir)
            .handle(MethodCall::new("applyFilter").with_argument("filterType", "grayscale"))
            .await;
        let MethodResponse::Error { code, message, .. } = response else {
            panic!("expected error, got {response:?}");
        };
        assert_eq!(code, "INVALID_ARGUMENT");
        assert_eq!(message, "Image path is required.");
    }

    #[tokio::test]
    async fn test_numeric_arguments_are_accepted() {
        let dir = TempDir::new().unwrap();
        let call = MethodCall::new("removeObject")
            .with_argument("imagePath", input(&dir))
            .with_argument("x", 1)
            .with_argument("y", 1)
            .with_argument("width", 2)
            .with_argument("height", 2)
            .with_argument("unused", Value::Null);
        let response = channel(&dir).handle(call).await;
        let MethodResponse::Success(Value::String(path)) = response else {
            panic!("expected output path, got {response:?}");
        };
        let output = ImageIOService::load_image(&path).unwrap();
        assert_eq!(output.pixel(1, 1), Some([0, 0, 0, 255]));
        assert_eq!(output.pixel(4, 4), Some([200, 10, 10, 255]));
    }

    #[tokio::test]
    async fn test_structured_argument_rejected() {
        let dir = TempDir::new().unwrap();
        let call = MethodCall::new("addObject")
            .with_argument("imagePath", input(&dir))
            .with_argument("x", serde_json::json!([1, 2]));
        let response = channel(&dir).handle(call).await;
        assert!(matches!(
            response,
            MethodResponse::Error { ref code, .. } if code == "INVALID_ARGUMENT"
        ));
    }

    #[tokio::test]
    async fn test_initialize_models_without_image_path() {
        let dir = TempDir::new().unwrap();
        let response = channel(&dir).handle(MethodCall::new("initializeModels")).await;
        let MethodResponse::Success(report) = response else {
            panic!("expected report, got {response:?}");
        };
        assert_eq!(report["outcomes"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_response_serialization() {
        let json = serde_json::to_value(MethodResponse::Success(Value::from("/tmp/a.png"))).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "body": "/tmp/a.png"}));
        let json = serde_json::to_value(MethodResponse::NotImplemented).unwrap();
        assert_eq!(json, serde_json::json!({"status": "not_implemented"}));
    }
}
