//! Inference request and response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON request body accepted by the serving runtime.
///
/// Without `adapters` the request is served by the base model alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub inputs: String,
    /// Name of a packaged adapter. Not checked locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl InvocationRequest {
    pub fn new(inputs: impl Into<String>) -> Self {
        Self {
            inputs: inputs.into(),
            adapters: None,
            parameters: None,
        }
    }

    /// Select an adapter by name.
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapters = Some(adapter.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,
}

/// Extract the generated text from a runtime response body.
///
/// Accepts `{"generated_text": ..}`, a list of such objects (first wins) or a
/// bare JSON string.
pub fn generated_text(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let value = match value {
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    match value {
        Value::Object(mut map) => match map.remove("generated_text")? {
            Value::String(text) => Some(text),
            _ => None,
        },
        Value::String(text) => Some(text),
        _ => None,
    }
}
