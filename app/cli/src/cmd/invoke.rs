//! `loradeploy invoke`.

use anyhow::Result;
use endpoint::{
    Driver, EndpointHandle, InvocationRequest, ManagedService, Parameters, generated_text,
};

/// Build the request body for one prompt.
pub fn request(
    text: &str,
    adapter: Option<&str>,
    max_new_tokens: Option<u32>,
) -> InvocationRequest {
    let mut request = InvocationRequest::new(text);
    if let Some(adapter) = adapter {
        request = request.with_adapter(adapter);
    }
    if max_new_tokens.is_some() {
        request = request.with_parameters(Parameters {
            max_new_tokens,
            ..Default::default()
        });
    }
    request
}

/// Send one prompt to `endpoint` and return the generated text.
///
/// Falls back to the raw body when the response has no `generated_text`.
pub async fn run<S: ManagedService>(
    driver: &Driver<S>,
    endpoint: &str,
    adapter: Option<&str>,
    max_new_tokens: Option<u32>,
    text: &str,
) -> Result<String> {
    let handle = EndpointHandle::new(endpoint);
    let body = driver
        .invoke(&handle, &request(text, adapter, max_new_tokens))
        .await?;
    Ok(generated_text(&body).unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned()))
}
