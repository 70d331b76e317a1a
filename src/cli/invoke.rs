//! Direct upstream model call, the server side of a chat turn run from the
//! terminal.

use std::error::Error;

use tracing::debug;

use crate::api::ApiMessage;
use crate::core::adapter::{
    AdapterError, HttpInferenceTransport, InferenceTransport, InvokeParams, ModelRequestAdapter,
};
use crate::core::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOptions {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl InvokeOptions {
    pub fn into_params(self, config: &Config) -> InvokeParams {
        InvokeParams {
            model: self.model,
            messages: vec![ApiMessage::new("user", self.prompt)],
            system_prompt: self
                .system
                .unwrap_or_else(|| config.system_prompt().to_string()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

pub async fn run_invoke(config: &Config, options: InvokeOptions) -> Result<(), Box<dyn Error>> {
    if options.prompt.trim().is_empty() {
        eprintln!("Usage: concierge invoke <prompt>");
        std::process::exit(1);
    }
    let token = config.upstream_api_key();
    if token.is_none() {
        debug!(env = config.upstream_api_key_env(), "no upstream token set; sending unauthenticated");
    }
    let transport = HttpInferenceTransport::new(reqwest::Client::new(), config.upstream_base_url(), token);
    let adapter = ModelRequestAdapter::new(transport, config.model_resolution());

    let text = invoke_text(&adapter, options.into_params(config)).await?;
    println!("{text}");
    Ok(())
}

/// Generate and return the concatenated text blocks of the reply.
pub async fn invoke_text<T: InferenceTransport>(
    adapter: &ModelRequestAdapter<T>,
    params: InvokeParams,
) -> Result<String, AdapterError> {
    let outcome = adapter.generate(params).await?;
    let response = outcome.response().map_err(AdapterError::Json)?;
    debug!(
        upstream_model = outcome.upstream_model,
        stop_reason = response.stop_reason.as_deref().unwrap_or("-"),
        "invoke finished"
    );
    Ok(response.text())
}
