use std::time::Duration;

use crate::api::models::DEFAULT_MODEL;
use crate::core::adapter::ModelResolution;
use crate::core::attachment::{AttachmentLimits, DEFAULT_MAX_UPLOAD_MB};
use crate::core::config::data::Config;
use crate::core::config::io::ConfigError;
use crate::core::decoder::{DEFAULT_ENVELOPE_TIMEOUT, MAX_ENVELOPE_TIMEOUT};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://bedrock-runtime.us-east-1.amazonaws.com";
pub const DEFAULT_API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful customer support assistant. Answer concisely and accurately.";

/// Keys accepted by `concierge set` / `unset`.
pub const CONFIG_KEYS: &[&str] = &[
    "backend-url",
    "default-model",
    "knowledge-base-id",
    "max-upload-mb",
    "envelope-timeout-secs",
    "markdown",
    "syntax",
    "strict-models",
    "system-prompt",
    "upstream-base-url",
    "upstream-api-key-env",
];

impl Config {
    pub fn backend_url(&self) -> &str {
        self.backend_url.as_deref().unwrap_or(DEFAULT_BACKEND_URL)
    }

    pub fn default_model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn knowledge_base_id(&self) -> &str {
        self.knowledge_base_id.as_deref().unwrap_or_default()
    }

    pub fn attachment_limits(&self) -> AttachmentLimits {
        AttachmentLimits::with_max_file_size_mb(self.max_upload_mb.unwrap_or(DEFAULT_MAX_UPLOAD_MB))
    }

    pub fn envelope_timeout(&self) -> Duration {
        self.envelope_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ENVELOPE_TIMEOUT)
            .min(MAX_ENVELOPE_TIMEOUT)
    }

    pub fn markdown_enabled(&self) -> bool {
        self.markdown.unwrap_or(true)
    }

    pub fn syntax_enabled(&self) -> bool {
        self.syntax.unwrap_or(true)
    }

    pub fn model_resolution(&self) -> ModelResolution {
        if self.strict_models.unwrap_or(false) {
            ModelResolution::Strict
        } else {
            ModelResolution::Lenient
        }
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn upstream_base_url(&self) -> &str {
        self.upstream
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_UPSTREAM_BASE_URL)
    }

    pub fn upstream_api_key_env(&self) -> &str {
        self.upstream
            .api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_API_KEY_ENV)
    }

    /// Bearer token for the upstream API, read from the configured variable.
    pub fn upstream_api_key(&self) -> Option<String> {
        std::env::var(self.upstream_api_key_env())
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let text = || Some(value.to_string());
        match key {
            "backend-url" => self.backend_url = text(),
            "default-model" => self.default_model = text(),
            "knowledge-base-id" => self.knowledge_base_id = text(),
            "max-upload-mb" => self.max_upload_mb = Some(parse_number(key, value)?),
            "envelope-timeout-secs" => {
                let secs = parse_number(key, value)?;
                if secs > MAX_ENVELOPE_TIMEOUT.as_secs() {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        expected: "at most 86400 seconds",
                    });
                }
                self.envelope_timeout_secs = Some(secs)
            }
            "markdown" => self.markdown = Some(parse_switch(key, value)?),
            "syntax" => self.syntax = Some(parse_switch(key, value)?),
            "strict-models" => self.strict_models = Some(parse_switch(key, value)?),
            "system-prompt" => self.system_prompt = text(),
            "upstream-base-url" => self.upstream.base_url = text(),
            "upstream-api-key-env" => self.upstream.api_key_env = text(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "backend-url" => self.backend_url = None,
            "default-model" => self.default_model = None,
            "knowledge-base-id" => self.knowledge_base_id = None,
            "max-upload-mb" => self.max_upload_mb = None,
            "envelope-timeout-secs" => self.envelope_timeout_secs = None,
            "markdown" => self.markdown = None,
            "syntax" => self.syntax = None,
            "strict-models" => self.strict_models = None,
            "system-prompt" => self.system_prompt = None,
            "upstream-base-url" => self.upstream.base_url = None,
            "upstream-api-key-env" => self.upstream.api_key_env = None,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a positive whole number",
        }),
    }
}

fn parse_switch(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "on or off",
        }),
    }
}
