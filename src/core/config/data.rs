use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where `concierge invoke` sends requests when it talks to the hosted
/// inference API directly.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: Option<String>,
    /// Name of the environment variable holding the bearer token
    pub api_key_env: Option<String>,
}

impl UpstreamConfig {
    fn is_empty(&self) -> bool {
        self.base_url.is_none() && self.api_key_env.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the chat backend (the client posts to `<base>/api/chat`)
    pub backend_url: Option<String>,
    pub default_model: Option<String>,
    pub knowledge_base_id: Option<String>,
    /// Largest image attachment accepted, in megabytes
    pub max_upload_mb: Option<u64>,
    /// Seconds to wait for an answer before the turn is shown as failed
    pub envelope_timeout_secs: Option<u64>,
    /// Enable markdown rendering of answers
    pub markdown: Option<bool>,
    /// Enable syntax highlighting for fenced code blocks when markdown is enabled
    pub syntax: Option<bool>,
    /// Refuse unknown model ids instead of falling back to the default upstream model
    pub strict_models: Option<bool>,
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "UpstreamConfig::is_empty")]
    pub upstream: UpstreamConfig,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
