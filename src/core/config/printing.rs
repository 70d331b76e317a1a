use crate::core::config::data::Config;

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn or_default<'a>(value: &'a Option<String>, fallback: &'a str) -> String {
    match value {
        Some(value) => value.clone(),
        None => format!("{fallback} (default)"),
    }
}

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  backend-url: {}", or_default(&self.backend_url, self.backend_url()));
        println!("  default-model: {}", or_default(&self.default_model, self.default_model()));
        match self.knowledge_base_id.as_deref() {
            Some(id) if !id.is_empty() => println!("  knowledge-base-id: {id}"),
            _ => println!("  knowledge-base-id: (unset)"),
        }
        println!(
            "  max-upload-mb: {}",
            self.attachment_limits().max_file_size_mb
        );
        println!(
            "  envelope-timeout-secs: {}",
            self.envelope_timeout().as_secs()
        );
        println!("  markdown: {}", on_off(self.markdown_enabled()));
        println!("  syntax: {}", on_off(self.syntax_enabled()));
        println!("  strict-models: {}", on_off(self.strict_models.unwrap_or(false)));
        println!(
            "  upstream-base-url: {}",
            or_default(&self.upstream.base_url, self.upstream_base_url())
        );
        println!(
            "  upstream-api-key-env: {}",
            or_default(&self.upstream.api_key_env, self.upstream_api_key_env())
        );
        match &self.system_prompt {
            Some(_) => println!("  system-prompt: (custom)"),
            None => println!("  system-prompt: (default)"),
        }
    }
}
