//! Model listing
//!
//! Prints the static catalog together with the provider id each entry is
//! sent as.

use crate::api::models::{resolve_upstream_model, MODEL_CATALOG};

pub fn list_models(current: &str) {
    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    for line in catalog_lines(current) {
        println!("{line}");
    }
    println!();
    println!("💡 Select one with 'concierge -m <id>' or 'concierge set default-model <id>'");
}

fn catalog_lines(current: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for model in MODEL_CATALOG {
        let marker = if model.id == current { "*" } else { " " };
        lines.push(format!("{marker} {} [{}]", model.id, model.capability));
        lines.push(format!("    {}: {}", model.name, model.description));
        if let Ok(upstream) = resolve_upstream_model(model.id) {
            lines.push(format!("    upstream: {upstream}"));
        }
    }
    lines
}
