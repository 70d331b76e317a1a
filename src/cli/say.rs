//! REPL-less "say" command

use std::error::Error;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use crate::cli::view_options;
use crate::core::attachment::prepare_image;
use crate::core::config::Config;
use crate::core::session::{ChatSession, SessionError};
use crate::ui::view::{render_state, AnswerView, ViewOptions};

use tracing::warn;

pub async fn run_say(
    mut session: ChatSession,
    config: &Config,
    prompt: &str,
    image: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    if prompt.trim().is_empty() && image.is_none() {
        eprintln!("Usage: concierge say <prompt> [--image <path>]");
        std::process::exit(1);
    }

    if let Some(path) = image {
        let prepared = prepare_image(path, &config.attachment_limits())?;
        let source = prepared
            .to_image_source()
            .ok_or("Error processing image")?;
        session.attach_image(source);
    }

    let view = view_options(config, std::io::stdout().is_terminal());
    let answer = say_once(&mut session, prompt, config.envelope_timeout(), view).await?;
    for line in &answer.lines {
        println!("{line}");
    }
    Ok(())
}

/// Run a single turn and render its settled state. A timed out turn renders
/// as the error line; the process exits before any late answer lands.
pub async fn say_once(
    session: &mut ChatSession,
    prompt: &str,
    timeout: Duration,
    view: ViewOptions,
) -> Result<AnswerView, SessionError> {
    let pending = session.begin_turn(prompt)?;
    let report = session.await_turn(pending, timeout).await;
    if let Some(err) = report.error {
        return Err(err);
    }
    if report.timed_out {
        warn!(placeholder = %report.placeholder_id, ?timeout, "no answer before the timeout");
    }
    Ok(render_state(&report.state, view))
}
