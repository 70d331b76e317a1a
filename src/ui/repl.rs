//! Line-oriented interactive chat.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::api::models::{find_model, MODEL_CATALOG};
use crate::core::attachment::{prepare_image, AttachmentLimits};
use crate::core::events::ChatEvent;
use crate::core::session::{ChatSession, SessionError, TurnReport};
use crate::ui::markdown::CodeBlock;
use crate::ui::view::{render_envelope, render_state, render_user, ViewOptions, THINKING_TEXT};
use crate::utils::clipboard::copy_to_clipboard;

const HELP: &str = "\
Commands:
  /image <path>   attach an image to the next message
  /image clear    drop the pending image
  /model [id]     show or change the model
  /models         list known models
  /ask <n>        ask suggested question n
  /copy <n>       copy code block n of the last answer
  /human          request a human agent
  /help           show this help
  /quit           leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Say(String),
    AttachImage(PathBuf),
    ClearImage,
    ShowModel,
    SetModel(String),
    ListModels,
    Ask(usize),
    Copy(usize),
    Human,
    Help,
    Quit,
    Invalid(String),
    Empty,
}

fn parse_index(arg: &str, usage: &str) -> ReplCommand {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => match usage {
            "ask" => ReplCommand::Ask(n),
            _ => ReplCommand::Copy(n),
        },
        _ => ReplCommand::Invalid(format!("Usage: /{usage} <n>")),
    }
}

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Say(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "image" | "img" => match arg {
            "" => ReplCommand::Invalid("Usage: /image <path> | /image clear".to_string()),
            "clear" => ReplCommand::ClearImage,
            path => ReplCommand::AttachImage(PathBuf::from(path)),
        },
        "model" if arg.is_empty() => ReplCommand::ShowModel,
        "model" => ReplCommand::SetModel(arg.to_string()),
        "models" => ReplCommand::ListModels,
        "ask" => parse_index(arg, "ask"),
        "copy" => parse_index(arg, "copy"),
        "human" => ReplCommand::Human,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("Unknown command /{other} (try /help)")),
    }
}

/// One-line note for a sidebar event, or `None` when there is nothing to show.
pub fn describe_event(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::SidebarUpdated {
            content,
            user_mood,
            debug,
            matched_categories,
            ..
        } => {
            let mut parts = Vec::new();
            if let Some(mood) = user_mood {
                parts.push(format!("mood: {mood}"));
            }
            if let Some(debug) = debug {
                if debug.context_used {
                    parts.push("knowledge base used".to_string());
                }
            }
            if let Some(categories) = matched_categories.as_ref().filter(|c| !c.is_empty()) {
                parts.push(format!("categories: {}", categories.join(", ")));
            }
            if let Some(thinking) = content.as_ref().filter(|t| !t.is_empty()) {
                parts.push(format!("thinking: {thinking}"));
            }
            (!parts.is_empty()).then(|| format!("[sidebar] {}", parts.join(" | ")))
        }
        ChatEvent::RagSourcesUpdated { sources, .. } => {
            let count = sources.as_array().map(Vec::len).unwrap_or(1);
            Some(format!("[sources] {count} retrieved"))
        }
        ChatEvent::AgentRedirectRequested(redirect) => {
            Some(format!("[handoff] suggested: {}", redirect.reason))
        }
        ChatEvent::HumanAgentRequested { reason, .. } => {
            Some(format!("[handoff] human agent requested: {reason}"))
        }
    }
}

pub struct ReplSettings {
    pub envelope_timeout: Duration,
    pub attachment_limits: AttachmentLimits,
    pub view: ViewOptions,
}

pub struct Repl {
    session: ChatSession,
    settings: ReplSettings,
    events: broadcast::Receiver<ChatEvent>,
    code_blocks: Vec<CodeBlock>,
}

impl Repl {
    pub fn new(session: ChatSession, settings: ReplSettings) -> Self {
        let events = session.events().subscribe();
        Self {
            session,
            settings,
            events,
            code_blocks: Vec::new(),
        }
    }

    pub async fn run(mut self) -> Result<(), Box<dyn Error>> {
        println!(
            "concierge: chatting via {} with {} (/help for commands)",
            self.session.backend().base_url(),
            self.session.model()
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };
            match parse_command(&line) {
                ReplCommand::Quit => break,
                command => self.execute(command).await,
            }
        }
        Ok(())
    }

    async fn execute(&mut self, command: ReplCommand) {
        self.show_late_turns();
        match command {
            ReplCommand::Empty | ReplCommand::Quit => {}
            ReplCommand::Say(text) => self.turn(&text).await,
            ReplCommand::AttachImage(path) => {
                match prepare_image(&path, &self.settings.attachment_limits) {
                    Ok(prepared) => match prepared.to_image_source() {
                        Some(source) => {
                            self.session.attach_image(source);
                            println!(
                                "Attached {} ({}x{}); it will be sent with your next message.",
                                path.display(),
                                prepared.width,
                                prepared.height
                            );
                        }
                        None => eprintln!("Error processing image"),
                    },
                    Err(err) => {
                        debug!(path = %path.display(), error = ?err, "attachment refused");
                        eprintln!("{err}");
                    }
                }
            }
            ReplCommand::ClearImage => {
                self.session.clear_image();
                println!("Pending image cleared.");
            }
            ReplCommand::ShowModel => println!("Model: {}", self.session.model()),
            ReplCommand::SetModel(id) => {
                if find_model(&id).is_none() {
                    warn!(model = %id, "model is not in the catalog");
                    println!("Note: '{id}' is not a known model; the backend may substitute its default.");
                }
                self.session.set_model(id);
                println!("Model: {}", self.session.model());
            }
            ReplCommand::ListModels => {
                for model in MODEL_CATALOG {
                    let marker = if model.id == self.session.model() { "*" } else { " " };
                    println!("{marker} {} ({}): {}", model.id, model.name, model.description);
                }
            }
            ReplCommand::Ask(index) => match self.session.suggested_question(index) {
                Ok(question) => {
                    println!("You: {question}");
                    self.turn(&question).await;
                }
                Err(err) => eprintln!("{err}"),
            },
            ReplCommand::Copy(index) => match index.checked_sub(1).and_then(|i| self.code_blocks.get(i)) {
                Some(block) => match copy_to_clipboard(&block.code) {
                    Ok(()) => println!("Copied code block {index}."),
                    Err(err) => eprintln!("{err}"),
                },
                None => eprintln!("No code block #{index} in the last answer."),
            },
            ReplCommand::Human => {
                if self.session.request_human_agent() {
                    println!("A human agent has been requested.");
                } else {
                    println!("The last answer did not offer a human handoff.");
                }
                self.drain_events();
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Invalid(message) => eprintln!("{message}"),
        }
    }

    async fn turn(&mut self, text: &str) {
        let pending = match self.session.begin_turn(text) {
            Ok(pending) => pending,
            Err(err) => {
                eprintln!("{err}");
                return;
            }
        };
        if let Some(message) = self.session.transcript().iter().rev().nth(1) {
            if message.content.has_image() {
                for line in render_user(&message.content).into_iter().skip(1) {
                    println!("{line}");
                }
            }
        }
        println!("{THINKING_TEXT}");

        let report = self
            .session
            .await_turn(pending, self.settings.envelope_timeout)
            .await;
        self.show(report);
        self.drain_events();
    }

    fn show(&mut self, report: TurnReport) {
        if let Some(err) = &report.error {
            report_error(err);
        }
        if report.timed_out {
            debug!(placeholder = %report.placeholder_id, "no answer before the timeout");
        }
        let view = render_state(&report.state, self.settings.view);
        for line in &view.lines {
            println!("{line}");
        }
        self.code_blocks = view.code_blocks;
    }

    /// Print answers that landed after their turn had already timed out.
    fn show_late_turns(&mut self) {
        for late in self.session.commit_late_turns() {
            match late.result {
                Ok(envelope) => {
                    println!("(late answer)");
                    let view = render_envelope(&envelope, self.settings.view);
                    for line in &view.lines {
                        println!("{line}");
                    }
                    self.code_blocks = view.code_blocks;
                }
                Err(err) => report_error(&err),
            }
        }
        self.drain_events();
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(note) = describe_event(&event) {
                        eprintln!("{note}");
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "sidebar events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

fn report_error(err: &SessionError) {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    eprintln!("({message})");
}
