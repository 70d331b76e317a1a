//! Command-line interface parsing and handling
//!
//! This module parses arguments, loads the config file, applies command-line
//! overrides on top of it and hands off to the REPL or a one-shot command.

pub mod invoke;
pub mod model_list;
pub mod say;

use std::error::Error;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::invoke::run_invoke;
use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::core::backend::BackendClient;
use crate::core::config::defaults::CONFIG_KEYS;
use crate::core::config::Config;
use crate::core::events::EventBus;
use crate::core::session::ChatSession;
use crate::ui::markdown::RenderOptions;
use crate::ui::repl::{Repl, ReplSettings};
use crate::ui::view::ViewOptions;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_DESCRIBE"), ")");

#[derive(Parser)]
#[command(name = "concierge", version = VERSION)]
#[command(about = "A terminal chat client for a support assistant")]
#[command(
    long_about = "Concierge talks to a customer-support chat backend from the terminal. \
Answers are rendered as markdown, suggested follow-up questions can be asked by number, \
and the assistant can hand the conversation to a human agent.\n\n\
Configuration:\n\
  Settings live in config.toml under the platform config directory \
(see 'concierge config path'). Use 'concierge set <key> <value>' to change them.\n\n\
Environment Variables:\n\
  RUST_LOG                     Log filter for diagnostics on stderr (default: warn)\n\
  AWS_BEARER_TOKEN_BEDROCK     Token for 'concierge invoke' (name configurable)\n\n\
Commands inside the chat:\n\
  /image <path>     Attach an image to the next message\n\
  /ask <n>          Ask suggested question n\n\
  /copy <n>         Copy code block n to the clipboard\n\
  /human            Ask for a human agent\n\
  /help             Show all commands"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model id to request (overrides default-model)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Chat backend base URL (overrides backend-url)
    #[arg(short = 'b', long, global = true, value_name = "URL")]
    pub backend: Option<String>,

    /// Knowledge base id sent with every chat request
    #[arg(long = "kb", global = true, value_name = "ID")]
    pub knowledge_base_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send one message to the backend and print the answer
    Say {
        /// Message text; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
        /// Image file to send along with the message
        #[arg(short = 'i', long, value_name = "PATH")]
        image: Option<PathBuf>,
    },
    /// Call the upstream model directly, bypassing the chat backend
    Invoke {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
        /// System prompt (overrides system-prompt)
        #[arg(short = 's', long)]
        system: Option<String>,
        #[arg(short = 't', long)]
        temperature: Option<f32>,
        #[arg(long = "max-tokens")]
        max_tokens: Option<u32>,
    },
    /// List the model catalog
    Models,
    /// Inspect the configuration file
    Config {
        #[arg(value_enum, default_value_t = ConfigAction::Show)]
        action: ConfigAction,
    },
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigAction {
    /// Print every setting with its effective value
    Show,
    /// Print where the config file lives
    Path,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing()?;
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

fn init_tracing() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init()?;
    Ok(())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command {
        None | Some(Commands::Chat) => {
            let config = Config::load()?;
            let session = build_session(&config, &args);
            let settings = ReplSettings {
                envelope_timeout: config.envelope_timeout(),
                attachment_limits: config.attachment_limits(),
                view: view_options(&config, std::io::stdout().is_terminal()),
            };
            Repl::new(session, settings).run().await
        }
        Some(Commands::Say { ref prompt, ref image }) => {
            let config = Config::load()?;
            let session = build_session(&config, &args);
            run_say(session, &config, &prompt.join(" "), image.as_deref()).await
        }
        Some(Commands::Invoke {
            ref prompt,
            ref system,
            temperature,
            max_tokens,
        }) => {
            let config = Config::load()?;
            let model = args
                .model
                .clone()
                .unwrap_or_else(|| config.default_model().to_string());
            run_invoke(
                &config,
                invoke::InvokeOptions {
                    model,
                    prompt: prompt.join(" "),
                    system: system.clone(),
                    temperature,
                    max_tokens,
                },
            )
            .await
        }
        Some(Commands::Models) => {
            let config = Config::load()?;
            list_models(args.model.as_deref().unwrap_or(config.default_model()));
            Ok(())
        }
        Some(Commands::Config { action }) => {
            match action {
                ConfigAction::Show => Config::load()?.print_all(),
                ConfigAction::Path => println!("{}", Config::get_config_path()?.display()),
            }
            Ok(())
        }
        Some(Commands::Set { ref key, ref value }) => {
            if value.is_empty() {
                eprintln!("⚠️  Usage: concierge set <key> <value>");
                eprintln!("Keys: {}", CONFIG_KEYS.join(", "));
                std::process::exit(1);
            }
            let value = value.join(" ");
            let mut config = Config::load()?;
            config.set_value(key, &value)?;
            config.save()?;
            println!("✅ Set {key} to: {value}");
            Ok(())
        }
        Some(Commands::Unset { ref key }) => {
            let mut config = Config::load()?;
            config.unset_value(key)?;
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}

/// Build a chat session from config, letting command-line flags win.
pub fn build_session(config: &Config, args: &Args) -> ChatSession {
    let backend_url = args.backend.as_deref().unwrap_or(config.backend_url());
    let model = args.model.as_deref().unwrap_or(config.default_model());
    let knowledge_base_id = args
        .knowledge_base_id
        .as_deref()
        .unwrap_or(config.knowledge_base_id());
    debug!(backend_url, model, knowledge_base_id, "building chat session");

    ChatSession::new(
        BackendClient::new(reqwest::Client::new(), backend_url),
        EventBus::new(),
        model,
        knowledge_base_id,
    )
}

/// Colors and highlighting only make sense on a terminal.
pub fn view_options(config: &Config, color: bool) -> ViewOptions {
    ViewOptions {
        markdown: config.markdown_enabled(),
        render: RenderOptions {
            color,
            syntax: color && config.syntax_enabled(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let config = Config {
            backend_url: Some("http://config:3000".into()),
            default_model: Some("claude-3-5-haiku-20241022".into()),
            knowledge_base_id: Some("kb-config".into()),
            ..Config::default()
        };
        let args = Args::parse_from([
            "concierge",
            "--backend",
            "http://flag:4000",
            "--kb",
            "kb-flag",
            "chat",
        ]);
        let session = build_session(&config, &args);
        assert_eq!(session.backend().base_url(), "http://flag:4000");
        assert_eq!(session.model(), "claude-3-5-haiku-20241022");
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let args = Args::parse_from(["concierge", "say", "-m", "claude-3-5-sonnet-20240620", "hi", "there"]);
        assert_eq!(args.model.as_deref(), Some("claude-3-5-sonnet-20240620"));
        match args.command {
            Some(Commands::Say { prompt, image }) => {
                assert_eq!(prompt, vec!["hi", "there"]);
                assert!(image.is_none());
            }
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn set_collects_multi_word_values() {
        let args = Args::parse_from(["concierge", "set", "system-prompt", "Be", "brief."]);
        match args.command {
            Some(Commands::Set { key, value }) => {
                assert_eq!(key, "system-prompt");
                assert_eq!(value.join(" "), "Be brief.");
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn config_action_defaults_to_show() {
        let args = Args::parse_from(["concierge", "config"]);
        assert!(matches!(
            args.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn syntax_highlighting_needs_color() {
        let config = Config::default();
        assert_eq!(
            view_options(&config, false).render,
            RenderOptions {
                color: false,
                syntax: false
            }
        );
        let config = Config {
            syntax: Some(false),
            ..Config::default()
        };
        assert!(!view_options(&config, true).render.syntax);
        assert!(view_options(&config, true).render.color);
    }

    #[test]
    fn args_are_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
