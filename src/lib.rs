//! Concierge is a terminal chat client for a customer-support assistant.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation: the session and its transcript, the
//!   response envelope and its decoder, the backend client, the upstream model
//!   adapter, image attachments, sidebar events and configuration.
//! - [`ui`] renders answers as terminal text and runs the line-oriented REPL.
//! - [`api`] defines the wire payloads and the static model catalog.
//! - [`utils`] holds URL, clipboard, error-body and highlighting helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which loads configuration and dispatches into
//! [`ui::repl`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
