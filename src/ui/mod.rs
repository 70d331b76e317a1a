//! Terminal presentation for chat sessions.
//!
//! - [`markdown`]: answer text to styled terminal lines, with code blocks
//!   collected for copying.
//! - [`view`]: how a transcript entry looks in each decoding state.
//! - [`repl`]: the interactive loop and its slash commands.
//!
//! Ownership boundary: this layer presents and captures interaction state, while
//! [`crate::core`] owns the conversation and backend coordination.

pub mod markdown;
pub mod repl;
pub mod view;
