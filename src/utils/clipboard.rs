use std::error::Error;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

#[cfg(target_os = "macos")]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("pbcopy", &[])];
#[cfg(target_os = "windows")]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[("cmd", &["/C", "clip"])];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    /// None of the platform clipboard commands could be run.
    Unavailable,
    Failed(String),
}

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipboardError::Unavailable => {
                let names: Vec<&str> = CLIPBOARD_COMMANDS.iter().map(|(cmd, _)| *cmd).collect();
                write!(f, "No clipboard command found (install {})", names.join(", "))
            }
            ClipboardError::Failed(cmd) => write!(f, "Clipboard command `{cmd}` failed"),
        }
    }
}

impl Error for ClipboardError {}

/// Copy `text` with the first clipboard command that succeeds.
pub fn copy_to_clipboard(text: &str) -> Result<(), ClipboardError> {
    let mut last_error = ClipboardError::Unavailable;
    for (cmd, args) in CLIPBOARD_COMMANDS {
        match run_with_stdin(cmd, args, text) {
            Ok(()) => return Ok(()),
            Err(err @ ClipboardError::Failed(_)) => last_error = err,
            Err(ClipboardError::Unavailable) => {}
        }
    }
    Err(last_error)
}

fn run_with_stdin(cmd: &str, args: &[&str], input: &str) -> Result<(), ClipboardError> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|_| ClipboardError::Unavailable)?;
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(input.as_bytes());
    }
    match child.wait() {
        Ok(status) if status.success() => Ok(()),
        _ => Err(ClipboardError::Failed(cmd.to_string())),
    }
}
