//! Launching an external editor for `%edit`-style payloads.

use std::process::Stdio;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(
        "No default editor available.\nSpecify a GUI text editor in the `editor` configuration option."
    )]
    NotConfigured,

    #[error("Invalid editor command: {0}")]
    InvalidCommand(String),

    #[error("Opening editor with command \"{command}\" failed: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Editor command templates.
///
/// `{filename}` and `{line}` are substituted per word; when no word names
/// `{filename}`, the file is appended as the last argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalEditor {
    editor: Option<String>,
    editor_line: Option<String>,
}

impl ExternalEditor {
    pub fn new(editor: Option<String>, editor_line: Option<String>) -> Self {
        Self {
            editor: editor.filter(|s| !s.trim().is_empty()),
            editor_line: editor_line.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.editor.is_some() || self.editor_line.is_some()
    }

    /// The argv that [`open`](Self::open) would run.
    pub fn command_for(&self, filename: &str, line: Option<u64>) -> Result<Vec<String>, EditorError> {
        let template = match (line, &self.editor_line, &self.editor) {
            (Some(_), Some(with_line), _) => with_line,
            (_, _, Some(plain)) => plain,
            (None, Some(with_line), None) => with_line,
            (_, None, None) => return Err(EditorError::NotConfigured),
        };

        let words =
            shlex::split(template).ok_or_else(|| EditorError::InvalidCommand(template.clone()))?;
        if words.is_empty() {
            return Err(EditorError::InvalidCommand(template.clone()));
        }

        let line = line.unwrap_or(1).to_string();
        let mut named_file = false;
        let mut argv: Vec<String> = words
            .into_iter()
            .map(|word| {
                named_file |= word.contains("{filename}");
                word.replace("{filename}", filename).replace("{line}", &line)
            })
            .collect();

        if !named_file {
            argv.push(filename.to_string());
        }
        Ok(argv)
    }

    /// Start the editor without waiting for it. Returns the child's pid.
    ///
    /// The child is always reaped once it exits: by a task on the current
    /// tokio runtime if there is one, otherwise by a waiter thread.
    pub fn open(&self, filename: &str, line: Option<u64>) -> Result<Option<u32>, EditorError> {
        let argv = self.command_for(filename, line)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| EditorError::InvalidCommand(String::new()))?;

        tracing::info!(command = ?argv, "launching editor");
        let spawn_failed = |source: std::io::Error| EditorError::Spawn {
            command: argv.join(" "),
            source,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _guard = handle.enter();
                let mut child = tokio::process::Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(spawn_failed)?;
                let pid = child.id();
                handle.spawn(async move {
                    if let Err(e) = child.wait().await {
                        tracing::warn!(error = %e, "failed to reap editor process");
                    }
                });
                Ok(pid)
            }
            Err(_) => {
                let mut child = std::process::Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(spawn_failed)?;
                let pid = child.id();
                std::thread::Builder::new()
                    .name("editor-reaper".into())
                    .spawn(move || {
                        if let Err(e) = child.wait() {
                            tracing::warn!(error = %e, "failed to reap editor process");
                        }
                    })
                    .map_err(spawn_failed)?;
                Ok(Some(pid))
            }
        }
    }
}
