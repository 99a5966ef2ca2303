use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::app::config::DictationConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictationEvent {
    /// A finished transcript fragment from the listening session.
    Transcript { session: u64, text: String },
    /// The transcription process exited or its output closed.
    Ended { session: u64 },
}

/// Voice input backed by an external speech-to-text command.
///
/// The command is expected to print one transcript fragment per line on stdout.
pub struct Dictation {
    command: Option<String>,
    args: Vec<String>,
    child: Option<Child>,
    session: u64,
}

impl Dictation {
    pub fn new(config: &DictationConfig) -> Self {
        Self {
            command: config
                .command
                .as_ref()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            args: config.args.clone(),
            child: None,
            session: 0,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.command.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.child.is_some()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Spawns the transcription command and forwards its output to `on_event`.
    pub fn start<F>(&mut self, on_event: F) -> Result<()>
    where
        F: Fn(DictationEvent) + Send + 'static,
    {
        let command = self
            .command
            .clone()
            .ok_or_else(|| Error::platform("Speech recognition is not supported in this terminal."))?;

        if self.is_listening() {
            return Ok(());
        }

        let mut child = Command::new(&command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::platform(format!("Failed to start dictation command '{}': {}", command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::platform("Failed to get stdout handle for dictation command"))?;

        self.session += 1;
        let session = self.session;
        info!("Dictation session {} started: {}", session, command);

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let text = line.trim();
                        if !text.is_empty() {
                            on_event(DictationEvent::Transcript {
                                session,
                                text: text.to_string(),
                            });
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error reading dictation output: {}", e);
                        break;
                    }
                }
            }
            debug!("Dictation session {} output closed", session);
            on_event(DictationEvent::Ended { session });
        });

        self.child = Some(child);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("Dictation process already gone: {}", e);
            }
            info!("Dictation session {} stopped", self.session);
        }
    }

    /// Handles the end of a session; stale sessions are ignored.
    pub fn mark_ended(&mut self, session: u64) -> bool {
        if session == self.session && self.child.is_some() {
            self.child = None;
            return true;
        }
        false
    }
}

impl Drop for Dictation {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Appends a transcript fragment, separating it from existing text by one space.
pub fn append_transcript(input: &str, fragment: &str) -> String {
    let mut result = String::with_capacity(input.len() + fragment.len() + 1);
    result.push_str(input);
    if !input.is_empty() && !input.ends_with(' ') {
        result.push(' ');
    }
    result.push_str(fragment);
    result
}
