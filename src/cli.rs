//! Terminal chat. Renders the transcript on stdout and feeds stdin lines to
//! the engine.
//!
//! Input is only forwarded while the engine offers an open input mode, and
//! blank lines never reach it.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::error::FunnelError;
use crate::funnel::{
    Advance, ConversationEntry, EntryBody, FunnelEngine, FunnelEvent, FunnelPhase, InputMode,
    Origin, Persona, ScheduledTask,
};

/// Label for the user's own messages.
const USER_LABEL: &str = "Você";

/// Interactive stdin/stdout front end for one funnel run.
pub struct CliChat {
    engine: Arc<FunnelEngine>,
}

impl CliChat {
    pub fn new(engine: Arc<FunnelEngine>) -> Self {
        Self { engine }
    }

    /// Run until the funnel finishes or stdin closes.
    pub async fn run(self) {
        let persona = self.engine.script().persona().clone();
        println!("{}", render_header(&persona));

        let mut events = self.engine.subscribe();
        let mut lines = spawn_stdin_reader();
        let _start = self.engine.spawn_start();
        let mut pending: Option<ScheduledTask<Result<Advance, FunnelError>>> = None;
        let mut mode = InputMode::Disabled;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(FunnelEvent::TypingStarted) => eprintln!("   {}", persona.typing_label),
                    Ok(FunnelEvent::EntryAppended(entry)) => {
                        println!("{}", render_entry(&persona, &entry));
                    }
                    Ok(FunnelEvent::InputModeChanged(next)) => {
                        if let Some(hint) = render_input(&next) {
                            eprintln!("{hint}");
                        }
                        mode = next;
                    }
                    Ok(FunnelEvent::Finished { answers }) => {
                        tracing::debug!(answers = answers.len(), "Conversation finished");
                        break;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Chat renderer fell behind, resyncing");
                        match self.resync().await {
                            Some(current) => mode = current,
                            None => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                line = lines.recv() => match line {
                    Some(line) => match interpret_input(&mode, &line) {
                        Some(response) => {
                            if let InputMode::TerminalLink { url, .. } = &mode {
                                println!("\n🔗 {url}\n");
                            }
                            mode = InputMode::Disabled;
                            pending = Some(self.engine.spawn_advance(response));
                        }
                        None => {
                            if !mode.is_disabled() {
                                eprint!("> ");
                            }
                        }
                    },
                    None => break,
                },
            }
        }

        // Dropping an unfinished answer aborts it along with its delay.
        drop(pending);
        self.engine.shutdown();
    }

    /// Re-read the input mode after missed events. `None` once the funnel
    /// is complete.
    async fn resync(&self) -> Option<InputMode> {
        let snapshot = self.engine.snapshot().await;
        if snapshot.phase == FunnelPhase::Complete {
            return None;
        }
        if let Some(hint) = render_input(&snapshot.state.input_mode) {
            eprintln!("{hint}");
        }
        Some(snapshot.state.input_mode)
    }
}

/// Read stdin lines on a background task.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Turn a typed line into a response for the current mode.
///
/// `None` means nothing is sent: input is closed, or the line is blank where
/// text is expected. On choice steps a number picks the matching option and
/// anything else is sent as typed.
pub fn interpret_input(mode: &InputMode, line: &str) -> Option<String> {
    match mode {
        InputMode::Disabled => None,
        InputMode::FreeText => (!line.trim().is_empty()).then(|| line.to_string()),
        InputMode::SingleChoice { options } => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            let picked = trimmed
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| options.get(i));
            Some(picked.cloned().unwrap_or_else(|| line.to_string()))
        }
        // Any key "clicks" the link.
        InputMode::TerminalLink { label, .. } => Some(label.clone()),
    }
}

pub fn render_header(persona: &Persona) -> String {
    format!("━━ {} ━━\n{}\n", persona.name, persona.banner)
}

pub fn render_entry(persona: &Persona, entry: &ConversationEntry) -> String {
    let sender = match entry.origin {
        Origin::Agent => persona.name.as_str(),
        Origin::User => USER_LABEL,
    };
    let ticks = match entry.origin {
        Origin::User => " ✓✓",
        Origin::Agent => "",
    };
    match &entry.body {
        EntryBody::Text { text } => format!("[{}] {sender}: {text}{ticks}", entry.timestamp),
        EntryBody::Audio {
            audio_ref,
            fallback_text,
        } => format!(
            "[{}] {sender}: 🎤 {audio_ref}\n        ({fallback_text}){ticks}",
            entry.timestamp
        ),
    }
}

/// Hint for the active input, `None` while input is closed.
pub fn render_input(mode: &InputMode) -> Option<String> {
    match mode {
        InputMode::Disabled => None,
        InputMode::FreeText => Some("> ".to_string()),
        InputMode::SingleChoice { options } => {
            let lines: Vec<String> = options
                .iter()
                .enumerate()
                .map(|(i, option)| format!("  {}) {option}", i + 1))
                .collect();
            Some(format!("{}\n> ", lines.join("\n")))
        }
        InputMode::TerminalLink { label, .. } => {
            Some(format!("  👉 {label}\n  (Enter para abrir)"))
        }
    }
}
