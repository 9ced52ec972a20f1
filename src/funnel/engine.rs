//! FunnelEngine: walks the script one step at a time and fires the terminal
//! side effects.
//!
//! The engine owns one `FunnelState` and one `Transcript` behind a single
//! mutex. The lock is never held across a typing delay, and the input gate
//! is checked and closed under the same lock acquisition, so overlapping
//! `advance` calls cannot both record an answer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::error::FunnelError;
use crate::integrations::{Integrations, Lead, QualifiedLead};

use super::link::LinkConfig;
use super::schedule::{ScheduledTask, Shutdown, TypingDelays};
use super::script::Script;
use super::state::{Accepted, AnswerMap, FunnelPhase, FunnelState, InputMode, mode_for_step};
use super::transcript::{ConversationEntry, Transcript};

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Changes the presentation layer reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunnelEvent {
    /// The agent is "typing"; input is closed until the next mode change.
    TypingStarted,
    EntryAppended(ConversationEntry),
    InputModeChanged(InputMode),
    /// The last answer was recorded.
    Finished { answers: AnswerMap },
}

/// Outcome of a successful `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Step `step` is now showing.
    Next { step: usize },
    /// The answer closed the funnel; no agent message follows.
    Finished,
}

/// Point-in-time copy of the engine's state and transcript.
#[derive(Debug, Clone, Serialize)]
pub struct FunnelSnapshot {
    pub phase: FunnelPhase,
    pub state: FunnelState,
    pub transcript: Transcript,
}

#[derive(Debug, Default)]
struct Session {
    state: FunnelState,
    transcript: Transcript,
}

/// Drives one conversation through the script.
pub struct FunnelEngine {
    script: Script,
    link: LinkConfig,
    delays: TypingDelays,
    integrations: Integrations,
    session: Mutex<Session>,
    events: broadcast::Sender<FunnelEvent>,
    shutdown: Shutdown,
}

impl FunnelEngine {
    /// Create an engine with fresh state. Tracks the page view.
    pub fn new(
        script: Script,
        link: LinkConfig,
        delays: TypingDelays,
        integrations: Integrations,
    ) -> Self {
        let (events, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        integrations.analytics.track_page_view();
        Self {
            script,
            link,
            delays,
            integrations,
            session: Mutex::new(Session::default()),
            events,
            shutdown: Shutdown::new(),
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<FunnelEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> FunnelSnapshot {
        let session = self.session.lock().await;
        FunnelSnapshot {
            phase: session.state.phase(self.script.len()),
            state: session.state.clone(),
            transcript: session.transcript.clone(),
        }
    }

    pub async fn input_mode(&self) -> InputMode {
        self.session.lock().await.state.input_mode.clone()
    }

    /// Show the first message after the warm-up delay.
    pub async fn start(&self) -> Result<(), FunnelError> {
        self.session.lock().await.state.begin_start()?;
        info!(steps = self.script.len(), "Funnel started");
        self.emit(FunnelEvent::TypingStarted);
        self.emit(FunnelEvent::InputModeChanged(InputMode::Disabled));

        self.shutdown.pause(self.delays.warm_up).await?;
        self.reveal_step(0).await
    }

    /// Record `response` for the current step and move to the next one.
    ///
    /// Refused with `InputDisabled` while the agent is typing or after the
    /// last answer. Responses to choice steps are not checked against the
    /// offered options.
    pub async fn advance(&self, response: &str) -> Result<Advance, FunnelError> {
        let accepted = {
            let mut session = self.session.lock().await;
            let key = session.state.ensure_accepting(&self.script)?.key.clone();
            self.integrations
                .analytics
                .track_step_interaction(&key, response);

            let accepted = session.state.accept_response(&self.script, response)?;
            let entry = ConversationEntry::user(response);
            session.transcript.push(entry.clone());
            debug!(step = %key, "User answered");
            self.emit(FunnelEvent::EntryAppended(entry));
            self.emit(FunnelEvent::InputModeChanged(InputMode::Disabled));

            if let Accepted::Finished { .. } = accepted {
                info!(answers = session.state.answers.len(), "Funnel finished");
                self.emit(FunnelEvent::Finished {
                    answers: session.state.answers.clone(),
                });
            }
            accepted
        };

        match accepted {
            Accepted::Finished { .. } => Ok(Advance::Finished),
            Accepted::Pending { next, .. } => {
                self.emit(FunnelEvent::TypingStarted);
                let delay = self.delays.sample();
                self.shutdown.pause(delay).await?;
                self.reveal_step(next).await?;
                Ok(Advance::Next { step: next })
            }
        }
    }

    /// Run `start` on the runtime. Dropping the handle cancels it.
    pub fn spawn_start(self: &Arc<Self>) -> ScheduledTask<Result<(), FunnelError>> {
        let engine = Arc::clone(self);
        ScheduledTask::spawn(async move { engine.start().await })
    }

    /// Run `advance` on the runtime. Dropping the handle cancels it.
    pub fn spawn_advance(
        self: &Arc<Self>,
        response: String,
    ) -> ScheduledTask<Result<Advance, FunnelError>> {
        let engine = Arc::clone(self);
        ScheduledTask::spawn(async move { engine.advance(&response).await })
    }

    /// Cancel pending delays. No state changes happen afterwards.
    pub fn shutdown(&self) {
        info!("Funnel shutting down");
        self.shutdown.trigger();
    }

    /// Emit step `index`'s agent message and open its input.
    async fn reveal_step(&self, index: usize) -> Result<(), FunnelError> {
        let mut session = self.session.lock().await;
        if self.shutdown.is_triggered() {
            return Err(FunnelError::Cancelled);
        }
        let Some(step) = self.script.get(index) else {
            return Err(FunnelError::StepOutOfRange { step: index });
        };

        let inputs = session.state.answers.select(step.prompt.requires());
        let text = step.prompt.resolve(&inputs);
        let entry = ConversationEntry::agent(text, step.audio_ref.as_deref());
        session.transcript.push(entry.clone());
        self.emit(FunnelEvent::EntryAppended(entry));

        let mode = mode_for_step(step, &session.state.answers, &self.link);
        if step.input.is_terminal() {
            self.fire_terminal_effects(&session.state.answers);
            if let InputMode::TerminalLink { url, .. } = &mode {
                info!(url = %url, "Generated terminal link");
            }
        }
        info!(step = index, key = %step.key, "Step shown");
        session.state.enter_step(index, mode.clone());
        self.emit(FunnelEvent::InputModeChanged(mode));
        Ok(())
    }

    /// Lead submission and qualified-lead conversion. Reached once per run,
    /// since the step index only moves forward.
    fn fire_terminal_effects(&self, answers: &AnswerMap) {
        info!(answers = answers.len(), "Lead qualified");
        self.integrations.lead.submit_lead(Lead::new(
            answers.clone(),
            self.integrations.lead_origin.clone(),
        ));
        self.integrations
            .analytics
            .track_qualified_lead(QualifiedLead::from_answers(answers));
    }

    fn emit(&self, event: FunnelEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for FunnelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunnelEngine")
            .field("steps", &self.script.len())
            .field("delays", &self.delays)
            .finish_non_exhaustive()
    }
}
