//! Funnel state record and its transitions.
//!
//! All transitions here are synchronous and pure with respect to I/O; the
//! engine owns the single `FunnelState` and drives it between delays.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::FunnelError;

use super::link::{LinkConfig, build_terminal_link};
use super::script::{InputKind, Script, Step};

/// Answers keyed by step key, in the order they were given.
///
/// Values are write-once: inserting an existing key is refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMap {
    entries: Vec<(String, String)>,
}

impl AnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answer. Refused if the key already has one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), FunnelError> {
        let key = key.into();
        if self.contains(&key) {
            return Err(FunnelError::AlreadyAnswered { key });
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// A copy holding only `keys` that have answers, in this map's order.
    pub fn select(&self, keys: &[String]) -> AnswerMap {
        AnswerMap {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| keys.iter().any(|wanted| wanted == k))
                .cloned()
                .collect(),
        }
    }
}

impl Serialize for AnswerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// The input affordance the presentation layer should offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMode {
    FreeText,
    SingleChoice { options: Vec<String> },
    TerminalLink { label: String, url: String },
    Disabled,
}

impl InputMode {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// Coarse progress of the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelPhase {
    NotStarted,
    InProgress,
    Complete,
}

impl std::fmt::Display for FunnelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// What `accept_response` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// The next step must be revealed after the typing delay.
    Pending { key: String, next: usize },
    /// The answer was for the last step; nothing follows.
    Finished { key: String },
}

/// The engine's single state record.
#[derive(Debug, Clone, Serialize)]
pub struct FunnelState {
    /// Current step. Equals the script length once the last answer is in.
    pub step_index: usize,
    pub answers: AnswerMap,
    pub is_agent_typing: bool,
    pub input_mode: InputMode,
    pub started: bool,
}

impl Default for FunnelState {
    fn default() -> Self {
        Self {
            step_index: 0,
            answers: AnswerMap::new(),
            is_agent_typing: false,
            input_mode: InputMode::Disabled,
            started: false,
        }
    }
}

impl FunnelState {
    pub fn phase(&self, script_len: usize) -> FunnelPhase {
        if !self.started {
            FunnelPhase::NotStarted
        } else if self.step_index >= script_len {
            FunnelPhase::Complete
        } else {
            FunnelPhase::InProgress
        }
    }

    /// Enter the warm-up before step 0.
    pub fn begin_start(&mut self) -> Result<(), FunnelError> {
        if self.started {
            return Err(FunnelError::AlreadyStarted);
        }
        self.started = true;
        self.is_agent_typing = true;
        self.input_mode = InputMode::Disabled;
        Ok(())
    }

    /// The step awaiting an answer, if input is open.
    pub fn ensure_accepting<'s>(&self, script: &'s Script) -> Result<&'s Step, FunnelError> {
        if !self.started {
            return Err(FunnelError::NotStarted);
        }
        if self.input_mode.is_disabled() {
            return Err(FunnelError::InputDisabled {
                step: self.step_index,
            });
        }
        script.get(self.step_index).ok_or(FunnelError::InputDisabled {
            step: self.step_index,
        })
    }

    /// Record the response for the current step and close the input.
    ///
    /// The gate check and the switch to `Disabled` happen in one call, so a
    /// second response arriving before the next step is revealed is refused.
    pub fn accept_response(
        &mut self,
        script: &Script,
        response: &str,
    ) -> Result<Accepted, FunnelError> {
        let key = self.ensure_accepting(script)?.key.clone();
        self.answers.insert(key.clone(), response)?;
        self.input_mode = InputMode::Disabled;

        let next = self.step_index + 1;
        if next == script.len() {
            self.step_index = next;
            return Ok(Accepted::Finished { key });
        }
        self.is_agent_typing = true;
        Ok(Accepted::Pending { key, next })
    }

    /// Land on `index` once its agent message has been shown.
    pub fn enter_step(&mut self, index: usize, mode: InputMode) {
        self.step_index = index;
        self.is_agent_typing = false;
        self.input_mode = mode;
    }
}

/// The input mode for a step. Terminal steps need the answers to build the
/// outbound link.
pub fn mode_for_step(step: &Step, answers: &AnswerMap, link: &LinkConfig) -> InputMode {
    match &step.input {
        InputKind::FreeText => InputMode::FreeText,
        InputKind::SingleChoice { choices } => InputMode::SingleChoice {
            options: choices.clone(),
        },
        InputKind::TerminalLink { label } => InputMode::TerminalLink {
            label: label.clone(),
            url: build_terminal_link(answers, &link.destination_number, &link.template),
        },
    }
}
