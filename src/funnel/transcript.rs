//! Append-only conversation transcript.

use chrono::Local;
use serde::Serialize;
use uuid::Uuid;

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Agent,
    User,
}

/// Delivery marker shown next to the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryBody {
    Text { text: String },
    Audio { audio_ref: String, fallback_text: String },
}

impl EntryBody {
    /// The readable text, for audio entries the fallback.
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Audio { fallback_text, .. } => fallback_text,
        }
    }

    pub fn audio_ref(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Audio { audio_ref, .. } => Some(audio_ref),
        }
    }
}

/// One line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub origin: Origin,
    pub body: EntryBody,
    /// Wall-clock `HH:MM` at emission.
    pub timestamp: String,
    pub status: DeliveryStatus,
}

impl ConversationEntry {
    /// An agent message; audio when `audio_ref` is set.
    pub fn agent(text: impl Into<String>, audio_ref: Option<&str>) -> Self {
        let text = text.into();
        let body = match audio_ref {
            Some(audio_ref) => EntryBody::Audio {
                audio_ref: audio_ref.to_string(),
                fallback_text: text,
            },
            None => EntryBody::Text { text },
        };
        Self::new(Origin::Agent, body)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Origin::User, EntryBody::Text { text: text.into() })
    }

    fn new(origin: Origin, body: EntryBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            body,
            timestamp: display_time(),
            status: DeliveryStatus::Read,
        }
    }
}

fn display_time() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Append-only transcript. Entries are never edited or removed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<ConversationEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }
}
