//! The funnel: a fixed, linear script of qualification questions.
//!
//! The engine reveals one scripted agent message at a time after a simulated
//! typing delay, records each answer, and at the terminal step submits the
//! lead, fires the conversion event, and offers a pre-filled WhatsApp link.

pub mod engine;
pub mod link;
pub mod schedule;
pub mod script;
pub mod state;
pub mod transcript;

pub use engine::{Advance, FunnelEngine, FunnelEvent, FunnelSnapshot};
pub use link::{DEFAULT_TEMPLATE, LinkConfig, build_terminal_link};
pub use schedule::{ScheduledTask, Shutdown, TypingDelays};
pub use script::{InputKind, Persona, Prompt, Script, Step};
pub use state::{AnswerMap, FunnelPhase, FunnelState, InputMode};
pub use transcript::{ConversationEntry, DeliveryStatus, EntryBody, Origin, Transcript};
