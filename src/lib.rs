//! Lead Funnel: a scripted chat that qualifies a real-estate lead.

pub mod cli;
pub mod config;
pub mod error;
pub mod funnel;
pub mod integrations;
