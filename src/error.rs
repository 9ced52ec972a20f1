//! Error types for the lead funnel.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Funnel error: {0}")]
    Funnel(#[from] FunnelError),

    #[error("Integration error: {0}")]
    Integration(#[from] IntegrationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load script from {path}: {reason}")]
    ScriptLoad { path: String, reason: String },
}

/// Script validation errors. Raised once, when the script is built.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script has no steps")]
    Empty,

    #[error("Step {index} has an empty key")]
    EmptyKey { index: usize },

    #[error("Duplicate step key: {key}")]
    DuplicateKey { key: String },

    #[error("Step key {key} collides with a lead payload field")]
    ReservedKey { key: String },

    #[error("Single-choice step {key} has no choices")]
    NoChoices { key: String },

    #[error("Last step {key} must be a terminal link")]
    MissingTerminal { key: String },

    #[error("Terminal link step {key} is not the last step")]
    EarlyTerminal { key: String },

    #[error("Step {key} prompt requires answer {requires}, which is not collected before it")]
    UnresolvableInterpolation { key: String, requires: String },

    #[error("Failed to parse script: {0}")]
    Parse(String),
}

/// Funnel engine contract violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FunnelError {
    #[error("Funnel already started")]
    AlreadyStarted,

    #[error("Funnel has not been started")]
    NotStarted,

    #[error("Input is disabled at step {step}")]
    InputDisabled { step: usize },

    #[error("Step {key} already has an answer")]
    AlreadyAnswered { key: String },

    #[error("Step {step} is past the end of the script")]
    StepOutOfRange { step: usize },

    #[error("Funnel was shut down while waiting")]
    Cancelled,
}

/// Outbound integration failures. Always caught and logged at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{service} request failed: {reason}")]
    Http { service: String, reason: String },

    #[error("{service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} has no credentials configured")]
    MissingCredentials { service: String },
}

/// Result type alias for the funnel.
pub type Result<T> = std::result::Result<T, Error>;
