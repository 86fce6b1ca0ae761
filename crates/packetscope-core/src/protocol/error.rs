use thiserror::Error;

/// Why an inbound line could not be turned into a `Command`.
///
/// The `Display` text is sent verbatim as the `error` event message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid JSON command")]
    InvalidJson,
    #[error("Missing command field")]
    MissingCommand,
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Missing field '{field}' for command {command}")]
    MissingField {
        command: String,
        field: &'static str,
    },
    #[error("Invalid payload for command {command}: {reason}")]
    InvalidPayload { command: String, reason: String },
}
