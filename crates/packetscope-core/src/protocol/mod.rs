//! Wire types for the controller protocol.
//!
//! Inbound commands are JSON objects discriminated by `command`; outbound
//! events are JSON objects discriminated by `type`, with variant fields
//! flattened next to the tag.

mod error;

pub use error::CommandError;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StatisticsReport;
use crate::normalize::PacketRecord;

/// Commands accepted from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartCapture {
        #[serde(default)]
        interface: Option<String>,
    },
    StopCapture,
    GetInterfaces,
    AnalyzePcap {
        file: PathBuf,
    },
    CancelAnalysis,
    GetResults,
    Ping,
}

const KNOWN_COMMANDS: &[&str] = &[
    "start_capture",
    "stop_capture",
    "get_interfaces",
    "analyze_pcap",
    "cancel_analysis",
    "get_results",
    "ping",
];

impl Command {
    /// Decode one inbound line.
    ///
    /// # Examples
    /// ```
    /// use packetscope_core::{Command, CommandError};
    ///
    /// assert_eq!(Command::decode(r#"{"command":"ping"}"#), Ok(Command::Ping));
    /// assert_eq!(
    ///     Command::decode(r#"{"command":"reboot"}"#),
    ///     Err(CommandError::Unknown("reboot".to_string()))
    /// );
    /// ```
    pub fn decode(line: &str) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_str(line).map_err(|_| CommandError::InvalidJson)?;
        let name = match value.get("command") {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(CommandError::MissingCommand),
        };
        if !KNOWN_COMMANDS.contains(&name.as_str()) {
            return Err(CommandError::Unknown(name));
        }
        if let Some(field) = missing_required_field(&name, &value) {
            return Err(CommandError::MissingField {
                command: name,
                field,
            });
        }

        let command = serde_json::from_value(value).map_err(|e| CommandError::InvalidPayload {
            command: name,
            reason: e.to_string(),
        })?;
        Ok(match command {
            Command::StartCapture { interface } => Command::StartCapture {
                interface: interface.filter(|name| !name.trim().is_empty()),
            },
            other => other,
        })
    }
}

fn missing_required_field(command: &str, value: &Value) -> Option<&'static str> {
    let required: &[&'static str] = match command {
        "analyze_pcap" => &["file"],
        _ => &[],
    };
    required.iter().copied().find(|field| {
        !matches!(value.get(*field), Some(Value::String(text)) if !text.trim().is_empty())
    })
}

/// Lifecycle markers carried by `analysis_status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Started,
    Cancelling,
    Cancelled,
    Completed,
    Error,
}

/// A capturable interface and its bound address (`"Unknown"` when none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: String,
}

/// Messages emitted to the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Startup {
        status: String,
        version: String,
    },
    CaptureStatus {
        active: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        interface: Option<String>,
    },
    PacketData(PacketRecord),
    Interfaces {
        interfaces: Vec<InterfaceInfo>,
    },
    AnalysisStatus {
        status: AnalysisStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    AnalysisProgress {
        progress: u8,
    },
    AnalysisResults(StatisticsReport),
    Pong {
        timestamp: f64,
    },
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
    Info {
        message: String,
    },
}

impl Event {
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Event::Warning {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Event::Info {
            message: message.into(),
        }
    }

    pub fn analysis_status(status: AnalysisStatus) -> Self {
        Event::AnalysisStatus { status, file: None }
    }
}
