use std::sync::Arc;

use log::{debug, warn};

use crate::analysis::engine::AnalysisEngine;
use crate::capture::{CaptureConfig, CaptureEngine};
use crate::channel::Outbox;
use crate::protocol::{Command, Event};
use crate::source::CaptureBackend;
use crate::unix_now;

/// Routes decoded commands to the engines.
///
/// Every outcome, including malformed input, is reported as an event; no
/// command can make `handle_line` fail.
pub struct Dispatcher {
    outbox: Outbox,
    capture: CaptureEngine,
    analysis: AnalysisEngine,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn CaptureBackend>, outbox: Outbox, config: CaptureConfig) -> Self {
        Self {
            capture: CaptureEngine::new(backend, outbox.clone(), config),
            analysis: AnalysisEngine::new(outbox.clone()),
            outbox,
        }
    }

    pub fn capture(&self) -> &CaptureEngine {
        &self.capture
    }

    pub fn analysis(&self) -> &AnalysisEngine {
        &self.analysis
    }

    /// Decode and execute one inbound line. Blank lines are ignored.
    pub fn handle_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match Command::decode(line) {
            Ok(command) => self.handle(command),
            Err(e) => {
                warn!("rejected command: {}", e);
                self.outbox.emit(Event::error(e.to_string()));
            }
        }
    }

    pub fn handle(&mut self, command: Command) {
        debug!("command: {:?}", command);
        match command {
            Command::StartCapture { interface } => self.capture.start(interface.as_deref()),
            Command::StopCapture => self.capture.stop(),
            Command::GetInterfaces => self.capture.list_interfaces(),
            Command::AnalyzePcap { file } => self.analysis.analyze(&file),
            Command::CancelAnalysis => self.analysis.cancel(),
            Command::GetResults => self.analysis.get_results(),
            Command::Ping => self.outbox.emit(Event::Pong {
                timestamp: unix_now(),
            }),
        }
    }

    /// Stop any live capture and abandon any running analysis.
    pub fn shutdown(&mut self) {
        self.capture.shutdown();
        self.analysis.shutdown();
    }
}
