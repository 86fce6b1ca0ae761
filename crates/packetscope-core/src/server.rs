use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded, select};
use log::{debug, error, info};

use crate::capture::CaptureConfig;
use crate::channel::{ChannelError, Inbound, outbox, run_writer, spawn_line_reader};
use crate::dispatch::Dispatcher;
use crate::protocol::Event;
use crate::source::CaptureBackend;

#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Longest the command loop waits for input before servicing a tick.
    pub poll_interval: Duration,
    pub capture: CaptureConfig,
    /// Reported in the `startup` event.
    pub version: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            capture: CaptureConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Run the agent until end of input, a `shutdown` signal, or an output
/// failure.
///
/// Emits `startup` first, then dispatches one command per input line. On exit
/// any live capture is stopped and its final status written before returning.
/// Only a failure to write events is returned as an error.
pub fn serve<R, W>(
    input: R,
    output: W,
    config: ServeConfig,
    backend: Arc<dyn CaptureBackend>,
    shutdown: Receiver<()>,
) -> Result<(), ChannelError>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let (outbox, events) = outbox();
    let (fatal_tx, fatal_rx) = bounded::<ChannelError>(1);
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let writer = thread::Builder::new()
        .name("event-writer".to_string())
        .spawn(move || {
            if let Err(e) = run_writer(events, stop_rx, output) {
                error!("event writer failed: {}", e);
                let _ = fatal_tx.send(e);
            }
        })?;

    outbox.emit(Event::Startup {
        status: "ready".to_string(),
        version: config.version.clone(),
    });
    info!("agent ready (version {})", config.version);

    let inbound = spawn_line_reader(input);
    let mut dispatcher = Dispatcher::new(backend, outbox, config.capture);

    let result = loop {
        select! {
            recv(inbound) -> message => match message {
                Ok(Inbound::Line(line)) => dispatcher.handle_line(&line),
                Ok(Inbound::Closed) | Err(_) => {
                    info!("command channel closed");
                    break Ok(());
                }
            },
            recv(shutdown) -> _ => {
                info!("shutdown requested");
                break Ok(());
            },
            recv(fatal_rx) -> failure => {
                break Err(failure.unwrap_or_else(|_| {
                    ChannelError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "event writer stopped",
                    ))
                }));
            },
            default(config.poll_interval) => {}
        }
    };

    dispatcher.shutdown();
    drop(dispatcher);
    let _ = stop_tx.send(());
    if writer.join().is_err() {
        error!("event writer panicked");
    }
    if result.is_ok() {
        if let Ok(e) = fatal_rx.try_recv() {
            return Err(e);
        }
    }
    debug!("serve loop finished");
    result
}
