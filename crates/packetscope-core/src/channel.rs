//! Line-delimited JSON message channel.
//!
//! Outbound: engines push `Event`s into an `Outbox`; a single writer drains it
//! and writes one JSON line per event, flushing after each. Inbound: a reader
//! thread turns the byte stream into `Inbound` lines that the serve loop polls
//! with a timeout.

use std::io::{BufRead, Write};
use std::thread;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, warn};
use thiserror::Error;

use crate::protocol::Event;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("output channel write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Cloneable handle used by engines to emit events.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: Sender<Event>,
}

impl Outbox {
    /// Queue an event for the writer. A closed writer is reported by the
    /// writer itself, so a failed send is only logged here.
    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event dropped: writer is gone");
        }
    }
}

/// Create an outbox and the receiving end the writer drains.
pub fn outbox() -> (Outbox, Receiver<Event>) {
    let (tx, rx) = unbounded();
    (Outbox { tx }, rx)
}

/// Serialize `event` as a single line and flush it.
///
/// # Examples
/// ```
/// use packetscope_core::{Event, write_event};
///
/// let mut out = Vec::new();
/// write_event(&mut out, &Event::info("hello")).unwrap();
/// assert_eq!(out, b"{\"type\":\"info\",\"message\":\"hello\"}\n");
/// ```
pub fn write_event<W: Write>(writer: &mut W, event: &Event) -> Result<(), ChannelError> {
    let line = serde_json::to_vec(event)?;
    writer.write_all(&line)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write events until every `Outbox` is dropped or `stop` fires.
///
/// On `stop` (a message or a disconnect) the events already queued are
/// written before returning. Returns the first write failure, after which the
/// controller can no longer be reached.
pub fn run_writer<W: Write>(
    events: Receiver<Event>,
    stop: Receiver<()>,
    mut writer: W,
) -> Result<(), ChannelError> {
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => write_event(&mut writer, &event)?,
                Err(_) => return Ok(()),
            },
            recv(stop) -> _ => {
                for event in events.try_iter() {
                    write_event(&mut writer, &event)?;
                }
                return Ok(());
            }
        }
    }
}

/// One unit read from the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    Closed,
}

/// Read `reader` line by line on a dedicated thread.
///
/// Invalid UTF-8 is replaced rather than rejected so the dispatcher reports it
/// as malformed JSON. `Inbound::Closed` is sent once at end of input or on a
/// read error.
pub fn spawn_line_reader<R>(mut reader: R) -> Receiver<Inbound>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("command-reader".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\r', '\n']).to_string();
                        if tx.send(Inbound::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("command channel read failed: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(Inbound::Closed);
        });
    if let Err(e) = spawned {
        warn!("failed to spawn command reader: {}", e);
    }
    rx
}
