//! Live capture engine.
//!
//! One session at a time: a capture loop reads frames from a `LiveSource`,
//! normalizes them and pushes them onto a bounded drop-oldest queue; a
//! forwarding loop that lives as long as the engine drains the queue and
//! emits `packet_data` events in queue order.
//!
//! Session transitions (`start`, `stop`) are driven by the dispatcher thread
//! only. Queued records are tagged with their session id and the forwarder
//! emits under the same gate that publishes session changes, so no record
//! precedes its session's `capture_status{active:true}` or follows its
//! `capture_status{active:false}`, whether the session was stopped or failed.

pub mod queue;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::channel::Outbox;
use crate::normalize::{PacketRecord, normalize};
use crate::protocol::Event;
use crate::source::{CaptureBackend, LiveSource, SourceError};

use queue::BoundedQueue;

const NO_SESSION: u64 = 0;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Records buffered between the capture and forwarding loops.
    pub queue_capacity: usize,
    /// Upper bound on a blocking frame read, and so on stop latency.
    pub read_timeout: Duration,
    /// How long the forwarding loop waits on an empty queue per poll.
    pub forward_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            read_timeout: Duration::from_millis(100),
            forward_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

type Queued = (u64, PacketRecord);

/// How a capture loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Stopped,
    /// The source failed; the loop has already reported it and retired itself.
    Failed,
}

struct Session {
    id: u64,
    interface: String,
    running: Arc<AtomicBool>,
    handle: JoinHandle<LoopExit>,
    dropped_base: u64,
}

struct SessionSlot {
    state: SessionState,
    active: Option<Session>,
    last_id: u64,
}

pub struct CaptureEngine {
    backend: Arc<dyn CaptureBackend>,
    outbox: Outbox,
    queue: Arc<BoundedQueue<Queued>>,
    slot: Mutex<SessionSlot>,
    active_id: Arc<AtomicU64>,
    forward_gate: Arc<Mutex<()>>,
    forwarding: Arc<AtomicBool>,
    forwarder: Option<JoinHandle<()>>,
}

impl CaptureEngine {
    /// Create an idle engine and start its forwarding loop.
    pub fn new(backend: Arc<dyn CaptureBackend>, outbox: Outbox, config: CaptureConfig) -> Self {
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let active_id = Arc::new(AtomicU64::new(NO_SESSION));
        let forward_gate = Arc::new(Mutex::new(()));
        let forwarding = Arc::new(AtomicBool::new(true));

        let forwarder = {
            let queue = Arc::clone(&queue);
            let active_id = Arc::clone(&active_id);
            let gate = Arc::clone(&forward_gate);
            let forwarding = Arc::clone(&forwarding);
            let outbox = outbox.clone();
            let timeout = config.forward_timeout;
            thread::Builder::new()
                .name("capture-forward".to_string())
                .spawn(move || {
                    forward_loop(&queue, &active_id, &gate, &forwarding, &outbox, timeout)
                })
        };
        let forwarder = match forwarder {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to spawn forwarding loop: {}", e);
                None
            }
        };

        Self {
            backend,
            outbox,
            queue,
            slot: Mutex::new(SessionSlot {
                state: SessionState::Idle,
                active: None,
                last_id: NO_SESSION,
            }),
            active_id,
            forward_gate,
            forwarding,
            forwarder,
        }
    }

    pub fn state(&self) -> SessionState {
        let mut slot = self.lock_slot();
        self.reap(&mut slot);
        slot.state
    }

    /// Interface of the running session, if any.
    pub fn interface(&self) -> Option<String> {
        self.lock_slot()
            .active
            .as_ref()
            .map(|session| session.interface.clone())
    }

    /// Emit an `interfaces` event listing every capturable interface.
    pub fn list_interfaces(&self) {
        match self.backend.interfaces() {
            Ok(interfaces) => {
                debug!("listing {} interfaces", interfaces.len());
                self.outbox.emit(Event::Interfaces { interfaces });
            }
            Err(e) => {
                warn!("interface enumeration failed: {}", e);
                self.outbox
                    .emit(Event::error(format!("Failed to get interfaces: {e}")));
            }
        }
    }

    /// Start a session on `interface`, or on the backend default.
    ///
    /// A running session yields a `warning`; an open failure yields an
    /// `error` and leaves the engine idle.
    pub fn start(&self, interface: Option<&str>) {
        let mut slot = self.lock_slot();
        self.reap(&mut slot);
        if slot.state != SessionState::Idle {
            self.outbox.emit(Event::warning("Capture already active"));
            return;
        }

        let opened = match self.backend.open(interface) {
            Ok(opened) => opened,
            Err(e) => {
                error!("capture start failed: {}", e);
                self.outbox
                    .emit(Event::error(format!("Failed to start capture: {e}")));
                return;
            }
        };

        let id = slot.last_id + 1;
        let running = Arc::new(AtomicBool::new(true));
        let dropped_base = self.queue.dropped();
        let capture = CaptureLoop {
            id,
            interface: opened.interface.clone(),
            dropped_base,
            running: Arc::clone(&running),
            queue: Arc::clone(&self.queue),
            active_id: Arc::clone(&self.active_id),
            gate: Arc::clone(&self.forward_gate),
            outbox: self.outbox.clone(),
        };
        let source = opened.source;

        // Held until the active status is out, so no record of this session
        // can be forwarded ahead of it.
        let _gate = self.lock_gate();
        self.active_id.store(id, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", opened.interface))
            .spawn(move || capture.run(source));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.active_id.store(NO_SESSION, Ordering::SeqCst);
                error!("failed to spawn capture loop: {}", e);
                self.outbox
                    .emit(Event::error(format!("Failed to start capture: {e}")));
                return;
            }
        };

        slot.last_id = id;
        slot.state = SessionState::Running;
        slot.active = Some(Session {
            id,
            interface: opened.interface.clone(),
            running,
            handle,
            dropped_base,
        });
        info!("capture started on {}", opened.interface);
        self.outbox.emit(Event::CaptureStatus {
            active: true,
            interface: Some(opened.interface),
        });
    }

    /// Stop the running session and discard its unforwarded records.
    pub fn stop(&self) {
        let mut slot = self.lock_slot();
        self.reap(&mut slot);
        let Some(session) = slot.active.take() else {
            self.outbox.emit(Event::warning("No active capture to stop"));
            return;
        };

        slot.state = SessionState::Stopping;
        session.running.store(false, Ordering::SeqCst);
        let exit = session.handle.join().unwrap_or_else(|_| {
            warn!("capture loop on {} panicked", session.interface);
            LoopExit::Stopped
        });

        let discarded = self.retire(&mut slot, session.id);
        if exit == LoopExit::Failed {
            // Its inactive status already went out from the loop.
            self.outbox.emit(Event::warning("No active capture to stop"));
            return;
        }
        debug!(
            "session {} stopped, {} queued records discarded",
            session.id, discarded
        );
        self.outbox.emit(Event::CaptureStatus {
            active: false,
            interface: None,
        });

        info!("capture stopped on {}", session.interface);
        report_dropped(
            &self.outbox,
            self.queue.dropped().saturating_sub(session.dropped_base),
            &session.interface,
        );
    }

    /// Stop any running session, then stop the forwarding loop.
    pub fn shutdown(&mut self) {
        let running = {
            let mut slot = self.lock_slot();
            self.reap(&mut slot);
            slot.state == SessionState::Running
        };
        if running {
            self.stop();
        }
        self.forwarding.store(false, Ordering::SeqCst);
        if let Some(handle) = self.forwarder.take() {
            if handle.join().is_err() {
                warn!("forwarding loop panicked");
            }
        }
    }

    /// Return a session whose loop has already exited to `Idle`.
    fn reap(&self, slot: &mut SessionSlot) {
        let finished = slot
            .active
            .as_ref()
            .is_some_and(|session| session.handle.is_finished());
        if !finished {
            return;
        }
        if let Some(session) = slot.active.take() {
            let _ = session.handle.join();
            self.retire(slot, session.id);
            debug!("reaped terminated session {} on {}", session.id, session.interface);
        }
    }

    /// Stop forwarding records of session `id`, drop its backlog and go idle.
    /// Returns the number of discarded records.
    fn retire(&self, slot: &mut SessionSlot, id: u64) -> usize {
        let _gate = self.lock_gate();
        let _ = self
            .active_id
            .compare_exchange(id, NO_SESSION, Ordering::SeqCst, Ordering::SeqCst);
        slot.state = SessionState::Idle;
        self.queue.clear()
    }

    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        lock_gate(&self.forward_gate)
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by one session's capture thread.
struct CaptureLoop {
    id: u64,
    interface: String,
    dropped_base: u64,
    running: Arc<AtomicBool>,
    queue: Arc<BoundedQueue<Queued>>,
    active_id: Arc<AtomicU64>,
    gate: Arc<Mutex<()>>,
    outbox: Outbox,
}

impl CaptureLoop {
    fn run(self, mut source: Box<dyn LiveSource>) -> LoopExit {
        debug!("capture loop {} running on {}", self.id, self.interface);
        while self.running.load(Ordering::SeqCst) {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    self.queue.push((self.id, normalize(&frame)));
                }
                Ok(None) => {}
                Err(e) => {
                    self.fail(&e);
                    return LoopExit::Failed;
                }
            }
        }
        debug!("capture loop {} exiting", self.id);
        LoopExit::Stopped
    }

    fn fail(&self, err: &SourceError) {
        error!("capture on {} failed: {}", self.interface, err);
        {
            let _gate = lock_gate(&self.gate);
            let _ = self.active_id.compare_exchange(
                self.id,
                NO_SESSION,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            self.outbox.emit(Event::error(format!(
                "Capture failed on {}: {err}",
                self.interface
            )));
            self.outbox.emit(Event::CaptureStatus {
                active: false,
                interface: None,
            });
        }
        report_dropped(
            &self.outbox,
            self.queue.dropped().saturating_sub(self.dropped_base),
            &self.interface,
        );
    }
}

fn report_dropped(outbox: &Outbox, dropped: u64, interface: &str) {
    if dropped == 0 {
        return;
    }
    warn!("{} records dropped under load on {}", dropped, interface);
    outbox.emit(Event::info(format!(
        "Dropped {dropped} packet records under load on {interface}"
    )));
}

fn forward_loop(
    queue: &BoundedQueue<Queued>,
    active_id: &AtomicU64,
    gate: &Mutex<()>,
    forwarding: &AtomicBool,
    outbox: &Outbox,
    timeout: Duration,
) {
    while forwarding.load(Ordering::SeqCst) {
        let Some((id, record)) = queue.pop_timeout(timeout) else {
            continue;
        };
        let _gate = lock_gate(gate);
        if id == active_id.load(Ordering::SeqCst) {
            outbox.emit(Event::PacketData(record));
        }
    }
}

fn lock_gate(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::{CaptureConfig, CaptureEngine, SessionState};
    use crate::channel::outbox;
    use crate::protocol::{Event, InterfaceInfo};
    use crate::source::{CaptureBackend, LiveSource, OpenedCapture, PacketEvent, SourceError};
    use crossbeam_channel::Receiver;
    use etherparse::PacketBuilder;
    use pcap_parser::Linktype;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(3);

    struct ScriptedBackend {
        frames: Vec<Vec<u8>>,
        fail_after_frames: bool,
    }

    struct ScriptedSource {
        frames: VecDeque<Vec<u8>>,
        fail_when_empty: bool,
    }

    impl LiveSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<PacketEvent>, SourceError> {
            match self.frames.pop_front() {
                Some(data) => Ok(Some(PacketEvent {
                    ts: Some(100.0),
                    linktype: Linktype::ETHERNET,
                    data,
                })),
                None if self.fail_when_empty => {
                    Err(SourceError::Io(std::io::Error::other("link down")))
                }
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Ok(None)
                }
            }
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn open(&self, interface: Option<&str>) -> Result<OpenedCapture, SourceError> {
            let interface = interface.unwrap_or("test0");
            if interface == "missing0" {
                return Err(SourceError::InterfaceNotFound(interface.to_string()));
            }
            Ok(OpenedCapture {
                interface: interface.to_string(),
                source: Box::new(ScriptedSource {
                    frames: self.frames.iter().cloned().collect(),
                    fail_when_empty: self.fail_after_frames,
                }),
            })
        }

        fn interfaces(&self) -> Result<Vec<InterfaceInfo>, SourceError> {
            Ok(vec![
                InterfaceInfo {
                    name: "test0".to_string(),
                    address: "10.0.0.1".to_string(),
                },
                InterfaceInfo {
                    name: "dummy1".to_string(),
                    address: "Unknown".to_string(),
                },
            ])
        }
    }

    /// Waits for `go`, then yields every frame back to back and raises `done`.
    struct BurstBackend {
        frames: Vec<Vec<u8>>,
        fail_at_end: bool,
        go: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
    }

    struct BurstSource {
        frames: VecDeque<Vec<u8>>,
        fail_at_end: bool,
        go: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
    }

    impl LiveSource for BurstSource {
        fn next_frame(&mut self) -> Result<Option<PacketEvent>, SourceError> {
            if !self.go.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
                return Ok(None);
            }
            if let Some(data) = self.frames.pop_front() {
                return Ok(Some(PacketEvent {
                    ts: Some(100.0),
                    linktype: Linktype::ETHERNET,
                    data,
                }));
            }
            self.done.store(true, Ordering::SeqCst);
            if self.fail_at_end {
                return Err(SourceError::Io(std::io::Error::other("link down")));
            }
            thread::sleep(Duration::from_millis(5));
            Ok(None)
        }
    }

    impl CaptureBackend for BurstBackend {
        fn open(&self, interface: Option<&str>) -> Result<OpenedCapture, SourceError> {
            Ok(OpenedCapture {
                interface: interface.unwrap_or("burst0").to_string(),
                source: Box::new(BurstSource {
                    frames: self.frames.iter().cloned().collect(),
                    fail_at_end: self.fail_at_end,
                    go: Arc::clone(&self.go),
                    done: Arc::clone(&self.done),
                }),
            })
        }

        fn interfaces(&self) -> Result<Vec<InterfaceInfo>, SourceError> {
            Ok(Vec::new())
        }
    }

    const BURST: u16 = 2_000;

    /// Start a burst session with a four-slot queue and run the whole burst
    /// while the forwarder is held off, so the queue must overflow.
    fn overflowing_session(fail_at_end: bool) -> (CaptureEngine, Receiver<Event>) {
        let go = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let backend = Arc::new(BurstBackend {
            frames: (1..=BURST).map(udp_frame).collect(),
            fail_at_end,
            go: Arc::clone(&go),
            done: Arc::clone(&done),
        });
        let (outbox, rx) = outbox();
        let config = CaptureConfig {
            queue_capacity: 4,
            read_timeout: Duration::from_millis(10),
            forward_timeout: Duration::from_millis(10),
        };
        let engine = CaptureEngine::new(backend, outbox, config);
        engine.start(None);

        let gate = engine.lock_gate();
        go.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + WAIT;
        while !done.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(done.load(Ordering::SeqCst), "burst did not finish");
        drop(gate);
        (engine, rx)
    }

    fn dropped_count(message: &str, interface: &str) -> u64 {
        let suffix = format!(" packet records under load on {interface}");
        message
            .strip_prefix("Dropped ")
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            .and_then(|count| count.parse().ok())
            .unwrap_or_else(|| panic!("unexpected info message {message:?}"))
    }

    fn udp_frame(src_port: u16) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(src_port, 9000);
        let mut data = Vec::new();
        builder.write(&mut data, &[0u8; 4]).unwrap();
        data
    }

    fn engine(frames: Vec<Vec<u8>>, fail_after_frames: bool) -> (CaptureEngine, Receiver<Event>) {
        let (outbox, rx) = outbox();
        let backend = Arc::new(ScriptedBackend {
            frames,
            fail_after_frames,
        });
        let config = CaptureConfig {
            queue_capacity: 64,
            read_timeout: Duration::from_millis(10),
            forward_timeout: Duration::from_millis(10),
        };
        (CaptureEngine::new(backend, outbox, config), rx)
    }

    fn next_matching(rx: &Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
        let deadline = Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = rx.recv_timeout(remaining).expect("expected event");
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn start_twice_warns_without_second_status() {
        let (engine, rx) = engine(Vec::new(), false);
        engine.start(Some("test0"));
        engine.start(Some("test0"));

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Event::CaptureStatus {
                active: true,
                interface: Some("test0".to_string())
            }
        );
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Event::warning("Capture already active")
        );
        assert_eq!(engine.state(), SessionState::Running);
        assert_eq!(engine.interface().as_deref(), Some("test0"));
    }

    #[test]
    fn stop_while_idle_warns() {
        let (engine, rx) = engine(Vec::new(), false);
        engine.stop();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Event::warning("No active capture to stop")
        );
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn open_failure_reports_error_and_stays_idle() {
        let (engine, rx) = engine(Vec::new(), false);
        engine.start(Some("missing0"));
        match rx.recv_timeout(WAIT).unwrap() {
            Event::Error { message } => assert!(message.contains("missing0")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(engine.state(), SessionState::Idle);

        engine.start(None);
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Event::CaptureStatus {
                active: true,
                interface: Some("test0".to_string())
            }
        );
    }

    #[test]
    fn records_are_forwarded_in_capture_order() {
        let frames = (1..=5).map(udp_frame).collect();
        let (engine, rx) = engine(frames, false);
        engine.start(None);

        let mut ports = Vec::new();
        while ports.len() < 5 {
            let event = next_matching(&rx, |e| matches!(e, Event::PacketData(_)));
            if let Event::PacketData(record) = event {
                ports.push(record.src_port.unwrap());
            }
        }
        assert_eq!(ports, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn stop_emits_inactive_status_and_nothing_after() {
        let frames = (1..=20).map(udp_frame).collect();
        let (engine, rx) = engine(frames, false);
        engine.start(None);
        engine.stop();
        assert_eq!(engine.state(), SessionState::Idle);

        let mut seen_stop = false;
        while let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
            match event {
                Event::CaptureStatus { active: false, .. } => seen_stop = true,
                Event::PacketData(_) => assert!(!seen_stop, "record forwarded after stop"),
                _ => {}
            }
        }
        assert!(seen_stop);
    }

    #[test]
    fn failing_source_is_reaped_to_idle() {
        let (engine, rx) = engine(vec![udp_frame(7)], true);
        engine.start(None);

        next_matching(&rx, |e| matches!(e, Event::Error { .. }));
        next_matching(&rx, |e| matches!(e, Event::CaptureStatus { active: false, .. }));

        let deadline = Instant::now() + WAIT;
        while engine.state() != SessionState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(engine.state(), SessionState::Idle);
        engine.stop();
        next_matching(&rx, |e| matches!(e, Event::Warning { .. }));
    }

    #[test]
    fn interfaces_are_listed_in_one_event() {
        let (engine, rx) = engine(Vec::new(), false);
        engine.list_interfaces();
        match rx.recv_timeout(WAIT).unwrap() {
            Event::Interfaces { interfaces } => {
                assert_eq!(interfaces.len(), 2);
                assert_eq!(interfaces[1].address, "Unknown");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn shutdown_stops_running_session() {
        let (mut engine, rx) = engine(Vec::new(), false);
        engine.start(None);
        engine.shutdown();
        next_matching(&rx, |e| matches!(e, Event::CaptureStatus { active: false, .. }));
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn overflow_keeps_newest_records_and_reports_drops() {
        let (engine, rx) = overflowing_session(false);

        let mut ports = Vec::new();
        while ports.last() != Some(&BURST) {
            let event = next_matching(&rx, |e| !matches!(e, Event::CaptureStatus { .. }));
            match event {
                Event::PacketData(record) => ports.push(record.src_port.unwrap()),
                other => panic!("unexpected event during overflow {other:?}"),
            }
        }
        assert!(ports.len() < usize::from(BURST));
        assert!(ports.windows(2).all(|pair| pair[0] < pair[1]), "{ports:?}");

        engine.stop();
        assert_eq!(
            next_matching(&rx, |e| !matches!(e, Event::PacketData(_))),
            Event::CaptureStatus {
                active: false,
                interface: None
            }
        );
        match rx.recv_timeout(WAIT).unwrap() {
            Event::Info { message } => {
                let dropped = dropped_count(&message, "burst0");
                assert!(dropped + ports.len() as u64 >= u64::from(BURST) - 1, "{message}");
            }
            other => panic!("expected dropped-records info, got {other:?}"),
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn failed_session_forwards_nothing_after_inactive_status() {
        let (engine, rx) = overflowing_session(true);

        let mut events = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
            events.push(event);
        }
        let inactive = events
            .iter()
            .position(|e| matches!(e, Event::CaptureStatus { active: false, .. }))
            .expect("inactive status after failure");
        assert!(matches!(events[inactive - 1], Event::Error { .. }));
        assert!(
            !events[inactive..]
                .iter()
                .any(|e| matches!(e, Event::PacketData(_))),
            "record forwarded after inactive status"
        );
        match &events[inactive + 1] {
            Event::Info { message } => assert!(dropped_count(message, "burst0") > 0),
            other => panic!("expected dropped-records info, got {other:?}"),
        }

        engine.stop();
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Event::warning("No active capture to stop")
        );
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn active_status_precedes_first_record() {
        for _ in 0..50 {
            let (engine, rx) = engine((1..=3).map(udp_frame).collect(), false);
            engine.start(None);
            assert!(matches!(
                rx.recv_timeout(WAIT).unwrap(),
                Event::CaptureStatus { active: true, .. }
            ));
            let first = next_matching(&rx, |_| true);
            assert!(matches!(first, Event::PacketData(ref r) if r.src_port == Some(1)));
            engine.stop();
        }
    }
}
