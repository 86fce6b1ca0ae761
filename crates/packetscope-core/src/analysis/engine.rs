//! Offline analysis job lifecycle.
//!
//! The dispatcher starts and cancels jobs; the worker thread performs the
//! terminal transition (`Completed`, `Failed`, or back to `Idle` after a
//! cancel) under the same lock, so `cancelling` is always emitted before
//! `cancelled`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use super::{AnalysisHooks, Outcome, analyze_source};
use crate::StatisticsReport;
use crate::channel::Outbox;
use crate::protocol::{AnalysisStatus, Event};
use crate::source::PcapFileSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Cancelling,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Running | JobState::Cancelling)
    }
}

#[derive(Debug)]
struct JobSlot {
    state: JobState,
    report: Option<StatisticsReport>,
}

pub struct AnalysisEngine {
    outbox: Outbox,
    slot: Arc<Mutex<JobSlot>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AnalysisEngine {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            slot: Arc::new(Mutex::new(JobSlot {
                state: JobState::Idle,
                report: None,
            })),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> JobState {
        lock(&self.slot).state
    }

    /// Start analysing `path` on a worker thread.
    ///
    /// Rejected with a `warning` while another job is active. A missing or
    /// unreadable file yields an `error` and creates no job.
    pub fn analyze(&mut self, path: &Path) {
        if self.state().is_active() {
            self.outbox.emit(Event::warning("Analysis already in progress"));
            return;
        }
        if !path.exists() {
            self.outbox
                .emit(Event::error(format!("File not found: {}", path.display())));
            return;
        }
        let source = match PcapFileSource::open(path) {
            Ok(source) => source,
            Err(e) => {
                warn!("cannot open {}: {}", path.display(), e);
                self.outbox.emit(Event::error(format!("Analysis failed: {e}")));
                return;
            }
        };

        if let Some(previous) = self.worker.take() {
            let _ = previous.join();
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Arc::clone(&cancel);
        let file = path.display().to_string();
        {
            let mut slot = lock(&self.slot);
            slot.state = JobState::Running;
            self.outbox.emit(Event::AnalysisStatus {
                status: AnalysisStatus::Started,
                file: Some(file.clone()),
            });
        }
        info!("analysis started: {}", file);

        let spawned = {
            let slot = Arc::clone(&self.slot);
            let outbox = self.outbox.clone();
            let file = file.clone();
            thread::Builder::new()
                .name("analysis".to_string())
                .spawn(move || run_job(&file, source, &cancel, &slot, &outbox))
        };
        match spawned {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                error!("failed to spawn analysis worker: {}", e);
                lock(&self.slot).state = JobState::Failed;
                self.outbox.emit(Event::error(format!("Analysis failed: {e}")));
                self.outbox
                    .emit(Event::analysis_status(AnalysisStatus::Error));
            }
        }
    }

    /// Request cooperative cancellation of the running job.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        if slot.state != JobState::Running {
            self.outbox.emit(Event::warning("No analysis in progress"));
            return;
        }
        self.cancel.store(true, Ordering::SeqCst);
        slot.state = JobState::Cancelling;
        debug!("analysis cancellation requested");
        self.outbox
            .emit(Event::analysis_status(AnalysisStatus::Cancelling));
    }

    /// Re-emit the last completed report.
    pub fn get_results(&self) {
        match lock(&self.slot).report.clone() {
            Some(report) => self.outbox.emit(Event::AnalysisResults(report)),
            None => self
                .outbox
                .emit(Event::warning("No analysis results available")),
        }
    }

    /// Signal the running job to stop and abandon its worker.
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.worker.take().is_some() {
            debug!("abandoning analysis worker");
        }
    }
}

struct JobHooks<'a> {
    cancel: &'a AtomicBool,
    outbox: &'a Outbox,
}

impl AnalysisHooks for JobHooks<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn on_progress(&mut self, progress: u8) {
        self.outbox.emit(Event::AnalysisProgress { progress });
    }
}

fn run_job(
    file: &str,
    source: PcapFileSource,
    cancel: &AtomicBool,
    slot: &Mutex<JobSlot>,
    outbox: &Outbox,
) {
    let mut hooks = JobHooks { cancel, outbox };
    let result = analyze_source(source, &mut hooks);

    let mut slot = lock(slot);
    match result {
        Ok(Outcome::Completed(report)) if !cancel.load(Ordering::SeqCst) => {
            info!(
                "analysis completed: {} ({} frames)",
                file, report.packet_count
            );
            slot.report = Some(report.clone());
            slot.state = JobState::Completed;
            outbox.emit(Event::AnalysisResults(report));
            outbox.emit(Event::analysis_status(AnalysisStatus::Completed));
        }
        Ok(_) => {
            info!("analysis cancelled: {}", file);
            slot.state = JobState::Idle;
            outbox.emit(Event::analysis_status(AnalysisStatus::Cancelled));
        }
        Err(e) => {
            error!("analysis of {} failed: {}", file, e);
            slot.state = JobState::Failed;
            outbox.emit(Event::error(format!("Analysis failed: {e}")));
            outbox.emit(Event::analysis_status(AnalysisStatus::Error));
        }
    }
}

fn lock(slot: &Mutex<JobSlot>) -> MutexGuard<'_, JobSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
