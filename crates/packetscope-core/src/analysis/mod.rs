use std::path::Path;

use thiserror::Error;

use crate::StatisticsReport;
use crate::source::{PacketEvent, PacketSource, PcapFileSource, SourceError};

pub mod engine;
mod tally;

use tally::Tally;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Observer for a running analysis.
pub trait AnalysisHooks {
    /// Checked before every frame; returning `true` aborts the run.
    fn is_cancelled(&self) -> bool {
        false
    }

    fn on_progress(&mut self, _progress: u8) {}
}

/// Hooks that never cancel and ignore progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl AnalysisHooks for NoHooks {}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(StatisticsReport),
    Cancelled,
}

/// Analyse a capture file in one pass with no progress or cancellation.
pub fn analyze_pcap_file(path: &Path) -> Result<StatisticsReport, AnalysisError> {
    let mut source = PcapFileSource::open(path)?;
    let mut tally = Tally::default();
    while let Some(frame) = source.next_packet()? {
        tally.observe(&frame);
    }
    Ok(tally.finish())
}

/// Load every frame from `source`, then accumulate statistics over them.
///
/// Progress is reported every `max(100, total / 100)` frames and on the final
/// frame; an empty source reports 100 once. Cancellation is checked before
/// every frame in both phases and discards all partial results.
pub fn analyze_source<S, H>(mut source: S, hooks: &mut H) -> Result<Outcome, AnalysisError>
where
    S: PacketSource,
    H: AnalysisHooks + ?Sized,
{
    let mut frames: Vec<PacketEvent> = Vec::new();
    while let Some(frame) = source.next_packet()? {
        if hooks.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        frames.push(frame);
    }

    let total = frames.len();
    if total == 0 {
        if hooks.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        hooks.on_progress(100);
        return Ok(Outcome::Completed(Tally::default().finish()));
    }

    let batch = progress_batch(total);
    let mut tally = Tally::default();
    for (i, frame) in frames.iter().enumerate() {
        if hooks.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        tally.observe(frame);
        if i % batch == 0 || i + 1 == total {
            hooks.on_progress(progress_percent(i + 1, total));
        }
    }
    Ok(Outcome::Completed(tally.finish()))
}

fn progress_batch(total: usize) -> usize {
    (total / 100).max(100)
}

fn progress_percent(processed: usize, total: usize) -> u8 {
    let percent = (processed as u128 * 100) / total.max(1) as u128;
    percent.min(100) as u8
}
