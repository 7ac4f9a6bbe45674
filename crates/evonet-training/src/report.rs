//! Structured progress events.
//!
//! The trainer never formats anything itself; it hands these events to a
//! [`Reporter`].

use evonet_network::ErrorSummary;

/// Position and current errors of one running job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub generation: usize,
    pub job: usize,
    pub epoch: usize,
    pub batch: usize,
    pub batch_count: usize,
    /// Mean training error of the last batch.
    pub train_error: f64,
    pub validation: ErrorSummary,
}

/// Outcome of one finished generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: usize,
    /// Validation errors of the elites after selection, best first.
    pub top_validation_errors: Vec<f64>,
}

pub trait Reporter: Send + Sync {
    fn job_progress(&self, event: &ProgressEvent);
    fn generation_finished(&self, summary: &GenerationSummary);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn job_progress(&self, _event: &ProgressEvent) {}
    fn generation_finished(&self, _summary: &GenerationSummary) {}
}
