use chrono::Local;
use evonet_training::{GenerationSummary, ProgressEvent, Reporter};

/// Writes progress as log lines stamped with the local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn job_progress(&self, event: &ProgressEvent) {
        let ProgressEvent {
            generation,
            job,
            epoch,
            batch,
            batch_count,
            train_error,
            validation,
        } = event;
        log::info!(
            "{} gen {generation} job {job:>2} epoch {epoch} batch {}/{batch_count}: train {train_error:.6} validation {:.6} (low {}, high {})",
            Local::now().format("%H:%M"),
            batch + 1,
            validation.mean_abs_error,
            validation.low_saturated,
            validation.high_saturated,
        );
    }

    fn generation_finished(&self, summary: &GenerationSummary) {
        let errors = summary
            .top_validation_errors
            .iter()
            .map(|e| format!("{e:.6}"))
            .collect::<Vec<_>>()
            .join(", ");
        log::info!(
            "{} gen {} top validation errors: [{errors}]",
            Local::now().format("%H:%M"),
            summary.generation,
        );
    }
}
