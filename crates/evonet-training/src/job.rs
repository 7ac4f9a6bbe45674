//! One training job: a network trained for one generation in one slot.

use std::time::{Duration, Instant};

use evonet_network::Network;
use ndarray::s;

use crate::{
    RunContext, TrainError,
    report::ProgressEvent,
    seed::{self, SeedPurpose},
};

/// A trained network and its final errors.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub slot: usize,
    pub network: Network,
    /// Mean absolute error over the whole train split after training.
    pub train_error: f64,
    /// Mean absolute error over the validation split after training.
    pub validation_error: f64,
}

/// Trains `network` over the configured epoch/batch/loop schedule.
///
/// The network is checkpointed as job `slot` after every batch. Cancellation
/// is checked before each batch and between back-propagation iterations; a
/// batch interrupted by cancellation is not checkpointed.
pub fn run_job(
    ctx: &RunContext,
    generation: usize,
    slot: usize,
    mut network: Network,
) -> Result<JobResult, TrainError> {
    let training = &ctx.config.training;
    let params = training.train_params();
    let report_interval = Duration::from_secs(training.report_interval_secs);
    let (train_x, train_y) = ctx.dataset.train();
    let (validation_x, validation_y) = ctx.dataset.validation();

    let rows = train_x.nrows();
    let batch_size = match training.batch_size {
        0 => rows,
        size => size.min(rows),
    }
    .max(1);
    let batch_count = rows.div_ceil(batch_size);

    let mut rng = seed::rng_for(ctx.config.seed, SeedPurpose::Job, generation, slot);
    let mut last_report: Option<Instant> = None;

    for epoch in 0..training.epochs {
        for batch in 0..batch_count {
            if ctx.cancel.is_cancelled() {
                return Err(TrainError::Cancelled { generation });
            }
            let start = batch * batch_size;
            let end = usize::min(start + batch_size, rows);
            let Some(batch_error) = network.train_interruptible(
                train_x.slice(s![start..end, ..]),
                train_y.slice(s![start..end, ..]),
                &params,
                &mut rng,
                || ctx.cancel.is_cancelled(),
            ) else {
                return Err(TrainError::Cancelled { generation });
            };
            ctx.store.save_job(slot, &network)?;

            if last_report.is_none_or(|at| at.elapsed() >= report_interval) {
                let validation = network.evaluate(validation_x, validation_y).summary;
                ctx.reporter.job_progress(&ProgressEvent {
                    generation,
                    job: slot,
                    epoch,
                    batch,
                    batch_count,
                    train_error: batch_error,
                    validation,
                });
                last_report = Some(Instant::now());
            }
        }
    }

    let train_error = network.evaluate(train_x, train_y).summary.mean_abs_error;
    let validation_error = network
        .evaluate(validation_x, validation_y)
        .summary
        .mean_abs_error;
    log::debug!(
        "generation {generation} job {slot} finished: train {train_error:.6}, validation {validation_error:.6}"
    );
    Ok(JobResult {
        slot,
        network,
        train_error,
        validation_error,
    })
}
