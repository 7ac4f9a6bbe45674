//! Read-only queries over a stored run.
//!
//! Nothing here writes to the [`CheckpointStore`]; every query works on the
//! job networks of the last run and the run's stored dataset.

use evonet_dataset::{Answer, Dataset};
use evonet_network::{ErrorSummary, Network};

use crate::{CheckpointStore, TrainError};

/// Errors of one stored job network on both splits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobReport {
    pub job: usize,
    pub train: ErrorSummary,
    pub validation: ErrorSummary,
}

/// Every job of the last run.
#[derive(Debug, Clone, PartialEq)]
pub struct LastRun {
    /// Jobs sorted by validation error, worst first.
    pub jobs: Vec<JobReport>,
    /// The two jobs with the lowest validation error, best first.
    pub best: Vec<JobReport>,
}

/// A job report together with its decoded validation predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInspection {
    pub report: JobReport,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub job: usize,
    pub answer: Answer,
}

fn report(job: usize, network: &Network, dataset: &Dataset) -> JobReport {
    let (train_x, train_y) = dataset.train();
    let (validation_x, validation_y) = dataset.validation();
    JobReport {
        job,
        train: network.evaluate(train_x, train_y).summary,
        validation: network.evaluate(validation_x, validation_y).summary,
    }
}

fn job_reports(store: &dyn CheckpointStore) -> Result<(Dataset, Vec<JobReport>), TrainError> {
    let config = store.load_run_config()?;
    let dataset = store.load_dataset()?;
    let reports = (0..config.evolution.population_size)
        .map(|job| -> Result<_, TrainError> {
            let network = store.load_job(job)?;
            Ok(report(job, &network, &dataset))
        })
        .collect::<Result<Vec<_>, TrainError>>()?;
    Ok((dataset, reports))
}

fn by_validation_error(a: &JobReport, b: &JobReport) -> std::cmp::Ordering {
    a.validation
        .mean_abs_error
        .total_cmp(&b.validation.mean_abs_error)
}

/// Evaluates every job network of the last run.
pub fn last_run(store: &dyn CheckpointStore) -> Result<LastRun, TrainError> {
    let (_, mut jobs) = job_reports(store)?;
    jobs.sort_by(by_validation_error);
    let best = jobs.iter().take(2).copied().collect();
    jobs.reverse();
    Ok(LastRun { jobs, best })
}

/// Inspects one job: error summaries plus decoded validation predictions.
pub fn check_job(store: &dyn CheckpointStore, job: usize) -> Result<JobInspection, TrainError> {
    let dataset = store.load_dataset()?;
    let network = store.load_job(job)?;
    inspection(job, &network, &dataset)
}

/// Inspects the job with the lowest validation error.
pub fn best_job(store: &dyn CheckpointStore) -> Result<JobInspection, TrainError> {
    let (dataset, best) = best_network(store)?;
    inspection(best.0, &best.1, &dataset)
}

/// Answers a question with the job network that has the lowest validation
/// error.
pub fn predict(store: &dyn CheckpointStore, operands: &[u64]) -> Result<Prediction, TrainError> {
    let (dataset, (job, network)) = best_network(store)?;
    let input = dataset.encode_query(operands)?;
    let output = network.predict(input.view());
    let answer = dataset.decode_row(input.row(0), output.row(0));
    Ok(Prediction { job, answer })
}

fn best_network(store: &dyn CheckpointStore) -> Result<(Dataset, (usize, Network)), TrainError> {
    let (dataset, reports) = job_reports(store)?;
    let best = reports
        .iter()
        .min_by(|a, b| by_validation_error(a, b))
        .map(|report| report.job)
        .unwrap_or_default();
    let network = store.load_job(best)?;
    Ok((dataset, (best, network)))
}

fn inspection(job: usize, network: &Network, dataset: &Dataset) -> Result<JobInspection, TrainError> {
    let (validation_x, _) = dataset.validation();
    let predictions = network.predict(validation_x);
    let answers = dataset.decode(validation_x, predictions.view())?;
    Ok(JobInspection {
        report: report(job, network, dataset),
        answers,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{CancelToken, EvolutionState, MemoryCheckpointStore, tests::toy_context};

    fn trained_store() -> Arc<MemoryCheckpointStore> {
        let store = Arc::new(MemoryCheckpointStore::new());
        let ctx = toy_context(store.clone(), CancelToken::new());
        let mut state = EvolutionState::fresh(&ctx).unwrap();
        state.run_generation(&ctx).unwrap();
        store
    }

    #[test]
    fn test_last_run_orders_jobs() {
        let store = trained_store();
        let last = last_run(store.as_ref()).unwrap();
        assert_eq!(last.jobs.len(), 4);
        assert!(
            last.jobs
                .windows(2)
                .all(|w| w[0].validation.mean_abs_error >= w[1].validation.mean_abs_error)
        );
        assert_eq!(last.best.len(), 2);
        assert_eq!(last.best[0], last.jobs[3]);
        assert_eq!(last.best[1], last.jobs[2]);
    }

    #[test]
    fn test_best_job_has_lowest_validation_error() {
        let store = trained_store();
        let last = last_run(store.as_ref()).unwrap();
        let best = best_job(store.as_ref()).unwrap();
        assert_eq!(best.report.job, last.best[0].job);
        assert_eq!(best.answers.len(), 2);
    }

    #[test]
    fn test_check_job_missing() {
        let store = trained_store();
        assert!(check_job(store.as_ref(), 1).is_ok());
        assert!(matches!(
            check_job(store.as_ref(), 9),
            Err(TrainError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_predict_decodes_operands() {
        let store = trained_store();
        let prediction = predict(store.as_ref(), &[2, 3]).unwrap();
        assert_eq!((prediction.answer.problem.a, prediction.answer.problem.b), (2, 3));
        assert_eq!(
            prediction.answer.correct,
            prediction.answer.problem.answer == 5
        );
        assert!(predict(store.as_ref(), &[9, 3]).is_err());
    }
}
