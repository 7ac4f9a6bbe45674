//! Evolutionary training of small feed-forward networks.
//!
//! Plain back-propagation gets stuck in local minima on the arithmetic
//! datasets. This crate trains a whole population of networks in parallel,
//! keeps the best of them (the elites) and breeds the next generation from the
//! elites with the allele operators of `evonet-network`.
//!
//! # Generation cycle
//!
//! ```text
//! population (N networks)
//!     | train every slot in parallel        (job)
//!     v
//! N job results  --- barrier: all N must report, else JobIncomplete
//!     | merge with previous elites, keep top K   (population)
//!     v
//! K elites
//!     | copy / crossover / mutate                (breeding)
//!     v
//! next population (N networks), persisted       (checkpoint)
//! ```
//!
//! `K = max(1, N / 5)`.
//!
//! # Modules
//!
//! - [`config`]: [`RunConfig`] and its validation
//! - [`orchestrator`]: [`RunContext`] and [`EvolutionState`], the generation loop
//! - [`job`]: the per-slot epoch/batch schedule
//! - [`population`] and [`breeding`]: selection and the next population
//! - [`checkpoint`]: the [`CheckpointStore`] contract and an in-memory store
//! - [`report`]: structured progress events for a [`Reporter`]
//! - [`inspect`]: read-only queries over a stored run
//! - [`seed`]: deterministic per-purpose random streams
//!
//! # Resuming
//!
//! Every random stream is derived from the run seed, the generation and the
//! slot, and the population is persisted after every generation. Resuming
//! from the store therefore reproduces the generations an uninterrupted run
//! would have produced.

pub use self::{
    cancel::CancelToken,
    checkpoint::{CheckpointStore, MemoryCheckpointStore, Progress, SlotCheckpoint},
    config::{ConfigError, EvolutionParams, RunConfig, TrainingParams},
    error::{CheckpointError, CheckpointItem, TrainError},
    orchestrator::{EvolutionState, RunContext},
    population::Elite,
    report::{GenerationSummary, NullReporter, ProgressEvent, Reporter},
};

pub mod breeding;
mod cancel;
pub mod checkpoint;
pub mod config;
mod error;
pub mod inspect;
pub mod job;
pub mod orchestrator;
pub mod population;
pub mod report;
pub mod seed;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evonet_dataset::{Dataset, Encoding, Problem, ProblemDomain};

    use crate::{CancelToken, CheckpointStore, NullReporter, RunConfig, RunContext};

    /// Eight two-bit additions with a 6/2 train/validation split.
    pub(crate) fn toy_dataset() -> Dataset {
        let problems = [(0, 1), (1, 2), (2, 3), (3, 3), (1, 1), (2, 0), (3, 1), (0, 2)]
            .into_iter()
            .map(|(a, b)| Problem::new(a, b, a + b))
            .collect();
        let encoding = Encoding {
            input_bits: 4,
            output_bits: 4,
            input_factor: 1,
        };
        Dataset::from_problems(ProblemDomain::Add, encoding, 25, problems).unwrap()
    }

    /// Population 4 (one elite) of 4x8x4 networks on [`toy_dataset`].
    pub(crate) fn toy_context(store: Arc<dyn CheckpointStore>, cancel: CancelToken) -> RunContext {
        let mut config = RunConfig::new(ProblemDomain::Add, 11);
        config.input_quantity = 8;
        config.validation_percent = 25;
        config.training.batch_size = 0;
        config.training.epochs = 1;
        config.training.loops_per_batch = 5;
        config.training.learn_rate = 0.5;
        config.evolution.population_size = 4;
        config.evolution.evolutions = 3;
        RunContext {
            config,
            dataset: toy_dataset(),
            store,
            reporter: Arc::new(NullReporter),
            cancel,
        }
    }
}
