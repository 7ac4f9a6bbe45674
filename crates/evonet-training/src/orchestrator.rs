//! Generation loop.
//!
//! ```text
//! INIT -> { RUN_GENERATION -> SELECT_TOP -> BREED_NEXT } x evolutions
//! ```
//!
//! [`EvolutionState::fresh`] and [`EvolutionState::resume`] cover `INIT`.
//! [`EvolutionState::run_generation`] runs one full cycle: it trains every
//! slot on its own worker thread, waits for all of them (the barrier), merges
//! the results with the previous elites, breeds the next population, and
//! persists it.
//!
//! A generation only advances when every job reported a result and the next
//! population was committed to the store. Otherwise the state is left
//! untouched and the error is returned ([`TrainError::JobIncomplete`] for a
//! missing result).
//!
//! Committing writes the next generation's slots under their own generation,
//! then the progress record. The slots of the generation that was just trained
//! are discarded only after the progress record is written, so a failure at
//! any point leaves the last committed generation resumable.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    thread,
};

use evonet_dataset::Dataset;
use evonet_network::Network;

use crate::{
    CancelToken, CheckpointError, CheckpointItem, CheckpointStore, Elite, Progress, Reporter,
    RunConfig, TrainError,
    breeding::breed_next,
    job::{JobResult, run_job},
    population::select_top,
    report::GenerationSummary,
    seed::{self, SeedPurpose},
};

/// Everything a run needs, built once at startup.
#[derive(Clone)]
pub struct RunContext {
    pub config: RunConfig,
    pub dataset: Dataset,
    pub store: Arc<dyn CheckpointStore>,
    pub reporter: Arc<dyn Reporter>,
    pub cancel: CancelToken,
}

/// Job results of one generation, written once per slot by the workers.
#[derive(Debug, Default)]
struct ResultBoard {
    results: Mutex<BTreeMap<usize, JobResult>>,
}

impl ResultBoard {
    fn insert(&self, result: JobResult) {
        let mut results = self
            .results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        results.entry(result.slot).or_insert(result);
    }

    /// All results in slot order, or the slots that never reported.
    fn into_complete(
        self,
        generation: usize,
        population_size: usize,
    ) -> Result<Vec<JobResult>, TrainError> {
        let mut results = self
            .results
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let missing: Vec<usize> = (0..population_size)
            .filter(|slot| !results.contains_key(slot))
            .collect();
        if !missing.is_empty() {
            return Err(TrainError::JobIncomplete {
                generation,
                missing,
            });
        }
        Ok((0..population_size)
            .filter_map(|slot| results.remove(&slot))
            .collect())
    }
}

/// Population state between two generations.
#[derive(Debug, Clone)]
pub struct EvolutionState {
    next_generation: usize,
    population: Vec<Network>,
    elites: Vec<Elite>,
}

impl EvolutionState {
    /// Starts a new run: persists the configuration and dataset, and creates
    /// generation 0 from freshly seeded networks.
    pub fn fresh(ctx: &RunContext) -> Result<Self, TrainError> {
        let config = &ctx.config;
        config.validate()?;
        config.validate_dataset(&ctx.dataset)?;
        let bounds = config.allele_bounds()?;
        let sizes = config.layer_sizes(&ctx.dataset.encoding());

        ctx.store.save_run_config(config)?;
        ctx.store.save_dataset(&ctx.dataset)?;

        let population = (0..config.evolution.population_size)
            .map(|slot| {
                let seed = seed::derive_seed(config.seed, SeedPurpose::Network, 0, slot);
                Network::with_allele_bounds(sizes, bounds, seed)
            })
            .collect::<Result<Vec<_>, _>>()?;

        commit(ctx, 0, &population, &[])?;
        let state = Self {
            next_generation: 0,
            population,
            elites: vec![],
        };
        log::info!(
            "started {} run: population {}, layer sizes {}x{}x{}",
            config.domain,
            config.evolution.population_size,
            sizes.input,
            sizes.hidden,
            sizes.output,
        );
        Ok(state)
    }

    /// Restores the population of the last fully completed generation.
    pub fn resume(ctx: &RunContext) -> Result<Self, TrainError> {
        let config = &ctx.config;
        config.validate()?;
        config.validate_dataset(&ctx.dataset)?;
        let sizes = config.layer_sizes(&ctx.dataset.encoding());

        let Progress {
            next_generation,
            elites,
        } = ctx.store.load_progress()?;
        let mut population = Vec::with_capacity(config.evolution.population_size);
        for slot in 0..config.evolution.population_size {
            let item = CheckpointItem::Slot {
                generation: next_generation,
                slot,
            };
            let checkpoint = ctx.store.load_slot(next_generation, slot)?;
            if checkpoint.generation != next_generation {
                return Err(CheckpointError::Inconsistent {
                    item,
                    reason: format!(
                        "slot holds generation {}, progress expects generation {next_generation}",
                        checkpoint.generation
                    ),
                }
                .into());
            }
            if checkpoint.network.sizes() != sizes {
                return Err(CheckpointError::Inconsistent {
                    item,
                    reason: format!(
                        "network sizes {:?} do not match the run's {sizes:?}",
                        checkpoint.network.sizes()
                    ),
                }
                .into());
            }
            population.push(checkpoint.network);
        }
        log::info!("resuming {} run at generation {next_generation}", config.domain);
        Ok(Self {
            next_generation,
            population,
            elites,
        })
    }

    #[must_use]
    pub fn next_generation(&self) -> usize {
        self.next_generation
    }

    /// Networks that the next generation starts from, in slot order.
    #[must_use]
    pub fn population(&self) -> &[Network] {
        &self.population
    }

    /// Elites of all finished generations, best first.
    #[must_use]
    pub fn elites(&self) -> &[Elite] {
        &self.elites
    }

    /// Runs `count` generations.
    pub fn run_generations(&mut self, ctx: &RunContext, count: usize) -> Result<(), TrainError> {
        for _ in 0..count {
            self.run_generation(ctx)?;
        }
        Ok(())
    }

    /// Trains, selects and breeds one generation.
    ///
    /// On error the state still describes the last committed generation.
    pub fn run_generation(&mut self, ctx: &RunContext) -> Result<GenerationSummary, TrainError> {
        let generation = self.next_generation;
        let evolution = &ctx.config.evolution;
        log::info!("generation {generation}: training {} jobs", self.population.len());

        let results = train_population(ctx, generation, &self.population)?;
        let current = results
            .into_iter()
            .map(|result| Elite::from_result(generation, result))
            .collect();
        let elites = select_top(current, self.elites.clone(), evolution.top_k());

        let mut rng = seed::rng_for(ctx.config.seed, SeedPurpose::Breed, generation, 0);
        let population = breed_next(
            &elites,
            evolution.population_size,
            evolution.swap_percent,
            evolution.mutate_percent,
            &mut rng,
        );
        commit(ctx, generation + 1, &population, &elites)?;
        if let Err(err) = ctx.store.discard_slots(generation, self.population.len()) {
            log::warn!("could not discard the slots of generation {generation}: {err}");
        }
        self.population = population;
        self.elites = elites;
        self.next_generation = generation + 1;

        let summary = GenerationSummary {
            generation,
            top_validation_errors: self.elites.iter().map(|e| e.validation_error).collect(),
        };
        if let Some(best) = self.elites.first() {
            log::info!(
                "generation {generation} done: best validation error {:.6} (generation {} job {})",
                best.validation_error,
                best.generation,
                best.slot,
            );
        }
        ctx.reporter.generation_finished(&summary);
        Ok(summary)
    }
}

/// Writes every slot of `generation`, then the progress record naming it.
fn commit(
    ctx: &RunContext,
    generation: usize,
    population: &[Network],
    elites: &[Elite],
) -> Result<(), CheckpointError> {
    for (slot, network) in population.iter().enumerate() {
        ctx.store.save_slot(generation, slot, network)?;
    }
    ctx.store.save_progress(&Progress {
        next_generation: generation,
        elites: elites.to_vec(),
    })
}

/// Trains every network on its own thread and waits for all of them.
fn train_population(
    ctx: &RunContext,
    generation: usize,
    population: &[Network],
) -> Result<Vec<JobResult>, TrainError> {
    let board = ResultBoard::default();
    thread::scope(|s| {
        let handles: Vec<_> = population
            .iter()
            .enumerate()
            .map(|(slot, network)| {
                let network = network.clone();
                let board = &board;
                let handle = s.spawn(move || match run_job(ctx, generation, slot, network) {
                    Ok(result) => board.insert(result),
                    Err(TrainError::Cancelled { .. }) => {
                        log::debug!("generation {generation} job {slot} cancelled");
                    }
                    Err(err) => log::error!("generation {generation} job {slot} failed: {err}"),
                });
                (slot, handle)
            })
            .collect();
        for (slot, handle) in handles {
            if handle.join().is_err() {
                log::error!("generation {generation} job {slot} panicked");
            }
        }
    });

    if ctx.cancel.is_cancelled() {
        return Err(TrainError::Cancelled { generation });
    }
    board.into_complete(generation, population.len())
}
