//! Persistence contract of a run.
//!
//! A [`CheckpointStore`] holds everything needed to resume a run at the start
//! of its next generation:
//!
//! - the [`RunConfig`] and the [`Dataset`] (written once when the run starts)
//! - one network per population slot, keyed by the generation it starts and
//!   the slot index
//! - the [`Progress`] record: the next generation to run and the elites
//!   carried into it
//! - the latest network of every job, rewritten after each trained batch
//!
//! Slots of different generations never overwrite each other. The orchestrator
//! writes every slot of the next generation, then the progress record, and
//! only then discards the slots of the generation before it. Writing the
//! progress record is the commit point: until it succeeds, the previous
//! progress record still names a generation whose slots are all intact.
//!
//! Stores are shared by all workers of a generation and must be usable through
//! `&self` from many threads.

use std::{collections::BTreeMap, sync::Mutex};

use evonet_dataset::Dataset;
use evonet_network::Network;

use crate::{CheckpointError, CheckpointItem, Elite, RunConfig};

/// A population slot as persisted: its network and the generation it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCheckpoint {
    pub generation: usize,
    pub network: Network,
}

/// Where a run stands between two generations.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Generation whose population is stored in the slots.
    pub next_generation: usize,
    /// Top-K of all finished generations, best first.
    pub elites: Vec<Elite>,
}

pub trait CheckpointStore: Send + Sync {
    fn save_run_config(&self, config: &RunConfig) -> Result<(), CheckpointError>;
    fn load_run_config(&self) -> Result<RunConfig, CheckpointError>;

    fn save_dataset(&self, dataset: &Dataset) -> Result<(), CheckpointError>;
    fn load_dataset(&self) -> Result<Dataset, CheckpointError>;

    fn save_slot(
        &self,
        generation: usize,
        slot: usize,
        network: &Network,
    ) -> Result<(), CheckpointError>;
    fn load_slot(&self, generation: usize, slot: usize) -> Result<SlotCheckpoint, CheckpointError>;
    /// Removes slots `0..count` of `generation`; slots that do not exist are ignored.
    fn discard_slots(&self, generation: usize, count: usize) -> Result<(), CheckpointError>;

    fn save_job(&self, job: usize, network: &Network) -> Result<(), CheckpointError>;
    fn load_job(&self, job: usize) -> Result<Network, CheckpointError>;

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError>;
    fn load_progress(&self) -> Result<Progress, CheckpointError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    run_config: Option<RunConfig>,
    dataset: Option<Dataset>,
    progress: Option<Progress>,
    slots: BTreeMap<(usize, usize), SlotCheckpoint>,
    jobs: BTreeMap<usize, Network>,
}

/// A store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<MemoryState>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }
}

fn missing(item: CheckpointItem) -> CheckpointError {
    CheckpointError::Missing {
        item,
        location: "memory".to_owned(),
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save_run_config(&self, config: &RunConfig) -> Result<(), CheckpointError> {
        self.with_state(|state| state.run_config = Some(config.clone()));
        Ok(())
    }

    fn load_run_config(&self) -> Result<RunConfig, CheckpointError> {
        self.with_state(|state| state.run_config.clone())
            .ok_or_else(|| missing(CheckpointItem::RunConfig))
    }

    fn save_dataset(&self, dataset: &Dataset) -> Result<(), CheckpointError> {
        self.with_state(|state| state.dataset = Some(dataset.clone()));
        Ok(())
    }

    fn load_dataset(&self) -> Result<Dataset, CheckpointError> {
        self.with_state(|state| state.dataset.clone())
            .ok_or_else(|| missing(CheckpointItem::Dataset))
    }

    fn save_slot(
        &self,
        generation: usize,
        slot: usize,
        network: &Network,
    ) -> Result<(), CheckpointError> {
        let checkpoint = SlotCheckpoint {
            generation,
            network: network.clone(),
        };
        self.with_state(|state| state.slots.insert((generation, slot), checkpoint));
        Ok(())
    }

    fn load_slot(&self, generation: usize, slot: usize) -> Result<SlotCheckpoint, CheckpointError> {
        self.with_state(|state| state.slots.get(&(generation, slot)).cloned())
            .ok_or_else(|| missing(CheckpointItem::Slot { generation, slot }))
    }

    fn discard_slots(&self, generation: usize, count: usize) -> Result<(), CheckpointError> {
        self.with_state(|state| {
            for slot in 0..count {
                state.slots.remove(&(generation, slot));
            }
        });
        Ok(())
    }

    fn save_job(&self, job: usize, network: &Network) -> Result<(), CheckpointError> {
        self.with_state(|state| state.jobs.insert(job, network.clone()));
        Ok(())
    }

    fn load_job(&self, job: usize) -> Result<Network, CheckpointError> {
        self.with_state(|state| state.jobs.get(&job).cloned())
            .ok_or_else(|| missing(CheckpointItem::Job(job)))
    }

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError> {
        self.with_state(|state| state.progress = Some(progress.clone()));
        Ok(())
    }

    fn load_progress(&self) -> Result<Progress, CheckpointError> {
        self.with_state(|state| state.progress.clone())
            .ok_or_else(|| missing(CheckpointItem::Progress))
    }
}
