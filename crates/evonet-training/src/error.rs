use evonet_dataset::DatasetError;
use evonet_network::ResourceError;

use crate::ConfigError;

/// One persisted item of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CheckpointItem {
    #[display("run config")]
    RunConfig,
    #[display("dataset")]
    Dataset,
    #[display("progress")]
    Progress,
    #[display("slot {slot} of generation {generation}")]
    Slot { generation: usize, slot: usize },
    #[display("job {_0}")]
    Job(usize),
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CheckpointError {
    #[display("{item} checkpoint not found at {location}")]
    Missing {
        item: CheckpointItem,
        location: String,
    },
    #[display("{item} checkpoint at {location} is corrupt: {reason}")]
    Corrupt {
        item: CheckpointItem,
        location: String,
        reason: String,
    },
    #[display("failed to write {item} checkpoint to {location}: {reason}")]
    Write {
        item: CheckpointItem,
        location: String,
        reason: String,
    },
    #[display("{item} checkpoint is inconsistent: {reason}")]
    Inconsistent {
        item: CheckpointItem,
        reason: String,
    },
}

impl CheckpointError {
    /// The item the error refers to.
    #[must_use]
    pub fn item(&self) -> CheckpointItem {
        match self {
            Self::Missing { item, .. }
            | Self::Corrupt { item, .. }
            | Self::Write { item, .. }
            | Self::Inconsistent { item, .. } => *item,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::IsVariant)]
pub enum TrainError {
    #[display("invalid configuration: {_0}")]
    Config(ConfigError),
    #[display("{_0}")]
    Resource(ResourceError),
    #[display("{_0}")]
    Checkpoint(CheckpointError),
    #[display("dataset error: {_0}")]
    Dataset(DatasetError),
    #[display("generation {generation} aborted: jobs {missing:?} did not report a result")]
    JobIncomplete {
        generation: usize,
        missing: Vec<usize>,
    },
    #[display("cancelled during generation {generation}")]
    Cancelled { generation: usize },
}

impl From<ConfigError> for TrainError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<ResourceError> for TrainError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

impl From<CheckpointError> for TrainError {
    fn from(err: CheckpointError) -> Self {
        Self::Checkpoint(err)
    }
}

impl From<DatasetError> for TrainError {
    fn from(err: DatasetError) -> Self {
        Self::Dataset(err)
    }
}
