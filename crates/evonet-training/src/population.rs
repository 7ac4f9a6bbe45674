//! Elite selection.

use evonet_network::Network;

use crate::job::JobResult;

/// A network carried between generations because of its validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct Elite {
    pub network: Network,
    pub train_error: f64,
    pub validation_error: f64,
    /// Generation in which the network was trained.
    pub generation: usize,
    /// Slot in which the network was trained.
    pub slot: usize,
}

impl Elite {
    #[must_use]
    pub fn from_result(generation: usize, result: JobResult) -> Self {
        Self {
            network: result.network,
            train_error: result.train_error,
            validation_error: result.validation_error,
            generation,
            slot: result.slot,
        }
    }
}

/// Keeps the `k` candidates with the lowest validation error, best first.
///
/// `current` comes before `previous` in the merged list and the sort is
/// stable, so equal errors keep that order.
#[must_use]
pub fn select_top(current: Vec<Elite>, previous: Vec<Elite>, k: usize) -> Vec<Elite> {
    let mut candidates = current;
    candidates.extend(previous);
    candidates.sort_by(|a, b| a.validation_error.total_cmp(&b.validation_error));
    candidates.truncate(k);
    candidates
}
