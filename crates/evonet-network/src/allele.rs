//! Allele tables and the genetic operators that work on them.
//!
//! An allele is a contiguous run of flat indices into one weight matrix. Every
//! weight matrix of a [`Network`](crate::Network) carries an [`AlleleTable`]
//! that partitions its flattened index range into alleles. The table is cut
//! once when the network is constructed and never changes afterwards, so it is
//! inherited unchanged by every copy, crossover and mutation of that network.
//!
//! # Operators
//!
//! - [`AlleleTable::partition`] cuts the table with random run lengths
//! - [`crossover`] copies whole alleles from a donor into a recipient
//! - [`mutate`] replaces whole alleles with fresh uniform values
//!
//! Both operators act on each of the three weight matrices independently and
//! pick `percent% of the matrix length` alleles (with replacement).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Network, WeightLayer};

/// Lower and upper bound on the number of indices in one allele.
///
/// The last allele of a table may exceed `max`: a trailing run shorter than
/// `min` is merged into the run before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleBounds {
    min: usize,
    max: usize,
}

impl Default for AlleleBounds {
    fn default() -> Self {
        Self { min: 5, max: 30 }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("invalid allele bounds {min}..={max}: need 1 <= min <= max")]
pub struct InvalidAlleleBounds {
    pub min: usize,
    pub max: usize,
}

impl AlleleBounds {
    pub fn new(min: usize, max: usize) -> Result<Self, InvalidAlleleBounds> {
        if min == 0 || min > max {
            return Err(InvalidAlleleBounds { min, max });
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> usize {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum AlleleCoverageError {
    #[display("allele {allele} is empty")]
    EmptyAllele { allele: usize },
    #[display("allele {allele} refers to index {index} outside a matrix of {len} values")]
    OutOfRange {
        allele: usize,
        index: usize,
        len: usize,
    },
    #[display("index {index} appears in more than one allele")]
    Duplicate { index: usize },
    #[display("alleles cover {covered} of {len} values")]
    Gap { covered: usize, len: usize },
}

/// Partition of one weight matrix's flat index range into alleles.
///
/// Allele ids are the positions in the table, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlleleTable {
    alleles: Vec<Vec<usize>>,
}

impl AlleleTable {
    /// Cuts `0..len` into contiguous runs with random lengths in
    /// `[bounds.min, bounds.max]`.
    ///
    /// A final run shorter than `bounds.min` is appended to the previous run
    /// instead of forming a short allele of its own. The only case that
    /// produces a run shorter than `bounds.min` is a matrix with fewer than
    /// `bounds.min` values, which becomes a single allele.
    ///
    /// The result depends only on `len`, `bounds` and the state of `rng`.
    pub fn partition<R>(len: usize, bounds: AlleleBounds, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut alleles: Vec<Vec<usize>> = vec![];
        let mut start = 0;
        while start < len {
            let run = rng.random_range(bounds.min..=bounds.max);
            let end = usize::min(start + run, len);
            alleles.push((start..end).collect());
            start = end;
        }

        if alleles.len() > 1 && alleles.last().is_some_and(|last| last.len() < bounds.min) {
            let short = alleles.pop().unwrap_or_default();
            if let Some(previous) = alleles.last_mut() {
                previous.extend(short);
            }
        }

        Self { alleles }
    }

    /// Rebuilds a table from persisted index lists, checking that they cover
    /// `0..len` exactly once.
    pub fn from_alleles(alleles: Vec<Vec<usize>>, len: usize) -> Result<Self, AlleleCoverageError> {
        let mut seen = vec![false; len];
        let mut covered = 0;
        for (allele, indices) in alleles.iter().enumerate() {
            if indices.is_empty() {
                return Err(AlleleCoverageError::EmptyAllele { allele });
            }
            for &index in indices {
                let Some(slot) = seen.get_mut(index) else {
                    return Err(AlleleCoverageError::OutOfRange { allele, index, len });
                };
                if *slot {
                    return Err(AlleleCoverageError::Duplicate { index });
                }
                *slot = true;
                covered += 1;
            }
        }
        if covered != len {
            return Err(AlleleCoverageError::Gap { covered, len });
        }
        Ok(Self { alleles })
    }

    /// Number of alleles in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alleles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alleles.is_empty()
    }

    /// Flat indices of allele `id`.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&[usize]> {
        self.alleles.get(id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.alleles.iter().map(Vec::as_slice)
    }

    /// Total number of indices over all alleles.
    #[must_use]
    pub fn covered_len(&self) -> usize {
        self.alleles.iter().map(Vec::len).sum()
    }
}

/// Number of operator applications for `percent` of `len` values.
fn picks(len: usize, percent: u32) -> usize {
    len * usize::try_from(percent).unwrap_or(usize::MAX).min(100) / 100
}

/// Rounds a freshly drawn weight to 4 decimal places.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Copies whole alleles of `donor` into `recipient`, one weight matrix at a
/// time, and returns the recipient.
///
/// For each matrix, `n = min(donor len, recipient len)` and
/// `swap_percent% of n` alleles are picked uniformly from the ids both tables
/// share. The indices of a picked allele come from the donor's table. When the
/// donor matrix is the longer one, indices at or past `n` are skipped with a
/// warning, so the recipient is never written outside the shared range.
#[must_use]
pub fn crossover<R>(donor: &Network, mut recipient: Network, swap_percent: u32, rng: &mut R) -> Network
where
    R: Rng + ?Sized,
{
    for (layer, (donor, recipient)) in donor
        .layers()
        .iter()
        .zip(recipient.layers_mut())
        .enumerate()
    {
        crossover_layer(layer, donor, recipient, swap_percent, rng);
    }
    recipient
}

fn crossover_layer<R>(
    layer: usize,
    donor: &WeightLayer,
    recipient: &mut WeightLayer,
    swap_percent: u32,
    rng: &mut R,
) where
    R: Rng + ?Sized,
{
    let shared_len = usize::min(donor.len(), recipient.len());
    let shared_alleles = usize::min(donor.alleles().len(), recipient.alleles().len());
    if shared_alleles == 0 {
        return;
    }
    for _ in 0..picks(shared_len, swap_percent) {
        let id = rng.random_range(0..shared_alleles);
        let Some(indices) = donor.alleles().get(id) else {
            continue;
        };
        for &index in indices {
            if index >= shared_len {
                log::warn!(
                    "crossover: skipping index {index} of allele {id} in layer {layer} (shared length {shared_len})"
                );
                continue;
            }
            if let Some(value) = donor.get_flat(index) {
                recipient.set_flat(index, value);
            }
        }
    }
}

/// Replaces whole alleles with fresh uniform values in `[-1, 1]` (rounded to
/// 4 decimal places), one weight matrix at a time, and returns the network.
///
/// Each matrix receives `mutate_percent% of its length` allele replacements.
#[must_use]
pub fn mutate<R>(mut network: Network, mutate_percent: u32, rng: &mut R) -> Network
where
    R: Rng + ?Sized,
{
    for layer in network.layers_mut() {
        let allele_count = layer.alleles().len();
        if allele_count == 0 {
            continue;
        }
        for _ in 0..picks(layer.len(), mutate_percent) {
            let id = rng.random_range(0..allele_count);
            let indices = layer.alleles().get(id).map(<[usize]>::to_vec).unwrap_or_default();
            for index in indices {
                layer.set_flat(index, round4(rng.random_range(-1.0..=1.0)));
            }
        }
    }
    network
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::LayerSizes;

    fn assert_exact_cover(table: &AlleleTable, len: usize) {
        let mut indices: Vec<usize> = table.iter().flatten().copied().collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..len).collect::<Vec<_>>());
    }

    #[test]
    fn test_partition_covers_range_exactly_once() {
        let mut rng = Pcg32::seed_from_u64(7);
        for len in [0, 1, 4, 5, 6, 29, 30, 31, 64, 100, 1000] {
            let table = AlleleTable::partition(len, AlleleBounds::default(), &mut rng);
            assert_exact_cover(&table, len);
            assert_eq!(table.covered_len(), len);
        }
    }

    #[test]
    fn test_partition_runs_are_contiguous_and_bounded() {
        let bounds = AlleleBounds::default();
        let mut rng = Pcg32::seed_from_u64(11);
        let table = AlleleTable::partition(500, bounds, &mut rng);
        let last = table.len() - 1;
        for (id, allele) in table.iter().enumerate() {
            assert!(allele.windows(2).all(|w| w[1] == w[0] + 1));
            assert!(allele.len() >= bounds.min());
            if id != last {
                assert!(allele.len() <= bounds.max());
            } else {
                assert!(allele.len() < bounds.max() + bounds.min());
            }
        }
    }

    #[test]
    fn test_partition_merges_short_tail() {
        // min == max pins the run length, so the tail length is predictable
        let bounds = AlleleBounds::new(5, 5).unwrap();
        let mut rng = Pcg32::seed_from_u64(0);
        let table = AlleleTable::partition(13, bounds, &mut rng);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), Some(&[0, 1, 2, 3, 4][..]));
        assert_eq!(table.get(1).map(<[usize]>::len), Some(8));
    }

    #[test]
    fn test_partition_shorter_than_min_is_single_allele() {
        let mut rng = Pcg32::seed_from_u64(3);
        let table = AlleleTable::partition(3, AlleleBounds::default(), &mut rng);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0), Some(&[0, 1, 2][..]));
    }

    #[test]
    fn test_partition_is_deterministic() {
        let a = AlleleTable::partition(300, AlleleBounds::default(), &mut Pcg32::seed_from_u64(42));
        let b = AlleleTable::partition(300, AlleleBounds::default(), &mut Pcg32::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(AlleleBounds::new(0, 3).is_err());
        assert!(AlleleBounds::new(6, 5).is_err());
        assert!(AlleleBounds::new(1, 1).is_ok());
    }

    #[test]
    fn test_from_alleles_rejects_bad_coverage() {
        assert!(AlleleTable::from_alleles(vec![vec![0, 1], vec![2]], 3).is_ok());
        assert!(matches!(
            AlleleTable::from_alleles(vec![vec![0, 1], vec![1, 2]], 3),
            Err(AlleleCoverageError::Duplicate { index: 1 })
        ));
        assert!(matches!(
            AlleleTable::from_alleles(vec![vec![0, 1]], 3),
            Err(AlleleCoverageError::Gap { covered: 2, len: 3 })
        ));
        assert!(matches!(
            AlleleTable::from_alleles(vec![vec![0, 1, 2, 3]], 3),
            Err(AlleleCoverageError::OutOfRange { index: 3, .. })
        ));
        assert!(matches!(
            AlleleTable::from_alleles(vec![vec![0, 1, 2], vec![]], 3),
            Err(AlleleCoverageError::EmptyAllele { allele: 1 })
        ));
    }

    #[test]
    fn test_picks_truncates() {
        assert_eq!(picks(32, 50), 16);
        assert_eq!(picks(32, 5), 1);
        assert_eq!(picks(10, 5), 0);
        assert_eq!(picks(10, 250), 10);
    }

    #[test]
    fn test_crossover_leaves_donor_untouched_and_copies_donor_values() {
        let sizes = LayerSizes::new(6, 10, 4);
        let donor = Network::new(sizes, 1).unwrap();
        let recipient = Network::new(sizes, 2).unwrap();
        let donor_before = donor.clone();
        let original = recipient.clone();

        let mut rng = Pcg32::seed_from_u64(5);
        let child = crossover(&donor, recipient, 50, &mut rng);

        assert_eq!(donor, donor_before);
        for ((child, donor), original) in child
            .layers()
            .iter()
            .zip(donor.layers())
            .zip(original.layers())
        {
            let mut swapped = 0;
            for index in 0..child.len() {
                let value = child.get_flat(index).unwrap();
                if value == donor.get_flat(index).unwrap() {
                    swapped += 1;
                } else {
                    assert_eq!(value, original.get_flat(index).unwrap());
                }
            }
            assert!(swapped > 0);
        }
    }

    #[test]
    fn test_crossover_never_writes_past_shared_length() {
        let donor = Network::new(LayerSizes::new(4, 6, 2), 10).unwrap();
        let recipient = Network::new(LayerSizes::new(8, 12, 5), 20).unwrap();
        let original = recipient.clone();

        let mut rng = Pcg32::seed_from_u64(9);
        let child = crossover(&donor, recipient, 100, &mut rng);

        for ((child, donor), original) in child
            .layers()
            .iter()
            .zip(donor.layers())
            .zip(original.layers())
        {
            let shared = usize::min(child.len(), donor.len());
            for index in shared..child.len() {
                assert_eq!(child.get_flat(index), original.get_flat(index));
            }
        }
    }

    #[test]
    fn test_crossover_from_longer_donor_skips_outside_indices() {
        let donor = Network::new(LayerSizes::new(8, 12, 5), 30).unwrap();
        let recipient = Network::new(LayerSizes::new(4, 6, 2), 40).unwrap();
        let original = recipient.clone();

        let mut rng = Pcg32::seed_from_u64(2);
        let child = crossover(&donor, recipient, 100, &mut rng);

        assert_eq!(child.sizes(), original.sizes());
        let mut copied = 0;
        for ((child, donor), original) in child
            .layers()
            .iter()
            .zip(donor.layers())
            .zip(original.layers())
        {
            assert_eq!(child.alleles(), original.alleles());
            for index in 0..child.len() {
                let value = child.get_flat(index).unwrap();
                if value == donor.get_flat(index).unwrap() {
                    copied += 1;
                } else {
                    assert_eq!(value, original.get_flat(index).unwrap());
                }
            }
        }
        assert!(copied > 0);
    }

    #[test]
    fn test_mutate_writes_rounded_values_in_range() {
        let network = Network::new(LayerSizes::new(8, 16, 8), 3).unwrap();
        let original = network.clone();
        let mut rng = Pcg32::seed_from_u64(4);
        let mutated = mutate(network, 50, &mut rng);

        let mut changed = 0;
        for (layer, original) in mutated.layers().iter().zip(original.layers()) {
            assert_eq!(layer.alleles(), original.alleles());
            for index in 0..layer.len() {
                let value = layer.get_flat(index).unwrap();
                if value != original.get_flat(index).unwrap() {
                    changed += 1;
                    assert!((-1.0..=1.0).contains(&value));
                    assert!(((value * 10_000.0).round() - value * 10_000.0).abs() < 1e-6);
                }
            }
        }
        assert!(changed > 0);
    }

    #[test]
    fn test_mutate_zero_percent_is_identity() {
        let network = Network::new(LayerSizes::new(4, 8, 4), 3).unwrap();
        let mutated = mutate(network.clone(), 0, &mut Pcg32::seed_from_u64(1));
        assert_eq!(mutated, network);
    }
}
