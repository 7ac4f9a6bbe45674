//! Building the next population from the elites.
//!
//! The population slots are cut into one contiguous group per elite. Every
//! group starts with an exact copy of its elite. The rest of group 0 (the best
//! elite) is mutated copies of it; the rest of every other group is a copy of
//! its elite crossed over with the best elite as donor, then mutated.
//!
//! ```text
//! slots:   | 0  1  2 | 3  4  5 | 6  7  8  9 |
//! group:   |    0    |    1    |     2      |
//! slot 0:  copy of elite g
//! others:  g == 0 -> mutate(copy)
//!          g >  0 -> mutate(crossover(elite 0 -> copy))
//! ```

use evonet_network::{Network, crossover, mutate};
use rand::Rng;

use crate::Elite;

/// Sizes of the `k` slot groups: `population / k` each, with the remainder
/// added to the last group.
#[must_use]
pub fn group_sizes(population_size: usize, k: usize) -> Vec<usize> {
    if k == 0 {
        return vec![];
    }
    let base = population_size / k;
    let mut sizes = vec![base; k];
    if let Some(last) = sizes.last_mut() {
        *last += population_size % k;
    }
    sizes
}

/// Breeds `population_size` networks from `elites` (best first).
#[must_use]
pub fn breed_next<R>(
    elites: &[Elite],
    population_size: usize,
    swap_percent: u32,
    mutate_percent: u32,
    rng: &mut R,
) -> Vec<Network>
where
    R: Rng + ?Sized,
{
    let Some(best) = elites.first() else {
        return vec![];
    };
    let mut population = Vec::with_capacity(population_size);
    for (group, (elite, size)) in elites
        .iter()
        .zip(group_sizes(population_size, elites.len()))
        .enumerate()
    {
        for member in 0..size {
            let copy = elite.network.clone();
            let child = match (group, member) {
                (_, 0) => copy,
                (0, _) => mutate(copy, mutate_percent, rng),
                _ => {
                    let crossed = crossover(&best.network, copy, swap_percent, rng);
                    mutate(crossed, mutate_percent, rng)
                }
            };
            population.push(child);
        }
    }
    population
}
