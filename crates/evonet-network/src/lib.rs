//! Feed-forward networks trained by back-propagation and recombined by alleles.
//!
//! This crate owns the genome of the evolutionary trainer: a three-matrix
//! network ([`Network`]) together with the allele tables that make its weights
//! recombinable.
//!
//! # Network
//!
//! ```text
//! input --W1 (in x hidden)--> hidden1 --W2 (hidden x hidden)--> hidden2 --W3 (hidden x out)--> output
//! ```
//!
//! - [`Network::new`] draws weights uniformly from `[-1, 1]` with a seeded
//!   generator and cuts the allele tables from the same stream
//! - [`Network::train`] runs back-propagation over one batch, with optional
//!   dropout and geometric learn-rate decay
//! - [`Network::evaluate`] is the deterministic pass used for ranking
//!
//! # Alleles
//!
//! An allele is a contiguous run of flat indices in one weight matrix. The
//! [`allele`] module cuts the tables and implements [`crossover`] and
//! [`mutate`] over whole alleles.
//!
//! # Example
//!
//! ```
//! use evonet_network::{LayerSizes, Network, crossover, mutate};
//! use rand::SeedableRng as _;
//!
//! let sizes = LayerSizes::new(4, 8, 4);
//! let elite = Network::new(sizes, 1).unwrap();
//! let other = Network::new(sizes, 2).unwrap();
//!
//! let mut rng = rand_pcg::Pcg32::seed_from_u64(0);
//! let child = crossover(&elite, other.clone(), 50, &mut rng);
//! let child = mutate(child, 5, &mut rng);
//! assert_eq!(child.sizes(), sizes);
//! ```

pub use self::{
    allele::{AlleleBounds, AlleleTable, crossover, mutate},
    network::*,
};

pub mod allele;
mod network;

/// The weight matrices for the requested sizes cannot be allocated.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("cannot allocate weight matrices for layer sizes {sizes:?}")]
pub struct ResourceError {
    pub sizes: LayerSizes,
}
