//! Versioned JSON layout of the checkpoint files.
//!
//! Networks are stored as plain data: three row-major matrices plus their
//! allele tables. Nothing is ever executed when a file is read back.

use chrono::{DateTime, Utc};
use evonet_dataset::{Dataset, DatasetError, Encoding, Problem, ProblemDomain};
use evonet_network::{Network, NetworkError, WeightLayer};
use evonet_training::{Elite, Progress, RunConfig};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// Common header of every checkpoint file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Versioned<T> {
    pub version: u32,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Versioned<T> {
    pub fn new(body: T) -> Self {
        Self {
            version: SCHEMA_VERSION,
            body,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunFile {
    pub saved_at: DateTime<Utc>,
    pub config: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetFile {
    pub domain: ProblemDomain,
    pub encoding: Encoding,
    pub validation_percent: u32,
    pub problems: Vec<Problem>,
}

impl DatasetFile {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            domain: dataset.domain(),
            encoding: dataset.encoding(),
            validation_percent: dataset.validation_percent(),
            problems: dataset.problems().to_vec(),
        }
    }

    pub fn into_dataset(self) -> Result<Dataset, DatasetError> {
        Dataset::from_problems(
            self.domain,
            self.encoding,
            self.validation_percent,
            self.problems,
        )
    }
}

/// A dense matrix in row-major order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatrixFile {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LayerFile {
    pub weights: MatrixFile,
    pub alleles: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkFile {
    pub layers: [LayerFile; 3],
}

impl NetworkFile {
    pub fn from_network(network: &Network) -> Self {
        let layers = network.layers().each_ref().map(|layer| {
            let (rows, cols) = layer.shape();
            LayerFile {
                weights: MatrixFile {
                    rows,
                    cols,
                    data: layer.flat_values().collect(),
                },
                alleles: layer.alleles().iter().map(<[usize]>::to_vec).collect(),
            }
        });
        Self { layers }
    }

    pub fn into_network(self) -> Result<Network, NetworkError> {
        let [l1, l2, l3] = self.layers;
        let layer = |index: usize, file: LayerFile| {
            let MatrixFile { rows, cols, data } = file.weights;
            WeightLayer::from_parts(index, (rows, cols), data, file.alleles)
        };
        Network::from_layers([layer(0, l1)?, layer(1, l2)?, layer(2, l3)?])
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlotFile {
    pub generation: usize,
    pub network: NetworkFile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobFile {
    pub saved_at: DateTime<Utc>,
    pub network: NetworkFile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EliteFile {
    pub generation: usize,
    pub slot: usize,
    pub train_error: f64,
    pub validation_error: f64,
    pub network: NetworkFile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressFile {
    pub saved_at: DateTime<Utc>,
    pub next_generation: usize,
    pub elites: Vec<EliteFile>,
}

impl ProgressFile {
    pub fn from_progress(progress: &Progress) -> Self {
        Self {
            saved_at: Utc::now(),
            next_generation: progress.next_generation,
            elites: progress
                .elites
                .iter()
                .map(|elite| EliteFile {
                    generation: elite.generation,
                    slot: elite.slot,
                    train_error: elite.train_error,
                    validation_error: elite.validation_error,
                    network: NetworkFile::from_network(&elite.network),
                })
                .collect(),
        }
    }

    pub fn into_progress(self) -> Result<Progress, NetworkError> {
        let elites = self
            .elites
            .into_iter()
            .map(|elite| -> Result<Elite, NetworkError> {
                Ok(Elite {
                    network: elite.network.into_network()?,
                    train_error: elite.train_error,
                    validation_error: elite.validation_error,
                    generation: elite.generation,
                    slot: elite.slot,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Progress {
            next_generation: self.next_generation,
            elites,
        })
    }
}

#[cfg(test)]
mod tests {
    use evonet_network::LayerSizes;

    use super::*;

    #[test]
    fn test_network_file_round_trip() {
        let network = Network::new(LayerSizes::new(4, 8, 4), 17).unwrap();
        let json = serde_json::to_string(&Versioned::new(NetworkFile::from_network(&network))).unwrap();
        let file: Versioned<NetworkFile> = serde_json::from_str(&json).unwrap();
        assert_eq!(file.version, SCHEMA_VERSION);
        let restored = file.body.into_network().unwrap();
        assert_eq!(restored, network);
        for (a, b) in restored.layers().iter().zip(network.layers()) {
            assert_eq!(a.alleles(), b.alleles());
        }
    }

    #[test]
    fn test_network_file_rejects_broken_alleles() {
        let network = Network::new(LayerSizes::new(2, 3, 1), 1).unwrap();
        let mut file = NetworkFile::from_network(&network);
        file.layers[1].alleles.pop();
        assert!(matches!(
            file.into_network(),
            Err(NetworkError::Alleles { layer: 1, .. })
        ));
    }

    #[test]
    fn test_network_file_rejects_short_data() {
        let network = Network::new(LayerSizes::new(2, 3, 1), 1).unwrap();
        let mut file = NetworkFile::from_network(&network);
        file.layers[0].weights.data.pop();
        assert!(matches!(
            file.into_network(),
            Err(NetworkError::ValueCount { layer: 0, .. })
        ));
    }

    #[test]
    fn test_versioned_header_is_flat() {
        let value = serde_json::to_value(Versioned::new(SlotFile {
            generation: 3,
            network: NetworkFile::from_network(&Network::new(LayerSizes::new(1, 1, 1), 0).unwrap()),
        }))
        .unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["generation"], 3);
        assert_eq!(value["network"]["layers"][0]["weights"]["rows"], 1);
    }
}
