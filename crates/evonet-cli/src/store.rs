//! JSON checkpoint store.
//!
//! ```text
//! <run-dir>/<domain>/
//!     run.json          run configuration
//!     dataset.json      problems and encoding
//!     progress.json     next generation and elites
//!     slot-<G>-<N>.json population slot N at the start of generation G
//!     job-<N>.json      latest trained network of job N
//! ```
//!
//! Every file is written to `<file>.tmp`, flushed and synced, then renamed
//! over the previous version, so a reader only ever sees complete files.
//! Slot files of the committed generation stay in place until `progress.json`
//! names the next one.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use chrono::Utc;
use evonet_dataset::{Dataset, ProblemDomain};
use evonet_network::Network;
use evonet_training::{
    CheckpointError, CheckpointItem, CheckpointStore, Progress, RunConfig, SlotCheckpoint,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::schema::{
    DatasetFile, JobFile, NetworkFile, ProgressFile, RunFile, SCHEMA_VERSION, SlotFile, Versioned,
};

#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    /// Store for `domain` under `run_dir`, creating the directory if needed.
    pub fn create(run_dir: &Path, domain: ProblemDomain) -> io::Result<Self> {
        let dir = run_dir.join(domain.as_str());
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store for `domain` under `run_dir`; the directory is not touched.
    pub fn open(run_dir: &Path, domain: ProblemDomain) -> Self {
        Self {
            dir: run_dir.join(domain.as_str()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, item: CheckpointItem) -> PathBuf {
        let name = match item {
            CheckpointItem::RunConfig => "run.json".to_owned(),
            CheckpointItem::Dataset => "dataset.json".to_owned(),
            CheckpointItem::Progress => "progress.json".to_owned(),
            CheckpointItem::Slot { generation, slot } => format!("slot-{generation}-{slot}.json"),
            CheckpointItem::Job(job) => format!("job-{job}.json"),
        };
        self.dir.join(name)
    }

    fn write<T>(&self, item: CheckpointItem, body: T) -> Result<(), CheckpointError>
    where
        T: Serialize,
    {
        let path = self.path(item);
        write_json_atomic(&path, &Versioned::new(body)).map_err(|err| CheckpointError::Write {
            item,
            location: path.display().to_string(),
            reason: err.to_string(),
        })
    }

    fn read<T>(&self, item: CheckpointItem) -> Result<(T, String), CheckpointError>
    where
        T: DeserializeOwned,
    {
        let path = self.path(item);
        let location = path.display().to_string();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::Missing { item, location });
            }
            Err(err) => {
                return Err(CheckpointError::Corrupt {
                    item,
                    location,
                    reason: err.to_string(),
                });
            }
        };
        let versioned: Versioned<T> = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            CheckpointError::Corrupt {
                item,
                location: location.clone(),
                reason: err.to_string(),
            }
        })?;
        if versioned.version != SCHEMA_VERSION {
            return Err(CheckpointError::Corrupt {
                item,
                location,
                reason: format!(
                    "unsupported version {} (expected {SCHEMA_VERSION})",
                    versioned.version
                ),
            });
        }
        Ok((versioned.body, location))
    }
}

fn corrupt(item: CheckpointItem, location: String, err: impl ToString) -> CheckpointError {
    CheckpointError::Corrupt {
        item,
        location,
        reason: err.to_string(),
    }
}

fn write_json_atomic<T>(path: &Path, value: &T) -> io::Result<()>
where
    T: Serialize,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = File::create(&tmp)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

impl CheckpointStore for JsonCheckpointStore {
    fn save_run_config(&self, config: &RunConfig) -> Result<(), CheckpointError> {
        self.write(
            CheckpointItem::RunConfig,
            RunFile {
                saved_at: Utc::now(),
                config: config.clone(),
            },
        )
    }

    fn load_run_config(&self) -> Result<RunConfig, CheckpointError> {
        let (file, _): (RunFile, _) = self.read(CheckpointItem::RunConfig)?;
        Ok(file.config)
    }

    fn save_dataset(&self, dataset: &Dataset) -> Result<(), CheckpointError> {
        self.write(CheckpointItem::Dataset, DatasetFile::from_dataset(dataset))
    }

    fn load_dataset(&self) -> Result<Dataset, CheckpointError> {
        let item = CheckpointItem::Dataset;
        let (file, location): (DatasetFile, _) = self.read(item)?;
        file.into_dataset().map_err(|err| corrupt(item, location, err))
    }

    fn save_slot(
        &self,
        generation: usize,
        slot: usize,
        network: &Network,
    ) -> Result<(), CheckpointError> {
        self.write(
            CheckpointItem::Slot { generation, slot },
            SlotFile {
                generation,
                network: NetworkFile::from_network(network),
            },
        )
    }

    fn load_slot(&self, generation: usize, slot: usize) -> Result<SlotCheckpoint, CheckpointError> {
        let item = CheckpointItem::Slot { generation, slot };
        let (file, location): (SlotFile, _) = self.read(item)?;
        let network = file
            .network
            .into_network()
            .map_err(|err| corrupt(item, location, err))?;
        Ok(SlotCheckpoint {
            generation: file.generation,
            network,
        })
    }

    fn discard_slots(&self, generation: usize, count: usize) -> Result<(), CheckpointError> {
        for slot in 0..count {
            let item = CheckpointItem::Slot { generation, slot };
            let path = self.path(item);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(CheckpointError::Write {
                        item,
                        location: path.display().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn save_job(&self, job: usize, network: &Network) -> Result<(), CheckpointError> {
        self.write(
            CheckpointItem::Job(job),
            JobFile {
                saved_at: Utc::now(),
                network: NetworkFile::from_network(network),
            },
        )
    }

    fn load_job(&self, job: usize) -> Result<Network, CheckpointError> {
        let item = CheckpointItem::Job(job);
        let (file, location): (JobFile, _) = self.read(item)?;
        file.network
            .into_network()
            .map_err(|err| corrupt(item, location, err))
    }

    fn save_progress(&self, progress: &Progress) -> Result<(), CheckpointError> {
        self.write(
            CheckpointItem::Progress,
            ProgressFile::from_progress(progress),
        )
    }

    fn load_progress(&self) -> Result<Progress, CheckpointError> {
        let item = CheckpointItem::Progress;
        let (file, location): (ProgressFile, _) = self.read(item)?;
        file.into_progress()
            .map_err(|err| corrupt(item, location, err))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evonet_network::LayerSizes;
    use evonet_training::{CancelToken, EvolutionState, NullReporter, RunContext};

    use super::*;

    fn store() -> (tempfile::TempDir, JsonCheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::create(dir.path(), ProblemDomain::Add).unwrap();
        (dir, store)
    }

    #[test]
    fn test_slot_round_trip_keeps_weights_and_alleles() {
        let (_dir, store) = store();
        let network = Network::new(LayerSizes::new(6, 12, 4), 5).unwrap();
        store.save_slot(7, 3, &network).unwrap();
        assert!(store.dir().join("slot-7-3.json").is_file());
        let slot = store.load_slot(7, 3).unwrap();
        assert_eq!(slot.generation, 7);
        assert_eq!(slot.network, network);
        for (a, b) in slot.network.layers().iter().zip(network.layers()) {
            assert_eq!(a.weights(), b.weights());
            assert_eq!(a.alleles(), b.alleles());
        }
    }

    #[test]
    fn test_writes_leave_no_temporary_files() {
        let (_dir, store) = store();
        let network = Network::new(LayerSizes::new(2, 4, 2), 1).unwrap();
        store.save_job(0, &network).unwrap();
        store.save_job(0, &network).unwrap();
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["job-0.json".to_owned()]);
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load_job(1),
            Err(CheckpointError::Missing {
                item: CheckpointItem::Job(1),
                ..
            })
        ));

        fs::write(store.dir().join("job-1.json"), "{ not json").unwrap();
        assert!(matches!(
            store.load_job(1),
            Err(CheckpointError::Corrupt {
                item: CheckpointItem::Job(1),
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let (_dir, store) = store();
        let network = Network::new(LayerSizes::new(2, 4, 2), 1).unwrap();
        store.save_slot(0, 0, &network).unwrap();
        let path = store.dir().join("slot-0-0.json");
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replacen("\"version\": 1", "\"version\": 99", 1)).unwrap();
        let err = store.load_slot(0, 0).unwrap_err();
        assert!(err.to_string().contains("unsupported version 99"));
    }

    #[test]
    fn test_run_resumes_from_disk() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let mut config = RunConfig::new(ProblemDomain::Add, 5);
        config.training.epochs = 1;
        config.training.loops_per_batch = 2;
        config.evolution.population_size = 3;
        let dataset = Dataset::generate(ProblemDomain::Add, 40, 1, 25, 5).unwrap();
        let ctx = RunContext {
            config,
            dataset,
            store: store.clone(),
            reporter: Arc::new(NullReporter),
            cancel: CancelToken::new(),
        };
        let mut state = EvolutionState::fresh(&ctx).unwrap();
        state.run_generation(&ctx).unwrap();

        let resumed_ctx = RunContext {
            config: store.load_run_config().unwrap(),
            dataset: store.load_dataset().unwrap(),
            ..ctx.clone()
        };
        assert_eq!(resumed_ctx.config, ctx.config);
        assert_eq!(resumed_ctx.dataset.problems(), ctx.dataset.problems());
        let resumed = EvolutionState::resume(&resumed_ctx).unwrap();
        assert_eq!(resumed.next_generation(), 1);
        assert_eq!(resumed.population(), state.population());
        assert_eq!(resumed.elites(), state.elites());
    }

    #[test]
    fn test_discard_slots_keeps_other_generations() {
        let (_dir, store) = store();
        let network = Network::new(LayerSizes::new(2, 4, 2), 1).unwrap();
        store.save_slot(0, 0, &network).unwrap();
        store.save_slot(0, 1, &network).unwrap();
        store.save_slot(1, 0, &network).unwrap();
        store.discard_slots(0, 3).unwrap();
        assert!(matches!(
            store.load_slot(0, 0),
            Err(CheckpointError::Missing { .. })
        ));
        assert!(store.load_slot(1, 0).is_ok());
    }

    #[test]
    fn test_resume_rejects_slot_of_other_generation() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let mut config = RunConfig::new(ProblemDomain::Add, 3);
        config.training.epochs = 1;
        config.training.loops_per_batch = 1;
        config.evolution.population_size = 2;
        let ctx = RunContext {
            config,
            dataset: Dataset::generate(ProblemDomain::Add, 20, 1, 25, 3).unwrap(),
            store: store.clone(),
            reporter: Arc::new(NullReporter),
            cancel: CancelToken::new(),
        };
        let mut state = EvolutionState::fresh(&ctx).unwrap();
        let stale = store.load_slot(0, 1).unwrap();
        state.run_generation(&ctx).unwrap();
        // a generation-0 slot file copied under a generation-1 name
        store.save_slot(0, 1, &stale.network).unwrap();
        fs::rename(
            store.dir().join("slot-0-1.json"),
            store.dir().join("slot-1-1.json"),
        )
        .unwrap();

        let err = EvolutionState::resume(&ctx).unwrap_err();
        assert!(err.to_string().contains("slot 1 of generation 1"), "{err}");
    }
}
