use std::sync::Arc;

use anyhow::Context as _;
use evonet_dataset::Dataset;
use evonet_training::{
    CancelToken, CheckpointStore as _, EvolutionParams, EvolutionState, RunConfig, RunContext,
    TrainError, TrainingParams,
    seed::{self, SeedPurpose},
};

use crate::{command::RunArg, report::LogReporter, store::JsonCheckpointStore};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    #[clap(flatten)]
    run: RunArg,
    /// Seed of the run (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Number of problems to generate
    #[arg(long, default_value_t = 10_000)]
    input_qty: usize,
    /// Hidden layer width as a multiple of the input bit width
    #[arg(long, default_value_t = 2)]
    hidden_factor: usize,
    /// Number of times the encoded input is repeated
    #[arg(long, default_value_t = 1)]
    input_factor: usize,
    /// Percentage of problems held out for validation
    #[arg(long, default_value_t = 10)]
    validation: u32,
    /// Rows per batch (0 = whole train split)
    #[arg(long, default_value_t = TrainingParams::default().batch_size)]
    batch_size: usize,
    /// Percentage of hidden activations dropped while training
    #[arg(long, default_value_t = TrainingParams::default().dropout_percent)]
    dropout: u32,
    #[arg(long, default_value_t = TrainingParams::default().epochs)]
    epochs: usize,
    /// Back-propagation iterations per batch
    #[arg(long, default_value_t = TrainingParams::default().loops_per_batch)]
    loops: usize,
    #[arg(long, default_value_t = TrainingParams::default().learn_rate)]
    learn_rate: f64,
    /// Learn rate divisor applied after every iteration
    #[arg(long, default_value_t = TrainingParams::default().learn_decay)]
    learn_decay: f64,
    /// Minimum seconds between progress reports of one job
    #[arg(long, default_value_t = TrainingParams::default().report_interval_secs)]
    report_interval: u64,
    #[arg(long, default_value_t = EvolutionParams::default().population_size)]
    population: usize,
    /// Number of generations to run
    #[arg(long, default_value_t = EvolutionParams::default().evolutions)]
    evolutions: usize,
    /// Crossover strength in percent
    #[arg(long, default_value_t = EvolutionParams::default().swap_percent)]
    swaps: u32,
    /// Mutation strength in percent
    #[arg(long, default_value_t = EvolutionParams::default().mutate_percent)]
    mutations: u32,
    #[arg(long, default_value_t = EvolutionParams::default().allele_min)]
    allele_min: usize,
    #[arg(long, default_value_t = EvolutionParams::default().allele_max)]
    allele_max: usize,
}

impl TrainArg {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            domain: self.run.domain,
            input_quantity: self.input_qty,
            hidden_factor: self.hidden_factor,
            input_factor: self.input_factor,
            validation_percent: self.validation,
            seed: self.seed.unwrap_or_else(rand::random),
            training: TrainingParams {
                batch_size: self.batch_size,
                dropout_percent: self.dropout,
                epochs: self.epochs,
                loops_per_batch: self.loops,
                learn_rate: self.learn_rate,
                learn_decay: self.learn_decay,
                report_interval_secs: self.report_interval,
            },
            evolution: EvolutionParams {
                population_size: self.population,
                evolutions: self.evolutions,
                swap_percent: self.swaps,
                mutate_percent: self.mutations,
                allele_min: self.allele_min,
                allele_max: self.allele_max,
            },
        }
    }
}

fn install_interrupt_handler(cancel: &CancelToken) -> anyhow::Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupted, stopping after the running batches");
        cancel.cancel();
    })
    .context("Failed to set Ctrl-C handler")
}

fn evolve(ctx: &RunContext, mut state: EvolutionState) -> anyhow::Result<()> {
    let count = ctx.config.evolution.evolutions;
    match state.run_generations(ctx, count) {
        Ok(()) => {
            if let Some(best) = state.elites().first() {
                log::info!(
                    "finished at generation {}: best validation error {:.6}",
                    state.next_generation(),
                    best.validation_error
                );
            }
            Ok(())
        }
        Err(TrainError::Cancelled { generation }) => {
            log::warn!(
                "generation {generation} cancelled; resume continues from generation {}",
                state.next_generation()
            );
            Ok(())
        }
        Err(err) => Err(err).context("Training failed"),
    }
}

pub(crate) fn run_train(arg: &TrainArg) -> anyhow::Result<()> {
    let config = arg.to_config();
    config.validate().context("Invalid training options")?;

    let dataset_seed = seed::derive_seed(config.seed, SeedPurpose::Dataset, 0, 0);
    log::info!(
        "generating {} {} problems (seed {})",
        config.input_quantity,
        config.domain,
        config.seed
    );
    let dataset = Dataset::generate(
        config.domain,
        config.input_quantity,
        config.input_factor,
        config.validation_percent,
        dataset_seed,
    )
    .context("Failed to generate dataset")?;

    let store = JsonCheckpointStore::create(&arg.run.run_dir, config.domain).with_context(|| {
        format!(
            "Failed to create run directory under {}",
            arg.run.run_dir.display()
        )
    })?;
    log::info!("writing checkpoints to {}", store.dir().display());

    let ctx = RunContext {
        config,
        dataset,
        store: Arc::new(store),
        reporter: Arc::new(LogReporter),
        cancel: CancelToken::new(),
    };
    install_interrupt_handler(&ctx.cancel)?;
    let state = EvolutionState::fresh(&ctx).context("Failed to start run")?;
    evolve(&ctx, state)
}

pub(crate) fn run_resume(arg: &RunArg) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::open(&arg.run_dir, arg.domain);
    let config = store
        .load_run_config()
        .context("Failed to load run configuration")?;
    let dataset = store.load_dataset().context("Failed to load dataset")?;

    let ctx = RunContext {
        config,
        dataset,
        store: Arc::new(store),
        reporter: Arc::new(LogReporter),
        cancel: CancelToken::new(),
    };
    install_interrupt_handler(&ctx.cancel)?;
    let state = EvolutionState::resume(&ctx).context("Failed to resume run")?;
    evolve(&ctx, state)
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;
    use evonet_dataset::ProblemDomain;

    use super::*;
    use crate::command::{CommandArgs, Mode};

    fn parse(args: &[&str]) -> TrainArg {
        let args = CommandArgs::try_parse_from(args).unwrap();
        let Mode::Train(arg) = args.mode else {
            panic!("unexpected mode");
        };
        arg
    }

    #[test]
    fn test_default_options_match_default_config() {
        let arg = parse(&["evonet", "train", "--seed", "9"]);
        assert_eq!(arg.to_config(), RunConfig::new(ProblemDomain::Add, 9));
    }

    #[test]
    fn test_options_reach_config() {
        let arg = parse(&[
            "evonet",
            "train",
            "--domain",
            "factor",
            "--seed",
            "1",
            "--population",
            "20",
            "--batch-size",
            "0",
            "--learn-rate",
            "0.25",
        ]);
        let config = arg.to_config();
        assert_eq!(config.domain, ProblemDomain::Factor);
        assert_eq!(config.evolution.population_size, 20);
        assert_eq!(config.evolution.top_k(), 4);
        assert_eq!(config.training.batch_size, 0);
        assert!((config.training.learn_rate - 0.25).abs() < f64::EPSILON);
    }
}
