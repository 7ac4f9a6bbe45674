use std::path::PathBuf;

use clap::{Parser, Subcommand};
use evonet_dataset::ProblemDomain;

use self::{inspect::CheckJobArg, predict::PredictArg, train::TrainArg};

mod inspect;
mod predict;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Start a new run: generate the dataset and evolve a fresh population
    Train(#[clap(flatten)] TrainArg),
    /// Continue the stored run from its last completed generation
    Resume(#[clap(flatten)] RunArg),
    /// Evaluate every job network of the stored run
    LastRun(#[clap(flatten)] RunArg),
    /// Show the job with the lowest validation error
    BestJob(#[clap(flatten)] RunArg),
    /// Show one job's errors and predictions
    CheckJob(#[clap(flatten)] CheckJobArg),
    /// Answer a question with the best job network
    Predict(#[clap(flatten)] PredictArg),
}

/// Selects the stored run.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    /// Problem domain (add, mod, multiply, factor)
    #[arg(long, default_value = "add")]
    domain: ProblemDomain,
    /// Directory holding one sub-directory per problem domain
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run_train(&arg)?,
        Mode::Resume(arg) => train::run_resume(&arg)?,
        Mode::LastRun(arg) => inspect::run_last_run(&arg)?,
        Mode::BestJob(arg) => inspect::run_best_job(&arg)?,
        Mode::CheckJob(arg) => inspect::run_check_job(&arg)?,
        Mode::Predict(arg) => predict::run(&arg)?,
    }
    Ok(())
}
