use anyhow::Context as _;
use evonet_training::inspect;

use crate::{command::RunArg, store::JsonCheckpointStore};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PredictArg {
    #[clap(flatten)]
    pub(super) run: RunArg,
    /// Operands of the question (two for add/mod/multiply, one for factor)
    #[arg(long, num_args = 1.., required = true)]
    pub(super) operands: Vec<u64>,
}

pub(crate) fn run(arg: &PredictArg) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::open(&arg.run.run_dir, arg.run.domain);
    let prediction = inspect::predict(&store, &arg.operands)
        .with_context(|| format!("Failed to predict {:?}", arg.operands))?;
    let answer = prediction.answer;
    println!(
        "job {}: a={} b={} -> {} ({})",
        prediction.job,
        answer.problem.a,
        answer.problem.b,
        answer.problem.answer,
        if answer.correct { "correct" } else { "wrong" }
    );
    Ok(())
}
