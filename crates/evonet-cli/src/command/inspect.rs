use anyhow::Context as _;
use evonet_network::ErrorSummary;
use evonet_training::inspect::{self, JobInspection, JobReport};

use crate::{command::RunArg, store::JsonCheckpointStore};

/// Number of decoded predictions printed per job.
const SHOWN_ANSWERS: usize = 20;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct CheckJobArg {
    #[clap(flatten)]
    pub(super) run: RunArg,
    /// Job (population slot) to inspect
    #[arg(long)]
    pub(super) job: usize,
}

fn format_summary(summary: &ErrorSummary) -> String {
    format!(
        "{:.6} (low {}, high {})",
        summary.mean_abs_error, summary.low_saturated, summary.high_saturated
    )
}

fn print_report(report: &JobReport) {
    println!(
        "job {:>3}  train {}  validation {}",
        report.job,
        format_summary(&report.train),
        format_summary(&report.validation)
    );
}

fn print_inspection(inspection: &JobInspection) {
    print_report(&inspection.report);
    let correct = inspection.answers.iter().filter(|a| a.correct).count();
    println!(
        "validation answers: {correct}/{} correct",
        inspection.answers.len()
    );
    for answer in inspection.answers.iter().take(SHOWN_ANSWERS) {
        let p = answer.problem;
        let mark = if answer.correct { "ok" } else { "--" };
        println!("  {mark} a={} b={} -> {}", p.a, p.b, p.answer);
    }
}

pub(crate) fn run_last_run(arg: &RunArg) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::open(&arg.run_dir, arg.domain);
    let last = inspect::last_run(&store)
        .with_context(|| format!("Failed to inspect run in {}", store.dir().display()))?;
    for report in &last.jobs {
        print_report(report);
    }
    println!("best:");
    for report in &last.best {
        print_report(report);
    }
    Ok(())
}

pub(crate) fn run_best_job(arg: &RunArg) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::open(&arg.run_dir, arg.domain);
    let inspection = inspect::best_job(&store)
        .with_context(|| format!("Failed to inspect run in {}", store.dir().display()))?;
    print_inspection(&inspection);
    Ok(())
}

pub(crate) fn run_check_job(arg: &CheckJobArg) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::open(&arg.run.run_dir, arg.run.domain);
    let inspection = inspect::check_job(&store, arg.job).with_context(|| {
        format!(
            "Failed to inspect job {} in {}",
            arg.job,
            store.dir().display()
        )
    })?;
    print_inspection(&inspection);
    Ok(())
}
