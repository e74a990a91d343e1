//! Differentially private statistics for one measure of a dataset
//!
//! Usage:
//!   geopriv-stats --data <file> --measure <name> --epsilon <e> --lower <lo> --upper <hi>
//!                 [--stat mean,std_dev,max,count] [--count-above <limit>]
//!                 [--trials <n>] [--seed <s>] [--format json|compact|table]

use anyhow::Context;
use clap::Parser;
use colored::*;
use geopriv_core::aggregate::Summary;
use geopriv_core::cli::{self, OutputFormat, ReleaseConfig};
use geopriv_core::*;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geopriv-stats")]
#[command(version = "0.1.0")]
#[command(about = "Release differentially private statistics for a numeric measure", long_about = None)]
struct Cli {
    /// Dataset file (JSON array of records)
    #[arg(short, long)]
    data: PathBuf,

    /// Numeric measure to release
    #[arg(short, long)]
    measure: Option<String>,

    /// Total privacy budget, split evenly across statistics
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Lower clamping bound
    #[arg(long, allow_negative_numbers = true)]
    lower: Option<f64>,

    /// Upper clamping bound
    #[arg(long, allow_negative_numbers = true)]
    upper: Option<f64>,

    /// Statistics to release
    #[arg(long = "stat", value_delimiter = ',')]
    stats: Vec<String>,

    /// Also release a noisy count of values above this limit
    #[arg(long, allow_negative_numbers = true)]
    count_above: Option<f64>,

    /// Repeat the release and summarize the noise (each repetition spends ε again)
    #[arg(long, default_value = "1")]
    trials: usize,

    /// Seed string for a reproducible run
    #[arg(long)]
    seed: Option<String>,

    /// Release settings file (JSON); flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct CountAbove {
    limit: f64,
    true_value: usize,
    private_value: i64,
    epsilon: f64,
}

#[derive(Serialize)]
struct TrialSummary {
    statistic: Statistic,
    true_value: f64,
    sample_mean: f64,
    sample_variance: f64,
    /// Variance of the Laplace noise alone
    noise_variance: f64,
}

#[derive(Serialize)]
struct StatsOutput {
    measure: String,
    report: ReleaseReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    count_above: Option<CountAbove>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trials: Vec<TrialSummary>,
}

fn main() -> anyhow::Result<()> {
    cli::init_tracing();
    let args = Cli::parse();

    let file: ReleaseConfig = match &args.config {
        Some(path) => cli::load_config(path)?,
        None => ReleaseConfig::default(),
    };

    let measure = args
        .measure
        .clone()
        .or(file.measure.clone())
        .context("No measure given (--measure or config)")?;
    let epsilon = match args.epsilon {
        Some(e) => PrivacyBudget::new(e)?,
        None => file.epsilon.context("No budget given (--epsilon or config)")?,
    };
    let bounds = match (args.lower, args.upper, file.bounds) {
        (Some(lo), Some(hi), _) => BoundRange::new(lo, hi)?,
        (None, None, Some(b)) => b,
        (lo, hi, file_bounds) => {
            let base = file_bounds.context("Both --lower and --upper are required")?;
            BoundRange::new(lo.unwrap_or(base.lower()), hi.unwrap_or(base.upper()))?
        }
    };
    let statistics: Vec<Statistic> = if args.stats.is_empty() {
        file.statistics
            .clone()
            .unwrap_or_else(|| vec![Statistic::Mean, Statistic::StdDev, Statistic::Max])
    } else {
        args.stats
            .iter()
            .map(|s| s.parse::<Statistic>())
            .collect::<Result<_>>()?
    };
    if args.trials == 0 {
        anyhow::bail!("--trials must be at least 1");
    }

    let dataset = cli::load_dataset(&args.data)?;
    let values = dataset.column(&measure)?;
    let mut rng = cli::random_source(args.seed.as_deref());

    // The count-above query takes one equal share of the budget
    let mut account = BudgetAccount::new(epsilon.epsilon())?;
    let parts = statistics.len() + usize::from(args.count_above.is_some());
    let share = account.even_share(parts)?;
    let release_budget = PrivacyBudget::new(share * statistics.len() as f64)?;

    let mut reports = Vec::with_capacity(args.trials);
    for _ in 0..args.trials {
        reports.push(release_statistics(
            &values,
            bounds,
            release_budget,
            &statistics,
            &file.aggregator,
            &mut rng,
        )?);
    }
    account.spend(release_budget.epsilon())?;

    let count_above = match args.count_above {
        Some(limit) => {
            account.spend(share)?;
            Some(CountAbove {
                limit,
                true_value: values.iter().filter(|&&v| v > limit).count(),
                private_value: private_count_above_with(
                    &values,
                    limit,
                    PrivacyBudget::new(share)?,
                    file.aggregator.count_policy,
                    &mut rng,
                )?,
                epsilon: share,
            })
        }
        None => None,
    };

    let trials = if args.trials > 1 {
        summarize_trials(&reports)
    } else {
        Vec::new()
    };

    let Some(report) = reports.into_iter().next() else {
        anyhow::bail!("no release produced");
    };
    let output = StatsOutput {
        measure,
        report,
        count_above,
        trials,
    };

    let text = match args.format {
        OutputFormat::Table => render_table(&output, &Summary::of(&values)?),
        format => cli::to_json(&output, format)?,
    };
    cli::write_output(&text, args.output.as_deref())
}

fn summarize_trials(reports: &[ReleaseReport]) -> Vec<TrialSummary> {
    let Some(first) = reports.first() else {
        return Vec::new();
    };
    first
        .statistics
        .iter()
        .map(|s| {
            let samples: Vec<f64> = reports
                .iter()
                .filter_map(|r| r.get(s.statistic))
                .map(|r| r.private_value)
                .collect();
            let n = samples.len() as f64;
            let mean = samples.iter().sum::<f64>() / n;
            let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
            TrialSummary {
                statistic: s.statistic,
                true_value: s.true_value,
                sample_mean: mean,
                sample_variance: variance,
                noise_variance: LaplaceMechanism::variance(s.noise_scale),
            }
        })
        .collect()
}

fn render_table(output: &StatsOutput, summary: &Summary) -> String {
    let report = &output.report;
    let mut lines = vec![
        format!("{}", format!("Private release of '{}'", output.measure).green().bold()),
        format!(
            "  n = {}, bounds = [{}, {}], total ε = {}",
            report.n,
            report.bounds.lower(),
            report.bounds.upper(),
            report.total_epsilon
        ),
    ];
    if report.clamped > 0 {
        lines.push(format!(
            "  {}",
            format!("{} values clamped into bounds; results are biased", report.clamped).yellow()
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "  {:<10} {:>14} {:>14} {:>8} {:>12}",
        "statistic", "true", "private", "ε", "±95%"
    ));
    for s in &report.statistics {
        lines.push(format!(
            "  {:<10} {:>14.3} {:>14.3} {:>8.3} {:>12.3}",
            s.statistic.name(),
            s.true_value,
            s.private_value,
            s.epsilon,
            s.noise_ci95
        ));
    }
    if let Some(c) = &output.count_above {
        lines.push(format!(
            "  {:<10} {:>14} {:>14} {:>8.3}",
            format!("> {}", c.limit),
            c.true_value,
            c.private_value,
            c.epsilon
        ));
    }
    if !output.trials.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}", "Repeated releases".yellow()));
        lines.push(format!(
            "  {:<10} {:>14} {:>14} {:>14}",
            "statistic", "sample mean", "sample var", "noise var"
        ));
        for t in &output.trials {
            lines.push(format!(
                "  {:<10} {:>14.3} {:>14.3} {:>14.3}",
                t.statistic.name(),
                t.sample_mean,
                t.sample_variance,
                t.noise_variance
            ));
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "  raw column: mean {:.3}, std dev {:.3}, max {:.3}",
        summary.mean, summary.std_dev, summary.max
    ));
    lines.join("\n")
}
