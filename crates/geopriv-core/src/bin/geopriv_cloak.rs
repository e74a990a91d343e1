//! Spatial k-anonymity cloaking and k-anonymity reports
//!
//! Usage:
//!   geopriv-cloak --data <file> cloak --target <id> -k <k> [--focal-rank <n>] [--shape hull|bbox|circle]
//!   geopriv-cloak --data <file> batch -k <k> [--where <key=value>]
//!   geopriv-cloak --data <file> groups --keys age,gender [--bin age=4] -k <k>
//!   geopriv-cloak --data <file> attack -k <k> --focal-rank <n>

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use geopriv_core::attack::{evaluate_centroid_attack, AttackEvaluation};
use geopriv_core::batch::{BatchCloaker, BatchConfig};
use geopriv_core::cli::{self, OutputFormat};
use geopriv_core::cloak::{cloak, cloak_conditioned, AttributeEquals};
use geopriv_core::*;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geopriv-cloak")]
#[command(version = "0.1.0")]
#[command(about = "Cloak locations into k-anonymous regions and audit quasi-identifiers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dataset file (JSON array of records)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Cloaking settings file (JSON); flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "json", global = true)]
    format: OutputFormat,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Hull,
    Bbox,
    Circle,
}

impl From<Shape> for GeometryKind {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Hull => GeometryKind::ConvexHull,
            Shape::Bbox => GeometryKind::BoundingBox,
            Shape::Circle => GeometryKind::Circle,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    Planar,
    Haversine,
}

impl From<Metric> for DistanceMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Planar => DistanceMetric::Planar,
            Metric::Haversine => DistanceMetric::Haversine,
        }
    }
}

/// Cloaking flags shared by the spatial subcommands
#[derive(Args)]
struct CloakArgs {
    /// Minimum anonymity set size
    #[arg(short)]
    k: Option<usize>,

    /// Re-center on the n-th nearest neighbor (0 = no re-centering)
    #[arg(long)]
    focal_rank: Option<usize>,

    #[arg(long, value_enum)]
    shape: Option<Shape>,

    #[arg(long, value_enum)]
    metric: Option<Metric>,
}

impl CloakArgs {
    fn apply(&self, mut config: CloakConfig) -> CloakConfig {
        if let Some(k) = self.k {
            config = config.with_k(k);
        }
        if let Some(rank) = self.focal_rank {
            config = config.with_focal_rank(rank);
        }
        if let Some(shape) = self.shape {
            config = config.with_shape(shape.into());
        }
        if let Some(metric) = self.metric {
            config = config.with_metric(metric.into());
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cloak one subject
    Cloak {
        /// Identifier of the subject record
        #[arg(short, long)]
        target: String,

        #[command(flatten)]
        cloak: CloakArgs,

        /// Condition on a sensitive attribute, as key=value
        #[arg(long = "where")]
        condition: Option<String>,
    },

    /// Cloak every located subject
    Batch {
        #[command(flatten)]
        cloak: CloakArgs,

        #[arg(long = "where")]
        condition: Option<String>,

        /// Report failing subjects instead of stopping
        #[arg(long)]
        skip_failures: bool,
    },

    /// Equivalence classes over quasi-identifiers
    Groups {
        /// Quasi-identifiers to group by
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,

        /// Bin a numeric attribute before grouping, as attribute=bins
        #[arg(long)]
        bin: Vec<String>,

        /// Minimum class size
        #[arg(short, default_value = "2")]
        k: usize,
    },

    /// Evaluate the center-of-region attack with and without re-centering
    Attack {
        #[command(flatten)]
        cloak: CloakArgs,

        /// Centroid guesses within this distance count as hits
        #[arg(long, default_value = "10.0")]
        hit_radius: f64,
    },
}

#[derive(Serialize)]
struct CloakOutput<'a> {
    target: &'a str,
    size: usize,
    members: Vec<&'a str>,
    set: AnonymitySet,
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    cloaked: usize,
    unlocated: usize,
    mean_set_size: f64,
    mean_area: f64,
    sets: Vec<CloakOutput<'a>>,
    failures: Vec<FailureOutput<'a>>,
}

#[derive(Serialize)]
struct FailureOutput<'a> {
    target: &'a str,
    error: String,
}

#[derive(Serialize)]
struct ClassOutput {
    class: String,
    count: usize,
}

#[derive(Serialize)]
struct GroupsOutput {
    keys: Vec<String>,
    k: usize,
    anonymity_level: Option<usize>,
    k_anonymous: bool,
    classes: Vec<ClassOutput>,
    violating: Vec<ClassOutput>,
}

fn main() -> anyhow::Result<()> {
    cli::init_tracing();
    let args = Cli::parse();

    let data = args.data.as_deref().context("--data is required")?;
    let dataset = cli::load_dataset(data)?;
    let records = dataset.records();
    let base: CloakConfig = match &args.config {
        Some(path) => cli::load_config(path)?,
        None => CloakConfig::default(),
    };

    let text = match &args.command {
        Commands::Cloak { target, cloak: flags, condition } => {
            let config = flags.apply(base);
            let index = dataset
                .position(target)
                .with_context(|| format!("No record with id '{}'", target))?;
            let set = match condition {
                Some(c) => cloak_conditioned(Target::Member(index), records, &config, &AttributeEquals::parse(c)?)?,
                None => cloak(Target::Member(index), records, &config)?,
            };
            let output = CloakOutput {
                target,
                size: set.len(),
                members: set.ids(records),
                set,
            };
            match args.format {
                OutputFormat::Table => render_cloak(&output),
                format => cli::to_json(&output, format)?,
            }
        }
        Commands::Batch { cloak: flags, condition, skip_failures } => {
            let config = BatchConfig::default()
                .with_cloak(flags.apply(base))
                .with_skip_failures(*skip_failures);
            let cloaker = BatchCloaker::new(config);
            let result = match condition {
                Some(c) => cloaker.cloak_all_conditioned(records, &AttributeEquals::parse(c)?)?,
                None => cloaker.cloak_all(records)?,
            };
            let output = BatchOutput {
                cloaked: result.success_count(),
                unlocated: result.unlocated,
                mean_set_size: result.stats.mean_set_size,
                mean_area: result.stats.mean_area,
                sets: result
                    .items
                    .into_iter()
                    .map(|item| CloakOutput {
                        target: records[item.index].id.as_str(),
                        size: item.set.len(),
                        members: item.set.ids(records),
                        set: item.set,
                    })
                    .collect(),
                failures: result
                    .failures
                    .iter()
                    .map(|(index, error)| FailureOutput {
                        target: records[*index].id.as_str(),
                        error: error.to_string(),
                    })
                    .collect(),
            };
            cli::to_json(&output, args.format)?
        }
        Commands::Groups { keys, bin: bins, k } => {
            let mut grouped = records.to_vec();
            for spec in bins {
                let (key, n) = cli::parse_bin_spec(spec)?;
                grouped = bin_attribute(&grouped, &key, n, &key)?;
            }
            let classes = equivalence_classes(&grouped, keys.as_slice())?;
            let output = GroupsOutput {
                keys: keys.clone(),
                k: *k,
                anonymity_level: anonymity_level(&classes),
                k_anonymous: is_k_anonymous(&classes, *k),
                classes: classes
                    .iter()
                    .map(|(key, count)| ClassOutput { class: key.to_string(), count })
                    .collect(),
                violating: violating_classes(&classes, *k)
                    .into_iter()
                    .map(|(key, count)| ClassOutput { class: key.to_string(), count })
                    .collect(),
            };
            match args.format {
                OutputFormat::Table => render_groups(&output),
                format => cli::to_json(&output, format)?,
            }
        }
        Commands::Attack { cloak: flags, hit_radius } => {
            let mut config = flags.apply(base);
            if config.focal_rank == 0 {
                config = config.with_focal_rank(config.k.saturating_sub(2).max(1));
            }
            let evaluation = evaluate_centroid_attack(records, &config, *hit_radius)?;
            match args.format {
                OutputFormat::Table => render_attack(&evaluation),
                format => cli::to_json(&evaluation, format)?,
            }
        }
    };

    cli::write_output(&text, args.output.as_deref())
}

fn render_cloak(output: &CloakOutput) -> String {
    let set = &output.set;
    let mut lines = vec![
        format!("{}", format!("Anonymity set for '{}'", output.target).green().bold()),
        format!("  k = {}, size = {}, shape = {:?}", set.k, set.len(), set.shape),
        format!(
            "  focal point: rank {} at ({:.6}, {:.6})",
            set.focal.rank, set.focal.point.x, set.focal.point.y
        ),
    ];
    if let Some(matches) = set.predicate_matches {
        lines.push(format!("  predicate matches: {}", matches));
    }
    for (member, id) in set.members.iter().zip(&output.members) {
        lines.push(format!("  {:<16} {:>14.3}", id, member.distance));
    }
    lines.push(format!("  geometry vertices: {}", set.geometry.vertices().len()));
    lines.join("\n")
}

fn render_groups(output: &GroupsOutput) -> String {
    let mut lines = vec![format!(
        "{}",
        format!("Equivalence classes over ({})", output.keys.join(", ")).green().bold()
    )];
    for class in &output.classes {
        let row = format!("  {:<40} {:>6}", class.class, class.count);
        lines.push(if class.count < output.k {
            format!("{}", row.red())
        } else {
            row
        });
    }
    let verdict = if output.k_anonymous {
        format!("{}", format!("{}-anonymous", output.k).green())
    } else {
        format!(
            "{}",
            format!("{} classes below k = {}", output.violating.len(), output.k).yellow()
        )
    };
    lines.push(format!(
        "  anonymity level: {}  ({})",
        output.anonymity_level.map_or("-".to_string(), |l| l.to_string()),
        verdict
    ));
    lines.join("\n")
}

fn render_attack(evaluation: &AttackEvaluation) -> String {
    let row = |label: &str, s: &geopriv_core::attack::AttackSummary| {
        format!(
            "  {:<12} {:>6} {:>14.3} {:>14.3} {:>6}",
            label, s.focal_rank, s.mean_error, s.median_error, s.hits
        )
    };
    [
        format!("{}", "Center-of-region attack".green().bold()),
        format!(
            "  {:<12} {:>6} {:>14} {:>14} {:>6}",
            "variant", "rank", "mean error", "median error", "hits"
        ),
        row("naive", &evaluation.naive),
        row("re-centered", &evaluation.recentered),
        format!("  error ratio: {:.2}x", evaluation.improvement()),
    ]
    .join("\n")
}
