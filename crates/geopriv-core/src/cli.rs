//! Shared plumbing for the driver binaries
//!
//! Dataset and configuration loading, logging setup, seeded randomness and
//! output writing. Only built with the `cli` feature.

use crate::aggregate::{AggregatorConfig, BoundRange, PrivacyBudget, Statistic};
use crate::dataset::Dataset;
use crate::rng::{from_entropy, seeded};
use crate::Seed;
use anyhow::{bail, Context};
use rand_chacha::ChaCha20Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Output format shared by the binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Compact,
    Table,
}

/// Statistics release settings read from `--config`; flags override them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    pub measure: Option<String>,
    pub epsilon: Option<PrivacyBudget>,
    pub bounds: Option<BoundRange>,
    pub statistics: Option<Vec<Statistic>>,
    pub aggregator: AggregatorConfig,
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second initialization (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Load a JSON array of records
pub fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let dataset: Dataset = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
    tracing::info!(
        records = dataset.len(),
        located = dataset.located(),
        path = %path.display(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Load a JSON configuration file
pub fn load_config<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
}

/// Seeded generator for reproducible runs, else OS entropy
pub fn random_source(seed: Option<&str>) -> ChaCha20Rng {
    match seed {
        Some(s) => seeded(Seed::from_string(s)),
        None => from_entropy(),
    }
}

/// Parse `attribute=bins`, as in `age=4`
pub fn parse_bin_spec(spec: &str) -> anyhow::Result<(String, usize)> {
    let Some((key, bins)) = spec.split_once('=') else {
        bail!("Expected attribute=bins, got '{}'", spec);
    };
    let bins: usize = bins
        .trim()
        .parse()
        .with_context(|| format!("Invalid bin count in '{}'", spec))?;
    Ok((key.trim().to_string(), bins))
}

/// Render a serializable value as JSON text
pub fn to_json<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Compact => serde_json::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    })
}

/// Write to `output`, or stdout when absent
pub fn write_output(text: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Output written to: {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
