//! Batch Cloaking API
//!
//! Cloaks every located record of a dataset as its own target. Each request
//! ranks and selects on its own derived state; the records are only read, so
//! requests run in parallel via rayon when the `parallel` feature is enabled.
//!
//! # Example
//!
//! ```rust
//! use geopriv_core::batch::{BatchCloaker, BatchConfig};
//! use geopriv_core::{CloakConfig, Point, Record};
//!
//! let records: Vec<Record> = (0..20)
//!     .map(|i| Record::new(format!("r{i}")).with_location(Point::new((i % 5) as f64, (i / 5) as f64)))
//!     .collect();
//!
//! let config = BatchConfig::default().with_cloak(CloakConfig::default().with_k(4));
//! let result = BatchCloaker::new(config).cloak_all(&records).unwrap();
//!
//! assert_eq!(result.success_count(), 20);
//! ```

use crate::cloak::{cloak, cloak_conditioned, AnonymitySet, CloakConfig, RecordPredicate, Target};
use crate::dataset::Record;
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for batch cloaking
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub cloak: CloakConfig,
    /// Enable parallel processing
    pub parallel: bool,
    /// Record failed targets instead of erroring
    pub skip_failures: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            cloak: CloakConfig::default(),
            parallel: true,
            skip_failures: false,
        }
    }
}

impl BatchConfig {
    pub fn with_cloak(mut self, cloak: CloakConfig) -> Self {
        self.cloak = cloak;
        self
    }

    /// Enable/disable parallel processing
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn with_skip_failures(mut self, skip: bool) -> Self {
        self.skip_failures = skip;
        self
    }
}

/// One target's anonymity set
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloakedRecord {
    /// Index of the target record
    pub index: usize,
    pub id: String,
    pub set: AnonymitySet,
}

/// Result from batch cloaking
#[derive(Clone, Debug)]
pub struct BatchResult {
    /// Successfully cloaked targets, in record order
    pub items: Vec<CloakedRecord>,
    /// Failed targets with their error, in record order
    pub failures: Vec<(usize, GeoPrivError)>,
    /// Records skipped for lacking a location
    pub unlocated: usize,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_count(&self) -> usize {
        self.items.len() + self.failures.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_count() == 0 {
            0.0
        } else {
            self.items.len() as f64 / self.total_count() as f64
        }
    }
}

/// Statistics from batch processing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Total processing time in milliseconds
    pub processing_time_ms: u64,
    /// Mean anonymity set size over successful targets
    pub mean_set_size: f64,
    /// Mean geometry area over successful targets
    pub mean_area: f64,
}

type Outcome = (usize, Result<AnonymitySet>);

/// Batch cloaker over one candidate set
pub struct BatchCloaker {
    config: BatchConfig,
}

impl BatchCloaker {
    pub fn new(config: BatchConfig) -> Self {
        BatchCloaker { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Plain cloaking of every located record
    pub fn cloak_all(&self, records: &[Record]) -> Result<BatchResult> {
        let cloak_config = self.config.cloak;
        self.run(records, |i| cloak(Target::Member(i), records, &cloak_config))
    }

    /// Conditioned cloaking of every located record
    pub fn cloak_all_conditioned<P>(&self, records: &[Record], predicate: &P) -> Result<BatchResult>
    where
        P: RecordPredicate + Sync,
    {
        let cloak_config = self.config.cloak;
        self.run(records, |i| {
            cloak_conditioned(Target::Member(i), records, &cloak_config, predicate)
        })
    }

    fn run<F>(&self, records: &[Record], cloak_fn: F) -> Result<BatchResult>
    where
        F: Fn(usize) -> Result<AnonymitySet> + Sync,
    {
        self.config.cloak.validate()?;
        let start_time = std::time::Instant::now();

        let targets: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.location.is_some())
            .map(|(i, _)| i)
            .collect();
        let unlocated = records.len() - targets.len();

        let outcomes = if self.config.parallel {
            self.cloak_parallel(&targets, &cloak_fn)
        } else {
            self.cloak_sequential(&targets, &cloak_fn)
        };

        let mut items = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(set) => items.push(CloakedRecord {
                    index,
                    id: records[index].id.clone(),
                    set,
                }),
                Err(e) if self.config.skip_failures => failures.push((index, e)),
                Err(e) => return Err(e),
            }
        }

        let n = items.len().max(1) as f64;
        let stats = BatchStats {
            processing_time_ms: start_time.elapsed().as_millis() as u64,
            mean_set_size: items.iter().map(|c| c.set.len() as f64).sum::<f64>() / n,
            mean_area: items.iter().map(|c| c.set.geometry.area()).sum::<f64>() / n,
        };

        tracing::info!(
            cloaked = items.len(),
            failed = failures.len(),
            unlocated,
            k = self.config.cloak.k,
            elapsed_ms = stats.processing_time_ms,
            "batch cloaking finished"
        );

        Ok(BatchResult {
            items,
            failures,
            unlocated,
            stats,
        })
    }

    /// Cloak targets with parallel processing
    #[cfg(feature = "parallel")]
    fn cloak_parallel<F>(&self, targets: &[usize], cloak_fn: &F) -> Vec<Outcome>
    where
        F: Fn(usize) -> Result<AnonymitySet> + Sync,
    {
        use rayon::prelude::*;

        // Indexed collect keeps record order
        targets.par_iter().map(|&i| (i, cloak_fn(i))).collect()
    }

    /// Fallback when parallel feature is disabled
    #[cfg(not(feature = "parallel"))]
    fn cloak_parallel<F>(&self, targets: &[usize], cloak_fn: &F) -> Vec<Outcome>
    where
        F: Fn(usize) -> Result<AnonymitySet>,
    {
        self.cloak_sequential(targets, cloak_fn)
    }

    fn cloak_sequential<F>(&self, targets: &[usize], cloak_fn: &F) -> Vec<Outcome>
    where
        F: Fn(usize) -> Result<AnonymitySet>,
    {
        targets.iter().map(|&i| (i, cloak_fn(i))).collect()
    }
}
