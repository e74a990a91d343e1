//! Differentially Private Aggregates
//!
//! Bounded, noise-injected count / mean / standard deviation / max over a
//! numeric column, using the Laplace mechanism.
//!
//! # Sensitivity model
//!
//! Values are clamped into a [`BoundRange`] `[lo, hi]` before anything else.
//! For n clamped values and budget ε the noise scale of each statistic is
//! fixed by [`Statistic::noise_scale`]:
//!
//! | statistic | sensitivity | Laplace scale |
//! |-----------|-------------|---------------|
//! | count     | 1           | 1/ε           |
//! | mean      | (hi-lo)/n   | (hi-lo)/(ε·n) |
//! | std dev   | (hi-lo)/√n  | (hi-lo)/(ε·√n)|
//! | max       | hi-lo       | (hi-lo)/ε     |
//!
//! Max is a plain Laplace release of the clamped maximum. Its noise does not
//! shrink with n, so it is high-variance by nature, and any outlier above a
//! poorly chosen `hi` is silently pulled down to `hi`.
//!
//! # Bounds
//!
//! Mis-set bounds are not an error: values outside them are clamped and the
//! result is biased accordingly. Clamping is reported with a `tracing` warning.
//!
//! # Nondeterminism
//!
//! Repeated calls with identical inputs return different outputs. Only a
//! seeded or scripted [`UniformSource`] makes results reproducible.

use crate::budget::BudgetAccount;
use crate::laplace::LaplaceMechanism;
use crate::rng::UniformSource;
use crate::validation::{validate_bounds, validate_epsilon};
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};

/// Privacy budget ε for one computation, always finite and positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct PrivacyBudget(f64);

impl PrivacyBudget {
    /// Fails with [`GeoPrivError::InvalidBudget`] unless ε is finite and > 0
    pub fn new(epsilon: f64) -> Result<Self> {
        validate_epsilon(epsilon)?;
        Ok(PrivacyBudget(epsilon))
    }

    pub fn epsilon(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for PrivacyBudget {
    type Error = GeoPrivError;

    fn try_from(epsilon: f64) -> Result<Self> {
        PrivacyBudget::new(epsilon)
    }
}

impl From<PrivacyBudget> for f64 {
    fn from(budget: PrivacyBudget) -> f64 {
        budget.0
    }
}

#[derive(Serialize, Deserialize)]
struct BoundsRepr {
    lower: f64,
    upper: f64,
}

/// Clamping interval `[lower, upper]` assumed for a measure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoundsRepr", into = "BoundsRepr")]
pub struct BoundRange {
    lower: f64,
    upper: f64,
}

impl BoundRange {
    /// Fails with [`GeoPrivError::InvalidBounds`] when lower > upper or the
    /// width is not representable
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        validate_bounds(lower, upper)?;
        Ok(BoundRange { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    /// Clamp a column into the range, counting what moved
    pub fn clamp_all(&self, values: &[f64]) -> Clamped {
        let mut below = 0;
        let mut above = 0;
        let values = values
            .iter()
            .map(|&v| {
                if v < self.lower {
                    below += 1;
                } else if v > self.upper {
                    above += 1;
                }
                self.clamp(v)
            })
            .collect();
        Clamped { values, below, above }
    }
}

impl TryFrom<BoundsRepr> for BoundRange {
    type Error = GeoPrivError;

    fn try_from(repr: BoundsRepr) -> Result<Self> {
        BoundRange::new(repr.lower, repr.upper)
    }
}

impl From<BoundRange> for BoundsRepr {
    fn from(bounds: BoundRange) -> Self {
        BoundsRepr {
            lower: bounds.lower,
            upper: bounds.upper,
        }
    }
}

/// A clamped copy of a column
#[derive(Debug, Clone, PartialEq)]
pub struct Clamped {
    pub values: Vec<f64>,
    /// Values raised to the lower bound
    pub below: usize,
    /// Values lowered to the upper bound
    pub above: usize,
}

impl Clamped {
    pub fn altered(&self) -> usize {
        self.below + self.above
    }
}

/// How a noisy count is post-processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Each record contributes presence 0/1; the rounded noisy count is
    /// released as is and may be negative for small true counts
    #[default]
    Presence,
    /// As `Presence`, then the rounded result is raised to at least 0
    NonNegative,
}

/// Aggregator settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub count_policy: CountPolicy,
}

impl AggregatorConfig {
    pub fn with_count_policy(mut self, policy: CountPolicy) -> Self {
        self.count_policy = policy;
        self
    }
}

/// A releasable statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Count,
    Mean,
    StdDev,
    Max,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [Statistic::Count, Statistic::Mean, Statistic::StdDev, Statistic::Max];

    /// L1 sensitivity over `n` values clamped into `bounds`
    pub fn sensitivity(&self, bounds: &BoundRange, n: usize) -> f64 {
        let n = n.max(1) as f64;
        match self {
            Statistic::Count => 1.0,
            Statistic::Mean => bounds.width() / n,
            Statistic::StdDev => bounds.width() / n.sqrt(),
            Statistic::Max => bounds.width(),
        }
    }

    /// Laplace scale: sensitivity / ε
    pub fn noise_scale(&self, bounds: &BoundRange, n: usize, budget: PrivacyBudget) -> f64 {
        self.sensitivity(bounds, n) / budget.epsilon()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Mean => "mean",
            Statistic::StdDev => "std_dev",
            Statistic::Max => "max",
        }
    }
}

impl std::str::FromStr for Statistic {
    type Err = GeoPrivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Statistic::Count),
            "mean" => Ok(Statistic::Mean),
            "std_dev" | "stddev" | "sd" => Ok(Statistic::StdDev),
            "max" => Ok(Statistic::Max),
            other => Err(GeoPrivError::InvalidParameter(format!(
                "unknown statistic '{}'",
                other
            ))),
        }
    }
}

fn check_column(values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(GeoPrivError::EmptyInput);
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(GeoPrivError::InvalidParameter(
            "column contains NaN".to_string(),
        ));
    }
    Ok(())
}

fn clamp_column(values: &[f64], bounds: &BoundRange) -> Result<Clamped> {
    check_column(values)?;
    let clamped = bounds.clamp_all(values);
    if clamped.altered() > 0 {
        tracing::warn!(
            below = clamped.below,
            above = clamped.above,
            lower = bounds.lower(),
            upper = bounds.upper(),
            "values clamped into bounds; released statistics are biased"
        );
    }
    Ok(clamped)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Reject a noise scale that overflows
///
/// With finite bounds this only happens when ε is so small that Δf/ε is no
/// longer representable, so it is reported as an unusable budget.
fn checked_scale(scale: f64, budget: PrivacyBudget) -> Result<f64> {
    if scale.is_finite() {
        Ok(scale)
    } else {
        Err(GeoPrivError::InvalidBudget(budget.epsilon()))
    }
}

fn noisy_count<S: UniformSource + ?Sized>(
    true_count: usize,
    budget: PrivacyBudget,
    policy: CountPolicy,
    source: &mut S,
) -> Result<i64> {
    let scale = checked_scale(1.0 / budget.epsilon(), budget)?;
    let noisy = (true_count as f64 + LaplaceMechanism::sample(scale, source)?).round() as i64;
    tracing::debug!(scale, ?policy, "private count");
    Ok(match policy {
        CountPolicy::Presence => noisy,
        CountPolicy::NonNegative => noisy.max(0),
    })
}

/// Noisy number of values, with [`CountPolicy::Presence`]
///
/// Adds Lap(1/ε) to the true count and rounds. Small true counts can come
/// out negative; that is the mechanism working, not a bug.
pub fn private_count<S: UniformSource + ?Sized>(
    values: &[f64],
    budget: PrivacyBudget,
    source: &mut S,
) -> Result<i64> {
    private_count_with(values, budget, CountPolicy::Presence, source)
}

/// Noisy number of values under an explicit [`CountPolicy`]
pub fn private_count_with<S: UniformSource + ?Sized>(
    values: &[f64],
    budget: PrivacyBudget,
    policy: CountPolicy,
    source: &mut S,
) -> Result<i64> {
    check_column(values)?;
    noisy_count(values.len(), budget, policy, source)
}

/// Noisy number of values strictly greater than `limit`
///
/// Zero matches is a valid true count; only an empty column is rejected.
pub fn private_count_above<S: UniformSource + ?Sized>(
    values: &[f64],
    limit: f64,
    budget: PrivacyBudget,
    source: &mut S,
) -> Result<i64> {
    private_count_above_with(values, limit, budget, CountPolicy::Presence, source)
}

/// Noisy number of values strictly greater than `limit` under an explicit [`CountPolicy`]
pub fn private_count_above_with<S: UniformSource + ?Sized>(
    values: &[f64],
    limit: f64,
    budget: PrivacyBudget,
    policy: CountPolicy,
    source: &mut S,
) -> Result<i64> {
    check_column(values)?;
    let above = values.iter().filter(|&&v| v > limit).count();
    noisy_count(above, budget, policy, source)
}

/// Noisy mean of the clamped values, noise Lap((hi-lo)/(ε·n))
pub fn private_mean<S: UniformSource + ?Sized>(
    values: &[f64],
    bounds: BoundRange,
    budget: PrivacyBudget,
    source: &mut S,
) -> Result<f64> {
    let clamped = clamp_column(values, &bounds)?;
    let n = clamped.values.len();
    let scale = checked_scale(Statistic::Mean.noise_scale(&bounds, n, budget), budget)?;
    tracing::debug!(n, scale, "private mean");
    Ok(mean(&clamped.values) + LaplaceMechanism::sample(scale, source)?)
}

/// Noisy population standard deviation of the clamped values
///
/// Noise Lap((hi-lo)/(ε·√n)). A negative noisy result is clamped to 0,
/// which biases the release upward when the true deviation is near zero.
pub fn private_std_dev<S: UniformSource + ?Sized>(
    values: &[f64],
    bounds: BoundRange,
    budget: PrivacyBudget,
    source: &mut S,
) -> Result<f64> {
    let clamped = clamp_column(values, &bounds)?;
    let n = clamped.values.len();
    let scale = checked_scale(Statistic::StdDev.noise_scale(&bounds, n, budget), budget)?;
    tracing::debug!(n, scale, "private standard deviation");
    let noisy = std_dev(&clamped.values) + LaplaceMechanism::sample(scale, source)?;
    Ok(noisy.max(0.0))
}

/// Noisy maximum of the clamped values, noise Lap((hi-lo)/ε)
///
/// High variance, low utility: the noise does not shrink with n.
pub fn private_max<S: UniformSource + ?Sized>(
    values: &[f64],
    bounds: BoundRange,
    budget: PrivacyBudget,
    source: &mut S,
) -> Result<f64> {
    let clamped = clamp_column(values, &bounds)?;
    if clamped.above > 0 {
        tracing::warn!(
            above = clamped.above,
            upper = bounds.upper(),
            "maximum exceeds the upper bound; private max cannot report it"
        );
    }
    let scale = checked_scale(Statistic::Max.noise_scale(&bounds, clamped.values.len(), budget), budget)?;
    tracing::debug!(scale, "private max");
    Ok(max(&clamped.values) + LaplaceMechanism::sample(scale, source)?)
}

/// One private statistic computed with `budget`
pub fn private_statistic<S: UniformSource + ?Sized>(
    statistic: Statistic,
    values: &[f64],
    bounds: BoundRange,
    budget: PrivacyBudget,
    config: &AggregatorConfig,
    source: &mut S,
) -> Result<f64> {
    match statistic {
        Statistic::Count => {
            private_count_with(values, budget, config.count_policy, source).map(|c| c as f64)
        }
        Statistic::Mean => private_mean(values, bounds, budget, source),
        Statistic::StdDev => private_std_dev(values, bounds, budget, source),
        Statistic::Max => private_max(values, bounds, budget, source),
    }
}

/// True number of values
pub fn true_count(values: &[f64]) -> Result<usize> {
    check_column(values)?;
    Ok(values.len())
}

/// True mean of the raw (unclamped) values
pub fn true_mean(values: &[f64]) -> Result<f64> {
    check_column(values)?;
    Ok(mean(values))
}

/// True population standard deviation of the raw values
pub fn true_std_dev(values: &[f64]) -> Result<f64> {
    check_column(values)?;
    Ok(std_dev(values))
}

/// True maximum of the raw values
pub fn true_max(values: &[f64]) -> Result<f64> {
    check_column(values)?;
    Ok(max(values))
}

/// Non-private summary of a raw column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Result<Self> {
        check_column(values)?;
        Ok(Summary {
            count: values.len(),
            mean: mean(values),
            std_dev: std_dev(values),
            max: max(values),
        })
    }

    pub fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Count => self.count as f64,
            Statistic::Mean => self.mean,
            Statistic::StdDev => self.std_dev,
            Statistic::Max => self.max,
        }
    }
}

/// One released statistic alongside its true value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasedStatistic {
    pub statistic: Statistic,
    /// Computed on the raw column; for comparison only, never released
    pub true_value: f64,
    pub private_value: f64,
    pub epsilon: f64,
    pub noise_scale: f64,
    /// Half-width holding 95% of the noise
    pub noise_ci95: f64,
}

/// A multi-statistic release under one total budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseReport {
    pub n: usize,
    pub bounds: BoundRange,
    pub total_epsilon: f64,
    /// Values altered by clamping
    pub clamped: usize,
    pub statistics: Vec<ReleasedStatistic>,
}

impl ReleaseReport {
    pub fn get(&self, statistic: Statistic) -> Option<&ReleasedStatistic> {
        self.statistics.iter().find(|s| s.statistic == statistic)
    }
}

/// Release several statistics, splitting `total` evenly (basic composition)
pub fn release_statistics<S: UniformSource + ?Sized>(
    values: &[f64],
    bounds: BoundRange,
    total: PrivacyBudget,
    statistics: &[Statistic],
    config: &AggregatorConfig,
    source: &mut S,
) -> Result<ReleaseReport> {
    if statistics.is_empty() {
        return Err(GeoPrivError::InvalidParameter(
            "no statistics requested".to_string(),
        ));
    }
    let summary = Summary::of(values)?;
    let clamped = bounds.clamp_all(values).altered();

    let mut account = BudgetAccount::new(total.epsilon())?;
    let share = PrivacyBudget::new(account.even_share(statistics.len())?)?;

    let mut released = Vec::with_capacity(statistics.len());
    for &statistic in statistics {
        account.spend(share.epsilon())?;
        let private_value = private_statistic(statistic, values, bounds, share, config, source)?;
        let noise_scale = statistic.noise_scale(&bounds, values.len(), share);
        released.push(ReleasedStatistic {
            statistic,
            true_value: summary.get(statistic),
            private_value,
            epsilon: share.epsilon(),
            noise_scale,
            noise_ci95: LaplaceMechanism::confidence_interval_95(noise_scale),
        });
    }

    tracing::info!(
        n = values.len(),
        statistics = released.len(),
        epsilon = total.epsilon(),
        clamped,
        "statistics released"
    );

    Ok(ReleaseReport {
        n: values.len(),
        bounds,
        total_epsilon: total.epsilon(),
        clamped,
        statistics: released,
    })
}
