//! Center-of-Region Attack
//!
//! An attacker who receives a cloaked region guesses that the subject sits
//! at its centroid. The attacker's error is the distance from that guess to
//! the true location: the larger, the better the cloaking resists.
//!
//! [`evaluate_centroid_attack`] cloaks every located record as its own
//! target, once around the subject and once re-centered on a neighbor, and
//! compares the attacker's errors.

use crate::cloak::{cloak, AnonymitySet, CloakConfig, Target};
use crate::dataset::Record;
use crate::geometry::{DistanceMetric, Point};
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};

/// Distance from the released geometry's centroid to the true target
pub fn centroid_attack_error(set: &AnonymitySet, target: Point, metric: DistanceMetric) -> f64 {
    metric.distance(&set.geometry.centroid(), &target)
}

/// Attacker errors over many cloaked subjects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackSummary {
    pub focal_rank: usize,
    pub subjects: usize,
    pub mean_error: f64,
    pub median_error: f64,
    /// Subjects whose centroid guess lands within `hit_radius`
    pub hits: usize,
    pub mean_area: f64,
}

/// Naive versus re-centered cloaking under the attack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackEvaluation {
    pub k: usize,
    pub hit_radius: f64,
    pub naive: AttackSummary,
    pub recentered: AttackSummary,
}

impl AttackEvaluation {
    /// Ratio of mean attacker error, re-centered over naive
    pub fn improvement(&self) -> f64 {
        if self.naive.mean_error == 0.0 {
            f64::INFINITY
        } else {
            self.recentered.mean_error / self.naive.mean_error
        }
    }
}

fn summarize(
    records: &[Record],
    subjects: &[(usize, Point)],
    config: &CloakConfig,
    hit_radius: f64,
) -> Result<AttackSummary> {
    let mut errors = Vec::with_capacity(subjects.len());
    let mut area = 0.0;
    for &(index, point) in subjects {
        let set = cloak(Target::Member(index), records, config)?;
        errors.push(centroid_attack_error(&set, point, config.metric));
        area += set.geometry.area();
    }

    let n = errors.len() as f64;
    let mean_error = errors.iter().sum::<f64>() / n;
    let hits = errors.iter().filter(|&&e| e <= hit_radius).count();
    errors.sort_by(|a, b| a.total_cmp(b));
    let mid = errors.len() / 2;
    let median_error = if errors.len() % 2 == 0 {
        (errors[mid - 1] + errors[mid]) / 2.0
    } else {
        errors[mid]
    };

    Ok(AttackSummary {
        focal_rank: config.focal_rank,
        subjects: errors.len(),
        mean_error,
        median_error,
        hits,
        mean_area: area / n,
    })
}

/// Run the attack against every located record
///
/// `config.focal_rank` must be positive: it is the re-centered variant
/// compared against focal rank 0. A guess within `hit_radius` of the
/// subject counts as a hit.
pub fn evaluate_centroid_attack(
    records: &[Record],
    config: &CloakConfig,
    hit_radius: f64,
) -> Result<AttackEvaluation> {
    config.validate()?;
    if config.focal_rank == 0 {
        return Err(GeoPrivError::InvalidParameter(
            "attack evaluation needs a positive focal rank to compare against".to_string(),
        ));
    }
    if hit_radius.is_nan() || hit_radius < 0.0 {
        return Err(GeoPrivError::InvalidParameter(format!(
            "hit radius must be non-negative, got {}",
            hit_radius
        )));
    }

    let subjects: Vec<(usize, Point)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.location.map(|p| (i, p)))
        .collect();
    if subjects.is_empty() {
        return Err(GeoPrivError::EmptyInput);
    }

    let naive = summarize(records, &subjects, &config.with_focal_rank(0), hit_radius)?;
    let recentered = summarize(records, &subjects, config, hit_radius)?;

    tracing::info!(
        subjects = subjects.len(),
        k = config.k,
        naive_error = naive.mean_error,
        recentered_error = recentered.mean_error,
        "centroid attack evaluated"
    );

    Ok(AttackEvaluation {
        k: config.k,
        hit_radius,
        naive,
        recentered,
    })
}
