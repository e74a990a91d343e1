//! Equal-Width Binning
//!
//! Generalizes a numeric quasi-identifier (e.g. exact age) into a small
//! number of ranges before grouping. The observed range `[min, max]` is cut
//! into `n` equal-width intervals, half-open `[lo, hi)` except the last one
//! which is closed `[lo, max]`, so every value in range maps to exactly one
//! bin. Values outside the range observed at [`bin`] time are rejected.

use crate::dataset::{AttributeValue, Record};
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One bin: `[lower, upper)`, or `[lower, upper]` when `closed`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BinInterval {
    pub lower: f64,
    pub upper: f64,
    pub closed: bool,
}

impl BinInterval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && (value < self.upper || (self.closed && value == self.upper))
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    fn key(&self) -> (u64, u64, bool) {
        (self.lower.to_bits(), self.upper.to_bits(), self.closed)
    }
}

// Bins come from finite, non-NaN edges, so bitwise identity is value identity
impl PartialEq for BinInterval {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BinInterval {}

impl Hash for BinInterval {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for BinInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lower
            .total_cmp(&other.lower)
            .then(self.upper.total_cmp(&other.upper))
            .then(self.closed.cmp(&other.closed))
    }
}

impl fmt::Display for BinInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.closed { ']' } else { ')' };
        write!(f, "[{}, {}{}", self.lower, self.upper, close)
    }
}

#[derive(Serialize, Deserialize)]
struct BinningRepr {
    min: f64,
    max: f64,
    intervals: Vec<BinInterval>,
}

/// Equal-width bins over an observed range
///
/// Deserialized binnings are checked like the ones [`bin`] builds: at least
/// one bin, finite contiguous edges from `min` to `max`, and only the last
/// bin closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BinningRepr", into = "BinningRepr")]
pub struct Binning {
    min: f64,
    max: f64,
    intervals: Vec<BinInterval>,
}

impl TryFrom<BinningRepr> for Binning {
    type Error = GeoPrivError;

    fn try_from(repr: BinningRepr) -> Result<Self> {
        let invalid = |reason: &str| Err(GeoPrivError::InvalidParameter(format!("binning {}", reason)));

        let (Some(first), Some(last)) = (repr.intervals.first(), repr.intervals.last()) else {
            return invalid("has no intervals");
        };
        if !repr.min.is_finite() || !repr.max.is_finite() || repr.min > repr.max {
            return invalid("range must be finite with min <= max");
        }
        if first.lower != repr.min || last.upper != repr.max {
            return invalid("edges must run from min to max");
        }
        if !last.closed {
            return invalid("last interval must be closed");
        }
        let body = &repr.intervals[..repr.intervals.len() - 1];
        if body.iter().any(|b| b.closed) {
            return invalid("only the last interval may be closed");
        }
        if repr.intervals.iter().any(|b| b.lower.is_nan() || b.upper.is_nan() || b.lower > b.upper) {
            return invalid("interval has lower edge above upper edge");
        }
        if repr.intervals.windows(2).any(|w| w[0].upper != w[1].lower) {
            return invalid("intervals must be sorted and contiguous");
        }

        Ok(Binning {
            min: repr.min,
            max: repr.max,
            intervals: repr.intervals,
        })
    }
}

impl From<Binning> for BinningRepr {
    fn from(binning: Binning) -> Self {
        BinningRepr {
            min: binning.min,
            max: binning.max,
            intervals: binning.intervals,
        }
    }
}

impl Binning {
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn intervals(&self) -> &[BinInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Index of the bin holding `value`
    pub fn assign_index(&self, value: f64) -> Result<usize> {
        if value.is_nan() || value < self.min || value > self.max {
            return Err(GeoPrivError::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        let last = self.intervals.len() - 1;
        if value == self.max {
            return Ok(last);
        }
        // Last bin whose lower edge is at or below the value
        let above = self.intervals.partition_point(|b| b.lower <= value);
        Ok(above.saturating_sub(1).min(last))
    }

    /// The bin holding `value`
    pub fn assign(&self, value: f64) -> Result<BinInterval> {
        Ok(self.intervals[self.assign_index(value)?])
    }
}

/// Cut the observed range of `values` into `num_bins` equal-width bins
///
/// When every value is equal, all bins but the last are empty and the last
/// one is the single point `[v, v]`.
pub fn bin(values: &[f64], num_bins: usize) -> Result<Binning> {
    if num_bins == 0 {
        return Err(GeoPrivError::InvalidParameter(
            "number of bins must be at least 1".to_string(),
        ));
    }
    if values.is_empty() {
        return Err(GeoPrivError::EmptyInput);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(GeoPrivError::InvalidParameter(
            "cannot bin non-finite values".to_string(),
        ));
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / num_bins as f64;

    let edge = |i: usize| {
        if i == num_bins {
            max
        } else {
            (min + width * i as f64).min(max)
        }
    };
    let intervals = (0..num_bins)
        .map(|i| BinInterval {
            lower: edge(i),
            upper: edge(i + 1),
            closed: i + 1 == num_bins,
        })
        .collect();

    Ok(Binning { min, max, intervals })
}

/// Derived copies of `records` with `key` binned into `new_key`
///
/// `key` is read as an ordinal quasi-identifier or a measure; every record
/// must have it.
pub fn bin_attribute(
    records: &[Record],
    key: &str,
    num_bins: usize,
    new_key: &str,
) -> Result<Vec<Record>> {
    let values = records
        .iter()
        .map(|r| r.numeric(key))
        .collect::<Result<Vec<f64>>>()?;
    let binning = bin(&values, num_bins)?;

    records
        .iter()
        .zip(values)
        .map(|(record, value)| {
            let interval = binning.assign(value)?;
            let mut copy = record.clone();
            copy.quasi.insert(new_key.to_string(), AttributeValue::Bin(interval));
            Ok(copy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equal_width_edges() {
        let binning = bin(&[20.0, 35.0, 60.0, 45.0], 4).unwrap();
        let lowers: Vec<f64> = binning.intervals().iter().map(|b| b.lower).collect();
        assert_eq!(lowers, vec![20.0, 30.0, 40.0, 50.0]);
        assert_eq!(binning.intervals()[3].upper, 60.0);
        assert!(binning.intervals()[3].closed);
        assert!(!binning.intervals()[0].closed);
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let binning = bin(&[0.0, 10.0], 2).unwrap();
        assert_eq!(binning.assign_index(0.0).unwrap(), 0);
        assert_eq!(binning.assign_index(4.999).unwrap(), 0);
        assert_eq!(binning.assign_index(5.0).unwrap(), 1);
        // Maximum falls in the closed last bin
        assert_eq!(binning.assign_index(10.0).unwrap(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let binning = bin(&[0.0, 10.0], 2).unwrap();
        assert_eq!(
            binning.assign(10.5),
            Err(GeoPrivError::OutOfRange { value: 10.5, min: 0.0, max: 10.0 })
        );
        assert!(binning.assign(-1.0).is_err());
        assert!(binning.assign(f64::NAN).is_err());
    }

    #[test]
    fn test_constant_values() {
        let binning = bin(&[7.0, 7.0, 7.0], 3).unwrap();
        let bin = binning.assign(7.0).unwrap();
        assert!(bin.closed);
        assert!(bin.contains(7.0));
        let holding = binning.intervals().iter().filter(|b| b.contains(7.0)).count();
        assert_eq!(holding, 1);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(bin(&[], 3), Err(GeoPrivError::EmptyInput));
        assert!(matches!(bin(&[1.0], 0), Err(GeoPrivError::InvalidParameter(_))));
        assert!(bin(&[1.0, f64::INFINITY], 2).is_err());
    }

    #[test]
    fn test_deserialized_binning_is_checked() {
        let ok: Binning = serde_json::from_str(
            r#"{"min": 0.0, "max": 10.0, "intervals": [
                {"lower": 0.0, "upper": 5.0, "closed": false},
                {"lower": 5.0, "upper": 10.0, "closed": true}]}"#,
        )
        .unwrap();
        assert_eq!(ok, bin(&[0.0, 10.0], 2).unwrap());
        assert_eq!(ok.assign_index(7.0).unwrap(), 1);

        let rejected = [
            // no bins
            r#"{"min": 0.0, "max": 10.0, "intervals": []}"#,
            // out of order
            r#"{"min": 0.0, "max": 10.0, "intervals": [
                {"lower": 5.0, "upper": 10.0, "closed": false},
                {"lower": 0.0, "upper": 5.0, "closed": true}]}"#,
            // gap between bins
            r#"{"min": 0.0, "max": 10.0, "intervals": [
                {"lower": 0.0, "upper": 4.0, "closed": false},
                {"lower": 5.0, "upper": 10.0, "closed": true}]}"#,
            // last bin open
            r#"{"min": 0.0, "max": 10.0, "intervals": [
                {"lower": 0.0, "upper": 5.0, "closed": false},
                {"lower": 5.0, "upper": 10.0, "closed": false}]}"#,
            // closed bin before the last
            r#"{"min": 0.0, "max": 10.0, "intervals": [
                {"lower": 0.0, "upper": 5.0, "closed": true},
                {"lower": 5.0, "upper": 10.0, "closed": true}]}"#,
            // range disagrees with the edges
            r#"{"min": -1.0, "max": 12.0, "intervals": [
                {"lower": 0.0, "upper": 5.0, "closed": false},
                {"lower": 5.0, "upper": 10.0, "closed": true}]}"#,
            // inverted interval
            r#"{"min": 0.0, "max": 0.0, "intervals": [
                {"lower": 0.0, "upper": 5.0, "closed": false},
                {"lower": 5.0, "upper": 0.0, "closed": true}]}"#,
        ];
        for json in rejected {
            assert!(serde_json::from_str::<Binning>(json).is_err(), "accepted {}", json);
        }
    }

    #[test]
    fn test_binning_survives_json() {
        let binning = bin(&[18.0, 42.0, 69.0], 4).unwrap();
        let json = serde_json::to_string(&binning).unwrap();
        let back: Binning = serde_json::from_str(&json).unwrap();
        assert_eq!(back, binning);
        assert_eq!(back.assign(69.0).unwrap(), binning.assign(69.0).unwrap());
    }

    #[test]
    fn test_bin_attribute_adds_group() {
        let records = vec![
            Record::new("a").with_quasi("age", 22),
            Record::new("b").with_quasi("age", 38),
            Record::new("c").with_quasi("age", 61),
        ];
        let binned = bin_attribute(&records, "age", 2, "age_group").unwrap();

        assert_eq!(binned.len(), 3);
        assert_eq!(binned[0].attribute("age_group"), binned[1].attribute("age_group"));
        assert_ne!(binned[0].attribute("age_group"), binned[2].attribute("age_group"));
        // Inputs untouched
        assert!(records[0].quasi.get("age_group").is_none());

        let missing = vec![Record::new("a").with_quasi("age", 22), Record::new("b")];
        assert!(matches!(
            bin_attribute(&missing, "age", 2, "age_group"),
            Err(GeoPrivError::MissingAttribute { .. })
        ));
    }

    proptest! {
        #[test]
        fn every_value_in_range_has_exactly_one_bin(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 1..50),
            num_bins in 1usize..20,
            probe in 0.0f64..=1.0,
        ) {
            let binning = bin(&values, num_bins).unwrap();
            let v = binning.min() + probe * (binning.max() - binning.min());
            let v = v.clamp(binning.min(), binning.max());

            let holding: Vec<usize> = binning
                .intervals()
                .iter()
                .enumerate()
                .filter(|(_, b)| b.contains(v))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(holding.len(), 1);
            prop_assert_eq!(holding[0], binning.assign_index(v).unwrap());

            for &value in &values {
                let interval = binning.assign(value).unwrap();
                prop_assert!(interval.contains(value));
            }
        }
    }
}
