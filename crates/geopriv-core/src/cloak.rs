//! Spatial k-Anonymity Cloaking
//!
//! Releases a region instead of a subject's exact location. The region is
//! built over an anonymity set of at least k candidate records nearest to
//! the subject, so the subject cannot be told apart from k-1 others.
//!
//! # Request flow
//!
//! 1. **Rank** every located candidate by distance to the target, ties kept
//!    in input order ([`rank`]).
//! 2. **Select** the k nearest ([`select_plain`]), or the smallest ranked
//!    prefix holding k records that satisfy a predicate on a sensitive
//!    attribute ([`select_conditioned`]).
//! 3. **Re-center** on the n-th ranked neighbor when `focal_rank = n > 0`,
//!    re-ranking and re-selecting around it, then extending the selection
//!    along the new ranking until it contains the target.
//! 4. **Enclose** the set in a convex hull, bounding box or circle.
//!
//! # Center-of-region attack
//!
//! With `focal_rank = 0` the region is grown around the subject itself, so
//! its centroid is an excellent guess of the subject's location. Growing it
//! around a nearby neighbor instead decouples the region's apparent center
//! from the subject (see [`crate::attack`]).
//!
//! The geometry always contains the target. Asking for more members than
//! there are located candidates fails with
//! [`GeoPrivError::InsufficientCandidates`]; a smaller set is never returned.

use crate::dataset::{AttributeValue, Record};
use crate::geometry::{enclose, DistanceMetric, Geometry, GeometryKind, Point};
use crate::validation::{validate_focal_rank, validate_k};
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};

/// Cloaking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloakConfig {
    /// Minimum anonymity set size
    pub k: usize,
    /// Rank of the neighbor to re-center on; 0 disables re-centering
    pub focal_rank: usize,
    pub shape: GeometryKind,
    pub metric: DistanceMetric,
}

impl Default for CloakConfig {
    fn default() -> Self {
        CloakConfig {
            k: 5,
            focal_rank: 0,
            shape: GeometryKind::ConvexHull,
            metric: DistanceMetric::Planar,
        }
    }
}

impl CloakConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_focal_rank(mut self, rank: usize) -> Self {
        self.focal_rank = rank;
        self
    }

    pub fn with_shape(mut self, shape: GeometryKind) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_k(self.k)?;
        validate_focal_rank(self.focal_rank, self.k)
    }
}

/// The subject being cloaked
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Index of a candidate record
    Member(usize),
    /// A location not in the candidate set
    External(Point),
}

impl From<Point> for Target {
    fn from(point: Point) -> Self {
        Target::External(point)
    }
}

/// A candidate with its distance to the ranking reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedNeighbor {
    /// Index into the candidate slice
    pub index: usize,
    pub distance: f64,
    pub point: Point,
}

/// Public center of an anonymity set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalPoint {
    /// Rank in the target's neighbor ordering; 0 is the target itself
    pub rank: usize,
    /// Candidate the focal point was taken from, if any
    pub index: Option<usize>,
    pub point: Point,
}

/// A released anonymity set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymitySet {
    pub k: usize,
    /// Members ranked by distance to the focal point
    pub members: Vec<RankedNeighbor>,
    pub focal: FocalPoint,
    pub shape: GeometryKind,
    pub geometry: Geometry,
    /// Predicate matches among members, for conditioned sets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate_matches: Option<usize>,
}

impl AnonymitySet {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.members.iter().map(|m| m.index).collect()
    }

    pub fn points(&self) -> Vec<Point> {
        self.members.iter().map(|m| m.point).collect()
    }

    pub fn contains_index(&self, index: usize) -> bool {
        self.members.iter().any(|m| m.index == index)
    }

    /// Member identifiers, given the candidates the set was built from
    pub fn ids<'a>(&self, candidates: &'a [Record]) -> Vec<&'a str> {
        self.members
            .iter()
            .filter_map(|m| candidates.get(m.index))
            .map(|r| r.id.as_str())
            .collect()
    }
}

/// Condition on a sensitive attribute for conditioned selection
pub trait RecordPredicate {
    fn matches(&self, record: &Record) -> bool;
}

impl<F> RecordPredicate for F
where
    F: Fn(&Record) -> bool,
{
    fn matches(&self, record: &Record) -> bool {
        self(record)
    }
}

/// `attribute == value`; records without the attribute do not match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeEquals {
    pub key: String,
    pub value: AttributeValue,
}

impl AttributeEquals {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        AttributeEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse `key=value`; integral values become [`AttributeValue::Integer`]
    pub fn parse(s: &str) -> Result<Self> {
        let (key, value) = s.split_once('=').ok_or_else(|| {
            GeoPrivError::InvalidParameter(format!("expected key=value, got '{}'", s))
        })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(GeoPrivError::InvalidParameter(format!(
                "empty attribute name in '{}'",
                s
            )));
        }
        let value = match value.parse::<i64>() {
            Ok(v) => AttributeValue::Integer(v),
            Err(_) => AttributeValue::from(value),
        };
        Ok(AttributeEquals::new(key, value))
    }
}

impl RecordPredicate for AttributeEquals {
    fn matches(&self, record: &Record) -> bool {
        record.quasi.get(&self.key) == Some(&self.value)
    }
}

/// Located candidates ordered by distance to `reference`
///
/// Records without a location are skipped. The sort is stable, so equal
/// distances keep input order and identical inputs rank identically.
pub fn rank(reference: Point, candidates: &[Record], metric: DistanceMetric) -> Vec<RankedNeighbor> {
    let mut ranked: Vec<RankedNeighbor> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            record.location.map(|point| RankedNeighbor {
                index,
                distance: metric.distance(&reference, &point),
                point,
            })
        })
        .collect();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let skipped = candidates.len() - ranked.len();
    if skipped > 0 {
        tracing::debug!(skipped, "records without a location excluded from ranking");
    }
    ranked
}

/// The k nearest ranked candidates
pub fn select_plain(ranked: &[RankedNeighbor], k: usize) -> Result<&[RankedNeighbor]> {
    validate_k(k)?;
    if ranked.len() < k {
        return Err(GeoPrivError::InsufficientCandidates {
            required: k,
            available: ranked.len(),
        });
    }
    Ok(&ranked[..k])
}

/// Smallest ranked prefix holding `k` records that satisfy `predicate`
///
/// The prefix always covers the plain k-selection, since it needs at least k
/// entries to hold k matches. `candidates` is the slice `ranked` indexes into.
pub fn select_conditioned<'r, P>(
    ranked: &'r [RankedNeighbor],
    candidates: &[Record],
    k: usize,
    predicate: &P,
) -> Result<&'r [RankedNeighbor]>
where
    P: RecordPredicate + ?Sized,
{
    validate_k(k)?;
    let mut matches = 0;
    for (i, neighbor) in ranked.iter().enumerate() {
        let hit = candidates
            .get(neighbor.index)
            .map_or(false, |record| predicate.matches(record));
        if hit {
            matches += 1;
            if matches == k {
                return Ok(&ranked[..=i]);
            }
        }
    }
    Err(GeoPrivError::InsufficientCandidates {
        required: k,
        available: matches,
    })
}

/// The `rank`-th entry of a ranking as a focal point
pub fn focal_point(ranked: &[RankedNeighbor], rank: usize) -> Result<FocalPoint> {
    let neighbor = ranked.get(rank).ok_or(GeoPrivError::InsufficientCandidates {
        required: rank + 1,
        available: ranked.len(),
    })?;
    Ok(FocalPoint {
        rank,
        index: Some(neighbor.index),
        point: neighbor.point,
    })
}

/// Build a plain anonymity set of `config.k` candidates around `target`
pub fn cloak(
    target: impl Into<Target>,
    candidates: &[Record],
    config: &CloakConfig,
) -> Result<AnonymitySet> {
    cloak_with(target.into(), candidates, config, None)
}

/// Build an anonymity set holding `config.k` candidates that satisfy `predicate`
///
/// Protects against an attacker who already knows the subject's value of
/// the sensitive attribute: at least k members share it.
pub fn cloak_conditioned<P>(
    target: impl Into<Target>,
    candidates: &[Record],
    config: &CloakConfig,
    predicate: &P,
) -> Result<AnonymitySet>
where
    P: RecordPredicate,
{
    cloak_with(target.into(), candidates, config, Some(predicate as &dyn RecordPredicate))
}

fn resolve(target: Target, candidates: &[Record]) -> Result<(Point, Option<usize>)> {
    match target {
        Target::External(point) => Ok((point, None)),
        Target::Member(index) => {
            let record = candidates.get(index).ok_or_else(|| {
                GeoPrivError::InvalidParameter(format!(
                    "target index {} out of range for {} candidates",
                    index,
                    candidates.len()
                ))
            })?;
            let point = record.location.ok_or_else(|| record.missing("location"))?;
            Ok((point, Some(index)))
        }
    }
}

fn select<'r>(
    ranked: &'r [RankedNeighbor],
    candidates: &[Record],
    k: usize,
    predicate: Option<&dyn RecordPredicate>,
) -> Result<&'r [RankedNeighbor]> {
    match predicate {
        Some(p) => select_conditioned(ranked, candidates, k, p),
        None => select_plain(ranked, k),
    }
}

fn cloak_with(
    target: Target,
    candidates: &[Record],
    config: &CloakConfig,
    predicate: Option<&dyn RecordPredicate>,
) -> Result<AnonymitySet> {
    config.validate()?;
    let (target_point, target_index) = resolve(target, candidates)?;

    let ranked = rank(target_point, candidates, config.metric);
    let selected = select(&ranked, candidates, config.k, predicate)?;

    let (focal, members) = if config.focal_rank == 0 {
        let focal = FocalPoint {
            rank: 0,
            index: target_index,
            point: target_point,
        };
        (focal, selected.to_vec())
    } else {
        let focal = focal_point(&ranked, config.focal_rank)?;
        let reranked = rank(focal.point, candidates, config.metric);
        let mut members = select(&reranked, candidates, config.k, predicate)?.to_vec();

        if let Some(t) = target_index {
            if !members.iter().any(|m| m.index == t) {
                if let Some(pos) = reranked.iter().position(|m| m.index == t) {
                    tracing::debug!(
                        from = members.len(),
                        to = pos + 1,
                        "anonymity set extended to reach the target"
                    );
                    members = reranked[..=pos].to_vec();
                }
            }
        }
        (focal, members)
    };

    let mut points: Vec<Point> = members.iter().map(|m| m.point).collect();
    let mut geometry = enclose(config.shape, focal.point, &points)?;
    if !geometry.contains(&target_point) {
        points.push(target_point);
        geometry = enclose(config.shape, focal.point, &points)?;
    }

    let predicate_matches = predicate.map(|p| {
        members
            .iter()
            .filter(|m| candidates.get(m.index).map_or(false, |r| p.matches(r)))
            .count()
    });

    tracing::debug!(
        k = config.k,
        size = members.len(),
        ranked = ranked.len(),
        focal_rank = config.focal_rank,
        conditioned = predicate.is_some(),
        "anonymity set built"
    );

    Ok(AnonymitySet {
        k: config.k,
        members,
        focal,
        shape: config.shape,
        geometry,
        predicate_matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Five records on a line at distances 0, 10, 20, 30, 40 from the first;
    /// the ones at 10, 30 and 40 are female
    fn line() -> Vec<Record> {
        [(0.0, "Male"), (10.0, "Female"), (20.0, "Male"), (30.0, "Female"), (40.0, "Female")]
            .iter()
            .enumerate()
            .map(|(i, &(x, gender))| {
                Record::new(format!("p{}", i))
                    .with_quasi("gender", gender)
                    .with_location(Point::new(x, 0.0))
            })
            .collect()
    }

    fn scatter() -> Vec<Record> {
        [
            (0.0, 0.0),
            (3.0, 1.0),
            (-2.0, 4.0),
            (5.0, -3.0),
            (1.0, 7.0),
            (-6.0, -1.0),
            (8.0, 6.0),
            (-4.0, 9.0),
            (10.0, -8.0),
            (-9.0, 5.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| Record::new(format!("s{}", i)).with_location(Point::new(x, y)))
        .collect()
    }

    #[test]
    fn test_rank_is_stable() {
        let records: Vec<Record> = (0..4)
            .map(|i| Record::new(format!("t{}", i)).with_location(Point::new(1.0, 0.0)))
            .collect();
        let ranked = rank(Point::new(0.0, 0.0), &records, DistanceMetric::Planar);
        let order: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rank_skips_unlocated() {
        let mut records = line();
        records.insert(2, Record::new("nowhere"));
        let ranked = rank(Point::new(0.0, 0.0), &records, DistanceMetric::Planar);
        assert_eq!(ranked.len(), 5);
        assert!(ranked.iter().all(|r| r.index != 2));
    }

    #[test]
    fn test_plain_selection_scenario() {
        let records = line();
        let set = cloak(Target::Member(0), &records, &CloakConfig::default().with_k(3)).unwrap();
        let distances: Vec<f64> = set.members.iter().map(|m| m.distance).collect();
        assert_eq!(distances, vec![0.0, 10.0, 20.0]);
        assert!(set.geometry.contains(&Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_conditioned_selection_scenario() {
        let records = line();
        let female = AttributeEquals::new("gender", "Female");
        let config = CloakConfig::default().with_k(3);

        let set = cloak_conditioned(Target::Member(0), &records, &config, &female).unwrap();
        let distances: Vec<f64> = set.members.iter().map(|m| m.distance).collect();

        // Smallest prefix holding three female records, the male at 20 included
        assert_eq!(distances, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(set.predicate_matches, Some(3));
        for plain in [0, 1, 2] {
            assert!(set.contains_index(plain));
        }
    }

    #[test]
    fn test_conditioned_predicate_never_reached() {
        let records = line();
        let nobody = AttributeEquals::new("gender", "Other");
        let result = cloak_conditioned(Target::Member(0), &records, &CloakConfig::default().with_k(2), &nobody);
        assert_eq!(
            result,
            Err(GeoPrivError::InsufficientCandidates { required: 2, available: 0 })
        );
    }

    #[test]
    fn test_insufficient_candidates() {
        let records = line();
        let result = cloak(Target::Member(0), &records, &CloakConfig::default().with_k(6));
        assert_eq!(
            result,
            Err(GeoPrivError::InsufficientCandidates { required: 6, available: 5 })
        );
    }

    #[test]
    fn test_invalid_requests() {
        let records = line();
        let config = CloakConfig::default().with_k(3).with_focal_rank(3);
        assert!(matches!(
            cloak(Target::Member(0), &records, &config),
            Err(GeoPrivError::InvalidParameter(_))
        ));
        assert!(cloak(Target::Member(0), &records, &CloakConfig::default().with_k(0)).is_err());
        assert!(cloak(Target::Member(9), &records, &CloakConfig::default().with_k(2)).is_err());

        let mut unlocated = records.clone();
        unlocated.push(Record::new("ghost"));
        assert!(matches!(
            cloak(Target::Member(5), &unlocated, &CloakConfig::default().with_k(2)),
            Err(GeoPrivError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_focal_recentering() {
        let records = scatter();
        let config = CloakConfig::default().with_k(5).with_focal_rank(3);
        let set = cloak(Target::Member(0), &records, &config).unwrap();

        let ranked = rank(Point::new(0.0, 0.0), &records, DistanceMetric::Planar);
        assert_eq!(set.focal.point, ranked[3].point);
        assert_ne!(set.focal.point, Point::new(0.0, 0.0));
        assert!(set.len() >= 5);
        assert!(set.contains_index(0));
        assert!(set.geometry.contains(&Point::new(0.0, 0.0)));

        // Members are ranked around the focal point
        assert!(set.members.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_coincident_candidates() {
        let records: Vec<Record> = (0..4)
            .map(|i| Record::new(format!("c{}", i)).with_location(Point::new(2.0, 2.0)))
            .collect();
        let set = cloak(Target::Member(1), &records, &CloakConfig::default().with_k(3)).unwrap();
        assert_eq!(set.geometry, Geometry::Point(Point::new(2.0, 2.0)));
    }

    #[test]
    fn test_external_target_inside_geometry() {
        let records = scatter();
        // Far outside the point cloud
        let target = Point::new(50.0, 50.0);
        for shape in [GeometryKind::ConvexHull, GeometryKind::BoundingBox, GeometryKind::Circle] {
            let config = CloakConfig::default().with_k(4).with_shape(shape);
            let set = cloak(target, &records, &config).unwrap();
            assert_eq!(set.len(), 4);
            assert!(set.geometry.contains(&target), "{:?}", shape);
            assert_eq!(set.focal.index, None);
        }
    }

    #[test]
    fn test_attribute_equals_parse() {
        let p = AttributeEquals::parse("gender=Female").unwrap();
        assert_eq!(p.value, AttributeValue::from("Female"));
        let p = AttributeEquals::parse("age = 34").unwrap();
        assert_eq!(p.value, AttributeValue::Integer(34));
        assert!(AttributeEquals::parse("gender").is_err());
        assert!(AttributeEquals::parse("=x").is_err());
    }

    #[test]
    fn test_closure_predicate() {
        let records = line();
        let far = |r: &Record| r.location.map_or(false, |p| p.x >= 30.0);
        let set = cloak_conditioned(Target::Member(0), &records, &CloakConfig::default().with_k(2), &far).unwrap();
        assert_eq!(set.len(), 5);
    }

    fn grid_records(points: &[(i32, i32)], flags: &[bool]) -> Vec<Record> {
        points
            .iter()
            .zip(flags)
            .enumerate()
            .map(|(i, (&(x, y), &flag))| {
                Record::new(format!("g{}", i))
                    .with_quasi("flag", if flag { "yes" } else { "no" })
                    .with_location(Point::new(x as f64, y as f64))
            })
            .collect()
    }

    proptest! {
        #[test]
        fn cloak_meets_k_and_contains_target(
            points in prop::collection::vec((-100i32..100, -100i32..100), 1..40),
            k_seed in 0usize..1000,
            target_seed in 0usize..1000,
            focal_seed in 0usize..1000,
        ) {
            let records = grid_records(&points, &vec![false; points.len()]);
            let k = 1 + k_seed % records.len();
            let target = target_seed % records.len();
            let focal_rank = focal_seed % k;
            let target_point = records[target].location.unwrap();

            for shape in [GeometryKind::ConvexHull, GeometryKind::BoundingBox] {
                let config = CloakConfig::default().with_k(k).with_focal_rank(focal_rank).with_shape(shape);
                let set = cloak(Target::Member(target), &records, &config).unwrap();
                prop_assert!(set.len() >= k);
                prop_assert!(set.contains_index(target));
                prop_assert!(set.geometry.contains(&target_point));
            }
        }

        #[test]
        fn conditioned_covers_plain(
            rows in prop::collection::vec(((-100i32..100, -100i32..100), any::<bool>()), 1..40),
            k_seed in 0usize..1000,
            target_seed in 0usize..1000,
        ) {
            let points: Vec<(i32, i32)> = rows.iter().map(|r| r.0).collect();
            let flags: Vec<bool> = rows.iter().map(|r| r.1).collect();
            let records = grid_records(&points, &flags);
            let matching = flags.iter().filter(|&&f| f).count();
            prop_assume!(matching > 0);

            let k = 1 + k_seed % matching;
            let target = target_seed % records.len();
            let config = CloakConfig::default().with_k(k);
            let predicate = AttributeEquals::new("flag", "yes");

            let plain = cloak(Target::Member(target), &records, &config).unwrap();
            let conditioned = cloak_conditioned(Target::Member(target), &records, &config, &predicate).unwrap();

            prop_assert!(conditioned.len() >= plain.len());
            prop_assert_eq!(&conditioned.members[..plain.len()], &plain.members[..]);
            prop_assert!(conditioned.predicate_matches.unwrap_or(0) >= k);
        }
    }
}
