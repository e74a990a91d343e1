//! GeoPriv Core - Privacy-Preserving Data Release
//!
//! Pure, in-process anonymization engine for tabular datasets that carry
//! quasi-identifiers, numeric measures and optional point locations.
//!
//! # Features
//!
//! - Laplace mechanism with an injectable uniform random source
//! - Bounded, noise-injected count / mean / standard deviation / max
//! - Equivalence classes and k-anonymity violation reports, with equal-width binning
//! - Spatial k-anonymity cloaking (plain and attribute-conditioned) with
//!   n-th-nearest-neighbor focal re-centering against the center-of-region attack
//! - Convex hull, bounding box and circle geometries for the released region
//!
//! # Example
//!
//! ```rust
//! use geopriv_core::{cloak, CloakConfig, Point, Record};
//!
//! let records: Vec<Record> = (0..5)
//!     .map(|i| Record::new(format!("r{i}")).with_location(Point::new(i as f64 * 10.0, 0.0)))
//!     .collect();
//!
//! let config = CloakConfig::default().with_k(3);
//! let set = cloak::cloak(Point::new(0.0, 0.0), &records, &config).unwrap();
//!
//! assert_eq!(set.len(), 3);
//! assert!(set.geometry.contains(&Point::new(0.0, 0.0)));
//! ```

pub mod aggregate;
pub mod anonymity;
pub mod attack;
pub mod batch;
pub mod binning;
pub mod budget;
pub mod cloak;
pub mod dataset;
pub mod geomask;
pub mod geometry;
pub mod laplace;
pub mod rng;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types for convenience
pub use aggregate::{
    private_count, private_count_above, private_count_above_with, private_max, private_mean,
    private_std_dev, release_statistics, AggregatorConfig, BoundRange, CountPolicy, PrivacyBudget,
    ReleaseReport, Statistic, Summary,
};
pub use anonymity::{
    anonymity_level, equivalence_classes, is_k_anonymous, violating_classes, ClassKey,
    EquivalenceClasses,
};
pub use binning::{bin, bin_attribute, BinInterval, Binning};
pub use budget::BudgetAccount;
pub use cloak::{AnonymitySet, CloakConfig, FocalPoint, RankedNeighbor, Target};
pub use dataset::{AttributeValue, Dataset, Record};
pub use geometry::{BoundingBox, DistanceMetric, Geometry, GeometryKind, Point};
pub use laplace::LaplaceMechanism;
pub use rng::{SharedSource, UniformSource};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte seed for reproducible noise generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed(pub [u8; 32]);

impl Seed {
    /// Create a seed from a string (hashed to 32 bytes)
    pub fn from_string(s: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        let result = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&result);
        Seed(seed)
    }

    /// Create a seed from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Seed(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Errors that can occur in release operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoPrivError {
    /// Lower clamping bound exceeds the upper one
    #[error("Invalid bounds: lower {lower} exceeds upper {upper}")]
    InvalidBounds { lower: f64, upper: f64 },
    /// Epsilon is zero, negative or not finite
    #[error("Invalid privacy budget: {0}")]
    InvalidBudget(f64),
    /// Empty input
    #[error("Empty input")]
    EmptyInput,
    /// Fewer candidates than the requested anonymity size
    #[error("Insufficient candidates: need {required}, have {available}")]
    InsufficientCandidates { required: usize, available: usize },
    /// Geometry requested over zero points
    #[error("Insufficient points to build a geometry")]
    InsufficientPoints,
    /// Value outside the range observed when the bins were built
    #[error("Value {value} outside binned range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    /// Sequential composition would overspend the total budget
    #[error("Privacy budget exhausted: need ε={required:.4}, have ε={remaining:.4}")]
    BudgetExhausted { required: f64, remaining: f64 },
    /// Two records share an identifier
    #[error("Duplicate record identifier: '{0}'")]
    DuplicateIdentifier(String),
    /// A record lacks an attribute required by the operation
    #[error("Record '{record}' has no attribute '{attribute}'")]
    MissingAttribute { record: String, attribute: String },
    /// Other invalid argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// The random source failed or produced no usable value
    #[error("Random source error: {0}")]
    RandomSource(String),
}

/// Result type for release operations
pub type Result<T> = std::result::Result<T, GeoPrivError>;
