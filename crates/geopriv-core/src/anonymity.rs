//! k-Anonymity Grouping
//!
//! Records are grouped by their projection onto a tuple of quasi-identifier
//! attributes. A dataset is k-anonymous for that tuple when every resulting
//! equivalence class holds at least k records.
//!
//! ```text
//! (age, gender)      count
//! (34, Female)         1   <- violates k = 2
//! (35, Male)           4
//! ```
//!
//! Numeric attributes usually need generalizing first; see
//! [`crate::binning::bin_attribute`].

use crate::dataset::{AttributeValue, Record};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The quasi-identifier tuple shared by one equivalence class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassKey(pub Vec<AttributeValue>);

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Class sizes for one attribute tuple, ordered by key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceClasses {
    keys: Vec<String>,
    counts: BTreeMap<ClassKey, usize>,
}

impl EquivalenceClasses {
    /// Attribute names, in tuple order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, key: &ClassKey) -> Option<usize> {
        self.counts.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClassKey, usize)> {
        self.counts.iter().map(|(k, &c)| (k, c))
    }

    /// Number of records grouped
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Group `records` by the quasi-identifiers named in `keys`
///
/// A record lacking any of the keys fails with
/// [`crate::GeoPrivError::MissingAttribute`]. An empty key tuple puts every
/// record in one class.
pub fn equivalence_classes<S: AsRef<str>>(
    records: &[Record],
    keys: &[S],
) -> Result<EquivalenceClasses> {
    let mut counts: BTreeMap<ClassKey, usize> = BTreeMap::new();

    for record in records {
        let key = keys
            .iter()
            .map(|k| record.attribute(k.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        *counts.entry(ClassKey(key)).or_insert(0) += 1;
    }

    tracing::debug!(records = records.len(), classes = counts.len(), "equivalence classes built");

    Ok(EquivalenceClasses {
        keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        counts,
    })
}

/// Every class with fewer than `k` records
pub fn violating_classes(classes: &EquivalenceClasses, k: usize) -> Vec<(ClassKey, usize)> {
    classes
        .iter()
        .filter(|&(_, count)| count < k)
        .map(|(key, count)| (key.clone(), count))
        .collect()
}

/// Smallest class size, i.e. the k the grouping actually achieves
///
/// `None` when there are no records.
pub fn anonymity_level(classes: &EquivalenceClasses) -> Option<usize> {
    classes.iter().map(|(_, count)| count).min()
}

pub fn is_k_anonymous(classes: &EquivalenceClasses, k: usize) -> bool {
    violating_classes(classes, k).is_empty()
}
