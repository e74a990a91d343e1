//! Records and Datasets
//!
//! A [`Record`] is one subject's observation: an identifier, categorical or
//! ordinal quasi-identifiers, numeric measures and an optional location.
//! A [`Dataset`] owns records with unique identifiers.
//!
//! Nothing in the crate mutates a dataset in place. Binning, ranking and
//! selection all produce derived copies or index views.

use crate::binning::BinInterval;
use crate::geometry::Point;
use crate::{GeoPrivError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Value of a quasi-identifier attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Ordinal value (age, year of birth, ...)
    Integer(i64),
    /// Categorical value (gender, postcode, ...)
    Text(String),
    /// Generalized ordinal value produced by binning
    Bin(BinInterval),
}

impl AttributeValue {
    /// Numeric view, for ordinal values only
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => write!(f, "{}", s),
            AttributeValue::Bin(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Integer(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Integer(v as i64)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<BinInterval> for AttributeValue {
    fn from(b: BinInterval) -> Self {
        AttributeValue::Bin(b)
    }
}

/// One subject's observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub quasi: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub measures: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Point>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Record {
            id: id.into(),
            quasi: BTreeMap::new(),
            measures: BTreeMap::new(),
            location: None,
        }
    }

    pub fn with_quasi(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.quasi.insert(key.into(), value.into());
        self
    }

    pub fn with_measure(mut self, key: impl Into<String>, value: f64) -> Self {
        self.measures.insert(key.into(), value);
        self
    }

    pub fn with_location(mut self, location: Point) -> Self {
        self.location = Some(location);
        self
    }

    /// Quasi-identifier `key`, failing with [`GeoPrivError::MissingAttribute`]
    pub fn attribute(&self, key: &str) -> Result<&AttributeValue> {
        self.quasi.get(key).ok_or_else(|| self.missing(key))
    }

    /// Numeric value of `key`: an ordinal quasi-identifier, else a measure
    pub fn numeric(&self, key: &str) -> Result<f64> {
        if let Some(v) = self.quasi.get(key).and_then(AttributeValue::as_f64) {
            return Ok(v);
        }
        self.measures.get(key).copied().ok_or_else(|| self.missing(key))
    }

    pub(crate) fn missing(&self, attribute: &str) -> GeoPrivError {
        GeoPrivError::MissingAttribute {
            record: self.id.clone(),
            attribute: attribute.to_string(),
        }
    }
}

/// Records with unique identifiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Record>", into = "Vec<Record>")]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    /// Fails with [`GeoPrivError::DuplicateIdentifier`] on a repeated id
    pub fn new(records: Vec<Record>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(GeoPrivError::DuplicateIdentifier(record.id.clone()));
            }
        }
        Ok(Dataset { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the record with identifier `id`
    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Numeric column `measure`, in record order
    ///
    /// Every record must carry the measure.
    pub fn column(&self, measure: &str) -> Result<Vec<f64>> {
        self.records.iter().map(|r| r.numeric(measure)).collect()
    }

    /// Number of records carrying a location
    pub fn located(&self) -> usize {
        self.records.iter().filter(|r| r.location.is_some()).count()
    }
}

impl TryFrom<Vec<Record>> for Dataset {
    type Error = GeoPrivError;

    fn try_from(records: Vec<Record>) -> Result<Self> {
        Dataset::new(records)
    }
}

impl From<Dataset> for Vec<Record> {
    fn from(dataset: Dataset) -> Self {
        dataset.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rider(id: &str, age: i64, gender: &str) -> Record {
        Record::new(id)
            .with_quasi("age", age)
            .with_quasi("gender", gender)
            .with_measure("distance", 1200.0)
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let result = Dataset::new(vec![rider("A1", 30, "Male"), rider("A1", 40, "Female")]);
        assert_eq!(result, Err(GeoPrivError::DuplicateIdentifier("A1".to_string())));
    }

    #[test]
    fn test_column_and_lookup() {
        let dataset = Dataset::new(vec![
            rider("A1", 30, "Male"),
            rider("A2", 40, "Female").with_measure("distance", 800.0),
        ])
        .unwrap();

        assert_eq!(dataset.column("distance").unwrap(), vec![1200.0, 800.0]);
        assert_eq!(dataset.column("age").unwrap(), vec![30.0, 40.0]);
        assert_eq!(dataset.position("A2"), Some(1));
        assert!(matches!(
            dataset.column("fare"),
            Err(GeoPrivError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_shape() {
        let json = r#"[
            {"id": "A1091", "quasi": {"age": 34, "gender": "Female"},
             "measures": {"distance": 1234.5}, "location": {"x": 4.37, "y": 50.83}},
            {"id": "B2", "quasi": {"gender": "Male"}}
        ]"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.located(), 1);

        let first = &dataset.records()[0];
        assert_eq!(first.attribute("age").unwrap(), &AttributeValue::Integer(34));
        assert_eq!(first.attribute("gender").unwrap().as_str(), Some("Female"));
        assert_eq!(first.location, Some(Point::new(4.37, 50.83)));

        let duplicate = r#"[{"id": "X"}, {"id": "X"}]"#;
        assert!(serde_json::from_str::<Dataset>(duplicate).is_err());
    }
}
