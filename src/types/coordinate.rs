//! Axis coordinates
//!
//! Every axis of a [LabeledArray](crate::array::LabeledArray) carries a coordinate: the sequence
//! of labels along that axis. Ordered axes (time, replicate) use numeric or timestamp
//! coordinates, categorical axes (state, region) use string labels.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A coordinate (label sequence) for one axis.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Coordinate {
    /// Integer labels, e.g. replicate indices or integer time steps
    Integer(Vec<i64>),
    /// Floating point labels, e.g. fractional days
    Float(Vec<f64>),
    /// Timestamps in seconds since the Unix epoch
    Timestamp(Vec<i64>),
    /// Categorical labels, e.g. compartment names
    Label(Vec<String>),
}

/// A single label taken from a [Coordinate].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CoordValue {
    Integer(i64),
    Float(f64),
    Label(String),
}

impl fmt::Display for CoordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordValue::Integer(value) => write!(f, "{}", value),
            CoordValue::Float(value) => write!(f, "{}", value),
            CoordValue::Label(value) => write!(f, "{}", value),
        }
    }
}

impl Coordinate {
    /// Number of labels in the coordinate.
    pub fn len(&self) -> usize {
        match self {
            Coordinate::Integer(values) | Coordinate::Timestamp(values) => values.len(),
            Coordinate::Float(values) => values.len(),
            Coordinate::Label(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the coordinate kind, as used in the API.
    pub fn kind(&self) -> &'static str {
        match self {
            Coordinate::Integer(_) => "integer",
            Coordinate::Float(_) => "float",
            Coordinate::Timestamp(_) => "timestamp",
            Coordinate::Label(_) => "label",
        }
    }

    /// Whether the coordinate kind can describe an ordered axis.
    pub fn is_ordinal(&self) -> bool {
        !matches!(self, Coordinate::Label(_))
    }

    /// Whether the labels are strictly increasing.
    ///
    /// Label coordinates are never considered monotonic. A float coordinate containing NaN is not
    /// monotonic.
    pub fn is_strictly_increasing(&self) -> bool {
        match self {
            Coordinate::Integer(values) | Coordinate::Timestamp(values) => {
                values.windows(2).all(|pair| pair[0] < pair[1])
            }
            Coordinate::Float(values) => {
                values.iter().all(|value| !value.is_nan())
                    && values.windows(2).all(|pair| pair[0] < pair[1])
            }
            Coordinate::Label(_) => false,
        }
    }

    /// Returns the label at `index`, if present.
    pub fn value(&self, index: usize) -> Option<CoordValue> {
        match self {
            Coordinate::Integer(values) | Coordinate::Timestamp(values) => {
                values.get(index).copied().map(CoordValue::Integer)
            }
            Coordinate::Float(values) => values.get(index).copied().map(CoordValue::Float),
            Coordinate::Label(values) => values.get(index).cloned().map(CoordValue::Label),
        }
    }

    /// Returns the position of a label given in its string form.
    ///
    /// Grouping mappings refer to labels by string, so numeric labels are matched on their
    /// formatted representation.
    pub fn position(&self, label: &str) -> Option<usize> {
        match self {
            Coordinate::Label(values) => values.iter().position(|value| value == label),
            _ => (0..self.len()).find(|index| {
                self.value(*index)
                    .map(|value| value.to_string() == label)
                    .unwrap_or(false)
            }),
        }
    }

    /// All labels in string form.
    pub fn labels(&self) -> Vec<String> {
        (0..self.len())
            .filter_map(|index| self.value(index))
            .map(|value| value.to_string())
            .collect()
    }

    /// Returns the sub-coordinate covering `range`.
    pub fn slice(&self, range: Range<usize>) -> Coordinate {
        match self {
            Coordinate::Integer(values) => Coordinate::Integer(values[range].to_vec()),
            Coordinate::Float(values) => Coordinate::Float(values[range].to_vec()),
            Coordinate::Timestamp(values) => Coordinate::Timestamp(values[range].to_vec()),
            Coordinate::Label(values) => Coordinate::Label(values[range].to_vec()),
        }
    }
}

impl From<Vec<&str>> for Coordinate {
    fn from(labels: Vec<&str>) -> Self {
        Coordinate::Label(labels.into_iter().map(String::from).collect())
    }
}
