//! Data types and associated functions and methods

use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::{Validate, ValidationError};

use crate::aggregation::{GroupBy, MaxReducer, MinReducer, Reduction};
use crate::array::{Dimension, LabeledArray, REPLICATE, STATE};
use crate::chunker::ChunkRequest;
use crate::error::EpiSummaryError;
use crate::operation::Element;
use crate::summary::{IntervalSeries, Summary, SummaryOptions};
use crate::types::DValue;

use std::sync::Arc;

/// Default quantiles for between- and within-simulation summaries.
pub const DEFAULT_QUANTILES: [f64; 1] = [0.5];
/// Default lower bound of a prediction interval.
pub const DEFAULT_LOWER: f64 = 0.05;
/// Default upper bound of a prediction interval.
pub const DEFAULT_UPPER: f64 = 0.95;

/// Supported numerical data types
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    /// [i32]
    Int32,
    /// [i64]
    Int64,
    /// [u32]
    Uint32,
    /// [u64]
    Uint64,
    /// [f32]
    Float32,
    /// [f64]
    Float64,
}

impl DType {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Int32 => std::mem::size_of::<i32>(),
            Self::Int64 => std::mem::size_of::<i64>(),
            Self::Uint32 => std::mem::size_of::<u32>(),
            Self::Uint64 => std::mem::size_of::<u64>(),
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::Float64 => std::mem::size_of::<f64>(),
        }
    }
}

/// Built-in associative reducers
#[derive(Clone, Copy, Debug, Deserialize, Display, PartialEq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReducerKind {
    Sum,
    Min,
    Max,
}

impl ReducerKind {
    /// Returns the [Reduction] for this kind.
    pub fn reduction<T: Element>(self) -> Reduction<T> {
        match self {
            ReducerKind::Sum => Reduction::Sum,
            ReducerKind::Min => Reduction::Custom(Arc::new(MinReducer)),
            ReducerKind::Max => Reduction::Custom(Arc::new(MaxReducer)),
        }
    }
}

fn default_group_axis() -> String {
    STATE.to_string()
}

/// Grouping of labels along a categorical axis
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct GroupByData {
    /// Axis whose labels are grouped
    #[serde(default = "default_group_axis")]
    #[validate(length(min = 1, message = "group axis must not be empty"))]
    pub axis: String,
    /// Map from axis label to group name
    #[validate(custom = "validate_mapping")]
    pub mapping: HashMap<String, String>,
    /// Name of the grouped output axis
    #[validate(length(min = 1, message = "output name must not be empty"))]
    pub output_name: Option<String>,
}

impl From<&GroupByData> for GroupBy {
    fn from(data: &GroupByData) -> Self {
        GroupBy {
            axis: data.axis.clone(),
            mapping: data.mapping.clone(),
            output_name: data.output_name.clone(),
        }
    }
}

/// Request data for operations
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_request_data"))]
pub struct RequestData {
    /// Data type
    pub dtype: DType,
    /// Dimensions of the array, outermost first
    #[validate]
    #[validate(length(min = 1, message = "dims length must be greater than 0"))]
    pub dims: Vec<Dimension>,
    /// Values in row-major (C) order
    pub values: Vec<DValue>,
    /// Axis to reduce
    #[validate(length(min = 1, message = "axis must not be empty"))]
    pub axis: Option<String>,
    /// Grouping of labels along a categorical axis
    #[validate]
    pub group_by: Option<GroupByData>,
    /// Reducer for generic reductions
    pub reducer: Option<ReducerKind>,
    /// Quantiles to compute
    #[validate(
        length(min = 1, message = "quantiles length must be greater than 0"),
        custom = "validate_quantiles"
    )]
    pub quantiles: Option<Vec<f64>>,
    /// Lower bound of a prediction interval
    #[validate(range(min = 0.0, max = 1.0, message = "lower must be in [0, 1]"))]
    pub lower: Option<f64>,
    /// Upper bound of a prediction interval
    #[validate(range(min = 0.0, max = 1.0, message = "upper must be in [0, 1]"))]
    pub upper: Option<f64>,
    /// Trailing window for within-simulation quantiles
    #[validate(range(min = 1, message = "window must be greater than 0"))]
    pub window: Option<usize>,
    /// Within-simulation axes summed away before quantiles are taken
    pub sum_over: Option<Vec<String>>,
    /// Number of replicate chunks
    #[validate(range(min = 1, message = "n_chunks must be greater than 0"))]
    pub n_chunks: Option<usize>,
    /// Maximum size of a replicate chunk
    #[validate(range(min = 1, message = "chunk_size must be greater than 0"))]
    pub chunk_size: Option<usize>,
}

impl RequestData {
    /// Axis to reduce, defaulting to `replicate`.
    pub fn axis(&self) -> &str {
        self.axis.as_deref().unwrap_or(REPLICATE)
    }

    /// Quantiles to compute, defaulting to the median.
    pub fn quantiles(&self) -> Vec<f64> {
        self.quantiles
            .clone()
            .unwrap_or_else(|| DEFAULT_QUANTILES.to_vec())
    }

    pub fn group_by(&self) -> Option<GroupBy> {
        self.group_by.as_ref().map(GroupBy::from)
    }

    /// Chunk request, if either chunk knob was given.
    pub fn chunking(&self) -> Result<Option<ChunkRequest>, EpiSummaryError> {
        match (self.n_chunks, self.chunk_size) {
            (None, None) => Ok(None),
            (n_chunks, chunk_size) => ChunkRequest::from_options(n_chunks, chunk_size).map(Some),
        }
    }

    pub fn summary_options(&self) -> Result<SummaryOptions, EpiSummaryError> {
        Ok(SummaryOptions {
            sum_over: self.sum_over.clone().unwrap_or_default(),
            chunking: self.chunking()?,
        })
    }

    /// Number of values in the request.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Validate a group mapping
fn validate_mapping(mapping: &HashMap<String, String>) -> Result<(), ValidationError> {
    if mapping.is_empty() {
        return Err(ValidationError::new("group mapping must not be empty"));
    }
    if mapping.values().any(String::is_empty) {
        return Err(ValidationError::new("group names must not be empty"));
    }
    Ok(())
}

/// Validate a list of quantiles
fn validate_quantiles(quantiles: &[f64]) -> Result<(), ValidationError> {
    if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        let mut error = ValidationError::new("quantiles must be in [0, 1]");
        error.add_param("quantile".into(), q);
        return Err(error);
    }
    Ok(())
}

/// Validate the number of values against the dimensions.
fn validate_values_length(
    values: &[DValue],
    dims: &[Dimension],
) -> Result<(), ValidationError> {
    let expected = dims.iter().map(Dimension::len).product::<usize>();
    if values.len() != expected {
        let mut error = ValidationError::new(
            "Number of values must be equal to the product of coordinate lengths",
        );
        error.add_param("values".into(), &values.len());
        error.add_param("expected".into(), &expected);
        return Err(error);
    }
    Ok(())
}

/// Validate request data
fn validate_request_data(request_data: &RequestData) -> Result<(), ValidationError> {
    // Validation of multiple fields in RequestData.
    validate_values_length(&request_data.values, &request_data.dims)?;
    if request_data.n_chunks.is_some() && request_data.chunk_size.is_some() {
        return Err(ValidationError::new(
            "n_chunks and chunk_size are mutually exclusive",
        ));
    }
    if let (Some(lower), Some(upper)) = (request_data.lower, request_data.upper) {
        if lower >= upper {
            return Err(ValidationError::new("lower must be less than upper"));
        }
    }
    Ok(())
}

/// An array in a response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArrayResponse {
    /// Data type of the values
    pub dtype: DType,
    /// Dimensions of the array
    pub dims: Vec<Dimension>,
    /// Shape of the array
    pub shape: Vec<usize>,
    /// Values in row-major (C) order
    pub values: Vec<serde_json::Value>,
}

impl ArrayResponse {
    /// Return an ArrayResponse for `array`.
    pub fn from_array<T: Serialize>(
        dtype: DType,
        array: LabeledArray<T>,
    ) -> Result<Self, EpiSummaryError> {
        let shape = array.shape().to_vec();
        let (dims, data) = array.into_parts();
        let values = data
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArrayResponse {
            dtype,
            dims,
            shape,
            values,
        })
    }
}

/// A summary in a response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryResponse {
    /// Member arrays by name
    pub members: BTreeMap<String, ArrayResponse>,
    /// Per-label interval series, for prediction intervals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<IntervalSeries>>,
}

impl SummaryResponse {
    /// Return a SummaryResponse for `summary`.
    pub fn from_summary(
        summary: Summary,
        series: Option<Vec<IntervalSeries>>,
    ) -> Result<Self, EpiSummaryError> {
        let members = summary
            .into_members()
            .into_iter()
            .map(|(name, array)| Ok((name, ArrayResponse::from_array(DType::Float64, array)?)))
            .collect::<Result<_, EpiSummaryError>>()?;
        Ok(SummaryResponse { members, series })
    }

    /// Shape shared by all members.
    pub fn shape(&self) -> Vec<usize> {
        self.members
            .values()
            .next()
            .map(|member| member.shape.clone())
            .unwrap_or_default()
    }
}

/// Response containing the result of a computation and associated metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Array(ArrayResponse),
    Summary(SummaryResponse),
}

impl Response {
    /// Data type of the response values.
    pub fn dtype(&self) -> DType {
        match self {
            Response::Array(array) => array.dtype,
            Response::Summary(_) => DType::Float64,
        }
    }

    /// Shape of the response array, or of each summary member.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Response::Array(array) => array.shape.clone(),
            Response::Summary(summary) => summary.shape(),
        }
    }
}
