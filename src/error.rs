//! Error handling.

use axum::{
    extract::rejection::JsonRejection,
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::types::DValue;

/// Broad classes of [EpiSummaryError].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Structural defect in the input array. Never retried.
    Validation,
    /// Caller-supplied aggregation configuration is unusable.
    Configuration,
    /// Malformed request body.
    Request,
    /// Invariant violation inside the engine.
    Internal,
    /// The execution substrate abandoned the computation.
    Cancelled,
}

/// Ensemble summary error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum EpiSummaryError {
    /// A required axis is absent from the array
    #[error("array has no axis named {axis}")]
    MissingAxis { axis: String },

    /// Two axes share a name
    #[error("axis {axis} appears more than once")]
    DuplicateAxis { axis: String },

    /// A coordinate is of the wrong kind or is not ordered
    #[error("invalid coordinate for axis {axis}: {reason}")]
    CoordinateType { axis: String, reason: String },

    /// A coordinate length disagrees with the array extent
    #[error("coordinate for axis {axis} has {coordinate} labels but the array extent is {extent}")]
    ShapeMismatch {
        axis: String,
        coordinate: usize,
        extent: usize,
    },

    /// Number of dimensions disagrees with the array rank
    #[error("array has {ndim} dimensions but {axes} axes were described")]
    RankMismatch { axes: usize, ndim: usize },

    /// Error creating ndarray Array from Shape
    #[error("failed to create array from shape")]
    ShapeInvalid(#[from] ShapeError),

    /// Unusable chunk request
    #[error("invalid chunk request: {reason}")]
    InvalidChunkRequest { reason: String },

    /// Grouping mapping refers to a label that is not on the axis
    #[error("group mapping refers to label {label} which is not on axis {axis}")]
    UnknownGroupLabel { axis: String, label: String },

    /// Quantile outside [0, 1]
    #[error("quantile {0} is outside the interval [0, 1]")]
    InvalidQuantile(f64),

    /// Prediction interval bounds out of order
    #[error("invalid prediction interval: lower {lower} and upper {upper} must satisfy lower <= 0.5 <= upper and lower < upper")]
    InvalidInterval { lower: f64, upper: f64 },

    /// Aggregation specification is inconsistent
    #[error("invalid aggregation: {reason}")]
    InvalidAggregation { reason: String },

    /// Attempt to perform an invalid operation on an empty axis
    #[error("cannot perform {operation} on an empty axis")]
    EmptyArray { operation: &'static str },

    /// Data contains NaN or infinite values where an ordering is required
    #[error("cannot perform {operation} on data containing NaN or infinite values")]
    NonFiniteValue { operation: &'static str },

    /// Incompatible value for the requested dtype
    #[error("incompatible value {0} for dtype")]
    IncompatibleValue(DValue),

    /// Summary members disagree in shape or coordinates
    #[error("summary member {member} does not share axes with the other members")]
    IncompatibleAxes { member: String },

    /// Error converting an element to another numeric type
    #[error("failed to convert element to {type_name}")]
    ElementConversion { type_name: &'static str },

    /// The computation was cancelled by the execution substrate
    #[error("aggregation was cancelled")]
    AggregationCancelled,

    /// Insufficient memory to process request
    #[error("insufficient memory to process request ({requested} > {total})")]
    InsufficientMemory { requested: usize, total: usize },

    /// Error deserialising request data into RequestData
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error validating RequestData (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error validating RequestData (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Error serialising response data
    #[error("failed to serialise response data")]
    Serialization(#[from] serde_json::Error),
}

impl EpiSummaryError {
    /// Returns the class this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EpiSummaryError::MissingAxis { .. }
            | EpiSummaryError::DuplicateAxis { .. }
            | EpiSummaryError::CoordinateType { .. }
            | EpiSummaryError::ShapeMismatch { .. }
            | EpiSummaryError::RankMismatch { .. }
            | EpiSummaryError::ShapeInvalid(_)
            | EpiSummaryError::EmptyArray { .. }
            | EpiSummaryError::NonFiniteValue { .. }
            | EpiSummaryError::IncompatibleValue(_) => ErrorCategory::Validation,

            EpiSummaryError::InvalidChunkRequest { .. }
            | EpiSummaryError::UnknownGroupLabel { .. }
            | EpiSummaryError::InvalidQuantile(_)
            | EpiSummaryError::InvalidInterval { .. }
            | EpiSummaryError::InvalidAggregation { .. }
            | EpiSummaryError::InsufficientMemory { .. } => ErrorCategory::Configuration,

            EpiSummaryError::RequestDataJsonRejection(_)
            | EpiSummaryError::RequestDataValidationSingle(_)
            | EpiSummaryError::RequestDataValidation(_) => ErrorCategory::Request,

            EpiSummaryError::IncompatibleAxes { .. }
            | EpiSummaryError::ElementConversion { .. }
            | EpiSummaryError::SemaphoreAcquireError(_)
            | EpiSummaryError::TryFromInt(_)
            | EpiSummaryError::Serialization(_) => ErrorCategory::Internal,

            EpiSummaryError::AggregationCancelled => ErrorCategory::Cancelled,
        }
    }
}

impl From<ndarray_stats::errors::QuantileError> for EpiSummaryError {
    fn from(error: ndarray_stats::errors::QuantileError) -> Self {
        match error {
            ndarray_stats::errors::QuantileError::EmptyInput => EpiSummaryError::EmptyArray {
                operation: "quantile",
            },
            ndarray_stats::errors::QuantileError::InvalidQuantile(q) => {
                EpiSummaryError::InvalidQuantile(q.raw())
            }
        }
    }
}

impl IntoResponse for EpiSummaryError {
    /// Convert from an `EpiSummaryError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by: Option<Vec<String>> = None;
        let mut current = error.source();
        while let Some(source) = current {
            caused_by
                .get_or_insert_with(Vec::new)
                .push(source.to_string());
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }
}

impl From<EpiSummaryError> for ErrorResponse {
    /// Convert from an `EpiSummaryError` into an `ErrorResponse`.
    fn from(error: EpiSummaryError) -> Self {
        let status = match error.category() {
            ErrorCategory::Validation | ErrorCategory::Configuration | ErrorCategory::Request => {
                StatusCode::BAD_REQUEST
            }
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        };
        let response = Self::new(status, &error);

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hyper::HeaderMap;

    // Jump through the hoops to get the body as a string.
    async fn body_string(response: Response) -> String {
        String::from_utf8(
            hyper::body::to_bytes(response.into_body())
                .await
                .unwrap()
                .to_vec(),
        )
        .unwrap()
    }

    async fn test_epi_summary_error(
        error: EpiSummaryError,
        status: StatusCode,
        message: &str,
        caused_by: Option<Vec<&'static str>>,
    ) {
        let response = error.into_response();
        assert_eq!(status, response.status());
        let mut headers = HeaderMap::new();
        headers.insert(&header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert_eq!(headers, *response.headers());
        let error_response: ErrorResponse =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(message.to_string(), error_response.error.message);
        // Map Vec items from str to String
        let caused_by = caused_by.map(|cb| cb.iter().map(|s| s.to_string()).collect());
        assert_eq!(caused_by, error_response.error.caused_by);
    }

    #[tokio::test]
    async fn missing_axis_error() {
        let error = EpiSummaryError::MissingAxis {
            axis: "replicate".to_string(),
        };
        let message = "array has no axis named replicate";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn coordinate_type_error() {
        let error = EpiSummaryError::CoordinateType {
            axis: "time".to_string(),
            reason: "labels must be strictly increasing".to_string(),
        };
        let message = "invalid coordinate for axis time: labels must be strictly increasing";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn shape_mismatch_error() {
        let error = EpiSummaryError::ShapeMismatch {
            axis: "state".to_string(),
            coordinate: 3,
            extent: 4,
        };
        let message = "coordinate for axis state has 3 labels but the array extent is 4";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn shape_invalid_error() {
        let error = EpiSummaryError::ShapeInvalid(ShapeError::from_kind(
            ndarray::ErrorKind::OutOfBounds,
        ));
        let message = "failed to create array from shape";
        let caused_by = Some(vec!["ShapeError/OutOfBounds: out of bounds indexing"]);
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, caused_by).await;
    }

    #[tokio::test]
    async fn invalid_chunk_request_error() {
        let error = EpiSummaryError::InvalidChunkRequest {
            reason: "axis has zero extent".to_string(),
        };
        let message = "invalid chunk request: axis has zero extent";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn unknown_group_label_error() {
        let error = EpiSummaryError::UnknownGroupLabel {
            axis: "state".to_string(),
            label: "X".to_string(),
        };
        let message = "group mapping refers to label X which is not on axis state";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn invalid_quantile_error() {
        let error = EpiSummaryError::InvalidQuantile(1.5);
        let message = "quantile 1.5 is outside the interval [0, 1]";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn incompatible_axes_error() {
        let error = EpiSummaryError::IncompatibleAxes {
            member: "upper".to_string(),
        };
        let message = "summary member upper does not share axes with the other members";
        test_epi_summary_error(error, StatusCode::INTERNAL_SERVER_ERROR, message, None).await;
    }

    #[tokio::test]
    async fn aggregation_cancelled_error() {
        let error = EpiSummaryError::AggregationCancelled;
        let message = "aggregation was cancelled";
        test_epi_summary_error(error, StatusCode::SERVICE_UNAVAILABLE, message, None).await;
    }

    #[tokio::test]
    async fn incompatible_value_error() {
        let error = EpiSummaryError::IncompatibleValue((-1).into());
        let message = "incompatible value -1 for dtype";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[tokio::test]
    async fn request_data_validation_single() {
        let validation_error = validator::ValidationError::new("foo");
        let error = EpiSummaryError::RequestDataValidationSingle(validation_error);
        let message = "request data is not valid";
        let caused_by = Some(vec!["Validation error: foo [{}]"]);
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, caused_by).await;
    }

    #[tokio::test]
    async fn insufficient_memory() {
        let error = EpiSummaryError::InsufficientMemory {
            requested: 2,
            total: 1,
        };
        let message = "insufficient memory to process request (2 > 1)";
        test_epi_summary_error(error, StatusCode::BAD_REQUEST, message, None).await;
    }

    #[test]
    fn categories() {
        assert_eq!(
            ErrorCategory::Validation,
            EpiSummaryError::MissingAxis { axis: "x".into() }.category()
        );
        assert_eq!(
            ErrorCategory::Configuration,
            EpiSummaryError::InvalidQuantile(-0.1).category()
        );
        assert_eq!(
            ErrorCategory::Internal,
            EpiSummaryError::IncompatibleAxes { member: "x".into() }.category()
        );
        assert_eq!(
            ErrorCategory::Cancelled,
            EpiSummaryError::AggregationCancelled.category()
        );
    }

    #[test]
    fn from_quantile_error() {
        let error = EpiSummaryError::from(ndarray_stats::errors::QuantileError::EmptyInput);
        assert!(matches!(
            error,
            EpiSummaryError::EmptyArray {
                operation: "quantile"
            }
        ));
    }
}
