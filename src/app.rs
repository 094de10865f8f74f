//! Axum web application

use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::error::EpiSummaryError;
use crate::executor::Executor;
use crate::metrics::{metrics_handler, record_operation, record_response_metrics, request_counter};
use crate::models;
use crate::operation;
use crate::operations;
use crate::validated_json::ValidatedJson;

use axum::{
    extract::State,
    http::header::{self, HeaderName},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

/// `x-episummary-dtype` header definition
static HEADER_DTYPE: HeaderName = HeaderName::from_static("x-episummary-dtype");
/// `x-episummary-shape` header definition
static HEADER_SHAPE: HeaderName = HeaderName::from_static("x-episummary-shape");

impl IntoResponse for models::Response {
    /// Render the response as a JSON body, with the dtype and shape also given in headers.
    fn into_response(self) -> Response {
        let dtype = self.dtype().to_string();
        let body = serde_json::to_string(&self).and_then(|body| {
            serde_json::to_string(&self.shape()).map(|shape| (body, shape))
        });
        match body {
            Ok((body, shape)) => (
                [
                    (&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string()),
                    (&HEADER_DTYPE, dtype),
                    (&HEADER_SHAPE, shape),
                ],
                body,
            )
                .into_response(),
            Err(err) => EpiSummaryError::from(err).into_response(),
        }
    }
}

/// Initialise the application
pub fn init(args: &CommandLineArgs) {
    if args.use_rayon {
        if let Some(threads) = args.thread_limit {
            if let Err(err) = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
            {
                tracing::warn!("failed to configure rayon thread pool: {}", err);
            }
        }
    }
}

/// Returns a [axum::Router] for the episummary application
///
/// # Arguments
///
/// * `args`: Command line arguments
fn router(args: &CommandLineArgs) -> Router {
    let state: SharedAppState = Arc::new(AppState::new(args));

    fn v1() -> Router<SharedAppState> {
        Router::new()
            .route("/sum", post(operation_handler::<operations::Sum>))
            .route("/reduce", post(operation_handler::<operations::Reduce>))
            .route("/quantile", post(operation_handler::<operations::Quantile>))
            .route(
                "/prediction_interval",
                post(operation_handler::<operations::PredictionInterval>),
            )
            .route(
                "/between_sim",
                post(operation_handler::<operations::BetweenSim>),
            )
            .route(
                "/within_sim",
                post(operation_handler::<operations::WithinSim>),
            )
    }

    Router::new()
        .route("/.well-known/episummary-schema", get(schema))
        .route("/metrics", get(metrics_handler))
        .nest("/v1", v1())
        .layer(
            TraceLayer::new_for_http()
                .on_request(request_counter)
                .on_response(record_response_metrics),
        )
        .with_state(state)
}

/// The episummary service type
///
/// We need to specify the type of the service, since it is used in the server.
pub type Service = NormalizePath<Router>;

/// Returns a [crate::app::Service] for the episummary application
///
/// The [NormalizePathLayer] trims trailing slashes from request paths.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn service(args: &CommandLineArgs) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router(args))
}

/// Describes the operations and data types supported by the service
async fn schema() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "operations": [
            "sum",
            "reduce",
            "quantile",
            "prediction_interval",
            "between_sim",
            "within_sim",
        ],
        "dtypes": ["int32", "int64", "uint32", "uint64", "float32", "float64"],
        "reducers": ["sum", "min", "max"],
        "coordinate_kinds": ["integer", "float", "timestamp", "label"],
    }))
}

/// Handler for ensemble summary operations
///
/// Admits the request subject to the task and memory limits, then executes the operation on a
/// blocking thread or the rayon pool. Abandoning the request cancels any outstanding work.
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `request_data`: RequestData object for the request
#[tracing::instrument(level = "debug", skip_all, fields(operation = T::name()))]
async fn operation_handler<T: operation::Operation + 'static>(
    State(state): State<SharedAppState>,
    ValidatedJson(request_data): ValidatedJson<models::RequestData>,
) -> Result<models::Response, EpiSummaryError> {
    let _task_permit = state.resource_manager.task().await?;
    let num_values = request_data.num_values();
    let _memory_permit = state
        .resource_manager
        .memory(num_values * request_data.dtype.size_of())
        .await?;

    let executor = Executor::new(state.args.use_rayon);
    let _cancel = executor.cancel_handle().cancel_on_drop();
    let result = if state.args.use_rayon {
        tokio_rayon::spawn(move || T::execute(&request_data, &executor)).await
    } else {
        tokio::task::spawn_blocking(move || T::execute(&request_data, &executor))
            .await
            .map_err(|_| EpiSummaryError::AggregationCancelled)?
    };
    record_operation(T::name(), num_values, result.is_ok());
    result
}
