use axum::{body::Body, http::Request, response::Response};
use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use tracing::Span;

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Simple request counter
    pub static ref INCOMING_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("incoming_requests", "The number of HTTP requests received"),
        &["http_method"]
    ).unwrap();
    // Request counter by status code
    pub static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = IntCounterVec::new(
        Opts::new("outgoing_response", "The number of responses sent."),
        &["status_code"]
    ).unwrap();
    // Request histogram by response time
    pub static ref RESPONSE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("response_time", "The time taken to respond to each request"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(),
        },
        &[],
    ).unwrap();
    // Operation counter by operation name and outcome
    pub static ref OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("operations", "The number of summary operations executed"),
        &["operation", "outcome"]
    ).unwrap();
    // Histogram of the number of values per operation request
    pub static ref OPERATION_VALUES: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("operation_values", "The number of values in each operation request"),
            buckets: prometheus::exponential_buckets(1.0, 10.0, 9).unwrap(),
        },
        &["operation"],
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(INCOMING_REQUESTS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RESPONSE_CODE_COLLECTOR.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RESPONSE_TIME_COLLECTOR.clone()))
        .unwrap();
    REGISTRY.register(Box::new(OPERATIONS.clone())).unwrap();
    REGISTRY
        .register(Box::new(OPERATION_VALUES.clone()))
        .unwrap();
}

pub async fn metrics_handler() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {}", err);
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

/// Increments the prometheus counter on all incoming requests, labelled by http method
pub fn request_counter(request: &Request<Body>, _span: &Span) {
    INCOMING_REQUESTS
        .with_label_values(&[&request.method().to_string().to_ascii_uppercase()])
        .inc();
}

/// Increment the prometheus counter on all outgoing responses, labelled by status code
pub fn record_response_metrics<B>(
    response: &Response<B>,
    latency: std::time::Duration,
    _span: &Span,
) {
    RESPONSE_CODE_COLLECTOR
        .with_label_values(&[response.status().as_str()])
        .inc();

    RESPONSE_TIME_COLLECTOR
        .with_label_values(&[])
        .observe(latency.as_secs_f64());
}

/// Record the execution of an operation, labelled by name and whether it succeeded
pub fn record_operation(operation: &str, num_values: usize, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    OPERATIONS.with_label_values(&[operation, outcome]).inc();
    OPERATION_VALUES
        .with_label_values(&[operation])
        .observe(num_values as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_operation_counts() {
        let before = OPERATIONS.with_label_values(&["metrics_test", "ok"]).get();
        record_operation("metrics_test", 12, true);
        record_operation("metrics_test", 12, false);
        assert_eq!(
            before + 1,
            OPERATIONS.with_label_values(&["metrics_test", "ok"]).get()
        );
        assert_eq!(
            1,
            OPERATIONS
                .with_label_values(&["metrics_test", "error"])
                .get()
        );
    }
}
