//! This file defines the episummary binary entry point.

use episummary::app;
use episummary::cli;
use episummary::metrics;
use episummary::server;
use episummary::tracing;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    ::tracing::debug!("{:?}", args);
    metrics::register_metrics();
    app::init(&args);
    let service = app::service(&args);
    server::serve(&args, service).await;
}
