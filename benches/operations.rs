/// Benchmarks for ensemble summary operations.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use episummary::array::Dimension;
use episummary::error::EpiSummaryError;
use episummary::executor::Executor;
use episummary::models::{DType, RequestData, Response};
use episummary::operation::Operation;
use episummary::operations;
use episummary::types::Coordinate;

const STATES: [&str; 4] = ["S", "E", "I", "R"];

fn get_test_request_data(times: usize, replicates: usize) -> RequestData {
    let dims = vec![
        Dimension::new("time", Coordinate::Integer((0..times as i64).collect())),
        Dimension::new(
            "state",
            Coordinate::Label(STATES.iter().map(|s| s.to_string()).collect()),
        ),
        Dimension::new(
            "replicate",
            Coordinate::Integer((0..replicates as i64).collect()),
        ),
    ];
    let values = (0..times * STATES.len() * replicates)
        .map(|i| ((i * 7919) % 1000) as i64)
        .map(Into::into)
        .collect();
    RequestData {
        dtype: DType::Int64,
        dims,
        values,
        axis: None,
        group_by: None,
        reducer: None,
        quantiles: None,
        lower: None,
        upper: None,
        window: None,
        sum_over: None,
        n_chunks: None,
        chunk_size: None,
    }
}

type ExecuteFn = dyn Fn(&RequestData, &Executor) -> Result<Response, EpiSummaryError>;

fn criterion_benchmark(c: &mut Criterion) {
    for replicates in [16, 128, 1024] {
        let operations: [(&str, Box<ExecuteFn>); 4] = [
            ("sum", Box::new(operations::Sum::execute)),
            ("prediction_interval", Box::new(operations::PredictionInterval::execute)),
            ("between_sim", Box::new(operations::BetweenSim::execute)),
            ("within_sim", Box::new(operations::WithinSim::execute)),
        ];
        for (op_name, execute) in operations {
            for (n_chunks, parallel) in [(None, false), (Some(8), false), (Some(8), true)] {
                let name = format!("{}({}, {:?}, {})", op_name, replicates, n_chunks, parallel);
                let mut request_data = get_test_request_data(100, replicates);
                request_data.n_chunks = n_chunks;
                let executor = Executor::new(parallel);
                c.bench_function(&name, |b| {
                    b.iter(|| execute(black_box(&request_data), &executor).unwrap())
                });
            }
        }
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
