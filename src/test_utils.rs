use crate::array::{build_array, Dimension, LabeledArray, REPLICATE, STATE, TIME};
use crate::models::*;
use crate::types::Coordinate;

/// A 3 x 2 x 2 (time, state, replicate) ensemble with values 0..12.
pub(crate) fn small_ensemble() -> LabeledArray<i64> {
    build_array(
        vec![
            Dimension::new(TIME, Coordinate::Integer(vec![0, 1, 2])),
            Dimension::new(STATE, vec!["S", "I"].into()),
            Dimension::new(REPLICATE, Coordinate::Integer(vec![0, 1])),
        ],
        (0..12).collect(),
    )
    .unwrap()
}

/// A (time, state, replicate) ensemble of floats where replicate `r` of state `s` at time `t`
/// holds `t * 100 + s * 10 + r`.
pub(crate) fn float_ensemble(times: usize, states: &[&str], replicates: usize) -> LabeledArray<f64> {
    let mut values = Vec::with_capacity(times * states.len() * replicates);
    for t in 0..times {
        for s in 0..states.len() {
            for r in 0..replicates {
                values.push((t * 100 + s * 10 + r) as f64);
            }
        }
    }
    build_array(
        vec![
            Dimension::new(TIME, Coordinate::Integer((0..times as i64).collect())),
            Dimension::new(STATE, states.to_vec().into()),
            Dimension::new(REPLICATE, Coordinate::Integer((0..replicates as i64).collect())),
        ],
        values,
    )
    .unwrap()
}

/// Create a RequestData object with only required fields set.
pub(crate) fn get_test_request_data() -> RequestData {
    RequestData {
        dtype: DType::Int64,
        dims: small_ensemble().dims().to_vec(),
        values: (0..12).map(|value: i64| value.into()).collect(),
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

/// Create a RequestData object with all fields set.
pub(crate) fn get_test_request_data_optional() -> RequestData {
    RequestData {
        dtype: DType::Int64,
        dims: small_ensemble().dims().to_vec(),
        values: (0..12).map(|value: i64| value.into()).collect(),
        axis: Some("replicate".to_string()),
        group_by: Some(GroupByData {
            axis: "state".to_string(),
            mapping: [("S", "all"), ("I", "all")]
                .into_iter()
                .map(|(label, group)| (label.to_string(), group.to_string()))
                .collect(),
            output_name: Some("group".to_string()),
        }),
        reducer: Some(ReducerKind::Sum),
        quantiles: Some(vec![0.25, 0.75]),
        lower: Some(0.05),
        upper: Some(0.95),
        window: Some(2),
        sum_over: Some(vec![]),
        n_chunks: Some(2),
        chunk_size: None,
    }
}
