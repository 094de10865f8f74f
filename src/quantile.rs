//! Exact quantiles along an axis.
//!
//! Quantiles are not associative, so chunked input is re-merged into one logical ordering before
//! the order statistics are taken. The rank of quantile `q` over `n` values is `q * (n - 1)`,
//! linearly interpolated between adjacent order statistics.
//!
//! Work is split across the first axis that is not reduced, each slice being independent.

use ndarray::{Array1, ArrayD, ArrayViewD, Axis};
use ndarray_stats::interpolate::Linear;
use ndarray_stats::QuantileExt;
use noisy_float::types::{n64, N64};

use crate::aggregation::{reduce_validated, AggregationSpec, GroupBy, Reduction, SumReducer};
use crate::array::{LabeledArray, REPLICATE};
use crate::chunker::make_chunks;
use crate::error::EpiSummaryError;
use crate::executor::Executor;
use crate::operation::Element;
use crate::validation::validate;

use std::sync::Arc;

/// Quantiles of `array` across simulations.
///
/// Returns one array per value of `qs`, in the same order, each with `axis` reduced away.
///
/// # Arguments
///
/// * `array`: Ensemble array
/// * `qs`: Quantiles, each in [0, 1]
/// * `axis`: Axis separating simulations, usually `replicate`
/// * `group_by`: Optional grouping, summed within each simulation before quantiles are taken
/// * `executor`: Executor on which tasks run
pub fn quantile_between_sims<T: Element>(
    array: &LabeledArray<T>,
    qs: &[f64],
    axis: &str,
    group_by: Option<&GroupBy>,
    executor: &Executor,
) -> Result<Vec<LabeledArray<f64>>, EpiSummaryError> {
    let mut builder = AggregationSpec::builder(Reduction::Quantile(qs.to_vec())).axes([axis]);
    if let Some(group_by) = group_by {
        builder = builder.group_by(group_by.clone());
    }
    quantiles(array, &builder.build()?, executor)
}

/// Apply a quantile [AggregationSpec].
#[tracing::instrument(level = "debug", skip_all, fields(axis = ?spec.axes()))]
pub fn quantiles<T: Element>(
    array: &LabeledArray<T>,
    spec: &AggregationSpec<T>,
    executor: &Executor,
) -> Result<Vec<LabeledArray<f64>>, EpiSummaryError> {
    let qs = match spec.reduction() {
        Reduction::Quantile(qs) => qs,
        _ => {
            return Err(EpiSummaryError::InvalidAggregation {
                reason: "expected a quantile reduction".to_string(),
            })
        }
    };
    let values = prepare(array, spec, executor)?;
    quantile_along(&values, &spec.axes()[0], qs, executor)
}

/// Validate `array` and apply the grouping and within-simulation sums of `spec`.
///
/// Chunks are merged back in order, so the result holds every value of the quantile axis.
pub(crate) fn prepare<T: Element>(
    array: &LabeledArray<T>,
    spec: &AggregationSpec<T>,
    executor: &Executor,
) -> Result<LabeledArray<f64>, EpiSummaryError> {
    validate(array, &spec.required_axes())?;
    if spec.group_by().is_none() && spec.sum_over().is_empty() {
        // Nothing to sum, but a chunk request must still fit the replicate axis.
        if let Some(request) = spec.chunking() {
            make_chunks(array, REPLICATE, request)?;
        }
        return array.to_f64();
    }
    tracing::debug!(sum_over = ?spec.sum_over(), "summing within simulations");
    reduce_validated(
        array,
        spec.sum_over(),
        spec.group_by(),
        spec.chunking(),
        Arc::new(SumReducer),
        executor,
    )?
    .to_f64()
}

/// Quantiles of `values` along the named axis, one output array per quantile.
pub(crate) fn quantile_along(
    values: &LabeledArray<f64>,
    axis: &str,
    qs: &[f64],
    executor: &Executor,
) -> Result<Vec<LabeledArray<f64>>, EpiSummaryError> {
    let index = values.axis_index(axis)?;
    if values.data().is_empty() {
        return Err(EpiSummaryError::EmptyArray {
            operation: "quantile",
        });
    }
    // Sums of finite inputs may overflow to infinity, which linear interpolation cannot handle.
    if values.data().iter().any(|value| !value.is_finite()) {
        return Err(EpiSummaryError::NonFiniteValue {
            operation: "quantile",
        });
    }
    let qs_n64 = qs
        .iter()
        .map(|q| N64::try_new(*q).ok_or(EpiSummaryError::InvalidQuantile(*q)))
        .collect::<Result<Array1<N64>, _>>()?;

    let data = values.data();
    let result = match (0..data.ndim()).find(|outer| *outer != index) {
        Some(outer) => {
            // Position of the quantile axis within a slice of the outer axis.
            let inner = if outer < index { index - 1 } else { index };
            let slices = executor.run((0..data.len_of(Axis(outer))).collect(), |position| {
                let slice = data.index_axis(Axis(outer), position);
                quantiles_of(slice, inner, &qs_n64).map(|result| result.insert_axis(Axis(outer)))
            })?;
            let views: Vec<ArrayViewD<N64>> = slices.iter().map(ArrayD::view).collect();
            ndarray::concatenate(Axis(outer), &views)?
        }
        None => quantiles_of(data.view(), index, &qs_n64)?,
    };

    let mut dims = values.dims().to_vec();
    dims.remove(index);
    Ok((0..qs.len())
        .map(|position| {
            let data = result.index_axis(Axis(index), position).mapv(N64::raw);
            LabeledArray::new(dims.clone(), data)
        })
        .collect())
}

/// Quantiles along `axis`. The axis is kept, with one entry per quantile.
fn quantiles_of(
    values: ArrayViewD<f64>,
    axis: usize,
    qs: &Array1<N64>,
) -> Result<ArrayD<N64>, EpiSummaryError> {
    let mut values = values.mapv(n64);
    Ok(values.quantiles_axis_mut(Axis(axis), qs, &Linear)?)
}
