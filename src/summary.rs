//! Derived summaries of an ensemble.
//!
//! A [Summary] is a set of named arrays that share every axis, e.g. the lower, median and upper
//! quantiles of a prediction interval. [Summary::interval_series] turns a prediction interval into
//! the per-label time series consumed by plotting front ends.

use std::collections::BTreeMap;

use ndarray::{ArrayViewD, Axis, Dimension as _};
use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationSpec, GroupBy, Reduction};
use crate::array::{LabeledArray, REPLICATE, TIME};
use crate::chunker::ChunkRequest;
use crate::error::EpiSummaryError;
use crate::executor::Executor;
use crate::operation::Element;
use crate::quantile::{prepare, quantile_along, quantiles};
use crate::types::CoordValue;

/// Member names of a prediction interval.
pub const LOWER: &str = "lower";
pub const MEDIAN: &str = "median";
pub const UPPER: &str = "upper";

/// Options shared by all summaries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SummaryOptions {
    /// Within-simulation axes summed away before quantiles are taken
    pub sum_over: Vec<String>,
    /// Optional chunking of the replicate axis for the summation phase
    pub chunking: Option<ChunkRequest>,
}

/// Named arrays sharing identical dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    members: Vec<(String, LabeledArray<f64>)>,
}

/// One point of an interval series.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IntervalPoint {
    pub time: CoordValue,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

/// Prediction interval over time for one combination of non-time labels.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IntervalSeries {
    /// Label on each non-time axis
    pub labels: BTreeMap<String, CoordValue>,
    /// Points ordered by time
    pub points: Vec<IntervalPoint>,
}

impl Summary {
    /// Returns a new Summary, checking that all members share their dimensions.
    pub fn new(members: Vec<(String, LabeledArray<f64>)>) -> Result<Self, EpiSummaryError> {
        if let Some((_, first)) = members.first() {
            if let Some((name, _)) = members.iter().find(|(_, array)| !array.same_axes(first)) {
                return Err(EpiSummaryError::IncompatibleAxes {
                    member: name.clone(),
                });
            }
        }
        Ok(Summary { members })
    }

    pub fn members(&self) -> &[(String, LabeledArray<f64>)] {
        &self.members
    }

    pub fn into_members(self) -> Vec<(String, LabeledArray<f64>)> {
        self.members
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Returns the named member.
    pub fn get(&self, name: &str) -> Option<&LabeledArray<f64>> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, array)| array)
    }

    fn member(&self, name: &str) -> Result<&LabeledArray<f64>, EpiSummaryError> {
        self.get(name)
            .ok_or_else(|| EpiSummaryError::InvalidAggregation {
                reason: format!("summary has no member named {}", name),
            })
    }

    /// Series of `(time, lower, median, upper)` points for each combination of labels on the
    /// other axes.
    ///
    /// Requires the `lower`, `median` and `upper` members of a prediction interval.
    pub fn interval_series(&self, time_axis: &str) -> Result<Vec<IntervalSeries>, EpiSummaryError> {
        let lower = self.member(LOWER)?;
        let median = self.member(MEDIAN)?;
        let upper = self.member(UPPER)?;
        let time_index = lower.axis_index(time_axis)?;
        let time_coord = &lower.dims()[time_index].coord;

        let others: Vec<usize> = (0..lower.dims().len())
            .filter(|axis| *axis != time_index)
            .collect();
        let lanes = |array: &LabeledArray<f64>| -> Vec<Vec<f64>> {
            lanes_along(array.data().view(), time_index)
        };
        let (lower, median, upper, dims) = (lanes(lower), lanes(median), lanes(upper), lower.dims());

        let other_shape: Vec<usize> = others.iter().map(|axis| dims[*axis].len()).collect();
        let mut series = Vec::with_capacity(lower.len());
        for (lane, position) in ndarray::indices(other_shape).into_iter().enumerate() {
            let labels = others
                .iter()
                .zip(position.slice())
                .map(|(axis, index)| {
                    let dim = &dims[*axis];
                    dim.coord
                        .value(*index)
                        .map(|value| (dim.name.clone(), value))
                        .ok_or_else(|| label_error(&dim.name))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            let points = (0..time_coord.len())
                .map(|t| {
                    Ok(IntervalPoint {
                        time: time_coord.value(t).ok_or_else(|| label_error(time_axis))?,
                        lower: lower[lane][t],
                        median: median[lane][t],
                        upper: upper[lane][t],
                    })
                })
                .collect::<Result<Vec<_>, EpiSummaryError>>()?;
            series.push(IntervalSeries { labels, points });
        }
        Ok(series)
    }
}

fn label_error(axis: &str) -> EpiSummaryError {
    EpiSummaryError::CoordinateType {
        axis: axis.to_string(),
        reason: "coordinate is shorter than the axis".to_string(),
    }
}

/// Lanes along `axis`, in row-major order of the remaining axes.
fn lanes_along(data: ArrayViewD<f64>, axis: usize) -> Vec<Vec<f64>> {
    data.lanes(Axis(axis))
        .into_iter()
        .map(|lane| lane.to_vec())
        .collect()
}

fn quantile_spec<T: Element>(
    qs: Vec<f64>,
    axis: &str,
    group_by: Option<&GroupBy>,
    options: &SummaryOptions,
) -> Result<AggregationSpec<T>, EpiSummaryError> {
    let mut builder = AggregationSpec::builder(Reduction::Quantile(qs))
        .axes([axis])
        .sum_over(options.sum_over.iter().cloned());
    if let Some(group_by) = group_by {
        builder = builder.group_by(group_by.clone());
    }
    if let Some(chunking) = options.chunking {
        builder = builder.chunking(chunking);
    }
    builder.build()
}

fn quantile_name(q: f64) -> String {
    format!("q{}", q)
}

/// Prediction interval across replicates: the `lower` and `upper` quantiles and the median.
///
/// Requires `lower <= 0.5 <= upper` and `lower < upper`, so that the median always lies within
/// the interval.
#[tracing::instrument(level = "debug", skip(array, executor))]
pub fn prediction_interval<T: Element>(
    array: &LabeledArray<T>,
    lower: f64,
    upper: f64,
    group_by: Option<&GroupBy>,
    options: &SummaryOptions,
    executor: &Executor,
) -> Result<Summary, EpiSummaryError> {
    for q in [lower, upper] {
        if !(0.0..=1.0).contains(&q) {
            return Err(EpiSummaryError::InvalidQuantile(q));
        }
    }
    if !(lower <= 0.5 && 0.5 <= upper && lower < upper) {
        return Err(EpiSummaryError::InvalidInterval { lower, upper });
    }
    let spec = quantile_spec(vec![lower, 0.5, upper], REPLICATE, group_by, options)?;
    let members = [LOWER, MEDIAN, UPPER]
        .into_iter()
        .map(String::from)
        .zip(quantiles(array, &spec, executor)?)
        .collect();
    Summary::new(members)
}

/// Variability between simulations: quantiles across the replicate axis, one member per
/// quantile named `q<value>`.
#[tracing::instrument(level = "debug", skip(array, executor))]
pub fn between_sim<T: Element>(
    array: &LabeledArray<T>,
    qs: &[f64],
    group_by: Option<&GroupBy>,
    options: &SummaryOptions,
    executor: &Executor,
) -> Result<Summary, EpiSummaryError> {
    let spec = quantile_spec(qs.to_vec(), REPLICATE, group_by, options)?;
    let members = qs
        .iter()
        .map(|q| quantile_name(*q))
        .zip(quantiles(array, &spec, executor)?)
        .collect();
    Summary::new(members)
}

/// Variability within simulations: quantiles across the time axis of each replicate.
///
/// With a `window` the quantile at each time is taken over the trailing `window` time steps,
/// and the time axis is kept.
#[tracing::instrument(level = "debug", skip(array, executor))]
pub fn within_sim<T: Element>(
    array: &LabeledArray<T>,
    qs: &[f64],
    window: Option<usize>,
    group_by: Option<&GroupBy>,
    options: &SummaryOptions,
    executor: &Executor,
) -> Result<Summary, EpiSummaryError> {
    let spec = quantile_spec(qs.to_vec(), TIME, group_by, options)?;
    let results = match window {
        None => quantiles(array, &spec, executor)?,
        Some(0) => {
            return Err(EpiSummaryError::InvalidAggregation {
                reason: "window must be at least 1".to_string(),
            })
        }
        Some(window) => {
            let values = prepare(array, &spec, executor)?;
            trailing_quantiles(&values, qs, window, executor)?
        }
    };
    let members = qs.iter().map(|q| quantile_name(*q)).zip(results).collect();
    Summary::new(members)
}

/// Quantiles over the trailing window `[t - window + 1, t]` of each time step.
fn trailing_quantiles(
    values: &LabeledArray<f64>,
    qs: &[f64],
    window: usize,
    executor: &Executor,
) -> Result<Vec<LabeledArray<f64>>, EpiSummaryError> {
    let time_index = values.axis_index(TIME)?;
    let steps = values.extent(TIME)?;
    if steps == 0 {
        return Err(EpiSummaryError::EmptyArray {
            operation: "quantile",
        });
    }
    let per_step = executor.run((0..steps).collect(), |t| {
        let start = (t + 1).saturating_sub(window);
        let slice = values.select_range(TIME, start..t + 1)?;
        quantile_along(&slice, TIME, qs, &Executor::serial())
    })?;

    (0..qs.len())
        .map(|position| {
            let views: Vec<ArrayViewD<f64>> = per_step
                .iter()
                .map(|step| step[position].data().view().insert_axis(Axis(time_index)))
                .collect();
            let data = ndarray::concatenate(Axis(time_index), &views)?;
            Ok(LabeledArray::new(values.dims().to_vec(), data))
        })
        .collect()
}
