//! Grouped reductions over labeled arrays.
//!
//! An [AggregationSpec] describes a reduction: which axes to reduce, an optional [GroupBy] that
//! combines labels along a categorical axis, the [Reduction] to apply and an optional chunking of
//! the replicate axis. Specs are validated once, when built.
//!
//! Associative reductions run as a two-phase protocol. First a list of independent tasks is
//! built, one per chunk and group. Then the tasks run on an [Executor] and their partial results
//! are merged: partials of a reduced replicate axis are combined with the reducer, otherwise they
//! are concatenated back along the replicate axis in chunk order.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use ndarray::{ArrayD, ArrayViewD, Axis, Slice};

use crate::array::{Dimension, LabeledArray, REPLICATE};
use crate::chunker::{make_chunks, Chunk, ChunkRequest};
use crate::error::EpiSummaryError;
use crate::executor::Executor;
use crate::operation::Element;
use crate::types::Coordinate;
use crate::validation::{validate, ENSEMBLE_AXES};

/// An associative, commutative binary operator with an identity element.
///
/// Implement this to plug a custom reduction into the engine. Partial results of different
/// chunks and labels are combined in an unspecified grouping, so `combine` must be associative
/// and commutative for results to be deterministic.
pub trait Reducer<T>: Send + Sync + std::fmt::Debug {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// The identity element: `combine(identity(), x) == x`.
    fn identity(&self) -> T;

    fn combine(&self, a: T, b: T) -> T;
}

/// Elementwise sum.
#[derive(Clone, Copy, Debug, Default)]
pub struct SumReducer;

impl<T: Element> Reducer<T> for SumReducer {
    fn name(&self) -> &str {
        "sum"
    }

    fn identity(&self) -> T {
        T::zero()
    }

    fn combine(&self, a: T, b: T) -> T {
        a + b
    }
}

/// Elementwise minimum.
#[derive(Clone, Copy, Debug, Default)]
pub struct MinReducer;

impl<T: Element> Reducer<T> for MinReducer {
    fn name(&self) -> &str {
        "min"
    }

    fn identity(&self) -> T {
        T::max_value()
    }

    fn combine(&self, a: T, b: T) -> T {
        if b < a {
            b
        } else {
            a
        }
    }
}

/// Elementwise maximum.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaxReducer;

impl<T: Element> Reducer<T> for MaxReducer {
    fn name(&self) -> &str {
        "max"
    }

    fn identity(&self) -> T {
        T::min_value()
    }

    fn combine(&self, a: T, b: T) -> T {
        if b > a {
            b
        } else {
            a
        }
    }
}

/// The kind of reduction an [AggregationSpec] applies.
#[derive(Clone, Debug)]
pub enum Reduction<T> {
    /// Sum over the reduced axes
    Sum,
    /// Exact quantiles along a single axis, one output per value
    Quantile(Vec<f64>),
    /// A caller-supplied associative reducer
    Custom(Arc<dyn Reducer<T>>),
}

impl<T: Element> Reduction<T> {
    pub fn name(&self) -> &str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Quantile(_) => "quantile",
            Reduction::Custom(reducer) => reducer.name(),
        }
    }

    /// The operator used to combine labels within a group and partial results across chunks.
    ///
    /// Quantiles group by summation before the order statistics are taken.
    pub fn reducer(&self) -> Arc<dyn Reducer<T>> {
        match self {
            Reduction::Custom(reducer) => reducer.clone(),
            Reduction::Sum | Reduction::Quantile(_) => Arc::new(SumReducer),
        }
    }
}

/// Combine labels along a categorical axis into named groups.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupBy {
    /// Axis whose labels are grouped
    pub axis: String,
    /// Map from axis label (in string form) to group name
    pub mapping: HashMap<String, String>,
    /// Name of the output axis. Defaults to `axis`.
    pub output_name: Option<String>,
}

/// Resolved grouping of axis positions.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupPlan {
    /// Group names in order of first appearance along the axis
    pub names: Vec<String>,
    /// Axis positions belonging to each group
    pub members: Vec<Vec<usize>>,
}

impl GroupPlan {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl GroupBy {
    pub fn new<I, L, G>(axis: &str, mapping: I) -> Self
    where
        I: IntoIterator<Item = (L, G)>,
        L: Into<String>,
        G: Into<String>,
    {
        GroupBy {
            axis: axis.to_string(),
            mapping: mapping
                .into_iter()
                .map(|(label, group)| (label.into(), group.into()))
                .collect(),
            output_name: None,
        }
    }

    pub fn with_output_name(mut self, output_name: &str) -> Self {
        self.output_name = Some(output_name.to_string());
        self
    }

    /// Name of the grouped axis in the output.
    pub fn output_name(&self) -> &str {
        self.output_name.as_deref().unwrap_or(&self.axis)
    }

    /// Resolve the mapping against the labels of the grouped axis.
    ///
    /// Labels missing from the mapping are left out of every group.
    pub fn plan(&self, coord: &Coordinate) -> Result<GroupPlan, EpiSummaryError> {
        let mut unknown: Vec<&String> = self
            .mapping
            .keys()
            .filter(|label| coord.position(label).is_none())
            .collect();
        unknown.sort();
        if let Some(label) = unknown.first() {
            return Err(EpiSummaryError::UnknownGroupLabel {
                axis: self.axis.clone(),
                label: label.to_string(),
            });
        }

        let mut names: Vec<String> = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();
        for (position, label) in coord.labels().iter().enumerate() {
            match self.mapping.get(label) {
                Some(group) => {
                    let slot = *slots.entry(group.as_str()).or_insert_with(|| {
                        names.push(group.clone());
                        members.push(Vec::new());
                        names.len() - 1
                    });
                    members[slot].push(position);
                }
                None => tracing::debug!(axis = %self.axis, %label, "label excluded from grouping"),
            }
        }
        Ok(GroupPlan { names, members })
    }
}

/// A validated description of one aggregation.
///
/// Build with [AggregationSpec::builder].
#[derive(Clone, Debug)]
pub struct AggregationSpec<T> {
    axes: Vec<String>,
    group_by: Option<GroupBy>,
    reduction: Reduction<T>,
    sum_over: Vec<String>,
    chunking: Option<ChunkRequest>,
}

/// Builder for [AggregationSpec].
#[derive(Clone, Debug)]
pub struct AggregationSpecBuilder<T> {
    spec: AggregationSpec<T>,
}

impl<T: Element> AggregationSpecBuilder<T> {
    /// Axes to reduce. A quantile reduction takes exactly one.
    pub fn axes<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.axes = axes.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.spec.group_by = Some(group_by);
        self
    }

    /// Within-simulation axes summed away before quantiles are taken.
    pub fn sum_over<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.sum_over = axes.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunking(mut self, chunking: ChunkRequest) -> Self {
        self.spec.chunking = Some(chunking);
        self
    }

    /// Validate and return the spec.
    pub fn build(self) -> Result<AggregationSpec<T>, EpiSummaryError> {
        let spec = self.spec;
        match &spec.reduction {
            Reduction::Quantile(qs) => {
                if qs.is_empty() {
                    return Err(invalid("at least one quantile is required"));
                }
                if let Some(q) = qs.iter().find(|q| !(0.0..=1.0).contains(*q)) {
                    return Err(EpiSummaryError::InvalidQuantile(*q));
                }
                for (position, q) in qs.iter().enumerate() {
                    if qs[..position].contains(q) {
                        return Err(invalid(&format!("quantile {} is requested more than once", q)));
                    }
                }
                if spec.axes.len() != 1 {
                    return Err(invalid("a quantile reduction takes exactly one axis"));
                }
            }
            _ => {
                if !spec.sum_over.is_empty() {
                    return Err(invalid("sum_over only applies to quantile reductions"));
                }
            }
        }

        validate_axes(&spec)?;

        let chunking = spec.chunking;
        match chunking {
            Some(ChunkRequest::Count(0)) => Err(EpiSummaryError::InvalidChunkRequest {
                reason: "n_chunks must be greater than 0".to_string(),
            }),
            Some(ChunkRequest::Size(0)) => Err(EpiSummaryError::InvalidChunkRequest {
                reason: "chunk_size must be greater than 0".to_string(),
            }),
            _ => Ok(spec),
        }
    }
}

/// Check that reduced axes are distinct and that the grouped axis is not reduced.
fn validate_axes<T>(spec: &AggregationSpec<T>) -> Result<(), EpiSummaryError> {
    let mut reduced = HashSet::new();
    for axis in spec.axes.iter().chain(&spec.sum_over) {
        if !reduced.insert(axis.as_str()) {
            return Err(invalid(&format!("axis {} is reduced more than once", axis)));
        }
    }

    if let Some(group_by) = &spec.group_by {
        if group_by.mapping.is_empty() {
            return Err(invalid("group mapping is empty"));
        }
        if reduced.contains(group_by.axis.as_str()) {
            return Err(invalid(&format!(
                "axis {} cannot be both grouped and reduced",
                group_by.axis
            )));
        }
        if spec.chunking.is_some() && group_by.axis == REPLICATE {
            return Err(invalid("the chunked replicate axis cannot be grouped"));
        }
    }
    Ok(())
}

fn invalid(reason: &str) -> EpiSummaryError {
    EpiSummaryError::InvalidAggregation {
        reason: reason.to_string(),
    }
}

/// Result of [AggregationSpec::apply].
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregated<T> {
    /// Output of an associative reduction, in the input element type
    Reduced(LabeledArray<T>),
    /// One array per requested quantile
    Quantiles(Vec<LabeledArray<f64>>),
}

impl<T: Element> AggregationSpec<T> {
    /// Returns a builder for a spec applying `reduction`.
    pub fn builder(reduction: Reduction<T>) -> AggregationSpecBuilder<T> {
        AggregationSpecBuilder {
            spec: AggregationSpec {
                axes: vec![],
                group_by: None,
                reduction,
                sum_over: vec![],
                chunking: None,
            },
        }
    }

    pub fn axes(&self) -> &[String] {
        &self.axes
    }

    pub fn group_by(&self) -> Option<&GroupBy> {
        self.group_by.as_ref()
    }

    pub fn reduction(&self) -> &Reduction<T> {
        &self.reduction
    }

    pub fn sum_over(&self) -> &[String] {
        &self.sum_over
    }

    pub fn chunking(&self) -> Option<ChunkRequest> {
        self.chunking
    }

    /// Name of the grouped output axis, if grouping.
    pub fn output_name(&self) -> Option<&str> {
        self.group_by.as_ref().map(GroupBy::output_name)
    }

    /// Axes that must be present on an input array.
    ///
    /// Every ensemble carries the replicate axis, even when it is not reduced.
    pub fn required_axes(&self) -> Vec<&str> {
        let mut required: Vec<&str> = ENSEMBLE_AXES.to_vec();
        let named = self
            .axes
            .iter()
            .chain(&self.sum_over)
            .chain(self.group_by.as_ref().map(|group_by| &group_by.axis));
        for axis in named {
            if !required.contains(&axis.as_str()) {
                required.push(axis.as_str());
            }
        }
        required
    }

    /// Apply the reduction to `array`.
    pub fn apply(
        &self,
        array: &LabeledArray<T>,
        executor: &Executor,
    ) -> Result<Aggregated<T>, EpiSummaryError> {
        match self.reduction {
            Reduction::Quantile(_) => {
                crate::quantile::quantiles(array, self, executor).map(Aggregated::Quantiles)
            }
            _ => reduce(array, self, executor).map(Aggregated::Reduced),
        }
    }
}

/// Apply an associative reduction described by `spec`.
///
/// The array is validated before any task runs.
///
/// # Arguments
///
/// * `array`: Input array
/// * `spec`: Aggregation to apply. Must not be a quantile reduction.
/// * `executor`: Executor on which chunk and group tasks run
#[tracing::instrument(level = "debug", skip_all, fields(reduction = spec.reduction().name()))]
pub fn reduce<T: Element>(
    array: &LabeledArray<T>,
    spec: &AggregationSpec<T>,
    executor: &Executor,
) -> Result<LabeledArray<T>, EpiSummaryError> {
    if let Reduction::Quantile(_) = spec.reduction() {
        return Err(invalid("quantile reductions produce one array per quantile"));
    }
    validate(array, &spec.required_axes())?;
    reduce_validated(
        array,
        spec.axes(),
        spec.group_by(),
        spec.chunking(),
        spec.reduction().reducer(),
        executor,
    )
}

/// Sum the labels of `axis` into the groups of `group_by`.
///
/// Without a grouping every label belongs to one implicit group, so `axis` is reduced away.
pub fn sum_over_groups<T: Element>(
    array: &LabeledArray<T>,
    group_by: Option<&GroupBy>,
    axis: &str,
    executor: &Executor,
) -> Result<LabeledArray<T>, EpiSummaryError> {
    let builder = AggregationSpec::builder(Reduction::Sum);
    let spec = match group_by {
        Some(group_by) if group_by.axis != axis => {
            return Err(invalid(&format!(
                "grouping is on axis {} but {} was requested",
                group_by.axis, axis
            )))
        }
        Some(group_by) => builder.group_by(group_by.clone()).build()?,
        None => builder.axes([axis]).build()?,
    };
    reduce(array, &spec, executor)
}

/// Reduce a validated array.
///
/// Shared by [reduce] and the grouping phase of quantile computations.
pub(crate) fn reduce_validated<T: Element>(
    array: &LabeledArray<T>,
    axes: &[String],
    group_by: Option<&GroupBy>,
    chunking: Option<ChunkRequest>,
    reducer: Arc<dyn Reducer<T>>,
    executor: &Executor,
) -> Result<LabeledArray<T>, EpiSummaryError> {
    let mut reduce_axes = axes
        .iter()
        .map(|axis| array.axis_index(axis))
        .collect::<Result<Vec<usize>, _>>()?;
    reduce_axes.sort_unstable();

    let group = match group_by {
        Some(group_by) => {
            let index = array.axis_index(&group_by.axis)?;
            let output_name = group_by.output_name();
            if output_name != group_by.axis
                && array.has_axis(output_name)
                && !axes.iter().any(|axis| axis == output_name)
            {
                return Err(EpiSummaryError::DuplicateAxis {
                    axis: output_name.to_string(),
                });
            }
            Some((index, group_by.plan(&array.dims()[index].coord)?))
        }
        None => None,
    };

    // Phase one: one task per chunk and group.
    let (chunk_axis, chunks): (Axis, Vec<Option<Chunk>>) = match chunking {
        Some(request) if array.has_axis(REPLICATE) => (
            Axis(array.axis_index(REPLICATE)?),
            make_chunks(array, REPLICATE, request)?.map(Some).collect(),
        ),
        _ => (Axis(0), vec![None]),
    };
    let n_groups = group.as_ref().map_or(1, |(_, plan)| plan.len());
    let tasks: Vec<(usize, usize)> = (0..chunks.len())
        .flat_map(|chunk| (0..n_groups).map(move |group| (chunk, group)))
        .collect();
    tracing::debug!(
        chunks = chunks.len(),
        groups = n_groups,
        tasks = tasks.len(),
        reducer = reducer.name(),
        "aggregation plan"
    );

    // Phase two: run the tasks and merge their partial results.
    let partials = executor.run(tasks, |(chunk, group_index)| {
        let block = match &chunks[chunk] {
            Some(chunk) => array.data().slice_axis(chunk_axis, Slice::from(chunk.range())),
            None => array.data().view(),
        };
        let members = group
            .as_ref()
            .map(|(index, plan)| (*index, plan.members[group_index].as_slice()));
        Ok(reduce_block(
            block,
            members,
            &reduce_axes,
            reducer.as_ref(),
        ))
    })?;

    // Position of an input axis in the output.
    let output_axis =
        |index: usize| index - reduce_axes.iter().filter(|axis| **axis < index).count();

    let per_chunk: Vec<ArrayD<T>> = match &group {
        Some((index, _)) => partials
            .chunks(n_groups)
            .map(|parts| {
                let views: Vec<ArrayViewD<T>> = parts.iter().map(ArrayD::view).collect();
                ndarray::concatenate(Axis(output_axis(*index)), &views)
            })
            .collect::<Result<_, _>>()?,
        None => partials,
    };

    let replicate_kept = match array.axis_index(REPLICATE) {
        Ok(index) if !reduce_axes.contains(&index) => Some(output_axis(index)),
        _ => None,
    };
    let data = match replicate_kept {
        Some(axis) if per_chunk.len() > 1 => {
            let views: Vec<ArrayViewD<T>> = per_chunk.iter().map(ArrayD::view).collect();
            ndarray::concatenate(Axis(axis), &views)?
        }
        _ => {
            let mut parts = per_chunk.into_iter();
            let mut merged = parts
                .next()
                .ok_or_else(|| invalid("aggregation produced no partial results"))?;
            for part in parts {
                merged.zip_mut_with(&part, |a, b| *a = reducer.combine(*a, *b));
            }
            merged
        }
    };

    let mut dims = Vec::with_capacity(data.ndim());
    for (index, dim) in array.dims().iter().enumerate() {
        if reduce_axes.contains(&index) {
            continue;
        }
        match (group_by, &group) {
            (Some(group_by), Some((group_index, plan))) if *group_index == index => dims.push(
                Dimension::new(group_by.output_name(), Coordinate::Label(plan.names.clone())),
            ),
            _ => dims.push(dim.clone()),
        }
    }
    Ok(LabeledArray::new(dims, data))
}

/// Reduce one block: fold the members of a group, then fold the reduced axes.
///
/// The group axis is kept with extent one. `axes` must be sorted in ascending order.
fn reduce_block<T: Element>(
    data: ArrayViewD<T>,
    group: Option<(usize, &[usize])>,
    axes: &[usize],
    reducer: &dyn Reducer<T>,
) -> ArrayD<T> {
    let fold = |view: ArrayViewD<T>, axis: usize| -> ArrayD<T> {
        view.fold_axis(Axis(axis), reducer.identity(), |acc, value| {
            reducer.combine(*acc, *value)
        })
    };
    let mut result = match group {
        Some((axis, members)) => {
            fold(data.select(Axis(axis), members).view(), axis).insert_axis(Axis(axis))
        }
        None => data.to_owned(),
    };
    // Each fold removes an axis, shifting the later ones down.
    for (n, axis) in axes.iter().enumerate() {
        result = fold(result.view(), axis - n);
    }
    result
}
