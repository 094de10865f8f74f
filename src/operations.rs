//! Ensemble summary operations.
//!
//! Each operation is implemented as a struct that implements the
//! [Operation](crate::operation::Operation) trait.

use crate::aggregation::{self, AggregationSpec, Reduction};
use crate::array::{build_array_from_dvalues, LabeledArray, REPLICATE, TIME};
use crate::error::EpiSummaryError;
use crate::executor::Executor;
use crate::models::{self, ArrayResponse, SummaryResponse, DEFAULT_LOWER, DEFAULT_UPPER};
use crate::operation::{Element, NumOperation};
use crate::quantile;
use crate::summary::{self, Summary};

/// Build the typed input array of a request.
fn input_array<T: Element>(
    request_data: &models::RequestData,
) -> Result<LabeledArray<T>, EpiSummaryError> {
    build_array_from_dvalues::<T>(&request_data.dims, &request_data.values)
}

/// Spec for an associative reduction.
///
/// An explicit axis is always reduced. Without one, a grouped request only combines the grouped
/// labels and an ungrouped request reduces the replicate axis.
fn reduction_spec<T: Element>(
    request_data: &models::RequestData,
    reduction: Reduction<T>,
) -> Result<AggregationSpec<T>, EpiSummaryError> {
    let group_by = request_data.group_by();
    let axes = match (&request_data.axis, &group_by) {
        (Some(axis), _) => vec![axis.clone()],
        (None, Some(_)) => vec![],
        (None, None) => vec![REPLICATE.to_string()],
    };
    let mut builder = AggregationSpec::builder(reduction).axes(axes);
    if let Some(group_by) = group_by {
        builder = builder.group_by(group_by);
    }
    if let Some(chunking) = request_data.chunking()? {
        builder = builder.chunking(chunking);
    }
    builder.build()
}

fn reduce<T: Element>(
    request_data: &models::RequestData,
    reduction: Reduction<T>,
    executor: &Executor,
) -> Result<models::Response, EpiSummaryError> {
    let array = input_array::<T>(request_data)?;
    let spec = reduction_spec(request_data, reduction)?;
    let result = aggregation::reduce(&array, &spec, executor)?;
    Ok(models::Response::Array(ArrayResponse::from_array(
        request_data.dtype,
        result,
    )?))
}

fn summary_response(summary: Summary) -> Result<models::Response, EpiSummaryError> {
    Ok(models::Response::Summary(SummaryResponse::from_summary(
        summary, None,
    )?))
}

/// Return the sum over an axis, optionally combining labels into groups.
pub struct Sum {}

impl NumOperation for Sum {
    const NAME: &'static str = "sum";

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        reduce::<T>(request_data, Reduction::Sum, executor)
    }
}

/// Return a reduction with a built-in reducer, defaulting to sum.
pub struct Reduce {}

impl NumOperation for Reduce {
    const NAME: &'static str = "reduce";

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        let reduction = request_data
            .reducer
            .unwrap_or(models::ReducerKind::Sum)
            .reduction();
        reduce::<T>(request_data, reduction, executor)
    }
}

/// Return quantiles along an axis, one summary member per quantile.
pub struct Quantile {}

impl NumOperation for Quantile {
    const NAME: &'static str = "quantile";

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        let array = input_array::<T>(request_data)?;
        let options = request_data.summary_options()?;
        let qs = request_data.quantiles();
        let mut builder = AggregationSpec::builder(Reduction::Quantile(qs.clone()))
            .axes([request_data.axis()])
            .sum_over(options.sum_over);
        if let Some(group_by) = request_data.group_by() {
            builder = builder.group_by(group_by);
        }
        if let Some(chunking) = options.chunking {
            builder = builder.chunking(chunking);
        }
        let results = quantile::quantiles(&array, &builder.build()?, executor)?;
        let members = qs.iter().map(|q| format!("q{}", q)).zip(results).collect();
        summary_response(Summary::new(members)?)
    }
}

/// Return a prediction interval across replicates, with per-label series over time.
pub struct PredictionInterval {}

impl NumOperation for PredictionInterval {
    const NAME: &'static str = "prediction_interval";

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        let array = input_array::<T>(request_data)?;
        let summary = summary::prediction_interval(
            &array,
            request_data.lower.unwrap_or(DEFAULT_LOWER),
            request_data.upper.unwrap_or(DEFAULT_UPPER),
            request_data.group_by().as_ref(),
            &request_data.summary_options()?,
            executor,
        )?;
        let series = match summary.get(summary::MEDIAN) {
            Some(median) if median.has_axis(TIME) => Some(summary.interval_series(TIME)?),
            _ => None,
        };
        Ok(models::Response::Summary(SummaryResponse::from_summary(
            summary, series,
        )?))
    }
}

/// Return quantiles between simulations.
pub struct BetweenSim {}

impl NumOperation for BetweenSim {
    const NAME: &'static str = "between_sim";

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        let array = input_array::<T>(request_data)?;
        let summary = summary::between_sim(
            &array,
            &request_data.quantiles(),
            request_data.group_by().as_ref(),
            &request_data.summary_options()?,
            executor,
        )?;
        summary_response(summary)
    }
}

/// Return quantiles within simulations, optionally over a trailing window.
pub struct WithinSim {}

impl NumOperation for WithinSim {
    const NAME: &'static str = "within_sim";

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        let array = input_array::<T>(request_data)?;
        let summary = summary::within_sim(
            &array,
            &request_data.quantiles(),
            request_data.window,
            request_data.group_by().as_ref(),
            &request_data.summary_options()?,
            executor,
        )?;
        summary_response(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::{DType, ReducerKind, Response};
    use crate::operation::Operation;
    use crate::test_utils;
    use serde_json::json;

    fn array_response(response: Response) -> ArrayResponse {
        match response {
            Response::Array(array) => array,
            other => panic!("expected array response, got {:?}", other),
        }
    }

    fn summary_response(response: Response) -> SummaryResponse {
        match response {
            Response::Summary(summary) => summary,
            other => panic!("expected summary response, got {:?}", other),
        }
    }

    #[test]
    fn sum_i64() {
        let request_data = test_utils::get_test_request_data();
        let response = array_response(Sum::execute(&request_data, &Executor::serial()).unwrap());
        assert_eq!(DType::Int64, response.dtype);
        assert_eq!(vec![3, 2], response.shape);
        assert_eq!(
            vec![json!(1), json!(5), json!(9), json!(13), json!(17), json!(21)],
            response.values
        );
    }

    #[test]
    fn sum_f32() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.dtype = DType::Float32;
        let response = array_response(Sum::execute(&request_data, &Executor::serial()).unwrap());
        assert_eq!(DType::Float32, response.dtype);
        assert_eq!(json!(1.0), response.values[0]);
    }

    #[test]
    fn sum_grouped() {
        let mut request_data = test_utils::get_test_request_data_optional();
        request_data.axis = None;
        let response =
            array_response(Sum::execute(&request_data, &Executor::parallel()).unwrap());
        assert_eq!(vec![3, 1, 2], response.shape);
        assert_eq!("group", response.dims[1].name);
        assert_eq!(json!(2), response.values[0]);
    }

    #[test]
    fn sum_grouped_and_reduced() {
        let request_data = test_utils::get_test_request_data_optional();
        let response =
            array_response(Sum::execute(&request_data, &Executor::serial()).unwrap());
        assert_eq!(vec![3, 1], response.shape);
        assert_eq!(vec![json!(6), json!(22), json!(38)], response.values);
    }

    #[test]
    fn sum_u32_negative_value() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.dtype = DType::Uint32;
        request_data.values[0] = (-1).into();
        assert!(matches!(
            Sum::execute(&request_data, &Executor::serial()),
            Err(EpiSummaryError::IncompatibleValue(_))
        ));
    }

    #[test]
    fn reduce_max_over_time() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.reducer = Some(ReducerKind::Max);
        request_data.axis = Some(TIME.to_string());
        let response =
            array_response(Reduce::execute(&request_data, &Executor::serial()).unwrap());
        assert_eq!(vec![2, 2], response.shape);
        assert_eq!(
            vec![json!(8), json!(9), json!(10), json!(11)],
            response.values
        );
    }

    #[test]
    fn reduce_defaults_to_sum() {
        let request_data = test_utils::get_test_request_data();
        let reduced = Reduce::execute(&request_data, &Executor::serial()).unwrap();
        let summed = Sum::execute(&request_data, &Executor::serial()).unwrap();
        assert_eq!(summed, reduced);
    }

    #[test]
    fn reduce_missing_axis() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.axis = Some("region".to_string());
        assert!(matches!(
            Reduce::execute(&request_data, &Executor::serial()),
            Err(EpiSummaryError::MissingAxis { .. })
        ));
    }

    #[test]
    fn quantile_members() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.quantiles = Some(vec![0.0, 1.0]);
        let response =
            summary_response(Quantile::execute(&request_data, &Executor::serial()).unwrap());
        let names: Vec<&String> = response.members.keys().collect();
        assert_eq!(vec!["q0", "q1"], names);
        assert_eq!(DType::Float64, response.members["q0"].dtype);
        assert_eq!(json!(0.0), response.members["q0"].values[0]);
        assert_eq!(json!(1.0), response.members["q1"].values[0]);
        assert!(response.series.is_none());
    }

    #[test]
    fn quantile_unknown_group_label() {
        let mut request_data = test_utils::get_test_request_data_optional();
        if let Some(group_by) = request_data.group_by.as_mut() {
            group_by.mapping.insert("X".to_string(), "all".to_string());
        }
        assert!(matches!(
            Quantile::execute(&request_data, &Executor::serial()),
            Err(EpiSummaryError::UnknownGroupLabel { .. })
        ));
    }

    #[test]
    fn prediction_interval_series() {
        let request_data = test_utils::get_test_request_data();
        let response = summary_response(
            PredictionInterval::execute(&request_data, &Executor::serial()).unwrap(),
        );
        let names: Vec<&String> = response.members.keys().collect();
        assert_eq!(vec!["lower", "median", "upper"], names);
        let series = response.series.unwrap();
        assert_eq!(2, series.len());
        assert_eq!(3, series[0].points.len());
        assert_eq!(0.5, series[0].points[0].median);
    }

    #[test]
    fn prediction_interval_invalid() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.lower = Some(0.6);
        request_data.upper = Some(0.9);
        assert!(matches!(
            PredictionInterval::execute(&request_data, &Executor::serial()),
            Err(EpiSummaryError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn between_sim_grouped() {
        let request_data = test_utils::get_test_request_data_optional();
        let response =
            summary_response(BetweenSim::execute(&request_data, &Executor::parallel()).unwrap());
        let member = &response.members["q0.25"];
        assert_eq!(vec![3, 1], member.shape);
        assert_eq!(json!(2.5), member.values[0]);
    }

    #[test]
    fn within_sim_window() {
        let request_data = test_utils::get_test_request_data_optional();
        let response =
            summary_response(WithinSim::execute(&request_data, &Executor::serial()).unwrap());
        let member = &response.members["q0.75"];
        assert_eq!(vec![3, 1, 2], member.shape);
    }

    #[test]
    fn within_sim_cancelled() {
        let request_data = test_utils::get_test_request_data();
        let executor = Executor::serial();
        executor.cancel_handle().cancel();
        assert!(matches!(
            WithinSim::execute(&request_data, &executor),
            Err(EpiSummaryError::AggregationCancelled)
        ));
    }
}
