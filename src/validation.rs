//! Structural validation of labeled arrays.
//!
//! Aggregations only run on arrays that pass [validate]: unique axis names, one coordinate per
//! axis with a length equal to the extent, required axes present, ordered axes with increasing
//! numeric labels and categorical axes with unique non-empty labels.

use hashbrown::HashSet;

use crate::array::{LabeledArray, REPLICATE, TIME};
use crate::error::EpiSummaryError;
use crate::types::Coordinate;

/// Axes every aggregation input must carry, whatever it reduces.
pub const ENSEMBLE_AXES: [&str; 1] = [REPLICATE];

/// Axes whose coordinates must be ordered.
pub const ORDERED_AXES: [&str; 2] = [TIME, REPLICATE];

/// Check that an array satisfies the structural contract.
///
/// Returns the input unchanged on success so that calls can be chained.
///
/// # Arguments
///
/// * `array`: The array to check
/// * `required_axes`: Names of axes that must be present
pub fn validate<'a, T>(
    array: &'a LabeledArray<T>,
    required_axes: &[&str],
) -> Result<&'a LabeledArray<T>, EpiSummaryError> {
    validate_names(array)?;
    validate_extents(array)?;
    for axis in required_axes {
        if !array.has_axis(axis) {
            return Err(EpiSummaryError::MissingAxis {
                axis: axis.to_string(),
            });
        }
    }
    for dim in array.dims() {
        if ORDERED_AXES.contains(&dim.name.as_str()) {
            validate_ordered(&dim.name, &dim.coord)?;
        } else {
            validate_populated(&dim.name, &dim.coord)?;
        }
    }
    Ok(array)
}

/// Check that axis names are unique.
fn validate_names<T>(array: &LabeledArray<T>) -> Result<(), EpiSummaryError> {
    let mut seen = HashSet::new();
    for name in array.axis_names() {
        if !seen.insert(name) {
            return Err(EpiSummaryError::DuplicateAxis {
                axis: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Check that each coordinate covers its axis exactly.
fn validate_extents<T>(array: &LabeledArray<T>) -> Result<(), EpiSummaryError> {
    if array.dims().len() != array.shape().len() {
        return Err(EpiSummaryError::RankMismatch {
            axes: array.dims().len(),
            ndim: array.shape().len(),
        });
    }
    for (dim, extent) in std::iter::zip(array.dims(), array.shape()) {
        if dim.len() != *extent {
            return Err(EpiSummaryError::ShapeMismatch {
                axis: dim.name.clone(),
                coordinate: dim.len(),
                extent: *extent,
            });
        }
    }
    Ok(())
}

fn coordinate_error(axis: &str, reason: &str) -> EpiSummaryError {
    EpiSummaryError::CoordinateType {
        axis: axis.to_string(),
        reason: reason.to_string(),
    }
}

/// Check an ordered axis: numeric or timestamp labels, strictly increasing.
fn validate_ordered(axis: &str, coord: &Coordinate) -> Result<(), EpiSummaryError> {
    if !coord.is_ordinal() {
        return Err(coordinate_error(
            axis,
            &format!(
                "ordered axes need integer, float or timestamp labels, not {}",
                coord.kind()
            ),
        ));
    }
    if !coord.is_strictly_increasing() {
        return Err(coordinate_error(axis, "labels must be strictly increasing"));
    }
    Ok(())
}

/// Check that every label along a non-ordered axis is present and distinct.
fn validate_populated(axis: &str, coord: &Coordinate) -> Result<(), EpiSummaryError> {
    match coord {
        Coordinate::Float(values) if values.iter().any(|value| value.is_nan()) => {
            Err(coordinate_error(axis, "labels must not be NaN"))
        }
        Coordinate::Label(values) => {
            if values.iter().any(String::is_empty) {
                return Err(coordinate_error(axis, "labels must not be empty"));
            }
            let mut seen = HashSet::new();
            if values.iter().any(|value| !seen.insert(value)) {
                return Err(coordinate_error(axis, "labels must be unique"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::array::{build_array, Dimension, STATE};
    use crate::test_utils::small_ensemble;
    use ndarray::ArrayD;
    use ndarray::IxDyn;

    #[test]
    fn valid_ensemble() {
        let array = small_ensemble();
        let validated = validate(&array, &ENSEMBLE_AXES).unwrap();
        assert!(std::ptr::eq(&array, validated));
    }

    #[test]
    fn missing_replicate() {
        let array = build_array(
            vec![
                Dimension::new(TIME, Coordinate::Integer(vec![0, 1])),
                Dimension::new(STATE, vec!["S"].into()),
            ],
            vec![1, 2],
        )
        .unwrap();
        match validate(&array, &ENSEMBLE_AXES).unwrap_err() {
            EpiSummaryError::MissingAxis { axis } => assert_eq!(REPLICATE, axis),
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn duplicate_axis() {
        let array = build_array(
            vec![
                Dimension::new(STATE, vec!["S"].into()),
                Dimension::new(STATE, vec!["I"].into()),
            ],
            vec![1],
        )
        .unwrap();
        assert!(matches!(
            validate(&array, &[]),
            Err(EpiSummaryError::DuplicateAxis { .. })
        ));
    }

    #[test]
    fn shape_mismatch() {
        let dims = vec![
            Dimension::new(TIME, Coordinate::Integer(vec![0, 1, 2])),
            Dimension::new(REPLICATE, Coordinate::Integer(vec![0, 1])),
        ];
        let data = ArrayD::<i64>::zeros(IxDyn(&[3, 3]));
        let array = LabeledArray::new(dims, data);
        match validate(&array, &[]).unwrap_err() {
            EpiSummaryError::ShapeMismatch {
                axis,
                coordinate,
                extent,
            } => {
                assert_eq!(REPLICATE, axis);
                assert_eq!(2, coordinate);
                assert_eq!(3, extent);
            }
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn rank_mismatch() {
        let dims = vec![Dimension::new(TIME, Coordinate::Integer(vec![0, 1, 2]))];
        let array = LabeledArray::new(dims, ArrayD::<i64>::zeros(IxDyn(&[3, 1])));
        assert!(matches!(
            validate(&array, &[]),
            Err(EpiSummaryError::RankMismatch { axes: 1, ndim: 2 })
        ));
    }

    #[test]
    fn non_monotonic_time() {
        let array = build_array(
            vec![Dimension::new(TIME, Coordinate::Timestamp(vec![10, 5]))],
            vec![1.0, 2.0],
        )
        .unwrap();
        match validate(&array, &[TIME]).unwrap_err() {
            EpiSummaryError::CoordinateType { axis, reason } => {
                assert_eq!(TIME, axis);
                assert_eq!("labels must be strictly increasing", reason);
            }
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn label_replicate() {
        let array = build_array(
            vec![Dimension::new(REPLICATE, vec!["a", "b"].into())],
            vec![1, 2],
        )
        .unwrap();
        match validate(&array, &[REPLICATE]).unwrap_err() {
            EpiSummaryError::CoordinateType { axis, reason } => {
                assert_eq!(REPLICATE, axis);
                assert!(reason.ends_with("not label"), "{}", reason);
            }
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn duplicate_state_label() {
        let array = build_array(
            vec![Dimension::new(STATE, vec!["S", "S"].into())],
            vec![1, 2],
        )
        .unwrap();
        assert!(matches!(
            validate(&array, &[STATE]),
            Err(EpiSummaryError::CoordinateType { .. })
        ));
    }

    #[test]
    fn nan_region_label() {
        let array = build_array(
            vec![Dimension::new("region", Coordinate::Float(vec![1.0, f64::NAN]))],
            vec![1, 2],
        )
        .unwrap();
        assert!(validate(&array, &[]).is_err());
    }
}
