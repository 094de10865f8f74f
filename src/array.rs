//! Labeled multi-dimensional arrays built on [ndarray].
//!
//! A [LabeledArray] pairs an [ndarray::ArrayD] with a name and a [Coordinate] for every axis.
//! Arrays are never mutated in place: every stage of an aggregation produces a new array.

use std::ops::Range;

use ndarray::prelude::*;
use ndarray::{IxDyn, Slice};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::EpiSummaryError;
use crate::operation::Element;
use crate::types::{Coordinate, DValue};

/// Name of the ordered time axis.
pub const TIME: &str = "time";
/// Name of the categorical state axis.
pub const STATE: &str = "state";
/// Name of the ordered replicate axis.
pub const REPLICATE: &str = "replicate";

/// One named axis together with its coordinate.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Dimension {
    /// Axis name, unique within an array
    #[validate(length(min = 1, message = "dimension name must not be empty"))]
    pub name: String,
    /// Labels along the axis
    pub coord: Coordinate,
}

impl Dimension {
    pub fn new(name: &str, coord: Coordinate) -> Self {
        Dimension {
            name: name.to_string(),
            coord,
        }
    }

    /// Number of labels along the axis.
    pub fn len(&self) -> usize {
        self.coord.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coord.is_empty()
    }
}

/// An n-dimensional array with named, labelled axes.
///
/// Construction does not check the structural invariants (unique names, coordinate lengths);
/// use [validate](crate::validation::validate) before aggregating untrusted input.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledArray<T> {
    dims: Vec<Dimension>,
    data: ArrayD<T>,
}

impl<T> LabeledArray<T> {
    /// Returns a new array from its dimensions and data.
    pub fn new(dims: Vec<Dimension>, data: ArrayD<T>) -> Self {
        LabeledArray { dims, data }
    }

    /// Dimensions of the array in axis order.
    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    /// The underlying data.
    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    /// Consumes the array, returning dimensions and data.
    pub fn into_parts(self) -> (Vec<Dimension>, ArrayD<T>) {
        (self.dims, self.data)
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Names of the axes in axis order.
    pub fn axis_names(&self) -> Vec<&str> {
        self.dims.iter().map(|dim| dim.name.as_str()).collect()
    }

    /// Whether an axis of this name exists.
    pub fn has_axis(&self, name: &str) -> bool {
        self.dims.iter().any(|dim| dim.name == name)
    }

    /// Returns the position of the named axis.
    pub fn axis_index(&self, name: &str) -> Result<usize, EpiSummaryError> {
        self.dims
            .iter()
            .position(|dim| dim.name == name)
            .ok_or_else(|| EpiSummaryError::MissingAxis {
                axis: name.to_string(),
            })
    }

    /// Returns the named dimension.
    pub fn dimension(&self, name: &str) -> Result<&Dimension, EpiSummaryError> {
        let index = self.axis_index(name)?;
        Ok(&self.dims[index])
    }

    /// Extent of the array along the named axis.
    pub fn extent(&self, name: &str) -> Result<usize, EpiSummaryError> {
        let index = self.axis_index(name)?;
        Ok(self.data.len_of(Axis(index)))
    }

    /// Whether `other` has identical dimensions (names and coordinates) and shape.
    pub fn same_axes<U>(&self, other: &LabeledArray<U>) -> bool {
        self.dims == other.dims && self.shape() == other.shape()
    }
}

impl<T: Clone> LabeledArray<T> {
    /// Returns a copy of the sub-array covering `range` along the named axis.
    pub fn select_range(&self, name: &str, range: Range<usize>) -> Result<Self, EpiSummaryError> {
        let index = self.axis_index(name)?;
        let data = self
            .data
            .slice_axis(Axis(index), Slice::from(range.clone()))
            .to_owned();
        let mut dims = self.dims.clone();
        dims[index].coord = dims[index].coord.slice(range);
        Ok(LabeledArray { dims, data })
    }
}

impl<T: Element> LabeledArray<T> {
    /// Converts every element to `f64`.
    pub fn to_f64(&self) -> Result<LabeledArray<f64>, EpiSummaryError> {
        let values = self
            .data
            .iter()
            .map(|value| {
                value.to_f64().ok_or(EpiSummaryError::ElementConversion {
                    type_name: "f64",
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let data = ArrayD::from_shape_vec(IxDyn(self.data.shape()), values)?;
        Ok(LabeledArray {
            dims: self.dims.clone(),
            data,
        })
    }
}

/// Returns the shape described by a list of dimensions.
fn get_shape(dims: &[Dimension]) -> Vec<usize> {
    dims.iter().map(Dimension::len).collect()
}

/// Build a [LabeledArray] from dimensions and flat row-major values.
///
/// # Arguments
///
/// * `dims`: Dimensions, outermost first. The shape is taken from the coordinate lengths.
/// * `values`: Values in row-major (C) order
pub fn build_array<T>(
    dims: Vec<Dimension>,
    values: Vec<T>,
) -> Result<LabeledArray<T>, EpiSummaryError> {
    let shape = get_shape(&dims);
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
    Ok(LabeledArray { dims, data })
}

/// Build a typed [LabeledArray] from request values of any dtype.
///
/// # Arguments
///
/// * `dims`: Dimensions, outermost first
/// * `values`: Values in row-major (C) order. Each must be representable as `T`.
pub fn build_array_from_dvalues<T: Element>(
    dims: &[Dimension],
    values: &[DValue],
) -> Result<LabeledArray<T>, EpiSummaryError> {
    let values = values
        .iter()
        .map(T::try_from_dvalue)
        .collect::<Result<Vec<T>, _>>()?;
    build_array(dims.to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::small_ensemble;

    #[test]
    fn build_array_shape() {
        let array = small_ensemble();
        assert_eq!(&[3, 2, 2], array.shape());
        assert_eq!(vec![TIME, STATE, REPLICATE], array.axis_names());
        assert_eq!(5, array.data()[[1, 0, 1]]);
    }

    #[test]
    fn build_array_wrong_length() {
        let dims = vec![Dimension::new(TIME, Coordinate::Integer(vec![0, 1, 2]))];
        match build_array(dims, vec![1, 2]).unwrap_err() {
            EpiSummaryError::ShapeInvalid(err) => {
                assert_eq!(ndarray::ErrorKind::OutOfBounds, err.kind())
            }
            err => panic!("unexpected error {:?}", err),
        }
    }

    #[test]
    fn build_array_from_dvalues_u32() {
        let dims = vec![Dimension::new(REPLICATE, Coordinate::Integer(vec![0, 1]))];
        let values: Vec<DValue> = vec![3.into(), 4.into()];
        let array = build_array_from_dvalues::<u32>(&dims, &values).unwrap();
        assert_eq!(array![3_u32, 4].into_dyn(), *array.data());
    }

    #[test]
    fn build_array_from_dvalues_incompatible() {
        let dims = vec![Dimension::new(REPLICATE, Coordinate::Integer(vec![0]))];
        let values: Vec<DValue> = vec![(-3).into()];
        assert!(matches!(
            build_array_from_dvalues::<u64>(&dims, &values),
            Err(EpiSummaryError::IncompatibleValue(_))
        ));
    }

    #[test]
    fn axis_lookup() {
        let array = small_ensemble();
        assert_eq!(2, array.axis_index(REPLICATE).unwrap());
        assert_eq!(3, array.extent(TIME).unwrap());
        assert!(matches!(
            array.axis_index("region"),
            Err(EpiSummaryError::MissingAxis { axis }) if axis == "region"
        ));
    }

    #[test]
    fn select_range() {
        let array = small_ensemble();
        let head = array.select_range(TIME, 0..1).unwrap();
        let tail = array.select_range(TIME, 1..3).unwrap();
        assert_eq!(&[1, 2, 2], head.shape());
        assert_eq!(
            Coordinate::Integer(vec![1, 2]),
            tail.dimension(TIME).unwrap().coord
        );
        assert_eq!(array.data()[[2, 1, 1]], tail.data()[[1, 1, 1]]);
    }

    #[test]
    fn to_f64() {
        let array = small_ensemble().to_f64().unwrap();
        assert_eq!(11.0, array.data()[[2, 1, 1]]);
        assert!(array.same_axes(&small_ensemble()));
    }
}
