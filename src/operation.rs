use crate::error::EpiSummaryError;
use crate::executor::Executor;
use crate::models;
use crate::types::TryFromDValue;

/// Trait for array elements.
pub trait Element:
    Clone
    + Copy
    + PartialOrd
    + num_traits::Bounded
    + num_traits::FromPrimitive
    + num_traits::ToPrimitive
    + num_traits::Zero
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + serde::Serialize
    + TryFromDValue
    + Send
    + Sync
    + 'static
{
}

/// Blanket implementation of Element.
impl<T> Element for T where
    T: Clone
        + Copy
        + PartialOrd
        + num_traits::Bounded
        + num_traits::FromPrimitive
        + num_traits::ToPrimitive
        + num_traits::Zero
        + std::fmt::Debug
        + std::ops::Add<Output = Self>
        + serde::Serialize
        + TryFromDValue
        + Send
        + Sync
        + 'static
{
}

/// Trait for ensemble summary operations.
///
/// This forms the contract between the API layer and the aggregation engine.
pub trait Operation {
    /// Name of the operation, as used in metrics.
    fn name() -> &'static str;

    /// Execute the operation.
    ///
    /// Returns a [models::Response](crate::models::Response) object with response data.
    ///
    /// # Arguments
    ///
    /// * `request_data`: RequestData object for the request
    /// * `executor`: Executor on which aggregation tasks run
    fn execute(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError>;
}

/// Trait for operations on numerical data.
///
/// This trait provides an entry point into the type system based on the runtime `dtype` value.
pub trait NumOperation: Operation {
    /// Name of the operation, as used in metrics.
    const NAME: &'static str;

    fn execute_t<T: Element>(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError>;
}

impl<T: NumOperation> Operation for T {
    fn name() -> &'static str {
        T::NAME
    }

    /// Execute the operation.
    ///
    /// This method dispatches to `execute_t` based on the `dtype`.
    fn execute(
        request_data: &models::RequestData,
        executor: &Executor,
    ) -> Result<models::Response, EpiSummaryError> {
        // Convert runtime data type into concrete types.
        match request_data.dtype {
            models::DType::Int32 => Self::execute_t::<i32>(request_data, executor),
            models::DType::Int64 => Self::execute_t::<i64>(request_data, executor),
            models::DType::Uint32 => Self::execute_t::<u32>(request_data, executor),
            models::DType::Uint64 => Self::execute_t::<u64>(request_data, executor),
            models::DType::Float32 => Self::execute_t::<f32>(request_data, executor),
            models::DType::Float64 => Self::execute_t::<f64>(request_data, executor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils;

    struct TestNumOp {}

    impl NumOperation for TestNumOp {
        const NAME: &'static str = "test";

        fn execute_t<T: Element>(
            request_data: &models::RequestData,
            _executor: &Executor,
        ) -> Result<models::Response, EpiSummaryError> {
            // Report the name of the type parameter as the only dimension name.
            let name = std::any::type_name::<T>();
            Ok(models::Response::Array(models::ArrayResponse {
                dtype: request_data.dtype,
                dims: vec![crate::array::Dimension::new(
                    name,
                    crate::types::Coordinate::Integer(vec![]),
                )],
                shape: vec![0],
                values: vec![],
            }))
        }
    }

    fn dispatched_type(dtype: models::DType) -> String {
        let mut request_data = test_utils::get_test_request_data();
        request_data.dtype = dtype;
        match TestNumOp::execute(&request_data, &Executor::serial()).unwrap() {
            models::Response::Array(array) => array.dims[0].name.clone(),
            _ => panic!("expected array response"),
        }
    }

    #[test]
    fn operation_name() {
        assert_eq!("test", TestNumOp::name());
    }

    #[test]
    fn num_operation_i64() {
        assert_eq!("i64", dispatched_type(models::DType::Int64));
    }

    #[test]
    fn num_operation_u32() {
        assert_eq!("u32", dispatched_type(models::DType::Uint32));
    }

    #[test]
    fn num_operation_f32() {
        assert_eq!("f32", dispatched_type(models::DType::Float32));
    }
}
