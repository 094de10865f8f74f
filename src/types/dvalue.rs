//! Data value representing a measurement of any [DType](crate::models::DType)

use crate::error::EpiSummaryError;

/// A value of any DType, as received in a request.
///
/// This is an alias of the Number type from serde_json. Floating point numbers are always finite.
pub type DValue = serde_json::Number;

/// Attempt to convert from a [DValue] to a specific numeric type.
// The trait and the primitive types both live in other crates, so TryFrom can't be used.
pub trait TryFromDValue: Sized {
    /// Try to convert from a [DValue] to a numeric type.
    fn try_from_dvalue(value: &DValue) -> Result<Self, EpiSummaryError>;
}

macro_rules! impl_try_from_dvalue_int {
    ($($t:ty => $wide:ident),*) => {
        $(
            impl TryFromDValue for $t {
                fn try_from_dvalue(value: &DValue) -> Result<Self, EpiSummaryError> {
                    value
                        .$wide()
                        .and_then(|wide| <$t>::try_from(wide).ok())
                        .ok_or_else(|| EpiSummaryError::IncompatibleValue(value.clone()))
                }
            }
        )*
    };
}

impl_try_from_dvalue_int!(i32 => as_i64, i64 => as_i64, u32 => as_u64, u64 => as_u64);

impl TryFromDValue for f32 {
    fn try_from_dvalue(value: &DValue) -> Result<Self, EpiSummaryError> {
        // Values beyond the f32 range become infinite.
        value
            .as_f64()
            .map(|float| float as f32)
            .filter(|float| float.is_finite())
            .ok_or_else(|| EpiSummaryError::IncompatibleValue(value.clone()))
    }
}

impl TryFromDValue for f64 {
    fn try_from_dvalue(value: &DValue) -> Result<Self, EpiSummaryError> {
        value
            .as_f64()
            .ok_or_else(|| EpiSummaryError::IncompatibleValue(value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_in_range() {
        assert_eq!(-42, i32::try_from_dvalue(&(-42).into()).unwrap());
    }

    #[test]
    #[should_panic(expected = "IncompatibleValue(Number(2147483648))")]
    fn i32_too_large() {
        i32::try_from_dvalue(&(i32::MAX as i64 + 1).into()).unwrap();
    }

    #[test]
    #[should_panic(expected = "IncompatibleValue(Number(1.5))")]
    fn i64_from_float() {
        i64::try_from_dvalue(&DValue::from_f64(1.5).unwrap()).unwrap();
    }

    #[test]
    #[should_panic(expected = "IncompatibleValue(Number(-1))")]
    fn u64_negative() {
        u64::try_from_dvalue(&(-1).into()).unwrap();
    }

    #[test]
    fn u32_in_range() {
        assert_eq!(7, u32::try_from_dvalue(&7_u64.into()).unwrap());
    }

    #[test]
    fn f32_from_int() {
        assert_eq!(42.0, f32::try_from_dvalue(&42_u64.into()).unwrap());
    }

    #[test]
    fn f32_too_large() {
        let value = DValue::from_f64(f32::MAX as f64 * 2.0).unwrap();
        assert!(f32::try_from_dvalue(&value).is_err());
    }

    #[test]
    fn f64_from_float() {
        let value = DValue::from_f64(-0.25).unwrap();
        assert_eq!(-0.25, f64::try_from_dvalue(&value).unwrap());
    }
}
