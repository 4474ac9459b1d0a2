/// Implements `From<$t> for Value` by wrapping the source in the given variant.
macro_rules! value_try_from {
    ($t:ty, $variant:path) => {
        impl From<$t> for $crate::value::Value {
            fn from(v: $t) -> $crate::value::Value {
                $variant(v.into())
            }
        }
    };
}

/// Implements `From<Vec<$t>> for Value` by mapping each element through `Value::from`.
macro_rules! value_vec_try_from {
    ($t:ty) => {
        impl From<Vec<$t>> for $crate::value::Value {
            fn from(v: Vec<$t>) -> $crate::value::Value {
                $crate::value::Value::Array(v.into_iter().map($crate::value::Value::from).collect())
            }
        }
    };
}

pub(crate) use value_try_from;
pub(crate) use value_vec_try_from;
