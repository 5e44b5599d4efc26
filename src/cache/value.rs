//! Cached Value Module
//!
//! Type-tagged opaque payloads and the read-side coercion table.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

// == Cached Value ==
/// An opaque payload stored together with its type discriminant.
///
/// The payload is shared behind an `Arc`; reads hand out clones, so callers
/// can never mutate what the store holds.
#[derive(Clone)]
pub struct CachedValue {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl CachedValue {
    /// Wraps a value, recording its type name for diagnostics.
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self {
            payload: Arc::new(value),
            type_name: type_name::<V>(),
        }
    }

    /// Name of the stored type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the payload is exactly of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    // == Read ==
    /// Reads the payload as `T`.
    ///
    /// An exact type match is cloned out; otherwise the widening table in
    /// [`coerce`] is consulted. Returns `None` when neither applies.
    pub fn read<T: Any + Clone>(&self) -> Option<T> {
        let payload: &(dyn Any + Send + Sync) = self.payload.as_ref();
        match payload.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => coerce::<T>(payload),
        }
    }
}

impl fmt::Debug for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// == Coercion ==
/// Converts a payload of a different type into `T` when the conversion is lossless.
///
/// Supported: integer to integer when the value fits, `f32` and integers to
/// `f64` (integers only within 53 bits), string-like types to `String`.
pub fn coerce<T: Any>(payload: &(dyn Any + Send + Sync)) -> Option<T> {
    let target = TypeId::of::<T>();

    macro_rules! int_target {
        ($($ty:ty),*) => {
            $(
                if target == TypeId::of::<$ty>() {
                    let wide = as_i128(payload)?;
                    let narrowed = <$ty>::try_from(wide).ok()?;
                    return downcast_owned::<T>(Box::new(narrowed));
                }
            )*
        };
    }
    int_target!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

    if target == TypeId::of::<f64>() {
        let converted = if let Some(v) = payload.downcast_ref::<f32>() {
            f64::from(*v)
        } else {
            let wide = as_i128(payload)?;
            const EXACT: i128 = 1 << 53;
            if !(-EXACT..=EXACT).contains(&wide) {
                return None;
            }
            wide as f64
        };
        return downcast_owned::<T>(Box::new(converted));
    }

    if target == TypeId::of::<String>() {
        let converted = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<Box<str>>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<Arc<str>>() {
            s.to_string()
        } else {
            return None;
        };
        return downcast_owned::<T>(Box::new(converted));
    }

    None
}

fn downcast_owned<T: Any>(boxed: Box<dyn Any>) -> Option<T> {
    boxed.downcast::<T>().ok().map(|b| *b)
}

/// Widens any primitive integer payload to `i128`. `u128` values above `i128::MAX` do not fit.
fn as_i128(payload: &(dyn Any + Send + Sync)) -> Option<i128> {
    macro_rules! try_int {
        ($($ty:ty),*) => {
            $(
                if let Some(v) = payload.downcast_ref::<$ty>() {
                    return i128::try_from(*v).ok();
                }
            )*
        };
    }
    try_int!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
    None
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_read() {
        let value = CachedValue::new("hello".to_string());
        assert!(value.is::<String>());
        assert_eq!(value.read::<String>(), Some("hello".to_string()));
    }

    #[test]
    fn test_read_wrong_type() {
        let value = CachedValue::new("text".to_string());
        assert_eq!(value.read::<i64>(), None);
        assert_eq!(value.read::<Vec<u8>>(), None);
    }

    #[test]
    fn test_integer_widening() {
        let value = CachedValue::new(42i32);
        assert_eq!(value.read::<i64>(), Some(42));
        assert_eq!(value.read::<u8>(), Some(42));
        assert_eq!(value.read::<f64>(), Some(42.0));
    }

    #[test]
    fn test_integer_narrowing_out_of_range() {
        let value = CachedValue::new(300u32);
        assert_eq!(value.read::<u8>(), None);
        assert_eq!(value.read::<u16>(), Some(300));

        let negative = CachedValue::new(-1i64);
        assert_eq!(negative.read::<u64>(), None);
    }

    #[test]
    fn test_float_widening() {
        let value = CachedValue::new(1.5f32);
        assert_eq!(value.read::<f64>(), Some(1.5));
        assert_eq!(value.read::<i32>(), None);
    }

    #[test]
    fn test_large_integer_not_exact_as_f64() {
        let value = CachedValue::new(u64::MAX);
        assert_eq!(value.read::<f64>(), None);
    }

    #[test]
    fn test_str_to_string() {
        assert_eq!(CachedValue::new("lit").read::<String>(), Some("lit".to_string()));
        let boxed: Box<str> = "boxed".into();
        assert_eq!(CachedValue::new(boxed).read::<String>(), Some("boxed".to_string()));
        let shared: Arc<str> = Arc::from("shared");
        assert_eq!(CachedValue::new(shared).read::<String>(), Some("shared".to_string()));
    }

    #[test]
    fn test_type_name_recorded() {
        let value = CachedValue::new(7u16);
        assert_eq!(value.type_name(), "u16");
    }

    #[test]
    fn test_explicit_none_is_readable() {
        let value = CachedValue::new(Option::<String>::None);
        assert_eq!(value.read::<Option<String>>(), Some(None));
    }
}
