//! Value converters: translate a single scalar value type to/from its string
//! representation, invariant-culture style (spec §4.5/§6).
//!
//! A per-registry table plus a `lazy_static` process-global fallback mirrors
//! how the teacher keeps its LFU/placement policy tables reachable from
//! anywhere in the crate without threading a handle through every call site.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Converts a single value type `T` to and from its string form.
pub trait ValueConverter<T>: Send + Sync {
    fn to_string_repr(&self, value: &T) -> String;
    fn from_string_repr(&self, repr: &str) -> Result<T>;
}

struct BoolConverter;
impl ValueConverter<bool> for BoolConverter {
    fn to_string_repr(&self, value: &bool) -> String {
        value.to_string()
    }
    fn from_string_repr(&self, repr: &str) -> Result<bool> {
        repr.trim()
            .parse()
            .map_err(|_| Error::persistence(format!("'{repr}' is not a valid bool")))
    }
}

macro_rules! impl_numeric_converter {
    ($name:ident, $ty:ty) => {
        struct $name;
        impl ValueConverter<$ty> for $name {
            fn to_string_repr(&self, value: &$ty) -> String {
                value.to_string()
            }
            fn from_string_repr(&self, repr: &str) -> Result<$ty> {
                repr.trim().parse().map_err(|_| {
                    Error::persistence(format!(
                        "'{repr}' is not a valid {}",
                        stringify!($ty)
                    ))
                })
            }
        }
    };
}

impl_numeric_converter!(I64Converter, i64);
impl_numeric_converter!(U64Converter, u64);
impl_numeric_converter!(F64Converter, f64);
impl_numeric_converter!(I32Converter, i32);
impl_numeric_converter!(U32Converter, u32);

struct StringConverter;
impl ValueConverter<String> for StringConverter {
    fn to_string_repr(&self, value: &String) -> String {
        value.clone()
    }
    fn from_string_repr(&self, repr: &str) -> Result<String> {
        Ok(repr.to_string())
    }
}

/// A registry of `ValueConverter<T>` implementations, keyed by `TypeId`.
///
/// `get`/`register` are generic over `T`; the registry itself stores
/// type-erased `Arc<dyn Any>` boxes (each actually an `Arc<dyn
/// ValueConverter<T>>` for the `T` it was registered under) and downcasts on
/// lookup.
pub struct ConverterRegistry {
    converters: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ConverterRegistry {
    pub fn empty() -> Self {
        ConverterRegistry {
            converters: RwLock::new(HashMap::new()),
        }
    }

    fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register::<bool, _>(BoolConverter);
        registry.register::<i64, _>(I64Converter);
        registry.register::<u64, _>(U64Converter);
        registry.register::<f64, _>(F64Converter);
        registry.register::<i32, _>(I32Converter);
        registry.register::<u32, _>(U32Converter);
        registry.register::<String, _>(StringConverter);
        registry
    }

    /// Registers (or replaces) the converter for `T`.
    pub fn register<T: 'static, C: ValueConverter<T> + 'static>(&self, converter: C) {
        let boxed: Arc<dyn ValueConverter<T>> = Arc::new(converter);
        self.converters
            .write()
            .insert(TypeId::of::<T>(), Arc::new(boxed) as Arc<dyn Any + Send + Sync>);
    }

    /// Returns the converter registered for `T`, if any.
    pub fn get<T: 'static>(&self) -> Option<Arc<dyn ValueConverter<T>>> {
        let converters = self.converters.read();
        let any = converters.get(&TypeId::of::<T>())?;
        any.downcast_ref::<Arc<dyn ValueConverter<T>>>()
            .cloned()
    }

    pub fn supports<T: 'static>(&self) -> bool {
        self.converters.read().contains_key(&TypeId::of::<T>())
    }
}

lazy_static::lazy_static! {
    /// Process-global fallback registry, populated with converters for the
    /// built-in scalar types at first use.
    pub static ref GLOBAL_CONVERTERS: ConverterRegistry = ConverterRegistry::with_builtins();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roundtrip() {
        let reg = ConverterRegistry::with_builtins();
        let c = reg.get::<i64>().unwrap();
        assert_eq!(c.to_string_repr(&42), "42");
        assert_eq!(c.from_string_repr("42").unwrap(), 42);

        let c = reg.get::<bool>().unwrap();
        assert_eq!(c.from_string_repr("true").unwrap(), true);
        assert!(c.from_string_repr("nope").is_err());
    }

    #[test]
    fn global_has_builtins() {
        assert!(GLOBAL_CONVERTERS.supports::<String>());
        assert!(GLOBAL_CONVERTERS.supports::<f64>());
        assert!(!GLOBAL_CONVERTERS.supports::<Vec<u8>>());
    }
}
