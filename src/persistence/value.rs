//! The `Persistable` contract and the type-support cache (spec §4.6).
//!
//! Rust has no runtime reflection, so the "reflection-driven complex-type
//! serialization" of the original design becomes option (b) from spec §9: a
//! trait-object table indexed by `TypeId`. A type opts in by implementing
//! [`Persistable`] by hand (the idiomatic substitute for what a derive macro
//! would otherwise generate) and, if it is a complex (struct) type, calling
//! [`register_complex_type`] once before first use.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::config::convert::GLOBAL_CONVERTERS;
use crate::error::{Error, Result};

/// The generic intermediate form an item's value is encoded to/from. Plays
/// the role `serde_json::Value` plays for JSON-backed configuration
/// systems, but scoped to what the XML strategy needs to write: scalar
/// text, nested unnamed array elements, or named struct fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemNode {
    /// A scalar's culture-invariant string representation.
    Text(String),
    /// A one-dimensional array, written as nested unnamed `<Item>` elements.
    Array(Vec<ItemNode>),
    /// A complex type's public fields, written as `<Field name="…">` children.
    Fields(Vec<(String, ItemNode)>),
}

impl ItemNode {
    pub fn as_text(&self) -> Result<&str> {
        match self {
            ItemNode::Text(s) => Ok(s),
            _ => Err(Error::persistence("expected a scalar text node")),
        }
    }

    pub fn as_array(&self) -> Result<&[ItemNode]> {
        match self {
            ItemNode::Array(items) => Ok(items),
            _ => Err(Error::persistence("expected an array node")),
        }
    }

    pub fn as_fields(&self) -> Result<&[(String, ItemNode)]> {
        match self {
            ItemNode::Fields(fields) => Ok(fields),
            _ => Err(Error::persistence("expected a complex (fields) node")),
        }
    }

    pub fn field(&self, name: &str) -> Result<&ItemNode> {
        self.as_fields()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::persistence(format!("missing field '{name}'")))
    }
}

/// A value type that can be stored as the value of a configuration item.
///
/// Scalars and arrays get blanket implementations below; complex (struct)
/// types implement this by hand, delegating to their fields' own `encode`/
/// `decode`.
pub trait Persistable: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    fn type_name() -> &'static str;
    fn encode(&self) -> ItemNode;
    fn decode(node: &ItemNode) -> Result<Self>;
}

macro_rules! impl_persistable_scalar {
    ($ty:ty, $name:literal) => {
        impl Persistable for $ty {
            fn type_name() -> &'static str {
                $name
            }
            fn encode(&self) -> ItemNode {
                let conv = GLOBAL_CONVERTERS
                    .get::<$ty>()
                    .expect(concat!("no converter registered for ", $name));
                ItemNode::Text(conv.to_string_repr(self))
            }
            fn decode(node: &ItemNode) -> Result<Self> {
                let conv = GLOBAL_CONVERTERS
                    .get::<$ty>()
                    .expect(concat!("no converter registered for ", $name));
                conv.from_string_repr(node.as_text()?)
            }
        }
    };
}

impl_persistable_scalar!(bool, "bool");
impl_persistable_scalar!(i64, "i64");
impl_persistable_scalar!(u64, "u64");
impl_persistable_scalar!(f64, "f64");
impl_persistable_scalar!(i32, "i32");
impl_persistable_scalar!(u32, "u32");
impl_persistable_scalar!(String, "string");

impl<T: Persistable> Persistable for Vec<T> {
    fn type_name() -> &'static str {
        "array"
    }

    fn encode(&self) -> ItemNode {
        ItemNode::Array(self.iter().map(Persistable::encode).collect())
    }

    fn decode(node: &ItemNode) -> Result<Self> {
        node.as_array()?.iter().map(T::decode).collect()
    }
}

/// A registered complex type's encode/decode pair, type-erased over `Box<dyn
/// Any>` so it can be stored in a single process-wide table.
#[derive(Clone)]
struct TypeDescriptor {
    name: &'static str,
    encode: fn(&dyn Any) -> ItemNode,
    decode: fn(&ItemNode) -> Result<Box<dyn Any>>,
}

enum CacheState {
    /// Registration for this type is under way; breaks recursive
    /// self-referential registration the way spec §4.6 requires.
    InProgress,
    Supported(TypeDescriptor),
}

lazy_static::lazy_static! {
    static ref TYPE_CACHE: Mutex<HashMap<TypeId, CacheState>> = Mutex::new(HashMap::new());
}

/// Registers `T` as a supported complex type, if it isn't already (or
/// currently being) registered. Idempotent and safe to call from within a
/// nested `encode`/`decode` triggered by registering another type.
pub fn register_complex_type<T: Persistable>() {
    let id = TypeId::of::<T>();
    {
        let mut cache = TYPE_CACHE.lock();
        if cache.contains_key(&id) {
            return;
        }
        cache.insert(id, CacheState::InProgress);
    }

    let descriptor = TypeDescriptor {
        name: T::type_name(),
        encode: |any: &dyn Any| {
            let value = any
                .downcast_ref::<T>()
                .expect("type id matched but downcast failed");
            value.encode()
        },
        decode: |node: &ItemNode| -> Result<Box<dyn Any>> {
            T::decode(node).map(|v| Box::new(v) as Box<dyn Any>)
        },
    };
    TYPE_CACHE.lock().insert(id, CacheState::Supported(descriptor));
}

/// True if `T` is a built-in scalar/array, or has been registered via
/// [`register_complex_type`].
pub fn is_type_supported<T: Persistable>() -> bool {
    is_type_id_supported(TypeId::of::<T>())
}

pub(crate) fn is_type_id_supported(id: TypeId) -> bool {
    matches!(TYPE_CACHE.lock().get(&id), Some(CacheState::Supported(_)))
        || GLOBAL_CONVERTERS_COVERS.with_type_id(id)
}

/// Small shim so `is_type_id_supported` can also recognize built-in scalar
/// `TypeId`s without requiring every scalar to separately call
/// `register_complex_type`.
struct BuiltinIds;
impl BuiltinIds {
    fn with_type_id(&self, id: TypeId) -> bool {
        id == TypeId::of::<bool>()
            || id == TypeId::of::<i64>()
            || id == TypeId::of::<u64>()
            || id == TypeId::of::<f64>()
            || id == TypeId::of::<i32>()
            || id == TypeId::of::<u32>()
            || id == TypeId::of::<String>()
    }
}
const GLOBAL_CONVERTERS_COVERS: BuiltinIds = BuiltinIds;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Persistable for Point {
        fn type_name() -> &'static str {
            "Point"
        }
        fn encode(&self) -> ItemNode {
            ItemNode::Fields(vec![
                ("x".to_string(), self.x.encode()),
                ("y".to_string(), self.y.encode()),
            ])
        }
        fn decode(node: &ItemNode) -> Result<Self> {
            Ok(Point {
                x: i64::decode(node.field("x")?)?,
                y: i64::decode(node.field("y")?)?,
            })
        }
    }

    #[test]
    fn scalar_roundtrip() {
        let node = 7i64.encode();
        assert_eq!(i64::decode(&node).unwrap(), 7);
    }

    #[test]
    fn array_roundtrip() {
        let values = vec![1i64, 2, 3];
        let node = values.encode();
        assert_eq!(Vec::<i64>::decode(&node).unwrap(), values);
    }

    #[test]
    fn complex_type_registration_and_roundtrip() {
        register_complex_type::<Point>();
        assert!(is_type_supported::<Point>());

        let p = Point { x: 3, y: 4 };
        let node = p.encode();
        assert_eq!(Point::decode(&node).unwrap(), p);
    }

    #[test]
    fn builtin_scalars_are_supported_without_registration() {
        assert!(is_type_supported::<i64>());
        assert!(is_type_supported::<String>());
    }
}
