//! The persistence strategy contract (spec §4.5) — the sole boundary between
//! the configuration core and a concrete backend such as the XML strategy in
//! [`super::xml`].

use std::any::TypeId;
use std::sync::Arc;

use crate::config::convert::{ValueConverter, GLOBAL_CONVERTERS};
use crate::error::{Error, Result};
use crate::persistence::value::{is_type_id_supported, ItemNode, Persistable};

/// Flags controlling a `save` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveFlags {
    /// When set, items without an own value are saved with their effective
    /// (possibly inherited) value instead of being omitted.
    pub save_inherited_settings: bool,
}

/// One item as read from or about to be written to a backing store,
/// addressed by its absolute path rather than a live tree position — this
/// is what keeps [`PersistenceStrategy`] free of any dependency on
/// `config::node`, preserving the crate's bottom-up module order.
#[derive(Debug, Clone)]
pub struct DocumentItem {
    pub path: String,
    pub type_id: TypeId,
    pub value: ItemNode,
    pub comment: Option<Vec<String>>,
}

/// A whole backing store read into memory (or about to be written out),
/// item order preserved as encountered.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub items: Vec<DocumentItem>,
}

impl Document {
    /// Looks up a persisted item by path. `type_id` is accepted to match the
    /// shape of the contract callers look things up under (spec §4.5
    /// `peek_item(path, type)`), but is not part of the match itself: a
    /// `std::any::TypeId` has no stable textual form and cannot be
    /// reconstructed from whatever a backend wrote to disk in an earlier
    /// process, so a freshly loaded `DocumentItem` only ever carries a
    /// placeholder one (see `xml::parse_document`). The item's real type
    /// is enforced by the caller's own `T::decode`, which fails with
    /// `kind=persistence` on a shape mismatch rather than silently
    /// accepting the wrong type.
    pub fn find(&self, path: &str, _type_id: TypeId) -> Option<&DocumentItem> {
        self.items.iter().find(|i| i.path == path)
    }
}

/// Capability set a concrete persistence backend must provide (spec §4.5).
///
/// Implementors decide which configuration/item names are syntactically
/// valid, which value types they can store, and whether they support
/// per-item comments; the core never calls `load`/`save` on anything but a
/// layer's root node.
///
/// Kept object-safe (no generic methods) so the core can hold it as
/// `Arc<dyn PersistenceStrategy>`; the generic convenience wrappers
/// ([`PersistenceStrategyExt`]) are a separate, non-object-safe extension
/// trait for callers that already know a concrete `T`.
pub trait PersistenceStrategy: Send + Sync {
    fn is_valid_configuration_name(&self, name: &str) -> bool;
    fn is_valid_item_name(&self, name: &str) -> bool;

    /// Whether this strategy can store a value of the type identified by `id`.
    fn supports_type_id(&self, id: TypeId) -> bool {
        is_type_id_supported(id)
    }

    fn supports_comments(&self) -> bool {
        true
    }

    /// Default assignability rule: in a statically typed core this is
    /// trivially true for any value the item was declared with; kept as an
    /// overridable hook so a strategy can reject specific runtime values
    /// (e.g. a string exceeding a backend-specific length limit). Takes the
    /// already-encoded node rather than a generic `T` so the trait stays
    /// object-safe.
    fn is_assignable(&self, _type_id: TypeId, _value: &ItemNode) -> bool {
        true
    }

    /// Reads the whole backing store. A store that does not exist yet (a
    /// file never saved) reads as an empty document rather than an error.
    fn load_document(&self) -> Result<Document>;

    /// Writes `doc` to the backing store, replacing its previous contents.
    /// Strategies that write to a filesystem are expected to do this
    /// atomically (write to a temp path, then rename over the target).
    fn save_document(&self, doc: &Document) -> Result<()>;

    /// Looks up a single item directly in the backing store, without
    /// requiring a full in-memory tree — used while a new item is being
    /// declared, before it has a place in any tree to load into.
    fn peek_item(&self, path: &str, type_id: TypeId) -> Result<Option<(ItemNode, Option<Vec<String>>)>> {
        Ok(self
            .load_document()?
            .find(path, type_id)
            .map(|i| (i.value.clone(), i.comment.clone())))
    }
}

/// Generic convenience wrappers over [`PersistenceStrategy`] for callers that
/// know a concrete `T` at the call site.
pub trait PersistenceStrategyExt: PersistenceStrategy {
    fn supports_type<T: Persistable>(&self) -> bool {
        self.supports_type_id(TypeId::of::<T>())
    }
}

impl<S: PersistenceStrategy + ?Sized> PersistenceStrategyExt for S {}

/// Looks up the global scalar converter for `T`, failing with
/// `kind=persistence` if none is registered — used by strategies that need
/// to go through the converter contract explicitly rather than via
/// `Persistable::encode`.
pub fn require_converter<T: 'static>() -> Result<Arc<dyn ValueConverter<T>>> {
    GLOBAL_CONVERTERS
        .get::<T>()
        .ok_or_else(|| Error::persistence("no value converter registered for this type"))
}
