//! Pluggable configuration persistence (spec §4.5, §4.6): the backend
//! contract, the encode/decode contract for item values, and the concrete
//! XML backend.

pub mod strategy;
pub mod value;
pub mod xml;

pub use strategy::{Document, DocumentItem, PersistenceStrategy, PersistenceStrategyExt, SaveFlags};
pub use value::{register_complex_type, is_type_supported, ItemNode, Persistable};
pub use xml::XmlPersistenceStrategy;
