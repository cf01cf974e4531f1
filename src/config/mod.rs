//! Cascaded configuration: a hierarchical, typed, layered configuration
//! store with inheritance, per-item value/comment overrides, change
//! propagation and pluggable persistence (spec §3–§4.4, §4.9).

pub mod cascade;
pub mod compare;
pub mod convert;
pub mod item;
pub mod layer;
pub mod node;
pub mod notify;
pub mod path;

pub use convert::{ConverterRegistry, ValueConverter, GLOBAL_CONVERTERS};
pub use item::{AnyItem, ConfigurationItem};
pub use layer::{CascadingConfiguration, DefaultConfiguration};
pub use node::ConfigurationNode;
pub use notify::{ChangeKind, InlineContext, NotifyContext, WorkerContext, GLOBAL_WORKER};
pub use path::ConfigPath;
