//! The two configuration layer kinds (spec §4.3): a root `DefaultConfiguration`
//! that owns items and persists them, and `CascadingConfiguration` layers
//! that inherit from a parent layer and only override what they choose to.

use std::any::TypeId;
use std::sync::Arc;

use log::{debug, trace};

use crate::config::item::{downcast_item, ConfigurationItem};
use crate::config::node::ConfigurationNode;
use crate::config::path::ConfigPath;
use crate::error::{Error, Result};
use crate::persistence::strategy::{Document, DocumentItem, PersistenceStrategy, SaveFlags};
use crate::persistence::value::Persistable;

/// Validates every segment of `path` against every strategy in the cascade
/// below `node`: each intermediate segment as a configuration name, the
/// leaf as an item name (spec §4.1/§4.2). Called before any node is
/// materialized for the path, so an invalid intermediate segment never gets
/// a chance to create a node.
fn validate_item_path(node: &ConfigurationNode, path: &ConfigPath) -> Result<()> {
    let strategies = node.all_strategies_in_cascade_below();
    let segments = path.segments();
    let last = segments.len() - 1;
    for strategy in &strategies {
        for (i, seg) in segments.iter().enumerate() {
            let ok = if i == last {
                strategy.is_valid_item_name(seg)
            } else {
                strategy.is_valid_configuration_name(seg)
            };
            if !ok {
                return Err(Error::invalid_argument(format!(
                    "'{seg}' is not a valid name for this configuration's persistence strategy"
                )));
            }
        }
    }
    Ok(())
}

fn parse_item_path(item_path: &str) -> Result<ConfigPath> {
    ConfigPath::parse(item_path, true, false, None)
}

/// Reads the backing store and applies it to every item already declared in
/// `root`'s subtree. Items the document doesn't mention keep whatever value
/// they already had (their compiled-in default, or an inherited one); the
/// document is never used to invent items the tree doesn't already have —
/// the strict-load reading of the missing-on-disk case (see DESIGN.md).
fn load_impl(root: &ConfigurationNode, strategy: &dyn PersistenceStrategy) -> Result<()> {
    let doc = strategy.load_document()?;
    let mut applied = 0usize;
    for item in root.walk_items() {
        if let Some(entry) = doc.find(item.path(), item.type_id_of()) {
            item.load_raw(Some(entry.value.clone()), entry.comment.clone())?;
            applied += 1;
        }
    }
    debug!("load: applied {applied} persisted item(s) under '{}'", root.path());
    Ok(())
}

/// Serializes every item in `root`'s subtree into a document and hands it to
/// the strategy to write out.
fn save_impl(root: &ConfigurationNode, strategy: &dyn PersistenceStrategy, flags: SaveFlags) -> Result<()> {
    let mut doc = Document::default();
    for item in root.walk_items() {
        let value = if flags.save_inherited_settings {
            Some(item.effective_value_node())
        } else {
            item.own_value_node()
        };
        let Some(value) = value else { continue };
        doc.items.push(DocumentItem {
            path: item.path().to_string(),
            type_id: item.type_id_of(),
            value,
            comment: item.own_comment(),
        });
    }
    debug!("save: writing {} item(s) from '{}'", doc.items.len(), root.path());
    strategy.save_document(&doc)
}

/// A root configuration layer that owns its items and is the only layer
/// kind items can be declared on.
pub struct DefaultConfiguration {
    root: ConfigurationNode,
}

impl DefaultConfiguration {
    pub fn new(strategy: Option<Arc<dyn PersistenceStrategy>>) -> Self {
        DefaultConfiguration {
            root: ConfigurationNode::new_root(strategy),
        }
    }

    pub fn root(&self) -> &ConfigurationNode {
        &self.root
    }

    /// Declares a new item at `item_path` with `default_value`, failing if
    /// one already exists there. Creates intermediate nodes as needed and
    /// propagates a peer item (with any previously persisted value already
    /// loaded) into every layer currently inheriting from this one.
    pub fn add_item<T: Persistable>(&self, item_path: &str, default_value: T) -> Result<ConfigurationItem<T>> {
        let parsed = parse_item_path(item_path)?;
        validate_item_path(&self.root, &parsed)?;
        let node = self.root.get_or_create_descendant(parsed.parent_segments());
        let leaf = parsed.leaf();

        if node.find_item_any(leaf).is_some() {
            debug!("add_item rejected: '{item_path}' already exists");
            return Err(Error::already_exists(item_path));
        }

        for strategy in node.all_strategies_in_cascade_below() {
            if !strategy.supports_type_id(TypeId::of::<T>()) {
                return Err(Error::not_supported(format!(
                    "this configuration's persistence strategy cannot store values of type {}",
                    T::type_name()
                )));
            }
        }

        let cascade = node.cascade();
        let supports_comments = node.strategy().map(|s| s.supports_comments()).unwrap_or(true);
        let base_item = ConfigurationItem::new_base(
            leaf,
            item_path,
            cascade,
            default_value,
            supports_comments,
            node.strategy().cloned(),
        );
        node.insert_item(base_item.as_any_item());
        trace!("add_item: declared '{item_path}'");

        self.propagate_new_item(&node, leaf, item_path, &base_item)?;
        Ok(base_item)
    }

    /// Like `add_item`, but only materializes the item (at every layer that
    /// would otherwise have nothing to show) if at least one inheriting
    /// layer's persistence strategy already has a stored value for it.
    /// Returns `Ok(None)` without creating anything if none do.
    pub fn add_item_if_inheriting_layer_has_value<T: Persistable>(
        &self,
        item_path: &str,
    ) -> Result<Option<ConfigurationItem<T>>> {
        let parsed = parse_item_path(item_path)?;
        let Some(node) = self.root.get_descendant(parsed.parent_segments()) else {
            return Ok(None);
        };
        let has_value = node
            .peer_nodes_recursive()
            .iter()
            .any(|peer| peer_has_persisted_value::<T>(peer, item_path).unwrap_or(false));
        if !has_value {
            return Ok(None);
        }
        Ok(Some(self.add_item(item_path, default_for_probe::<T>())?))
    }

    fn propagate_new_item<T: Persistable>(
        &self,
        node: &ConfigurationNode,
        leaf: &str,
        item_path: &str,
        base_item: &ConfigurationItem<T>,
    ) -> Result<()> {
        for peer_node in node.peer_nodes_recursive() {
            let inherited_for_peer = peer_node
                .inherited_node_ref()
                .and_then(|n| n.find_item_any(leaf))
                .and_then(downcast_item::<T>)
                .unwrap_or_else(|| base_item.clone());
            let supports_comments = peer_node.strategy().map(|s| s.supports_comments()).unwrap_or(true);
            let peer_item = ConfigurationItem::new_inheriting(
                leaf,
                item_path,
                peer_node.cascade(),
                inherited_for_peer,
                supports_comments,
                peer_node.strategy().cloned(),
            );
            if let Some(strategy) = peer_node.strategy() {
                if let Some((value, comment)) = strategy.peek_item(item_path, TypeId::of::<T>())? {
                    peer_item.load_own(Some(value), comment)?;
                }
            }
            peer_node.insert_item(peer_item.as_any_item());
        }
        Ok(())
    }

    pub fn load(&self) -> Result<()> {
        if let Some(strategy) = self.root.strategy() {
            load_impl(&self.root, strategy.as_ref())?;
        }
        self.root.clear_modified_recursive();
        Ok(())
    }

    pub fn save(&self, flags: SaveFlags) -> Result<()> {
        if let Some(strategy) = self.root.strategy() {
            save_impl(&self.root, strategy.as_ref(), flags)?;
        }
        self.root.clear_modified_recursive();
        Ok(())
    }
}

fn peer_has_persisted_value<T: Persistable>(peer: &ConfigurationNode, item_path: &str) -> Result<bool> {
    match peer.strategy() {
        Some(strategy) => Ok(strategy.peek_item(item_path, TypeId::of::<T>())?.is_some()),
        None => Ok(false),
    }
}

/// A throwaway default used only to probe whether an inheriting layer
/// already has a value; immediately overwritten for any layer that does.
fn default_for_probe<T: Persistable>() -> T {
    T::decode(&default_probe_node::<T>()).expect("probe default must decode")
}

fn default_probe_node<T: Persistable>() -> crate::persistence::value::ItemNode {
    use crate::persistence::value::ItemNode;
    match T::type_name() {
        "bool" => ItemNode::Text("false".to_string()),
        "array" => ItemNode::Array(Vec::new()),
        "string" => ItemNode::Text(String::new()),
        name if name == "i64" || name == "u64" || name == "i32" || name == "u32" || name == "f64" => {
            ItemNode::Text("0".to_string())
        }
        _ => ItemNode::Fields(Vec::new()),
    }
}

/// A non-root layer inheriting from a parent layer (which may itself be
/// inheriting). Read-only with respect to the tree shape: it can only
/// override values/comments of items the base layer already declared.
pub struct CascadingConfiguration {
    root: ConfigurationNode,
}

impl CascadingConfiguration {
    /// Builds a layer inheriting from `parent`, mirroring its current tree
    /// shape and registering itself so future `add_item` calls on the base
    /// layer reach it too.
    pub fn new(parent: &ConfigurationNode, strategy: Option<Arc<dyn PersistenceStrategy>>) -> Self {
        CascadingConfiguration {
            root: ConfigurationNode::new_inheriting_root(parent, strategy),
        }
    }

    pub fn root(&self) -> &ConfigurationNode {
        &self.root
    }

    pub fn get_item<T: Persistable>(&self, item_path: &str) -> Result<ConfigurationItem<T>> {
        self.root.get_item(item_path)
    }

    pub fn try_get_value<T: Persistable>(&self, item_path: &str, inherit: bool) -> Result<Option<T>> {
        self.root.try_get_value(item_path, inherit)
    }

    pub fn load(&self) -> Result<()> {
        if let Some(strategy) = self.root.strategy() {
            load_impl(&self.root, strategy.as_ref())?;
        }
        self.root.clear_modified_recursive();
        Ok(())
    }

    pub fn save(&self, flags: SaveFlags) -> Result<()> {
        if let Some(strategy) = self.root.strategy() {
            save_impl(&self.root, strategy.as_ref(), flags)?;
        }
        self.root.clear_modified_recursive();
        Ok(())
    }
}
