//! Configuration nodes (spec §4.2) — the tree structure items and child
//! nodes hang off of.
//!
//! A node's children and items are kept in case-insensitive name order
//! ([`compare::name_cmp`]) so iteration order is deterministic regardless of
//! insertion order, the same invariant the teacher's LRU replacement tree
//! keeps over its keys.

use std::sync::{Arc, Weak};

use log::trace;
use parking_lot::RwLock;

use crate::config::cascade::Cascade;
use crate::config::compare::name_cmp;
use crate::config::item::{downcast_item, AnyItem, ConfigurationItem};
use crate::config::path::{self, ConfigPath};
use crate::error::{Error, Result};
use crate::persistence::strategy::PersistenceStrategy;
use crate::persistence::value::Persistable;

struct NodeInner {
    name: String,
    path: String,
    parent: Option<Weak<NodeInner>>,
    cascade: Arc<Cascade>,
    strategy: Option<Arc<dyn PersistenceStrategy>>,
    children: RwLock<Vec<ConfigurationNode>>,
    items: RwLock<Vec<Arc<dyn AnyItem>>>,
    /// The node at the same path one layer up, if this node's layer inherits
    /// from another.
    inherited: RwLock<Option<ConfigurationNode>>,
    /// Nodes at the same path in layers that inherit from this one.
    inheriting: RwLock<Vec<Weak<NodeInner>>>,
}

/// A single node in a configuration tree: a named point that owns zero or
/// more items and has zero or more named children.
///
/// Cheap to clone; every clone shares the same underlying tree node.
#[derive(Clone)]
pub struct ConfigurationNode(Arc<NodeInner>);

impl ConfigurationNode {
    /// Builds the root node of a brand-new base layer.
    pub fn new_root(strategy: Option<Arc<dyn PersistenceStrategy>>) -> Self {
        ConfigurationNode(Arc::new(NodeInner {
            name: String::new(),
            path: "/".to_string(),
            parent: None,
            cascade: Arc::new(Cascade::new()),
            strategy,
            children: RwLock::new(Vec::new()),
            items: RwLock::new(Vec::new()),
            inherited: RwLock::new(None),
            inheriting: RwLock::new(Vec::new()),
        }))
    }

    /// Builds the root node of a new layer inheriting from `base`, mirroring
    /// `base`'s current tree shape recursively and sharing its cascade
    /// mutex.
    pub fn new_inheriting_root(base: &ConfigurationNode, strategy: Option<Arc<dyn PersistenceStrategy>>) -> Self {
        let _guard = base.0.cascade.lock();
        let root = ConfigurationNode(Arc::new(NodeInner {
            name: String::new(),
            path: "/".to_string(),
            parent: None,
            cascade: base.0.cascade.clone(),
            strategy,
            children: RwLock::new(Vec::new()),
            items: RwLock::new(Vec::new()),
            inherited: RwLock::new(Some(base.clone())),
            inheriting: RwLock::new(Vec::new()),
        }));
        base.0.inheriting.write().push(Arc::downgrade(&root.0));
        root.mirror_from(base);
        root
    }

    /// Recreates `base`'s current shape under `self`, recursively: every
    /// item `base` (or a descendant of it) already owns gets an inheriting
    /// peer on `self` via `AnyItem::create_inheriting_peer` (the concrete
    /// `T` never has to leave the item's own `impl`), and every child node
    /// is mirrored the same way. `add_item` takes care of the complementary
    /// case — a layer that already existed when the item was added — by
    /// propagating to every live `inheriting` peer node at that time.
    fn mirror_from(&self, base: &ConfigurationNode) {
        self.mirror_items_from(base);
        for base_child in base.0.children.read().iter() {
            let child = self.create_child_raw(&base_child.name());
            *child.0.inherited.write() = Some(base_child.clone());
            base_child.0.inheriting.write().push(Arc::downgrade(&child.0));
            child.mirror_from(base_child);
        }
    }

    fn mirror_items_from(&self, base: &ConfigurationNode) {
        for base_item in base.0.items.read().iter() {
            let peer = base_item
                .clone()
                .create_inheriting_peer(self.0.cascade.clone(), self.0.strategy.clone());
            self.insert_item(peer);
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn strategy(&self) -> Option<&Arc<dyn PersistenceStrategy>> {
        self.0.strategy.as_ref()
    }

    pub fn is_base_layer(&self) -> bool {
        self.0.inherited.read().is_none()
    }

    pub fn parent(&self) -> Option<ConfigurationNode> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(ConfigurationNode)
    }

    pub fn children(&self) -> Vec<ConfigurationNode> {
        self.0.children.read().clone()
    }

    pub fn get_child(&self, name: &str) -> Option<ConfigurationNode> {
        self.0
            .children
            .read()
            .iter()
            .find(|c| name_cmp(c.name(), name) == std::cmp::Ordering::Equal)
            .cloned()
    }

    /// Creates a direct child of `self` named `name`, propagating a peer
    /// child into every layer inheriting from this node's layer
    /// (recursively, so multi-level cascades stay in shape). Internal: only
    /// the default-layer item-creation API exposes tree growth to callers.
    pub(crate) fn create_child(&self, name: &str) -> ConfigurationNode {
        let child = self.create_child_raw(name);
        let peers: Vec<Arc<NodeInner>> = self.0.inheriting.read().iter().filter_map(Weak::upgrade).collect();
        for peer in peers {
            let peer_node = ConfigurationNode(peer);
            let peer_child = peer_node.create_child(name);
            *peer_child.0.inherited.write() = Some(child.clone());
            child.0.inheriting.write().push(Arc::downgrade(&peer_child.0));
        }
        child
    }

    fn create_child_raw(&self, name: &str) -> ConfigurationNode {
        let child_path = path::combine(&self.0.path, [name]);
        trace!("create_child: '{child_path}'");
        let child = ConfigurationNode(Arc::new(NodeInner {
            name: name.to_string(),
            path: child_path,
            parent: Some(Arc::downgrade(&self.0)),
            cascade: self.0.cascade.clone(),
            strategy: self.0.strategy.clone(),
            children: RwLock::new(Vec::new()),
            items: RwLock::new(Vec::new()),
            inherited: RwLock::new(None),
            inheriting: RwLock::new(Vec::new()),
        }));
        let mut children = self.0.children.write();
        let pos = children
            .binary_search_by(|c| name_cmp(c.name(), name))
            .unwrap_or_else(|p| p);
        children.insert(pos, child.clone());
        child
    }

    /// Walks (creating as needed) the child chain named by `segments`,
    /// returning the final node. Internal to item construction.
    pub(crate) fn get_or_create_descendant(&self, segments: &[String]) -> ConfigurationNode {
        let mut node = self.clone();
        for seg in segments {
            node = match node.get_child(seg) {
                Some(existing) => existing,
                None => node.create_child(seg),
            };
        }
        node
    }

    pub(crate) fn get_descendant(&self, segments: &[String]) -> Option<ConfigurationNode> {
        let mut node = self.clone();
        for seg in segments {
            node = node.get_child(seg)?;
        }
        Some(node)
    }

    fn inherited_node(&self) -> Option<ConfigurationNode> {
        self.0.inherited.read().clone()
    }

    fn inheriting_nodes(&self) -> Vec<ConfigurationNode> {
        self.0
            .inheriting
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .map(ConfigurationNode)
            .collect()
    }

    pub(crate) fn insert_item(&self, item: Arc<dyn AnyItem>) {
        let mut items = self.0.items.write();
        let pos = items
            .binary_search_by(|i| name_cmp(i.name(), item.name()))
            .unwrap_or_else(|p| p);
        items.insert(pos, item);
    }

    pub(crate) fn find_item_any(&self, name: &str) -> Option<Arc<dyn AnyItem>> {
        self.0
            .items
            .read()
            .iter()
            .find(|i| name_cmp(i.name(), name) == std::cmp::Ordering::Equal)
            .cloned()
    }

    pub fn items(&self) -> Vec<Arc<dyn AnyItem>> {
        self.0.items.read().clone()
    }

    /// spec §4.2 `get_all_items`: a snapshot of this node's own items, or —
    /// when `recursive` — this node's items followed by every descendant's,
    /// in the same depth-first name order `walk_items` uses for persistence.
    pub fn get_all_items(&self, recursive: bool) -> Vec<Arc<dyn AnyItem>> {
        if recursive {
            self.walk_items()
        } else {
            self.items()
        }
    }

    /// Typed item lookup at `path` relative to this node, creating
    /// intermediate nodes as needed but never the item itself — the item
    /// must already have been added with `add_item`/`add_item_if_...`.
    pub fn get_item<T: Persistable>(&self, item_path: &str) -> Result<ConfigurationItem<T>> {
        self.try_get_item(item_path)?
            .ok_or_else(|| Error::not_found(item_path))
    }

    pub fn try_get_item<T: Persistable>(&self, item_path: &str) -> Result<Option<ConfigurationItem<T>>> {
        let parsed = ConfigPath::parse(item_path, true, false, None)?;
        let node = match self.get_descendant(parsed.parent_segments()) {
            Some(n) => n,
            None => return Ok(None),
        };
        let any = match node.find_item_any(parsed.leaf()) {
            Some(a) => a,
            None => return Ok(None),
        };
        if any.type_id_of() != std::any::TypeId::of::<T>() {
            return Err(Error::TypeMismatch {
                path: item_path.to_string(),
                expected: T::type_name(),
                found: any.type_name_of(),
            });
        }
        Ok(downcast_item::<T>(any))
    }

    /// spec §4.2 `try_get_value(path, inherit)`: with `inherit`, returns the
    /// nearest ancestor layer's value (own value if this layer has one,
    /// else whatever the inheritance chain supplies); without it, returns
    /// only this layer's own value, `None` if it has none even when an
    /// inherited one exists.
    pub fn try_get_value<T: Persistable>(&self, item_path: &str, inherit: bool) -> Result<Option<T>> {
        Ok(self
            .try_get_item::<T>(item_path)?
            .map(|i| if inherit { Some(i.value()) } else { i.own_value() })
            .unwrap_or(None))
    }

    /// spec §4.2 `try_get_comment(path, inherit)`, mirroring `try_get_value`.
    pub fn try_get_comment<T: Persistable>(&self, item_path: &str, inherit: bool) -> Result<Option<Vec<String>>> {
        Ok(self
            .try_get_item::<T>(item_path)?
            .and_then(|i| if inherit { i.comment() } else { i.own_comment() }))
    }

    /// Recursively clears every item's own value in this subtree that has
    /// an inherited counterpart (base-layer items, which have none, are
    /// left untouched).
    pub fn reset_items(&self) {
        let _guard = self.0.cascade.lock();
        trace!("reset_items: '{}'", self.0.path);
        for item in self.0.items.read().iter() {
            item.reset();
        }
        for child in self.0.children.read().iter() {
            child.reset_items();
        }
    }

    pub fn is_modified(&self) -> bool {
        self.0.cascade.is_modified()
    }

    /// Clears the whole cascade's modification flag, called after a
    /// successful `load`/`save` so the flag again reflects only changes
    /// made since.
    pub(crate) fn clear_modified_recursive(&self) {
        self.0.cascade.clear_modified();
    }

    pub(crate) fn cascade(&self) -> Arc<Cascade> {
        self.0.cascade.clone()
    }

    /// All items in this subtree, in depth-first, name-ordered traversal —
    /// the order the XML strategy writes/reads configuration items in.
    pub(crate) fn walk_items(&self) -> Vec<Arc<dyn AnyItem>> {
        let mut out = self.0.items.read().clone();
        for child in self.0.children.read().iter() {
            out.extend(child.walk_items());
        }
        out
    }

    /// Every node at this same relative path in every layer (direct and
    /// transitive) inheriting from this node's layer. Used by item
    /// propagation once the item's own node is established: the node shape
    /// was already mirrored when each inheriting layer was constructed (or
    /// grown by `create_child` since), so the peers are expected to exist.
    pub(crate) fn peer_nodes_recursive(&self) -> Vec<ConfigurationNode> {
        let mut out = Vec::new();
        for peer in self.inheriting_nodes() {
            out.push(peer.clone());
            out.extend(peer.peer_nodes_recursive());
        }
        out
    }

    /// Every strategy among this node's own layer and every layer
    /// transitively inheriting from it, used to validate a new item's name
    /// against all layers it will materialize into.
    pub(crate) fn all_strategies_in_cascade_below(&self) -> Vec<Arc<dyn PersistenceStrategy>> {
        let mut out = Vec::new();
        if let Some(s) = &self.0.strategy {
            out.push(s.clone());
        }
        for peer in self.inheriting_nodes() {
            out.extend(peer.all_strategies_in_cascade_below());
        }
        out
    }

    pub(crate) fn inherited_node_ref(&self) -> Option<ConfigurationNode> {
        self.inherited_node()
    }

    /// Walks up to the root of this node's own layer.
    fn root_node(&self) -> ConfigurationNode {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// spec §4.3: builds a new root-level layer inheriting this node's
    /// whole cascade (not just the subtree under `self`), then walks back
    /// down to the node at this node's own path in the new layer. Callable
    /// from any node in the tree, not only the root.
    pub fn add_inheriting_layer(&self, strategy: Option<Arc<dyn PersistenceStrategy>>) -> ConfigurationNode {
        let root = self.root_node();
        let new_root = ConfigurationNode::new_inheriting_root(&root, strategy);
        if self.0.parent.is_none() {
            return new_root;
        }
        let parsed = ConfigPath::parse(&self.0.path, false, false, None)
            .expect("a non-root node's own path always has segments");
        new_root
            .get_descendant(parsed.segments())
            .expect("mirroring the root must have produced a peer at this node's path")
    }
}
