//! Configuration items (spec §4.1 "Configuration item").
//!
//! An item's own value lives behind the cascade's single mutex; its
//! inherited counterpart (the matching item one layer up) is a plain typed
//! `Arc` reference, not a type-erased lookup, since an item and its
//! inherited peer are always created together with the same `T`.
//!
//! Node-wide tree walks (persistence, reset, ordering) need a homogeneous
//! collection of otherwise differently-typed items; [`AnyItem`] is the
//! type-erased façade each `ConfigurationItem<T>` implements, downcast back
//! to a concrete `ConfigurationItem<T>` via [`downcast_item`] the same way
//! an `Arc<dyn Any>` table would.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::cascade::Cascade;
use crate::config::notify::{ChangeKind, Subscription};
use crate::error::{Error, Result};
use crate::persistence::strategy::PersistenceStrategy;
use crate::persistence::value::{ItemNode, Persistable};

struct ItemState<T: Persistable> {
    own_value: Option<T>,
    own_comment: Option<Vec<String>>,
}

struct ItemInner<T: Persistable> {
    name: String,
    path: String,
    cascade: Arc<Cascade>,
    state: Mutex<ItemState<T>>,
    /// The same-named item one layer up the cascade, if this item lives in
    /// an inheriting layer.
    inherited: Option<ConfigurationItem<T>>,
    /// The same-named item in every layer directly inheriting from this
    /// one's layer. Populated at construction time (`new_inheriting`
    /// registers itself on its `inherited` item) so a value/comment change
    /// here can walk down and notify every peer whose effective value just
    /// changed as a result.
    peers: Mutex<Vec<std::sync::Weak<ItemInner<T>>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    supports_comments: bool,
    /// This item's own layer's persistence strategy, consulted by
    /// `set_value` for `is_assignable` (spec §4.4). `None` for a layer with
    /// no persistence.
    strategy: Option<Arc<dyn PersistenceStrategy>>,
}

/// A single configuration value, generic over its value type.
///
/// Cheap to clone: every clone shares the same underlying state.
pub struct ConfigurationItem<T: Persistable>(Arc<ItemInner<T>>);

impl<T: Persistable> Clone for ConfigurationItem<T> {
    fn clone(&self) -> Self {
        ConfigurationItem(self.0.clone())
    }
}

impl<T: Persistable> fmt::Debug for ConfigurationItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationItem")
            .field("path", &self.0.path)
            .finish()
    }
}

impl<T: Persistable> ConfigurationItem<T> {
    pub(crate) fn new_base(
        name: &str,
        path: &str,
        cascade: Arc<Cascade>,
        default_value: T,
        supports_comments: bool,
        strategy: Option<Arc<dyn PersistenceStrategy>>,
    ) -> Self {
        ConfigurationItem(Arc::new(ItemInner {
            name: name.to_string(),
            path: path.to_string(),
            cascade,
            state: Mutex::new(ItemState {
                own_value: Some(default_value),
                own_comment: None,
            }),
            inherited: None,
            peers: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            supports_comments,
            strategy,
        }))
    }

    pub(crate) fn new_inheriting(
        name: &str,
        path: &str,
        cascade: Arc<Cascade>,
        inherited: ConfigurationItem<T>,
        supports_comments: bool,
        strategy: Option<Arc<dyn PersistenceStrategy>>,
    ) -> Self {
        let item = ConfigurationItem(Arc::new(ItemInner {
            name: name.to_string(),
            path: path.to_string(),
            cascade,
            state: Mutex::new(ItemState {
                own_value: None,
                own_comment: None,
            }),
            inherited: Some(inherited.clone()),
            peers: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            supports_comments,
            strategy,
        }));
        inherited.0.peers.lock().push(Arc::downgrade(&item.0));
        item
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn has_own_value(&self) -> bool {
        self.0.state.lock().own_value.is_some()
    }

    /// This item's own value only — `None` if it has none, even if an
    /// inherited counterpart would supply one. The `inherit=false` half of
    /// spec §4.2's `try_get_value`.
    pub fn own_value(&self) -> Option<T> {
        self.0.state.lock().own_value.clone()
    }

    /// This item's own comment only, with the same `inherit=false` meaning
    /// as [`Self::own_value`].
    pub fn own_comment(&self) -> Option<Vec<String>> {
        self.0.state.lock().own_comment.clone()
    }

    /// The effective value: this item's own value, or failing that, the
    /// inherited item's effective value, recursively. Every item ultimately
    /// bottoms out at a base-layer item, which always has an own value.
    pub fn value(&self) -> T {
        let state = self.0.state.lock();
        if let Some(v) = &state.own_value {
            return v.clone();
        }
        drop(state);
        self.0
            .inherited
            .as_ref()
            .expect("item with no own value must have an inherited counterpart")
            .value()
    }

    pub fn comment(&self) -> Option<Vec<String>> {
        let state = self.0.state.lock();
        if state.own_comment.is_some() {
            return state.own_comment.clone();
        }
        drop(state);
        self.0.inherited.as_ref().and_then(|i| i.comment())
    }

    /// Sets this item's own value, marking the node subtree modified and
    /// firing the value-changed notification on every registered
    /// subscription, then propagating the same notification to every peer
    /// item (in layers inheriting from this one) whose effective value just
    /// changed as a result — i.e. every peer with no own value of its own,
    /// recursively down the cascade.
    ///
    /// A no-op (no store, no notification, no propagation) if `value`
    /// already equals the current own value. Fails with `kind=persistence`
    /// if the owning layer's persistence strategy rejects `value` via
    /// `is_assignable`.
    pub fn set_value(&self, value: T) -> Result<()> {
        let _guard = self.0.cascade.lock();
        if self.0.state.lock().own_value.as_ref() == Some(&value) {
            return Ok(());
        }
        if let Some(strategy) = &self.0.strategy {
            let encoded = value.encode();
            if !strategy.is_assignable(TypeId::of::<T>(), &encoded) {
                return Err(Error::persistence(format!(
                    "value for '{}' is not assignable under this configuration's persistence strategy",
                    self.0.path
                )));
            }
        }
        self.0.state.lock().own_value = Some(value);
        self.0.cascade.mark_modified();
        self.fire(ChangeKind::Value);
        ItemInner::propagate_value_change(&self.0);
        Ok(())
    }

    /// Sets this item's own comment. A no-op (no store, no notification, no
    /// propagation) if the owning layer's strategy does not support
    /// comments is an error; if `lines` already equals the current own
    /// comment, it is a silent no-op instead.
    pub fn set_comment(&self, lines: Option<Vec<String>>) -> Result<()> {
        if !self.0.supports_comments {
            return Err(Error::not_supported(
                "this configuration's persistence strategy does not support comments",
            ));
        }
        let _guard = self.0.cascade.lock();
        if self.0.state.lock().own_comment == lines {
            return Ok(());
        }
        self.0.state.lock().own_comment = lines;
        self.0.cascade.mark_modified();
        self.fire(ChangeKind::Comment);
        ItemInner::propagate_comment_change(&self.0);
        Ok(())
    }

    /// Clears this item's own value, reverting it to its inherited value (or
    /// a no-op for a base-layer item, which has no inherited counterpart).
    /// Since the effective value only changes for peers that themselves
    /// have no own value, propagation here is the same walk `set_value`
    /// does.
    pub fn reset_value(&self) {
        if self.0.inherited.is_none() {
            return;
        }
        let _guard = self.0.cascade.lock();
        self.0.state.lock().own_value = None;
        self.0.cascade.mark_modified();
        self.fire(ChangeKind::Value);
        ItemInner::propagate_value_change(&self.0);
    }

    pub fn subscribe(
        &self,
        context: Arc<dyn crate::config::notify::NotifyContext>,
        handler: impl Fn(ChangeKind) + Send + Sync + 'static,
    ) {
        self.0
            .subscriptions
            .lock()
            .push(Subscription::new(context, handler));
    }

    /// Queues delivery of `kind` to every subscription, deferred until the
    /// cascade's outermost lock for this call releases (see
    /// `config::cascade`), so a handler never runs while the mutex is held.
    fn fire(&self, kind: ChangeKind) {
        ItemInner::fire(&self.0, kind);
    }

    /// Called during the owning layer's `load`: sets the own value/comment
    /// directly from persisted nodes without going through `set_value`'s
    /// modification-flag bookkeeping, matching the invariant that a
    /// successful load leaves the tree's modification flag clear.
    pub(crate) fn load_own(&self, value: Option<ItemNode>, comment: Option<Vec<String>>) -> Result<()> {
        let mut state = self.0.state.lock();
        state.own_value = value.as_ref().map(T::decode).transpose()?;
        state.own_comment = comment;
        Ok(())
    }

    pub(crate) fn encode_own_value(&self) -> Option<ItemNode> {
        self.0.state.lock().own_value.as_ref().map(Persistable::encode)
    }

    pub(crate) fn encode_effective_value(&self) -> ItemNode {
        self.value().encode()
    }

    /// The type-erased handle to this same item, for insertion into a
    /// node's homogeneous item list.
    pub(crate) fn as_any_item(&self) -> Arc<dyn AnyItem> {
        self.0.clone()
    }
}

/// Type-erased façade over a `ConfigurationItem<T>` for node-wide tree
/// walks that must treat items of different `T` uniformly.
pub trait AnyItem: Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn name(&self) -> &str;
    fn path(&self) -> &str;
    fn type_id_of(&self) -> TypeId;
    fn type_name_of(&self) -> &'static str;
    fn has_own_value(&self) -> bool;
    fn own_value_node(&self) -> Option<ItemNode>;
    fn effective_value_node(&self) -> ItemNode;
    fn own_comment(&self) -> Option<Vec<String>>;
    fn load_raw(&self, value: Option<ItemNode>, comment: Option<Vec<String>>) -> Result<()>;
    fn reset(&self);

    /// Builds a new item of the same (erased) type, inheriting from this
    /// one, for a newly mirrored node in a layer constructed after this
    /// item already existed (`ConfigurationNode::new_inheriting_root`'s
    /// shape mirroring). The concrete `T` never needs to leave
    /// `ItemInner<T>`'s `impl` of this method. `strategy` is the new peer's
    /// own layer's persistence strategy (the mirrored node's, not the
    /// inherited item's).
    fn create_inheriting_peer(
        self: Arc<Self>,
        cascade: Arc<Cascade>,
        strategy: Option<Arc<dyn PersistenceStrategy>>,
    ) -> Arc<dyn AnyItem>;
}

impl<T: Persistable> ItemInner<T> {
    /// Queues delivery of `kind` to every subscription on this specific
    /// item, deferred until the cascade's outermost lock for this call
    /// releases (see `config::cascade`), so a handler never runs while the
    /// mutex is held.
    fn fire(self: &Arc<Self>, kind: ChangeKind) {
        let subs = self.subscriptions.lock();
        if subs.is_empty() {
            return;
        }
        let contexts: Vec<_> = subs
            .iter()
            .map(|s| (s.context.clone(), s.handler.clone()))
            .collect();
        drop(subs);
        crate::config::cascade::defer(Box::new(move || {
            for (context, handler) in contexts {
                let handler = handler.clone();
                context.schedule(Box::new(move || handler(kind)));
            }
        }));
    }

    /// Walks down to every peer item (in layers inheriting from this one)
    /// that has no own value and so just inherited this change, firing a
    /// value-changed notification on each and continuing the walk below
    /// it. A peer with its own value stops the walk: its effective value
    /// didn't change, and neither did anything further below it.
    fn propagate_value_change(self: &Arc<Self>) {
        let peers: Vec<_> = self.peers.lock().iter().filter_map(std::sync::Weak::upgrade).collect();
        for peer in peers {
            if peer.state.lock().own_value.is_none() {
                peer.fire(ChangeKind::Value);
                ItemInner::propagate_value_change(&peer);
            }
        }
    }

    /// Same walk as [`Self::propagate_value_change`], for comment changes.
    fn propagate_comment_change(self: &Arc<Self>) {
        let peers: Vec<_> = self.peers.lock().iter().filter_map(std::sync::Weak::upgrade).collect();
        for peer in peers {
            if peer.state.lock().own_comment.is_none() {
                peer.fire(ChangeKind::Comment);
                ItemInner::propagate_comment_change(&peer);
            }
        }
    }
}

impl<T: Persistable> AnyItem for ItemInner<T> {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn type_id_of(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name_of(&self) -> &'static str {
        T::type_name()
    }

    fn has_own_value(&self) -> bool {
        self.state.lock().own_value.is_some()
    }

    fn own_value_node(&self) -> Option<ItemNode> {
        self.state.lock().own_value.as_ref().map(Persistable::encode)
    }

    fn effective_value_node(&self) -> ItemNode {
        let state = self.state.lock();
        if let Some(v) = &state.own_value {
            return v.encode();
        }
        drop(state);
        self.inherited
            .as_ref()
            .expect("item with no own value must have an inherited counterpart")
            .encode_effective_value()
    }

    fn own_comment(&self) -> Option<Vec<String>> {
        self.state.lock().own_comment.clone()
    }

    fn load_raw(&self, value: Option<ItemNode>, comment: Option<Vec<String>>) -> Result<()> {
        let mut state = self.state.lock();
        state.own_value = value.as_ref().map(T::decode).transpose()?;
        state.own_comment = comment;
        Ok(())
    }

    fn reset(&self) {
        if self.inherited.is_some() {
            self.state.lock().own_value = None;
        }
    }

    fn create_inheriting_peer(
        self: Arc<Self>,
        cascade: Arc<Cascade>,
        strategy: Option<Arc<dyn PersistenceStrategy>>,
    ) -> Arc<dyn AnyItem> {
        let name = self.name.clone();
        let path = self.path.clone();
        let supports_comments = self.supports_comments;
        let inherited = ConfigurationItem(self);
        ConfigurationItem::new_inheriting(&name, &path, cascade, inherited, supports_comments, strategy).as_any_item()
    }
}

/// Downcasts a type-erased item handle back to a concrete
/// `ConfigurationItem<T>`, returning `None` if `T` does not match the
/// item's actual type.
pub fn downcast_item<T: Persistable>(any: Arc<dyn AnyItem>) -> Option<ConfigurationItem<T>> {
    let any: Arc<dyn Any + Send + Sync> = any.as_any_arc();
    any.downcast::<ItemInner<T>>().ok().map(ConfigurationItem)
}
