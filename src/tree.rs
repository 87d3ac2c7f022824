//! Arena of components, containers and windows.
//!
//! The coordinator never owns widgets. It only needs to ask the windowing
//! layer a handful of questions (is this visible, who is the parent, which
//! window owns this, which native id maps to what) and to hand events to the
//! listeners registered on a component. `ComponentTree` is that narrow
//! surface.

use std::collections::HashMap;

use tracing::trace;

use crate::error::FocusError;
use crate::event::{ComponentId, EventKind, EventRecord, NativeId};
use crate::focus::keys::{KeyStroke, TraversalKeys};
use crate::focus::policy::ContainerOrderPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Component,
    Container,
    /// Plain top-level window. Cannot be activated by the platform; it is
    /// activated through its owning frame or dialog.
    Window,
    Frame,
    Dialog,
}

impl ComponentKind {
    pub fn is_container(self) -> bool {
        !matches!(self, ComponentKind::Component)
    }

    pub fn is_window(self) -> bool {
        matches!(
            self,
            ComponentKind::Window | ComponentKind::Frame | ComponentKind::Dialog
        )
    }

    pub fn is_activatable(self) -> bool {
        matches!(self, ComponentKind::Frame | ComponentKind::Dialog)
    }
}

pub type FocusListener = Box<dyn FnMut(&EventRecord) + Send>;
pub type WindowListener = Box<dyn FnMut(&EventRecord) + Send>;
pub type KeyListener = Box<dyn FnMut(&mut EventRecord) + Send>;
pub type MenuListener = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// One flat list per listener kind, in registration order.
#[derive(Default)]
struct ListenerTable {
    focus: Vec<(ListenerId, FocusListener)>,
    window: Vec<(ListenerId, WindowListener)>,
    key: Vec<(ListenerId, KeyListener)>,
    menu: Vec<(ListenerId, MenuListener)>,
}

impl ListenerTable {
    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.len();
        self.focus.retain(|(lid, _)| *lid != id);
        self.window.retain(|(lid, _)| *lid != id);
        self.key.retain(|(lid, _)| *lid != id);
        self.menu.retain(|(lid, _)| *lid != id);
        self.len() != before
    }

    fn len(&self) -> usize {
        self.focus.len() + self.window.len() + self.key.len() + self.menu.len()
    }
}

/// Keyboard shortcuts of a frame's menu bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuBar {
    shortcuts: Vec<(KeyStroke, String)>,
}

impl MenuBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shortcut(&mut self, stroke: KeyStroke, command: impl Into<String>) {
        self.shortcuts.push((stroke, command.into()));
    }

    pub fn command_for(&self, stroke: &KeyStroke) -> Option<&str> {
        self.shortcuts
            .iter()
            .find(|(k, _)| k == stroke)
            .map(|(_, cmd)| cmd.as_str())
    }
}

struct Node {
    kind: ComponentKind,
    name: String,
    parent: Option<ComponentId>,
    owner: Option<ComponentId>,
    children: Vec<ComponentId>,
    visible: bool,
    displayable: bool,
    enabled: bool,
    focusable: bool,
    focus_cycle_root: bool,
    policy_provider: bool,
    policy: Option<ContainerOrderPolicy>,
    traversal_keys: Option<TraversalKeys>,
    native_id: Option<NativeId>,
    focus_proxy: Option<NativeId>,
    menu_bar: Option<MenuBar>,
    listeners: ListenerTable,
}

impl Node {
    fn new(kind: ComponentKind, name: String, parent: Option<ComponentId>) -> Self {
        Self {
            kind,
            name,
            parent,
            owner: None,
            children: Vec::new(),
            visible: true,
            displayable: true,
            enabled: true,
            focusable: kind == ComponentKind::Component,
            focus_cycle_root: kind.is_window(),
            policy_provider: false,
            policy: None,
            traversal_keys: None,
            native_id: None,
            focus_proxy: None,
            menu_bar: None,
            listeners: ListenerTable::default(),
        }
    }
}

#[derive(Default)]
pub struct ComponentTree {
    nodes: Vec<Node>,
    native: HashMap<NativeId, ComponentId>,
    proxies: HashMap<NativeId, ComponentId>,
    next_listener: u64,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> ComponentId {
        let id = ComponentId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn node(&self, id: ComponentId) -> Result<&Node, FocusError> {
        self.nodes
            .get(id.0)
            .ok_or(FocusError::UnknownComponent(id))
    }

    fn node_mut(&mut self, id: ComponentId) -> Result<&mut Node, FocusError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(FocusError::UnknownComponent(id))
    }

    pub fn add_frame(&mut self, name: impl Into<String>) -> ComponentId {
        self.push(Node::new(ComponentKind::Frame, name.into(), None))
    }

    pub fn add_dialog(
        &mut self,
        name: impl Into<String>,
        owner: Option<ComponentId>,
    ) -> Result<ComponentId, FocusError> {
        self.add_owned(ComponentKind::Dialog, name.into(), owner)
    }

    /// Adds a plain, non-activatable window owned by `owner`.
    pub fn add_window(
        &mut self,
        name: impl Into<String>,
        owner: ComponentId,
    ) -> Result<ComponentId, FocusError> {
        self.add_owned(ComponentKind::Window, name.into(), Some(owner))
    }

    fn add_owned(
        &mut self,
        kind: ComponentKind,
        name: String,
        owner: Option<ComponentId>,
    ) -> Result<ComponentId, FocusError> {
        if let Some(owner) = owner
            && !self.kind(owner)?.is_window()
        {
            return Err(FocusError::NotAWindow(owner));
        }
        let mut node = Node::new(kind, name, None);
        node.owner = owner;
        Ok(self.push(node))
    }

    pub fn add_container(
        &mut self,
        parent: ComponentId,
        name: impl Into<String>,
    ) -> Result<ComponentId, FocusError> {
        self.add_child(parent, ComponentKind::Container, name.into())
    }

    pub fn add_component(
        &mut self,
        parent: ComponentId,
        name: impl Into<String>,
    ) -> Result<ComponentId, FocusError> {
        self.add_child(parent, ComponentKind::Component, name.into())
    }

    fn add_child(
        &mut self,
        parent: ComponentId,
        kind: ComponentKind,
        name: String,
    ) -> Result<ComponentId, FocusError> {
        if !self.kind(parent)?.is_container() {
            return Err(FocusError::NotAContainer(parent));
        }
        let id = self.push(Node::new(kind, name, Some(parent)));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Every component in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        (0..self.nodes.len()).map(ComponentId)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: ComponentId) -> Result<ComponentKind, FocusError> {
        Ok(self.node(id)?.kind)
    }

    pub fn name(&self, id: ComponentId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("?")
    }

    /// Finds a component by name. Names are not required to be unique; the
    /// first match in creation order wins.
    pub fn find(&self, name: &str) -> Option<ComponentId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(ComponentId)
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.node(id).ok().and_then(|n| n.parent)
    }

    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn component_count(&self, id: ComponentId) -> usize {
        self.children(id).len()
    }

    pub fn component(&self, id: ComponentId, index: usize) -> Option<ComponentId> {
        self.children(id).get(index).copied()
    }

    pub fn component_index(&self, child: ComponentId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|c| *c == child)
    }

    pub fn is_container(&self, id: ComponentId) -> bool {
        self.kind(id).is_ok_and(ComponentKind::is_container)
    }

    pub fn is_window(&self, id: ComponentId) -> bool {
        self.kind(id).is_ok_and(ComponentKind::is_window)
    }

    pub fn is_activatable(&self, id: ComponentId) -> bool {
        self.kind(id).is_ok_and(ComponentKind::is_activatable)
    }

    pub fn is_visible(&self, id: ComponentId) -> bool {
        self.node(id).is_ok_and(|n| n.visible)
    }

    pub fn is_displayable(&self, id: ComponentId) -> bool {
        self.node(id).is_ok_and(|n| n.displayable)
    }

    pub fn is_enabled(&self, id: ComponentId) -> bool {
        self.node(id).is_ok_and(|n| n.enabled)
    }

    pub fn is_focusable(&self, id: ComponentId) -> bool {
        self.node(id).is_ok_and(|n| n.focusable)
    }

    pub fn is_focus_cycle_root(&self, id: ComponentId) -> bool {
        self.node(id)
            .is_ok_and(|n| n.focus_cycle_root && n.kind.is_container())
    }

    pub fn is_focus_traversal_policy_provider(&self, id: ComponentId) -> bool {
        self.node(id)
            .is_ok_and(|n| n.policy_provider && n.kind.is_container())
    }

    pub fn set_visible(&mut self, id: ComponentId, visible: bool) -> Result<(), FocusError> {
        self.node_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_displayable(&mut self, id: ComponentId, displayable: bool) -> Result<(), FocusError> {
        self.node_mut(id)?.displayable = displayable;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: ComponentId, enabled: bool) -> Result<(), FocusError> {
        self.node_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_focusable(&mut self, id: ComponentId, focusable: bool) -> Result<(), FocusError> {
        self.node_mut(id)?.focusable = focusable;
        Ok(())
    }

    /// Windows are always focus cycle roots; the flag is ignored for them.
    pub fn set_focus_cycle_root(&mut self, id: ComponentId, root: bool) -> Result<(), FocusError> {
        let node = self.node_mut(id)?;
        if !node.kind.is_container() {
            return Err(FocusError::NotAContainer(id));
        }
        node.focus_cycle_root = root || node.kind.is_window();
        Ok(())
    }

    pub fn set_focus_traversal_policy_provider(
        &mut self,
        id: ComponentId,
        provider: bool,
    ) -> Result<(), FocusError> {
        let node = self.node_mut(id)?;
        if !node.kind.is_container() {
            return Err(FocusError::NotAContainer(id));
        }
        node.policy_provider = provider;
        Ok(())
    }

    pub fn set_focus_traversal_policy(
        &mut self,
        id: ComponentId,
        policy: ContainerOrderPolicy,
    ) -> Result<(), FocusError> {
        let node = self.node_mut(id)?;
        if !node.kind.is_container() {
            return Err(FocusError::NotAContainer(id));
        }
        node.policy = Some(policy);
        Ok(())
    }

    /// Policy governing `container`: its own, else the nearest one found on
    /// its focus cycle root ancestors.
    pub fn effective_policy(&self, container: ComponentId) -> Option<ContainerOrderPolicy> {
        let mut current = Some(container);
        while let Some(id) = current {
            if let Some(policy) = self.node(id).ok().and_then(|n| n.policy) {
                return Some(policy);
            }
            current = self.focus_cycle_root_ancestor(id);
        }
        None
    }

    pub fn set_traversal_keys(
        &mut self,
        id: ComponentId,
        keys: TraversalKeys,
    ) -> Result<(), FocusError> {
        self.node_mut(id)?.traversal_keys = Some(keys);
        Ok(())
    }

    /// Per-component traversal keys. `None` means the coordinator defaults apply.
    pub fn traversal_keys(&self, id: ComponentId) -> Option<&TraversalKeys> {
        self.node(id).ok().and_then(|n| n.traversal_keys.as_ref())
    }

    /// Nearest window, counting `id` itself.
    pub fn window_ancestor(&self, id: ComponentId) -> Option<ComponentId> {
        let mut current = Some(id);
        while let Some(c) = current {
            if self.is_window(c) {
                return Some(c);
            }
            current = self.parent(c);
        }
        None
    }

    /// Nearest strict ancestor that is a focus cycle root.
    pub fn focus_cycle_root_ancestor(&self, id: ComponentId) -> Option<ComponentId> {
        let mut current = self.parent(id);
        while let Some(c) = current {
            if self.is_focus_cycle_root(c) {
                return Some(c);
            }
            current = self.parent(c);
        }
        None
    }

    /// Whether `root` is the cycle root governing `id`. A cycle root also
    /// counts as a member of its own cycle.
    pub fn is_focus_cycle_root_of(&self, root: ComponentId, id: ComponentId) -> bool {
        (root == id && self.is_focus_cycle_root(root))
            || self.focus_cycle_root_ancestor(id) == Some(root)
    }

    /// Strict containment in the component hierarchy.
    pub fn is_ancestor_of(&self, ancestor: ComponentId, id: ComponentId) -> bool {
        let mut current = self.parent(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    pub fn owner(&self, window: ComponentId) -> Option<ComponentId> {
        self.node(window).ok().and_then(|n| n.owner)
    }

    /// Nearest activatable window (frame or dialog) following owner links,
    /// counting `window` itself.
    pub fn frame_dialog_owner(&self, window: ComponentId) -> Option<ComponentId> {
        let mut current = self.window_ancestor(window);
        while let Some(w) = current {
            if self.is_activatable(w) {
                return Some(w);
            }
            current = self.owner(w);
        }
        None
    }

    pub fn set_native_id(&mut self, window: ComponentId, native: NativeId) -> Result<(), FocusError> {
        let node = self.node_mut(window)?;
        if !node.kind.is_window() {
            return Err(FocusError::NotAWindow(window));
        }
        if let Some(old) = node.native_id.replace(native) {
            self.native.remove(&old);
        }
        self.native.insert(native, window);
        Ok(())
    }

    /// Registers the hidden focus proxy native window of `window`.
    pub fn set_focus_proxy(&mut self, window: ComponentId, proxy: NativeId) -> Result<(), FocusError> {
        let node = self.node_mut(window)?;
        if !node.kind.is_window() {
            return Err(FocusError::NotAWindow(window));
        }
        if let Some(old) = node.focus_proxy.replace(proxy) {
            self.proxies.remove(&old);
        }
        self.proxies.insert(proxy, window);
        Ok(())
    }

    pub fn native_id(&self, window: ComponentId) -> Option<NativeId> {
        self.node(window).ok().and_then(|n| n.native_id)
    }

    pub fn focus_proxy(&self, window: ComponentId) -> Option<NativeId> {
        self.node(window).ok().and_then(|n| n.focus_proxy)
    }

    pub fn component_for_native(&self, native: NativeId) -> Option<ComponentId> {
        self.native.get(&native).copied()
    }

    /// Window owning the focus proxy `native`, if it is one.
    pub fn proxy_owner(&self, native: NativeId) -> Option<ComponentId> {
        self.proxies.get(&native).copied()
    }

    pub fn set_menu_bar(&mut self, frame: ComponentId, menu_bar: MenuBar) -> Result<(), FocusError> {
        let node = self.node_mut(frame)?;
        if node.kind != ComponentKind::Frame {
            return Err(FocusError::NotAWindow(frame));
        }
        node.menu_bar = Some(menu_bar);
        Ok(())
    }

    pub fn menu_bar(&self, frame: ComponentId) -> Option<&MenuBar> {
        self.node(frame).ok().and_then(|n| n.menu_bar.as_ref())
    }

    fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    pub fn add_focus_listener<F>(&mut self, id: ComponentId, f: F) -> Result<ListenerId, FocusError>
    where
        F: FnMut(&EventRecord) + Send + 'static,
    {
        self.node(id)?;
        let lid = self.next_listener_id();
        self.node_mut(id)?.listeners.focus.push((lid, Box::new(f)));
        Ok(lid)
    }

    pub fn add_window_listener<F>(&mut self, id: ComponentId, f: F) -> Result<ListenerId, FocusError>
    where
        F: FnMut(&EventRecord) + Send + 'static,
    {
        if !self.is_window(id) {
            self.node(id)?;
            return Err(FocusError::NotAWindow(id));
        }
        let lid = self.next_listener_id();
        self.node_mut(id)?.listeners.window.push((lid, Box::new(f)));
        Ok(lid)
    }

    pub fn add_key_listener<F>(&mut self, id: ComponentId, f: F) -> Result<ListenerId, FocusError>
    where
        F: FnMut(&mut EventRecord) + Send + 'static,
    {
        self.node(id)?;
        let lid = self.next_listener_id();
        self.node_mut(id)?.listeners.key.push((lid, Box::new(f)));
        Ok(lid)
    }

    pub fn add_menu_listener<F>(&mut self, frame: ComponentId, f: F) -> Result<ListenerId, FocusError>
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.node(frame)?;
        let lid = self.next_listener_id();
        self.node_mut(frame)?.listeners.menu.push((lid, Box::new(f)));
        Ok(lid)
    }

    pub fn remove_listener(&mut self, id: ComponentId, listener: ListenerId) -> bool {
        self.node_mut(id)
            .map(|n| n.listeners.remove(listener))
            .unwrap_or(false)
    }

    /// Hands `event` to the listeners of its source. Consumed events are
    /// never delivered.
    pub(crate) fn deliver(&mut self, event: &mut EventRecord) {
        if event.is_consumed() {
            return;
        }
        let Some(source) = event.source() else {
            return;
        };
        let Ok(node) = self.node_mut(source) else {
            return;
        };
        trace!(event = %event, "deliver");
        let listeners = &mut node.listeners;
        match event.kind() {
            EventKind::FocusGained | EventKind::FocusLost => {
                for (_, l) in listeners.focus.iter_mut() {
                    l(&*event);
                }
            }
            k if k.is_window() => {
                for (_, l) in listeners.window.iter_mut() {
                    l(&*event);
                }
            }
            k if k.is_key() => {
                for (_, l) in listeners.key.iter_mut() {
                    l(&mut *event);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn fire_menu_command(&mut self, frame: ComponentId, command: &str) {
        if let Ok(node) = self.node_mut(frame) {
            for (_, l) in node.listeners.menu.iter_mut() {
                l(command);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn window_and_cycle_root_ancestors() {
        let mut tree = ComponentTree::new();
        let frame = tree.add_frame("frame");
        let panel = tree.add_container(frame, "panel").unwrap();
        let inner = tree.add_container(panel, "inner").unwrap();
        tree.set_focus_cycle_root(inner, true).unwrap();
        let button = tree.add_component(inner, "button").unwrap();

        assert_eq!(tree.window_ancestor(button), Some(frame));
        assert_eq!(tree.focus_cycle_root_ancestor(button), Some(inner));
        assert_eq!(tree.focus_cycle_root_ancestor(inner), Some(frame));
        assert!(tree.is_focus_cycle_root_of(inner, button));
        assert!(!tree.is_focus_cycle_root_of(frame, button));
        assert!(tree.is_ancestor_of(panel, button));
        assert_eq!(tree.component_index(inner), Some(0));
    }

    #[test]
    fn leaves_cannot_hold_children() {
        let mut tree = ComponentTree::new();
        let frame = tree.add_frame("frame");
        let leaf = tree.add_component(frame, "leaf").unwrap();
        assert_eq!(
            tree.add_component(leaf, "x"),
            Err(FocusError::NotAContainer(leaf))
        );
        assert_eq!(
            tree.set_focus_cycle_root(leaf, true),
            Err(FocusError::NotAContainer(leaf))
        );
    }

    #[test]
    fn frame_dialog_owner_follows_owner_links() {
        let mut tree = ComponentTree::new();
        let frame = tree.add_frame("frame");
        let popup = tree.add_window("popup", frame).unwrap();
        let nested = tree.add_window("nested", popup).unwrap();
        assert_eq!(tree.frame_dialog_owner(nested), Some(frame));
        assert_eq!(tree.frame_dialog_owner(frame), Some(frame));
        assert!(!tree.is_activatable(popup));
    }

    #[test]
    fn consumed_events_skip_listeners() {
        let mut tree = ComponentTree::new();
        let frame = tree.add_frame("frame");
        let button = tree.add_component(frame, "button").unwrap();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let lid = tree
            .add_focus_listener(button, move |_| *counter.lock().unwrap() += 1)
            .unwrap();

        let mut ev = EventRecord::focus_gained(button, None, false);
        tree.deliver(&mut ev);
        ev.consume();
        tree.deliver(&mut ev);
        assert_eq!(*seen.lock().unwrap(), 1);

        assert!(tree.remove_listener(button, lid));
        assert!(!tree.remove_listener(button, lid));
    }

    #[test]
    fn native_and_proxy_lookup() {
        let mut tree = ComponentTree::new();
        let frame = tree.add_frame("frame");
        tree.set_native_id(frame, NativeId(10)).unwrap();
        tree.set_focus_proxy(frame, NativeId(11)).unwrap();
        assert_eq!(tree.component_for_native(NativeId(10)), Some(frame));
        assert_eq!(tree.component_for_native(NativeId(11)), None);
        assert_eq!(tree.proxy_owner(NativeId(11)), Some(frame));
    }
}
