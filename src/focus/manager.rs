//! Keyboard focus state machine.
//!
//! [`FocusCoordinator`] owns the focus triple (focus owner, focused window,
//! active window) and consumes focus, window and key events on the dispatch
//! thread. Every proposed change goes through a rejectable setter: vetoable
//! listeners run first and may refuse it, in which case the coordinator
//! recovers locally and the event source never learns about it.
//!
//! Invariant after every handled event: when there is a focus owner, its
//! window is the focused window.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

use crate::event::{ComponentId, EventKind, EventRecord};
use crate::event_queue::EventQueue;
use crate::focus::keys::{TraversalAction, TraversalKeys};
use crate::focus::policy::ContainerOrderPolicy;
use crate::peer::FocusPeer;
use crate::tree::{ComponentKind, ComponentTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusProperty {
    FocusOwner,
    PermanentFocusOwner,
    FocusedWindow,
    ActiveWindow,
    CurrentFocusCycleRoot,
}

impl fmt::Display for FocusProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FocusProperty::FocusOwner => "focusOwner",
            FocusProperty::PermanentFocusOwner => "permanentFocusOwner",
            FocusProperty::FocusedWindow => "focusedWindow",
            FocusProperty::ActiveWindow => "activeWindow",
            FocusProperty::CurrentFocusCycleRoot => "currentFocusCycleRoot",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusChange {
    pub property: FocusProperty,
    pub old: Option<ComponentId>,
    pub new: Option<ComponentId>,
}

/// Refusal returned by a [`VetoableChangeListener`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("focus change vetoed: {0}")]
pub struct FocusVeto(pub String);

pub trait VetoableChangeListener: Send {
    fn vetoable_change(&mut self, change: &FocusChange) -> Result<(), FocusVeto>;
}

impl<F> VetoableChangeListener for F
where
    F: FnMut(&FocusChange) -> Result<(), FocusVeto> + Send,
{
    fn vetoable_change(&mut self, change: &FocusChange) -> Result<(), FocusVeto> {
        self(change)
    }
}

pub trait PropertyChangeListener: Send {
    fn property_change(&mut self, change: &FocusChange);
}

impl<F> PropertyChangeListener for F
where
    F: FnMut(&FocusChange) + Send,
{
    fn property_change(&mut self, change: &FocusChange) {
        self(change)
    }
}

/// First look at every key event, before the focus owner sees it.
pub trait KeyEventDispatcher: Send {
    /// Return `true` to claim the event and stop further dispatch.
    fn dispatch_key_event(&mut self, event: &mut EventRecord) -> bool;
}

impl<F> KeyEventDispatcher for F
where
    F: FnMut(&mut EventRecord) -> bool + Send,
{
    fn dispatch_key_event(&mut self, event: &mut EventRecord) -> bool {
        self(event)
    }
}

/// Last look at every key event, after the focus owner's listeners.
pub trait KeyEventPostProcessor: Send {
    /// Return `true` to claim the event; menu shortcuts are then skipped.
    fn post_process_key_event(&mut self, event: &mut EventRecord) -> bool;
}

impl<F> KeyEventPostProcessor for F
where
    F: FnMut(&mut EventRecord) -> bool + Send,
{
    fn post_process_key_event(&mut self, event: &mut EventRecord) -> bool {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What the coordinator needs from its surroundings while handling one
/// operation. Built by the owner of the coordinator under its lock.
pub struct FocusEnv<'a> {
    pub tree: &'a mut ComponentTree,
    pub queue: &'a EventQueue,
    pub peer: &'a mut dyn FocusPeer,
}

pub struct FocusCoordinator {
    focus_owner: Option<ComponentId>,
    permanent_focus_owner: Option<ComponentId>,
    focused_window: Option<ComponentId>,
    active_window: Option<ComponentId>,
    current_focus_cycle_root: Option<ComponentId>,

    // Recovery checkpoints, overwritten on each transition.
    prev_focus_owner: Option<ComponentId>,
    prev_focused_window: Option<ComponentId>,
    prev_active_window: Option<ComponentId>,

    most_recent_focus_owners: HashMap<ComponentId, ComponentId>,
    // One-shot: swallow the KEY_TYPED that follows a consumed traversal
    // KEY_PRESSED. Interleaved key streams could pair the wrong events.
    consume_next_key_typed: bool,

    default_policy: ContainerOrderPolicy,
    traversal_keys: TraversalKeys,

    vetoers: Vec<(HandlerId, Box<dyn VetoableChangeListener>)>,
    observers: Vec<(HandlerId, Box<dyn PropertyChangeListener>)>,
    dispatchers: Vec<(HandlerId, Box<dyn KeyEventDispatcher>)>,
    post_processors: Vec<(HandlerId, Box<dyn KeyEventPostProcessor>)>,
    next_handler: u64,
}

impl Default for FocusCoordinator {
    fn default() -> Self {
        Self::new(ContainerOrderPolicy::default(), TraversalKeys::default())
    }
}

impl fmt::Debug for FocusCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusCoordinator")
            .field("focus_owner", &self.focus_owner)
            .field("focused_window", &self.focused_window)
            .field("active_window", &self.active_window)
            .finish_non_exhaustive()
    }
}

impl FocusCoordinator {
    pub fn new(default_policy: ContainerOrderPolicy, traversal_keys: TraversalKeys) -> Self {
        Self {
            focus_owner: None,
            permanent_focus_owner: None,
            focused_window: None,
            active_window: None,
            current_focus_cycle_root: None,
            prev_focus_owner: None,
            prev_focused_window: None,
            prev_active_window: None,
            most_recent_focus_owners: HashMap::new(),
            consume_next_key_typed: false,
            default_policy,
            traversal_keys,
            vetoers: Vec::new(),
            observers: Vec::new(),
            dispatchers: Vec::new(),
            post_processors: Vec::new(),
            next_handler: 0,
        }
    }

    pub fn focus_owner(&self) -> Option<ComponentId> {
        self.focus_owner
    }

    pub fn permanent_focus_owner(&self) -> Option<ComponentId> {
        self.permanent_focus_owner
    }

    pub fn focused_window(&self) -> Option<ComponentId> {
        self.focused_window
    }

    pub fn active_window(&self) -> Option<ComponentId> {
        self.active_window
    }

    pub fn current_focus_cycle_root(&self) -> Option<ComponentId> {
        self.current_focus_cycle_root
    }

    pub fn prev_focus_owner(&self) -> Option<ComponentId> {
        self.prev_focus_owner
    }

    pub fn prev_focused_window(&self) -> Option<ComponentId> {
        self.prev_focused_window
    }

    pub fn prev_active_window(&self) -> Option<ComponentId> {
        self.prev_active_window
    }

    /// Component that last held, or was last asked to hold, focus in `window`.
    pub fn most_recent_focus_owner(&self, window: ComponentId) -> Option<ComponentId> {
        self.most_recent_focus_owners.get(&window).copied()
    }

    pub fn default_policy(&self) -> ContainerOrderPolicy {
        self.default_policy
    }

    pub fn set_default_policy(&mut self, policy: ContainerOrderPolicy) {
        self.default_policy = policy;
    }

    pub fn default_traversal_keys(&self) -> &TraversalKeys {
        &self.traversal_keys
    }

    pub fn set_default_traversal_keys(&mut self, keys: TraversalKeys) {
        self.traversal_keys = keys;
    }

    /// Policy governing traversal inside `root`.
    pub fn policy_for(&self, tree: &ComponentTree, root: ComponentId) -> ContainerOrderPolicy {
        tree.effective_policy(root).unwrap_or(self.default_policy)
    }

    /// `true` when the focus owner, if any, lives in the focused window.
    pub fn is_consistent(&self, tree: &ComponentTree) -> bool {
        match self.focus_owner {
            None => true,
            Some(owner) => {
                self.focused_window.is_some() && tree.window_ancestor(owner) == self.focused_window
            }
        }
    }

    fn next_handler_id(&mut self) -> HandlerId {
        self.next_handler += 1;
        HandlerId(self.next_handler)
    }

    pub fn add_vetoable_change_listener<L>(&mut self, listener: L) -> HandlerId
    where
        L: VetoableChangeListener + 'static,
    {
        let id = self.next_handler_id();
        self.vetoers.push((id, Box::new(listener)));
        id
    }

    pub fn add_property_change_listener<L>(&mut self, listener: L) -> HandlerId
    where
        L: PropertyChangeListener + 'static,
    {
        let id = self.next_handler_id();
        self.observers.push((id, Box::new(listener)));
        id
    }

    pub fn add_key_event_dispatcher<D>(&mut self, dispatcher: D) -> HandlerId
    where
        D: KeyEventDispatcher + 'static,
    {
        let id = self.next_handler_id();
        self.dispatchers.push((id, Box::new(dispatcher)));
        id
    }

    pub fn add_key_event_post_processor<P>(&mut self, processor: P) -> HandlerId
    where
        P: KeyEventPostProcessor + 'static,
    {
        let id = self.next_handler_id();
        self.post_processors.push((id, Box::new(processor)));
        id
    }

    /// Remove a listener, dispatcher or post processor by handle.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        let before = self.handler_count();
        self.vetoers.retain(|(h, _)| *h != id);
        self.observers.retain(|(h, _)| *h != id);
        self.dispatchers.retain(|(h, _)| *h != id);
        self.post_processors.retain(|(h, _)| *h != id);
        self.handler_count() != before
    }

    fn handler_count(&self) -> usize {
        self.vetoers.len() + self.observers.len() + self.dispatchers.len() + self.post_processors.len()
    }

    fn field_mut(&mut self, property: FocusProperty) -> &mut Option<ComponentId> {
        match property {
            FocusProperty::FocusOwner => &mut self.focus_owner,
            FocusProperty::PermanentFocusOwner => &mut self.permanent_focus_owner,
            FocusProperty::FocusedWindow => &mut self.focused_window,
            FocusProperty::ActiveWindow => &mut self.active_window,
            FocusProperty::CurrentFocusCycleRoot => &mut self.current_focus_cycle_root,
        }
    }

    // Rejectable update: vetoers run first, observers after the write.
    // Returns whether the property now holds `new`.
    fn set_property(&mut self, property: FocusProperty, new: Option<ComponentId>) -> bool {
        let old = *self.field_mut(property);
        if old == new {
            return true;
        }
        let change = FocusChange { property, old, new };
        for (_, vetoer) in self.vetoers.iter_mut() {
            if let Err(veto) = vetoer.vetoable_change(&change) {
                debug!(%property, ?old, ?new, %veto, "focus change rejected");
                return false;
            }
        }
        self.write_property(change);
        true
    }

    // Unconditional update used to keep the invariant after another change
    // has already been applied.
    fn force_property(&mut self, property: FocusProperty, new: Option<ComponentId>) {
        let old = *self.field_mut(property);
        if old != new {
            self.write_property(FocusChange { property, old, new });
        }
    }

    fn write_property(&mut self, change: FocusChange) {
        *self.field_mut(change.property) = change.new;
        trace!(property = %change.property, old = ?change.old, new = ?change.new, "focus property changed");
        for (_, observer) in self.observers.iter_mut() {
            observer.property_change(&change);
        }
    }

    /// Rejectable setter for the focus owner. A component outside the
    /// focused window is refused outright.
    pub fn set_global_focus_owner(&mut self, tree: &ComponentTree, owner: Option<ComponentId>) -> bool {
        if let Some(c) = owner
            && (self.focused_window.is_none() || tree.window_ancestor(c) != self.focused_window)
        {
            debug!(owner = %c, "focus owner outside the focused window refused");
            return false;
        }
        self.set_property(FocusProperty::FocusOwner, owner)
    }

    pub fn set_global_permanent_focus_owner(
        &mut self,
        tree: &ComponentTree,
        owner: Option<ComponentId>,
    ) -> bool {
        if let Some(c) = owner
            && !tree.contains(c)
        {
            return false;
        }
        self.set_property(FocusProperty::PermanentFocusOwner, owner)
    }

    /// Rejectable setter for the focused window. When the change is applied
    /// and the focus owner no longer lives in the focused window, the owner
    /// is cleared as part of the same transition.
    pub fn set_global_focused_window(&mut self, tree: &ComponentTree, window: Option<ComponentId>) -> bool {
        if let Some(w) = window
            && !tree.is_window(w)
        {
            debug!(window = %w, "focused window must be a window");
            return false;
        }
        if !self.set_property(FocusProperty::FocusedWindow, window) {
            return false;
        }
        if let Some(owner) = self.focus_owner
            && (window.is_none() || tree.window_ancestor(owner) != window)
        {
            self.force_property(FocusProperty::FocusOwner, None);
        }
        true
    }

    pub fn set_global_active_window(&mut self, tree: &ComponentTree, window: Option<ComponentId>) -> bool {
        if let Some(w) = window
            && !tree.is_activatable(w)
        {
            debug!(window = %w, "active window must be a frame or dialog");
            return false;
        }
        self.set_property(FocusProperty::ActiveWindow, window)
    }

    pub fn set_global_current_focus_cycle_root(
        &mut self,
        tree: &ComponentTree,
        root: Option<ComponentId>,
    ) -> bool {
        if let Some(r) = root
            && !tree.is_focus_cycle_root(r)
        {
            return false;
        }
        self.set_property(FocusProperty::CurrentFocusCycleRoot, root)
    }

    /// Drop focus from whatever owns it. Listeners of the old owner hear a
    /// permanent FOCUS_LOST. This cannot be vetoed: it is the terminal
    /// fallback of every recovery path.
    pub fn clear_global_focus_owner(&mut self, env: &mut FocusEnv<'_>) {
        let Some(owner) = self.focus_owner else {
            return;
        };
        debug!(%owner, "clearing global focus owner");
        self.prev_focus_owner = Some(owner);
        self.force_property(FocusProperty::FocusOwner, None);
        self.force_property(FocusProperty::PermanentFocusOwner, None);
        let mut lost = EventRecord::focus_lost(owner, None, false);
        env.tree.deliver(&mut lost);
    }

    fn accepts_focus(&self, tree: &ComponentTree, c: ComponentId) -> bool {
        ContainerOrderPolicy::default().accept(tree, c)
    }

    /// Ask for `component` to become the focus owner.
    ///
    /// When its window already has focus the request turns into a
    /// FOCUS_LOST / FOCUS_GAINED pair on the queue. Otherwise the component
    /// is remembered for its window and the peer is asked to focus that
    /// window natively. Returns `false` when the request cannot succeed.
    pub fn request_focus(&mut self, env: &mut FocusEnv<'_>, component: ComponentId, temporary: bool) -> bool {
        if !self.accepts_focus(env.tree, component) {
            debug!(%component, "focus request for unfocusable component");
            return false;
        }
        let Some(window) = env.tree.window_ancestor(component) else {
            return false;
        };
        self.most_recent_focus_owners.insert(window, component);
        if self.focused_window != Some(window) {
            debug!(%component, %window, "window not focused; asking peer");
            return env.peer.request_window_focus(window);
        }
        let owner = self.focus_owner;
        if owner == Some(component) {
            return true;
        }
        if let Some(owner) = owner {
            env.queue
                .post_event(EventRecord::focus_lost(owner, Some(component), temporary));
        }
        env.queue
            .post_event(EventRecord::focus_gained(component, owner, temporary));
        true
    }

    /// Ask the platform to focus `window`.
    pub fn request_focus_in_window(&mut self, env: &mut FocusEnv<'_>, window: ComponentId, temporary: bool) -> bool {
        if !env.tree.is_window(window) {
            return false;
        }
        if self.focused_window == Some(window) {
            return true;
        }
        trace!(%window, temporary, "requesting native window focus");
        env.peer.request_window_focus(window)
    }

    /// Entry point for resolved native window focus changes. Posts the
    /// window events in causal order: activation before focus on gain,
    /// focus loss before deactivation on loss.
    pub fn post_window_focus(
        &mut self,
        env: &mut FocusEnv<'_>,
        window: ComponentId,
        opposite: Option<ComponentId>,
        gained: bool,
    ) {
        let Some(activatable) = env.tree.frame_dialog_owner(window) else {
            debug!(%window, "window without frame or dialog owner ignored");
            return;
        };
        if gained {
            if self.active_window != Some(activatable) {
                if let Some(old) = self.active_window {
                    env.queue.post_event(EventRecord::window(
                        EventKind::WindowDeactivated,
                        old,
                        Some(activatable),
                    ));
                }
                env.queue.post_event(EventRecord::window(
                    EventKind::WindowActivated,
                    activatable,
                    self.active_window,
                ));
            }
            env.queue.post_event(EventRecord::window(
                EventKind::WindowGainedFocus,
                window,
                opposite,
            ));
        } else {
            env.queue.post_event(EventRecord::window(
                EventKind::WindowLostFocus,
                window,
                opposite,
            ));
            let opposite_owner = opposite.and_then(|o| env.tree.frame_dialog_owner(o));
            if opposite_owner != Some(activatable) {
                env.queue.post_event(EventRecord::window(
                    EventKind::WindowDeactivated,
                    activatable,
                    opposite,
                ));
            }
        }
    }

    /// Handle one event on the dispatch thread. Returns `true` when the
    /// coordinator took care of it (including redispatching it to the
    /// target's listeners or deliberately discarding it).
    pub fn dispatch_event(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        trace!(event = %event, "focus dispatch");
        let handled = match event.kind() {
            EventKind::FocusGained => self.on_focus_gained(env, event),
            EventKind::FocusLost => self.on_focus_lost(env, event),
            EventKind::WindowActivated | EventKind::WindowDeactivated => {
                self.on_window_activation(env, event)
            }
            EventKind::WindowGainedFocus => self.on_window_gained_focus(env, event),
            EventKind::WindowLostFocus => self.on_window_lost_focus(env, event),
            EventKind::KeyPressed | EventKind::KeyReleased | EventKind::KeyTyped => {
                self.on_key_event(env, event)
            }
            EventKind::Invocation => false,
        };
        debug_assert!(self.is_consistent(env.tree), "focus owner outside focused window");
        handled
    }

    fn on_focus_gained(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        let Some(component) = event.source() else {
            return true;
        };
        let window = env.tree.window_ancestor(component);
        if window.is_none() || window != self.focused_window {
            // Focus cannot run ahead of the window; keep it for when the
            // window gains focus.
            if let Some(w) = window {
                self.most_recent_focus_owners.insert(w, component);
            }
            debug!(%component, "FOCUS_GAINED outside the focused window dropped");
            return true;
        }
        if self.focus_owner == Some(component) {
            return true;
        }
        if let Some(old) = self.focus_owner {
            // Gained without a preceding lost: the old owner loses focus first.
            let mut lost = EventRecord::focus_lost(old, Some(component), event.is_temporary());
            self.on_focus_lost(env, &mut lost);
            if self.focus_owner == Some(old) {
                debug!(%old, %component, "old owner kept focus; FOCUS_GAINED dropped");
                return true;
            }
        }
        if !self.set_global_focus_owner(env.tree, Some(component)) {
            self.restore_focus(env, component);
            return true;
        }
        if !event.is_temporary()
            && !self.set_global_permanent_focus_owner(env.tree, Some(component))
        {
            self.restore_focus(env, component);
            return true;
        }
        if let Some(w) = window {
            self.most_recent_focus_owners.insert(w, component);
        }
        debug!(owner = %component, "focus owner changed");
        env.tree.deliver(event);
        true
    }

    fn on_focus_lost(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        let Some(component) = event.source() else {
            return true;
        };
        if event.opposite() == Some(component) {
            event.consume();
            return true;
        }
        let Some(owner) = self.focus_owner else {
            return true;
        };
        if component != owner {
            if !env.tree.is_ancestor_of(component, owner) {
                trace!(%component, %owner, "stale FOCUS_LOST dropped");
                return true;
            }
            event.retarget(owner);
        }
        self.prev_focus_owner = Some(owner);
        if !self.set_global_focus_owner(env.tree, None) {
            // Owner keeps focus; nothing changed.
            return true;
        }
        if !event.is_temporary() {
            self.set_global_permanent_focus_owner(env.tree, None);
        }
        env.tree.deliver(event);
        true
    }

    // Recovery after a vetoed owner change: previous owner, then the next
    // component after the rejected one, then nothing.
    fn restore_focus(&mut self, env: &mut FocusEnv<'_>, rejected: ComponentId) {
        if let Some(prev) = self.prev_focus_owner
            && prev != rejected
            && self.focus_now(env, prev)
        {
            debug!(%rejected, restored = %prev, "focus restored to previous owner");
            return;
        }
        if let Some(root) = env.tree.focus_cycle_root_ancestor(rejected) {
            let policy = self.policy_for(env.tree, root);
            if let Ok(Some(next)) = policy.component_after(env.tree, root, rejected)
                && next != rejected
                && self.focus_now(env, next)
            {
                debug!(%rejected, restored = %next, "focus moved past rejected component");
                return;
            }
        }
        debug!(%rejected, "focus recovery exhausted");
        self.clear_global_focus_owner(env);
    }

    // Synchronous owner change used by recovery.
    fn focus_now(&mut self, env: &mut FocusEnv<'_>, component: ComponentId) -> bool {
        if !self.accepts_focus(env.tree, component) {
            return false;
        }
        let old = self.focus_owner;
        if old == Some(component) {
            return true;
        }
        if !self.set_global_focus_owner(env.tree, Some(component)) {
            return false;
        }
        self.set_global_permanent_focus_owner(env.tree, Some(component));
        if let Some(old) = old {
            env.tree
                .deliver(&mut EventRecord::focus_lost(old, Some(component), false));
        }
        env.tree
            .deliver(&mut EventRecord::focus_gained(component, old, false));
        true
    }

    fn on_window_activation(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        let Some(source) = event.source() else {
            return true;
        };
        let Some(window) = env.tree.frame_dialog_owner(source) else {
            return true;
        };
        let activated = event.kind() == EventKind::WindowActivated;
        if activated {
            if self.active_window == Some(window) {
                return true;
            }
            // Keep the snapshot taken on deactivation when nothing is active.
            if self.active_window.is_some() {
                self.prev_active_window = self.active_window;
            }
            if !self.set_global_active_window(env.tree, Some(window)) {
                self.restore_activation(env, event.opposite());
                return true;
            }
        } else {
            if self.active_window != Some(window) {
                return true;
            }
            self.prev_active_window = Some(window);
            if !self.set_global_active_window(env.tree, None) {
                return true;
            }
        }
        debug!(%window, activated, "active window changed");
        event.retarget(window);
        env.tree.deliver(event);
        true
    }

    fn restore_activation(&mut self, env: &mut FocusEnv<'_>, opposite: Option<ComponentId>) {
        let candidate = self
            .prev_focused_window
            .filter(|w| {
                self.prev_active_window.is_some()
                    && env.tree.frame_dialog_owner(*w) == self.prev_active_window
            })
            .or(opposite);
        if let Some(window) = candidate
            && env.peer.request_window_focus(window)
        {
            debug!(%window, "activation rejected; refocusing previous window");
            return;
        }
        self.clear_global_focus_owner(env);
    }

    fn on_window_gained_focus(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        let Some(window) = event.source() else {
            return true;
        };
        if !env.tree.is_window(window) {
            return true;
        }
        let owner = env.tree.frame_dialog_owner(window);
        if owner.is_none() || owner != self.active_window {
            debug!(%window, "WINDOW_GAINED_FOCUS ahead of activation dropped");
            return true;
        }
        if event.opposite() == Some(window) || self.focused_window == Some(window) {
            return true;
        }
        if let Some(old) = self.focused_window {
            let mut lost = EventRecord::window(EventKind::WindowLostFocus, old, Some(window));
            self.on_window_lost_focus(env, &mut lost);
        }
        if !self.set_global_focused_window(env.tree, Some(window)) {
            self.restore_window_focus(env);
            return true;
        }
        debug!(%window, "focused window changed");
        env.tree.deliver(event);

        let target = self
            .most_recent_focus_owner(window)
            .filter(|c| {
                env.tree.window_ancestor(*c) == Some(window) && self.accepts_focus(env.tree, *c)
            })
            .or_else(|| {
                self.policy_for(env.tree, window)
                    .initial_component(env.tree, window)
                    .ok()
                    .flatten()
            });
        if let Some(target) = target {
            self.request_focus(env, target, false);
        }
        true
    }

    fn restore_window_focus(&mut self, env: &mut FocusEnv<'_>) {
        if let Some(prev) = self.prev_focused_window
            && env.peer.request_window_focus(prev)
        {
            debug!(window = %prev, "window focus rejected; refocusing previous window");
            return;
        }
        self.clear_global_focus_owner(env);
    }

    fn on_window_lost_focus(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        let Some(window) = event.source() else {
            return true;
        };
        // Focus already sits in the opposite window. This also covers the
        // active frame reported as losing focus to its focused child.
        if event.opposite() == self.focused_window {
            return true;
        }
        let Some(focused) = self.focused_window else {
            return true;
        };
        trace!(%window, %focused, "WINDOW_LOST_FOCUS");
        event.retarget(focused);
        if let Some(owner) = self.focus_owner {
            let mut lost = EventRecord::focus_lost(owner, None, true);
            self.on_focus_lost(env, &mut lost);
        }
        let kept = self.focus_owner;
        self.prev_focused_window = Some(focused);
        if !self.set_global_focused_window(env.tree, None) {
            return true;
        }
        if let Some(owner) = kept {
            // The owner refused to let go, but it cannot outlive its window.
            env.tree
                .deliver(&mut EventRecord::focus_lost(owner, None, true));
        }
        debug!(window = %focused, "focused window cleared");
        env.tree.deliver(event);
        true
    }

    fn on_key_event(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) -> bool {
        let Some(owner) = self.focus_owner else {
            trace!(event = %event, "key event without focus owner dropped");
            return true;
        };
        event.retarget(owner);

        for (_, dispatcher) in self.dispatchers.iter_mut() {
            if dispatcher.dispatch_key_event(event) {
                return true;
            }
        }

        self.process_traversal_key(env, owner, event);
        if env.tree.is_enabled(owner) {
            env.tree.deliver(event);
        }

        for (_, processor) in self.post_processors.iter_mut() {
            if processor.post_process_key_event(event) {
                return true;
            }
        }
        self.process_menu_shortcut(env, event);
        true
    }

    // Traversal keys never reach the owner's listeners: a match consumes
    // the event (and the KEY_TYPED that follows a matching KEY_PRESSED).
    fn process_traversal_key(&mut self, env: &mut FocusEnv<'_>, owner: ComponentId, event: &mut EventRecord) {
        if event.kind() == EventKind::KeyTyped {
            if self.consume_next_key_typed {
                event.consume();
                self.consume_next_key_typed = false;
            }
            return;
        }
        let Some(stroke) = event.key_stroke() else {
            return;
        };
        let allow_down_cycle = env.tree.is_focus_cycle_root(owner);
        let action = env
            .tree
            .traversal_keys(owner)
            .unwrap_or(&self.traversal_keys)
            .action_for(&stroke, allow_down_cycle);
        let pressed = event.kind() == EventKind::KeyPressed;
        let Some(action) = action else {
            if pressed {
                self.consume_next_key_typed = false;
            }
            return;
        };
        event.consume();
        if !pressed {
            return;
        }
        self.consume_next_key_typed = true;
        debug!(%owner, %stroke, ?action, "traversal key");
        match action {
            TraversalAction::Forward => self.focus_next_component(env, owner),
            TraversalAction::Backward => self.focus_previous_component(env, owner),
            TraversalAction::UpCycle => self.up_focus_cycle(env, owner),
            TraversalAction::DownCycle => self.down_focus_cycle(env, owner),
        };
    }

    fn process_menu_shortcut(&mut self, env: &mut FocusEnv<'_>, event: &mut EventRecord) {
        if event.is_consumed() || event.kind() != EventKind::KeyPressed {
            return;
        }
        let Some(frame) = self.active_window else {
            return;
        };
        if env.tree.kind(frame).ok() != Some(ComponentKind::Frame) {
            return;
        }
        let Some(stroke) = event.key_stroke() else {
            return;
        };
        let command = env
            .tree
            .menu_bar(frame)
            .and_then(|bar| bar.command_for(&stroke))
            .map(str::to_string);
        if let Some(command) = command {
            debug!(%frame, %command, "menu shortcut");
            event.consume();
            env.tree.fire_menu_command(frame, &command);
        }
    }

    /// Move focus to the component after `from` in its focus cycle.
    pub fn focus_next_component(&mut self, env: &mut FocusEnv<'_>, from: ComponentId) -> bool {
        self.traverse(env, from, true)
    }

    /// Move focus to the component before `from` in its focus cycle.
    pub fn focus_previous_component(&mut self, env: &mut FocusEnv<'_>, from: ComponentId) -> bool {
        self.traverse(env, from, false)
    }

    fn traverse(&mut self, env: &mut FocusEnv<'_>, from: ComponentId, forward: bool) -> bool {
        let Some(root) = env.tree.focus_cycle_root_ancestor(from) else {
            return false;
        };
        let policy = self.policy_for(env.tree, root);
        let next = if forward {
            policy.component_after(env.tree, root, from)
        } else {
            policy.component_before(env.tree, root, from)
        };
        match next {
            Ok(Some(target)) => self.request_focus(env, target, false),
            Ok(None) => false,
            Err(err) => {
                debug!(%from, %err, "traversal failed");
                false
            }
        }
    }

    /// Leave the focus cycle of `from`: focus its cycle root and make the
    /// root's own cycle root current. At window level the window's default
    /// component is focused instead.
    pub fn up_focus_cycle(&mut self, env: &mut FocusEnv<'_>, from: ComponentId) -> bool {
        let Some(root) = env.tree.focus_cycle_root_ancestor(from) else {
            return false;
        };
        if env.tree.is_window(root) {
            self.set_global_current_focus_cycle_root(env.tree, Some(root));
            let target = self
                .policy_for(env.tree, root)
                .default_component(env.tree, root)
                .ok()
                .flatten();
            return target.is_some_and(|t| self.request_focus(env, t, false));
        }
        let outer = env.tree.focus_cycle_root_ancestor(root).unwrap_or(root);
        self.set_global_current_focus_cycle_root(env.tree, Some(outer));
        self.request_focus(env, root, false)
    }

    /// Enter the focus cycle rooted at `container` at its default component.
    pub fn down_focus_cycle(&mut self, env: &mut FocusEnv<'_>, container: ComponentId) -> bool {
        if !env.tree.is_focus_cycle_root(container) {
            return false;
        }
        self.set_global_current_focus_cycle_root(env.tree, Some(container));
        let target = self
            .policy_for(env.tree, container)
            .default_component(env.tree, container)
            .ok()
            .flatten();
        target.is_some_and(|t| self.request_focus(env, t, false))
    }
}
