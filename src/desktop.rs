//! One component hierarchy with its event queue and focus coordinator.
//!
//! [`Desktop`] is a cheap-to-clone handle. Every operation takes the desktop
//! lock once, so calls from any thread are serialized with event dispatch.
//! Listeners registered on the tree or the coordinator run with that lock
//! held and must not call back into the desktop; schedule follow-up work
//! with [`EventQueue::invoke_later`] instead.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::FocusConfig;
use crate::event::{ComponentId, EventRecord};
use crate::event_loop::{DispatchThread, EventSink, pump_pending};
use crate::event_queue::EventQueue;
use crate::focus::dispatcher::{Disposition, FocusDispatcher, NativeFocusEvent};
use crate::focus::manager::{
    FocusCoordinator, FocusEnv, HandlerId, KeyEventDispatcher, KeyEventPostProcessor,
    PropertyChangeListener, VetoableChangeListener,
};
use crate::peer::FocusPeer;
use crate::tree::ComponentTree;

struct DesktopCore {
    tree: ComponentTree,
    focus: FocusCoordinator,
    peer: Box<dyn FocusPeer>,
    dispatcher: FocusDispatcher,
}

impl DesktopCore {
    fn split<'a>(&'a mut self, queue: &'a EventQueue) -> (&'a mut FocusCoordinator, FocusEnv<'a>) {
        let DesktopCore {
            tree, focus, peer, ..
        } = self;
        (
            focus,
            FocusEnv {
                tree,
                queue,
                peer: peer.as_mut(),
            },
        )
    }
}

#[derive(Clone)]
pub struct Desktop {
    queue: EventQueue,
    core: Arc<Mutex<DesktopCore>>,
    config: Arc<FocusConfig>,
}

impl Desktop {
    pub fn new<P: FocusPeer + 'static>(tree: ComponentTree, peer: P) -> Self {
        Self::with_config(tree, peer, FocusConfig::default())
    }

    pub fn with_config<P: FocusPeer + 'static>(tree: ComponentTree, peer: P, config: FocusConfig) -> Self {
        let focus = FocusCoordinator::new(config.default_policy(), config.traversal_keys.clone());
        Self {
            queue: EventQueue::new(),
            core: Arc::new(Mutex::new(DesktopCore {
                tree,
                focus,
                peer: Box::new(peer),
                dispatcher: FocusDispatcher::new(),
            })),
            config: Arc::new(config),
        }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn post_event(&self, event: EventRecord) {
        self.queue.post_event(event);
    }

    /// Event sink that routes queued events into this desktop's coordinator.
    pub fn sink(&self) -> DesktopSink {
        DesktopSink {
            queue: self.queue.clone(),
            core: self.core.clone(),
        }
    }

    /// Dispatch everything pending on the calling thread.
    pub fn pump(&self) -> usize {
        pump_pending(&self.queue, &mut self.sink())
    }

    pub fn start_dispatch_thread(&self) -> io::Result<DispatchThread> {
        DispatchThread::spawn(
            self.queue.clone(),
            self.sink(),
            &self.config.dispatch_thread_name,
        )
    }

    /// Close the queue. Pending events are dropped and blocked callers
    /// are released.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn with_tree<R>(&self, f: impl FnOnce(&mut ComponentTree) -> R) -> R {
        f(&mut self.core.lock().tree)
    }

    pub fn with_focus<R>(&self, f: impl FnOnce(&mut FocusCoordinator, &ComponentTree) -> R) -> R {
        let mut core = self.core.lock();
        let DesktopCore { tree, focus, .. } = &mut *core;
        f(focus, tree)
    }

    fn with_env<R>(&self, f: impl FnOnce(&mut FocusCoordinator, &mut FocusEnv<'_>) -> R) -> R {
        let mut core = self.core.lock();
        let (focus, mut env) = core.split(&self.queue);
        f(focus, &mut env)
    }

    pub fn focus_owner(&self) -> Option<ComponentId> {
        self.core.lock().focus.focus_owner()
    }

    pub fn permanent_focus_owner(&self) -> Option<ComponentId> {
        self.core.lock().focus.permanent_focus_owner()
    }

    pub fn focused_window(&self) -> Option<ComponentId> {
        self.core.lock().focus.focused_window()
    }

    pub fn active_window(&self) -> Option<ComponentId> {
        self.core.lock().focus.active_window()
    }

    pub fn current_focus_cycle_root(&self) -> Option<ComponentId> {
        self.core.lock().focus.current_focus_cycle_root()
    }

    pub fn is_consistent(&self) -> bool {
        let core = self.core.lock();
        core.focus.is_consistent(&core.tree)
    }

    pub fn request_focus(&self, component: ComponentId) -> bool {
        self.with_env(|focus, env| focus.request_focus(env, component, false))
    }

    pub fn request_focus_temporary(&self, component: ComponentId) -> bool {
        self.with_env(|focus, env| focus.request_focus(env, component, true))
    }

    pub fn request_focus_in_window(&self, window: ComponentId) -> bool {
        self.with_env(|focus, env| focus.request_focus_in_window(env, window, false))
    }

    pub fn clear_global_focus_owner(&self) {
        self.with_env(|focus, env| focus.clear_global_focus_owner(env));
    }

    pub fn focus_next_component(&self, from: ComponentId) -> bool {
        self.with_env(|focus, env| focus.focus_next_component(env, from))
    }

    pub fn focus_previous_component(&self, from: ComponentId) -> bool {
        self.with_env(|focus, env| focus.focus_previous_component(env, from))
    }

    pub fn up_focus_cycle(&self, from: ComponentId) -> bool {
        self.with_env(|focus, env| focus.up_focus_cycle(env, from))
    }

    pub fn down_focus_cycle(&self, container: ComponentId) -> bool {
        self.with_env(|focus, env| focus.down_focus_cycle(env, container))
    }

    pub fn set_global_focus_owner(&self, owner: Option<ComponentId>) -> bool {
        self.with_focus(|focus, tree| focus.set_global_focus_owner(tree, owner))
    }

    pub fn set_global_permanent_focus_owner(&self, owner: Option<ComponentId>) -> bool {
        self.with_focus(|focus, tree| focus.set_global_permanent_focus_owner(tree, owner))
    }

    pub fn set_global_focused_window(&self, window: Option<ComponentId>) -> bool {
        self.with_focus(|focus, tree| focus.set_global_focused_window(tree, window))
    }

    pub fn set_global_active_window(&self, window: Option<ComponentId>) -> bool {
        self.with_focus(|focus, tree| focus.set_global_active_window(tree, window))
    }

    pub fn set_global_current_focus_cycle_root(&self, root: Option<ComponentId>) -> bool {
        self.with_focus(|focus, tree| focus.set_global_current_focus_cycle_root(tree, root))
    }

    pub fn add_vetoable_change_listener<L>(&self, listener: L) -> HandlerId
    where
        L: VetoableChangeListener + 'static,
    {
        self.core.lock().focus.add_vetoable_change_listener(listener)
    }

    pub fn add_property_change_listener<L>(&self, listener: L) -> HandlerId
    where
        L: PropertyChangeListener + 'static,
    {
        self.core.lock().focus.add_property_change_listener(listener)
    }

    pub fn add_key_event_dispatcher<D>(&self, dispatcher: D) -> HandlerId
    where
        D: KeyEventDispatcher + 'static,
    {
        self.core.lock().focus.add_key_event_dispatcher(dispatcher)
    }

    pub fn add_key_event_post_processor<P>(&self, processor: P) -> HandlerId
    where
        P: KeyEventPostProcessor + 'static,
    {
        self.core.lock().focus.add_key_event_post_processor(processor)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.core.lock().focus.remove_handler(id)
    }

    /// Feed a native focus notification through the proxy filter into the
    /// coordinator. Resulting window events are posted to the queue.
    pub fn native_focus(&self, event: NativeFocusEvent) -> Disposition {
        let mut core = self.core.lock();
        let dispatcher = core.dispatcher;
        let (focus, mut env) = core.split(&self.queue);
        let disposition = dispatcher.dispatch(focus, &mut env, event);
        debug!(%event, ?disposition, "native focus handled");
        disposition
    }
}

/// [`EventSink`] feeding a [`Desktop`]'s coordinator.
#[derive(Clone)]
pub struct DesktopSink {
    queue: EventQueue,
    core: Arc<Mutex<DesktopCore>>,
}

impl EventSink for DesktopSink {
    fn dispatch_event(&mut self, event: &mut EventRecord) {
        let mut core = self.core.lock();
        let (focus, mut env) = core.split(&self.queue);
        focus.dispatch_event(&mut env, event);
    }
}
