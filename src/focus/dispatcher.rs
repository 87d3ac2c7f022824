//! Filter between raw native focus notifications and the coordinator.
//!
//! The platform reports focus in terms of native windows, some of which are
//! hidden proxies used to activate an owner on behalf of a window that
//! cannot be activated itself. Proxy traffic is dropped or rewritten here so
//! the coordinator only ever sees real windows.

use std::fmt;

use tracing::{debug, trace};

use crate::event::{ComponentId, NativeId};
use crate::focus::manager::{FocusCoordinator, FocusEnv};
use crate::tree::ComponentTree;

/// A focus change as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFocusEvent {
    pub source: NativeId,
    pub opposite: Option<NativeId>,
    pub gained: bool,
}

impl NativeFocusEvent {
    pub fn gained(source: NativeId, opposite: Option<NativeId>) -> Self {
        Self {
            source,
            opposite,
            gained: true,
        }
    }

    pub fn lost(source: NativeId, opposite: Option<NativeId>) -> Self {
        Self {
            source,
            opposite,
            gained: false,
        }
    }
}

impl fmt::Display for NativeFocusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.gained { "gained" } else { "lost" };
        match self.opposite {
            Some(o) => write!(f, "native {} {} (opposite {})", self.source, verb, o),
            None => write!(f, "native {} {}", self.source, verb),
        }
    }
}

/// What happened to a native notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Forwarded {
        window: ComponentId,
        opposite: Option<ComponentId>,
        gained: bool,
    },
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownWindow,
    ProxyGained,
    LostToOwnProxy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    Window(ComponentId),
    // Hidden proxy of the given activatable window.
    Proxy(ComponentId),
}

fn resolve(tree: &ComponentTree, native: NativeId) -> Option<Resolved> {
    if let Some(c) = tree.component_for_native(native) {
        return tree.window_ancestor(c).map(Resolved::Window);
    }
    tree.proxy_owner(native).map(Resolved::Proxy)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FocusDispatcher;

impl FocusDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch(
        &self,
        focus: &mut FocusCoordinator,
        env: &mut FocusEnv<'_>,
        event: NativeFocusEvent,
    ) -> Disposition {
        trace!(%event, "native focus");
        let Some(source) = resolve(env.tree, event.source) else {
            debug!(%event, "native focus for unknown window dropped");
            return Disposition::Discarded(DiscardReason::UnknownWindow);
        };
        let opposite = event.opposite.and_then(|o| resolve(env.tree, o));

        let window = match (event.gained, source) {
            (true, Resolved::Proxy(_)) => {
                return Disposition::Discarded(DiscardReason::ProxyGained);
            }
            (false, Resolved::Proxy(owner)) => {
                let opposite_window = match opposite {
                    Some(Resolved::Window(w)) => env.tree.frame_dialog_owner(w),
                    _ => None,
                };
                if opposite_window == Some(owner) {
                    return Disposition::Discarded(DiscardReason::LostToOwnProxy);
                }
                match focus.focused_window() {
                    Some(w) => w,
                    None => return Disposition::Discarded(DiscardReason::UnknownWindow),
                }
            }
            (_, Resolved::Window(w)) => w,
        };
        if !event.gained
            && let Some(Resolved::Proxy(owner)) = opposite
            && env.tree.frame_dialog_owner(window) == Some(owner)
        {
            return Disposition::Discarded(DiscardReason::LostToOwnProxy);
        }

        let opposite = match opposite {
            Some(Resolved::Window(w)) => Some(w),
            Some(Resolved::Proxy(_)) => focus.focused_window(),
            None => None,
        };

        if event.gained && !env.tree.is_activatable(window) && opposite != Some(window) {
            // Activate the owner through its proxy so the platform keeps a
            // real frame or dialog active behind this window.
            if let Some(proxy) = env
                .tree
                .frame_dialog_owner(window)
                .and_then(|owner| env.tree.focus_proxy(owner))
            {
                debug!(%window, %proxy, "activating owner through focus proxy");
                env.peer.request_native_focus(proxy);
            }
        }

        focus.post_window_focus(env, window, opposite, event.gained);
        Disposition::Forwarded {
            window,
            opposite,
            gained: event.gained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::event_queue::EventQueue;
    use crate::peer::{PeerRequest, RecordingPeer};

    struct Setup {
        tree: ComponentTree,
        queue: EventQueue,
        peer: RecordingPeer,
        focus: FocusCoordinator,
        frame: ComponentId,
        popup: ComponentId,
    }

    fn setup() -> Setup {
        let mut tree = ComponentTree::new();
        let frame = tree.add_frame("frame");
        let popup = tree.add_window("popup", frame).unwrap();
        tree.set_native_id(frame, NativeId(1)).unwrap();
        tree.set_native_id(popup, NativeId(2)).unwrap();
        tree.set_focus_proxy(frame, NativeId(100)).unwrap();
        Setup {
            tree,
            queue: EventQueue::new(),
            peer: RecordingPeer::new(),
            focus: FocusCoordinator::default(),
            frame,
            popup,
        }
    }

    fn run(s: &mut Setup, event: NativeFocusEvent) -> Disposition {
        let mut env = FocusEnv {
            tree: &mut s.tree,
            queue: &s.queue,
            peer: &mut s.peer,
        };
        FocusDispatcher::new().dispatch(&mut s.focus, &mut env, event)
    }

    fn posted_kinds(queue: &EventQueue) -> Vec<EventKind> {
        std::iter::from_fn(|| queue.try_next_event())
            .map(|e| e.record().kind())
            .collect()
    }

    #[test]
    fn gained_on_proxy_is_discarded() {
        let mut s = setup();
        let d = run(&mut s, NativeFocusEvent::gained(NativeId(100), Some(NativeId(2))));
        assert_eq!(d, Disposition::Discarded(DiscardReason::ProxyGained));
        assert_eq!(s.queue.pending(), 0);
    }

    #[test]
    fn lost_to_own_proxy_is_discarded() {
        let mut s = setup();
        let d = run(&mut s, NativeFocusEvent::lost(NativeId(1), Some(NativeId(100))));
        assert_eq!(d, Disposition::Discarded(DiscardReason::LostToOwnProxy));
    }

    #[test]
    fn unknown_native_window_is_discarded() {
        let mut s = setup();
        let d = run(&mut s, NativeFocusEvent::gained(NativeId(77), None));
        assert_eq!(d, Disposition::Discarded(DiscardReason::UnknownWindow));
    }

    #[test]
    fn non_activatable_window_activates_owner_through_proxy() {
        let mut s = setup();
        let d = run(&mut s, NativeFocusEvent::gained(NativeId(2), None));
        assert_eq!(
            d,
            Disposition::Forwarded {
                window: s.popup,
                opposite: None,
                gained: true
            }
        );
        assert_eq!(
            s.peer.take_requests(),
            vec![PeerRequest::NativeFocus(NativeId(100))]
        );
        assert_eq!(
            posted_kinds(&s.queue),
            vec![EventKind::WindowActivated, EventKind::WindowGainedFocus]
        );
    }

    #[test]
    fn frame_gain_posts_activation_before_focus() {
        let mut s = setup();
        run(&mut s, NativeFocusEvent::gained(NativeId(1), None));
        assert!(s.peer.requests().is_empty());
        let records: Vec<_> = std::iter::from_fn(|| s.queue.try_next_event())
            .map(|e| e.into_parts().0)
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), EventKind::WindowActivated);
        assert_eq!(records[0].source(), Some(s.frame));
        assert_eq!(records[1].kind(), EventKind::WindowGainedFocus);
    }

    #[test]
    fn loss_posts_focus_before_deactivation() {
        let mut s = setup();
        run(&mut s, NativeFocusEvent::lost(NativeId(1), None));
        assert_eq!(
            posted_kinds(&s.queue),
            vec![EventKind::WindowLostFocus, EventKind::WindowDeactivated]
        );
    }
}
