//! Event records flowing through the queue and the focus coordinator.

use std::fmt;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyModifiers};

use crate::focus::keys::KeyStroke;

/// Identity of a node in the [`ComponentTree`](crate::tree::ComponentTree).
/// Windows, frames and dialogs are components too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw identifier the native windowing layer uses for a window or a hidden
/// focus proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(pub u64);

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native:{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FocusGained,
    FocusLost,
    WindowActivated,
    WindowDeactivated,
    WindowGainedFocus,
    WindowLostFocus,
    KeyPressed,
    KeyReleased,
    KeyTyped,
    /// Carries a task for the dispatch thread; see
    /// [`EventQueue::invoke_later`](crate::event_queue::EventQueue::invoke_later).
    Invocation,
}

impl EventKind {
    pub fn is_focus(self) -> bool {
        matches!(self, EventKind::FocusGained | EventKind::FocusLost)
    }

    pub fn is_window(self) -> bool {
        matches!(
            self,
            EventKind::WindowActivated
                | EventKind::WindowDeactivated
                | EventKind::WindowGainedFocus
                | EventKind::WindowLostFocus
        )
    }

    pub fn is_key(self) -> bool {
        matches!(
            self,
            EventKind::KeyPressed | EventKind::KeyReleased | EventKind::KeyTyped
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::FocusGained => "FOCUS_GAINED",
            EventKind::FocusLost => "FOCUS_LOST",
            EventKind::WindowActivated => "WINDOW_ACTIVATED",
            EventKind::WindowDeactivated => "WINDOW_DEACTIVATED",
            EventKind::WindowGainedFocus => "WINDOW_GAINED_FOCUS",
            EventKind::WindowLostFocus => "WINDOW_LOST_FOCUS",
            EventKind::KeyPressed => "KEY_PRESSED",
            EventKind::KeyReleased => "KEY_RELEASED",
            EventKind::KeyTyped => "KEY_TYPED",
            EventKind::Invocation => "INVOCATION",
        };
        write!(f, "{}", s)
    }
}

/// Key payload. Pressed/released events carry a `code`; typed events only
/// carry the produced character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyData {
    pub code: Option<KeyCode>,
    pub ch: Option<char>,
}

/// A focus, window, key or invocation event.
///
/// Records are plain data once built. The only mutations allowed after
/// construction are [`consume`](Self::consume), retargeting by the focus
/// coordinator, and the queue marking the record as posted.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    kind: EventKind,
    source: Option<ComponentId>,
    opposite: Option<ComponentId>,
    temporary: bool,
    when: Instant,
    modifiers: KeyModifiers,
    key: Option<KeyData>,
    consumed: bool,
    posted: bool,
}

impl EventRecord {
    fn new(kind: EventKind, source: Option<ComponentId>) -> Self {
        Self {
            kind,
            source,
            opposite: None,
            temporary: false,
            when: Instant::now(),
            modifiers: KeyModifiers::NONE,
            key: None,
            consumed: false,
            posted: false,
        }
    }

    pub fn focus_gained(
        source: ComponentId,
        opposite: Option<ComponentId>,
        temporary: bool,
    ) -> Self {
        Self {
            opposite,
            temporary,
            ..Self::new(EventKind::FocusGained, Some(source))
        }
    }

    pub fn focus_lost(source: ComponentId, opposite: Option<ComponentId>, temporary: bool) -> Self {
        Self {
            opposite,
            temporary,
            ..Self::new(EventKind::FocusLost, Some(source))
        }
    }

    /// Builds a window event. `kind` must satisfy [`EventKind::is_window`].
    pub fn window(kind: EventKind, window: ComponentId, opposite: Option<ComponentId>) -> Self {
        debug_assert!(kind.is_window(), "{kind} is not a window event");
        Self {
            opposite,
            ..Self::new(kind, Some(window))
        }
    }

    pub fn key_pressed(source: ComponentId, code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self::key_event(EventKind::KeyPressed, source, code, modifiers)
    }

    pub fn key_released(source: ComponentId, code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self::key_event(EventKind::KeyReleased, source, code, modifiers)
    }

    fn key_event(
        kind: EventKind,
        source: ComponentId,
        code: KeyCode,
        modifiers: KeyModifiers,
    ) -> Self {
        let ch = match code {
            KeyCode::Char(c) => Some(c),
            _ => None,
        };
        Self {
            modifiers,
            key: Some(KeyData {
                code: Some(code),
                ch,
            }),
            ..Self::new(kind, Some(source))
        }
    }

    pub fn key_typed(source: ComponentId, ch: char, modifiers: KeyModifiers) -> Self {
        Self {
            modifiers,
            key: Some(KeyData {
                code: None,
                ch: Some(ch),
            }),
            ..Self::new(EventKind::KeyTyped, Some(source))
        }
    }

    pub(crate) fn invocation() -> Self {
        Self::new(EventKind::Invocation, None)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn source(&self) -> Option<ComponentId> {
        self.source
    }

    pub fn opposite(&self) -> Option<ComponentId> {
        self.opposite
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn when(&self) -> Instant {
        self.when
    }

    pub fn modifiers(&self) -> KeyModifiers {
        self.modifiers
    }

    pub fn key(&self) -> Option<KeyData> {
        self.key
    }

    pub fn consume(&mut self) {
        self.consumed = true;
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    pub fn is_posted(&self) -> bool {
        self.posted
    }

    pub(crate) fn mark_posted(&mut self) {
        self.posted = true;
    }

    pub(crate) fn retarget(&mut self, source: ComponentId) {
        self.source = Some(source);
    }

    /// Keystroke for pressed/released key events. Typed events have no key
    /// code and therefore no keystroke.
    pub fn key_stroke(&self) -> Option<KeyStroke> {
        let code = self.key?.code?;
        match self.kind {
            EventKind::KeyPressed => Some(KeyStroke::pressed(code, self.modifiers)),
            EventKind::KeyReleased => Some(KeyStroke::released(code, self.modifiers)),
            _ => None,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(source) = self.source {
            write!(f, " src={source}")?;
        }
        if let Some(opposite) = self.opposite {
            write!(f, " opp={opposite}")?;
        }
        if self.temporary {
            write!(f, " temporary")?;
        }
        if self.consumed {
            write!(f, " consumed")?;
        }
        Ok(())
    }
}
