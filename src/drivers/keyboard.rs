//! Terminal keys to key events.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::event::{ComponentId, EventRecord};

/// Smooths over platform differences in crossterm key reporting: Shift+Tab
/// always arrives as `BackTab`, repeats are dropped, and release events are
/// kept only when the terminal reports them reliably.
#[derive(Debug, Default)]
pub struct KeyboardNormalizer {
    esc_down: bool,
    keep_releases: bool,
}

impl KeyboardNormalizer {
    pub fn new() -> Self {
        Self {
            esc_down: false,
            keep_releases: cfg!(windows),
        }
    }

    pub fn with_releases(mut self, keep: bool) -> Self {
        self.keep_releases = keep;
        self
    }

    pub fn normalize(&mut self, evt: Event) -> Option<Event> {
        match evt {
            Event::Key(mut key) => {
                if key.code == KeyCode::Tab && key.modifiers.contains(KeyModifiers::SHIFT) {
                    key.code = KeyCode::BackTab;
                    key.modifiers.remove(KeyModifiers::SHIFT);
                }
                match key.kind {
                    KeyEventKind::Repeat => return None,
                    KeyEventKind::Release => {
                        if key.code == KeyCode::Esc {
                            self.esc_down = false;
                        }
                        if !self.keep_releases {
                            return None;
                        }
                    }
                    KeyEventKind::Press => {
                        // Windows consoles repeat Esc presses while held.
                        if cfg!(windows) && key.code == KeyCode::Esc {
                            if self.esc_down {
                                return None;
                            }
                            self.esc_down = true;
                        } else {
                            self.esc_down = false;
                        }
                    }
                }
                Some(Event::Key(key))
            }
            other => Some(other),
        }
    }
}

/// Character a key press types, if any.
pub fn typed_char(key: &KeyEvent) -> Option<char> {
    if key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
    {
        return None;
    }
    match key.code {
        KeyCode::Char(c) => Some(c),
        KeyCode::Enter => Some('\n'),
        KeyCode::Tab | KeyCode::BackTab => Some('\t'),
        _ => None,
    }
}

/// Events posted for one terminal key. A press yields KEY_PRESSED and, when
/// it types a character, KEY_TYPED. The coordinator retargets them to the
/// focus owner, so `target` only needs to be somewhere in the hierarchy.
pub fn key_events(target: ComponentId, key: &KeyEvent) -> Vec<EventRecord> {
    match key.kind {
        KeyEventKind::Press | KeyEventKind::Repeat => {
            let mut out = vec![EventRecord::key_pressed(target, key.code, key.modifiers)];
            if let Some(ch) = typed_char(key) {
                out.push(EventRecord::key_typed(target, ch, key.modifiers));
            }
            out
        }
        KeyEventKind::Release => vec![EventRecord::key_released(target, key.code, key.modifiers)],
    }
}
