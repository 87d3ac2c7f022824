use std::collections::HashMap;
use std::fmt;

use crossterm::event::{KeyCode, KeyModifiers};

/// Focus traversal operations that a keystroke can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalAction {
    Backward,
    Forward,
    UpCycle,
    /// Only honored when the focus owner is itself a focus cycle root.
    DownCycle,
}

impl TraversalAction {
    /// Lookup order used when resolving a keystroke.
    pub const ALL: [TraversalAction; 4] = [
        TraversalAction::Backward,
        TraversalAction::Forward,
        TraversalAction::UpCycle,
        TraversalAction::DownCycle,
    ];
}

impl fmt::Display for TraversalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraversalAction::Backward => "Focus previous component",
            TraversalAction::Forward => "Focus next component",
            TraversalAction::UpCycle => "Focus up one cycle",
            TraversalAction::DownCycle => "Focus down into cycle",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub code: KeyCode,
    pub mods: KeyModifiers,
    pub on_release: bool,
}

impl KeyStroke {
    pub fn pressed(code: KeyCode, mods: KeyModifiers) -> Self {
        Self {
            code,
            mods,
            on_release: false,
        }
    }

    pub fn released(code: KeyCode, mods: KeyModifiers) -> Self {
        Self {
            code,
            mods,
            on_release: true,
        }
    }

    /// Same key and modifiers, opposite press/release phase.
    pub fn opposite(&self) -> Self {
        Self {
            on_release: !self.on_release,
            ..*self
        }
    }

    pub fn display(&self) -> String {
        let mut parts = Vec::new();
        if self.mods.contains(KeyModifiers::CONTROL) {
            parts.push("Ctrl".to_string());
        }
        if self.mods.contains(KeyModifiers::SHIFT) {
            parts.push("Shift".to_string());
        }
        if self.mods.contains(KeyModifiers::ALT) {
            parts.push("Alt".to_string());
        }
        let code = match self.code {
            KeyCode::Char(c) => c.to_ascii_uppercase().to_string(),
            KeyCode::Esc => "Esc".to_string(),
            KeyCode::Enter => "Enter".to_string(),
            KeyCode::Tab => "Tab".to_string(),
            KeyCode::BackTab => "BackTab".to_string(),
            KeyCode::Up => "Up".to_string(),
            KeyCode::Down => "Down".to_string(),
            KeyCode::F(n) => format!("F{}", n),
            _ => format!("{:?}", self.code),
        };
        parts.push(code);
        let mut s = parts.join("+");
        if self.on_release {
            s.push_str(" (release)");
        }
        s
    }
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Keystroke sets per traversal action.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalKeys {
    map: HashMap<TraversalAction, Vec<KeyStroke>>,
}

impl TraversalKeys {
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn add(&mut self, action: TraversalAction, stroke: KeyStroke) {
        let list = self.map.entry(action).or_default();
        if !list.contains(&stroke) {
            list.push(stroke);
        }
    }

    pub fn set(&mut self, action: TraversalAction, strokes: Vec<KeyStroke>) {
        self.map.insert(action, strokes);
    }

    pub fn keys_for(&self, action: TraversalAction) -> &[KeyStroke] {
        self.map.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve `stroke` against the sets. A set entry matches both phases of
    /// the same key so the release of a traversal key is swallowed too.
    /// `DownCycle` is only considered when `allow_down_cycle` is set.
    pub fn action_for(&self, stroke: &KeyStroke, allow_down_cycle: bool) -> Option<TraversalAction> {
        let opposite = stroke.opposite();
        TraversalAction::ALL.into_iter().find(|action| {
            if *action == TraversalAction::DownCycle && !allow_down_cycle {
                return false;
            }
            self.keys_for(*action)
                .iter()
                .any(|k| *k == *stroke || *k == opposite)
        })
    }

    /// Display strings for the keys mapped to `action`.
    pub fn combos_for(&self, action: TraversalAction) -> Vec<String> {
        self.keys_for(action).iter().map(|k| k.display()).collect()
    }
}

impl Default for TraversalKeys {
    fn default() -> Self {
        use TraversalAction::*;
        let mut keys = Self::empty();
        keys.add(Forward, KeyStroke::pressed(KeyCode::Tab, KeyModifiers::NONE));
        keys.add(
            Forward,
            KeyStroke::pressed(KeyCode::Tab, KeyModifiers::CONTROL),
        );
        keys.add(
            Backward,
            KeyStroke::pressed(KeyCode::BackTab, KeyModifiers::NONE),
        );
        keys.add(
            Backward,
            KeyStroke::pressed(KeyCode::BackTab, KeyModifiers::CONTROL),
        );
        // Up and down cycle traversal have no default keys.
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tab_in_both_phases() {
        let keys = TraversalKeys::default();
        let press = KeyStroke::pressed(KeyCode::Tab, KeyModifiers::NONE);
        assert_eq!(
            keys.action_for(&press, false),
            Some(TraversalAction::Forward)
        );
        assert_eq!(
            keys.action_for(&press.opposite(), false),
            Some(TraversalAction::Forward)
        );
        let back = KeyStroke::pressed(KeyCode::BackTab, KeyModifiers::CONTROL);
        assert_eq!(
            keys.action_for(&back, false),
            Some(TraversalAction::Backward)
        );
        let other = KeyStroke::pressed(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(keys.action_for(&other, true), None);
    }

    #[test]
    fn down_cycle_requires_permission() {
        let mut keys = TraversalKeys::empty();
        let f2 = KeyStroke::pressed(KeyCode::F(2), KeyModifiers::NONE);
        keys.add(TraversalAction::DownCycle, f2);
        assert_eq!(keys.action_for(&f2, false), None);
        assert_eq!(keys.action_for(&f2, true), Some(TraversalAction::DownCycle));
        assert_eq!(keys.combos_for(TraversalAction::DownCycle), vec!["F2"]);
    }
}
