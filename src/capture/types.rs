//! Event types produced by the capture layer.
//!
//! A [`CapturedEvent`] is built once on the capture thread and never mutated
//! afterwards. Sequence ids are not part of the event: they are allocated by
//! the encoder when the event is turned into output records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Keyboard,
    Pointer,
    Scroll,
    Modifier,
    AppActivation,
    WindowQuery,
}

/// Phase of the event within its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubKind {
    Down,
    Up,
    Move,
    Change,
}

impl SubKind {
    /// Wire label for DOWN/UP style fields. `Move` and `Change` never reach
    /// a DOWN/UP slot in the encoder, but fall back to `UP` if they do.
    pub fn wire_label(self) -> &'static str {
        match self {
            SubKind::Down => "DOWN",
            _ => "UP",
        }
    }
}

/// A single modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Cmd,
    Shift,
    Ctrl,
    Alt,
    Fn,
    CapsLock,
}

impl Modifier {
    /// All modifiers, in the order they appear in a flags field.
    pub const ALL: [Modifier; 6] = [
        Modifier::Cmd,
        Modifier::Shift,
        Modifier::Ctrl,
        Modifier::Alt,
        Modifier::Fn,
        Modifier::CapsLock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Cmd => "CMD",
            Modifier::Shift => "SHIFT",
            Modifier::Ctrl => "CTRL",
            Modifier::Alt => "ALT",
            Modifier::Fn => "FN",
            Modifier::CapsLock => "CAPSLOCK",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Modifier::Cmd => 1 << 0,
            Modifier::Shift => 1 << 1,
            Modifier::Ctrl => 1 << 2,
            Modifier::Alt => 1 << 3,
            Modifier::Fn => 1 << 4,
            Modifier::CapsLock => 1 << 5,
        }
    }
}

/// A set of held modifiers, stored as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierSet(u8);

impl ModifierSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, modifier: Modifier) -> Self {
        self.insert(modifier);
        self
    }

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn contains(&self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Rebuild a set from [`ModifierSet::bits`]. Unknown bits are discarded.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Modifier::ALL.iter().fold(0, |mask, m| mask | m.bit()))
    }

    /// Modifiers held in `self` but not in `previous`.
    pub fn pressed_since(self, previous: ModifierSet) -> ModifierSet {
        Self(self.0 & !previous.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(|m| self.contains(*m))
    }
}

/// `+`-joined modifier names, e.g. `CMD+SHIFT`. Empty when no modifier is held.
impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for modifier in self.iter() {
            if !first {
                f.write_str("+")?;
            }
            f.write_str(modifier.name())?;
            first = false;
        }
        Ok(())
    }
}

/// Kind-specific data that does not fit the numeric `code` field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum EventPayload {
    #[default]
    None,
    /// Characters composed by a key event (possibly empty).
    Characters(String),
    /// Name of the application that became active.
    Application(String),
}

/// An input event as seen by the dispatcher.
///
/// `code` carries the virtual key code for keyboard and modifier events, the
/// button number for pointer buttons (0 = left, 1 = right, 2+ = other) and the
/// line delta for scroll events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub kind: EventKind,
    pub subkind: SubKind,
    pub code: i64,
    pub position: (f64, f64),
    pub modifiers: ModifierSet,
    pub payload: EventPayload,
}

impl CapturedEvent {
    /// A pointer button press or release.
    pub fn pointer_button(subkind: SubKind, button: i64, position: (f64, f64)) -> Self {
        Self {
            kind: EventKind::Pointer,
            subkind,
            code: button,
            position,
            modifiers: ModifierSet::empty(),
            payload: EventPayload::None,
        }
    }

    /// Pointer movement (including drags).
    pub fn pointer_move(position: (f64, f64)) -> Self {
        Self {
            kind: EventKind::Pointer,
            subkind: SubKind::Move,
            code: 0,
            position,
            modifiers: ModifierSet::empty(),
            payload: EventPayload::None,
        }
    }

    /// A scroll wheel event with its vertical line delta.
    pub fn scroll(delta: i64, position: (f64, f64)) -> Self {
        Self {
            kind: EventKind::Scroll,
            subkind: SubKind::Change,
            code: delta,
            position,
            modifiers: ModifierSet::empty(),
            payload: EventPayload::None,
        }
    }

    /// A key press or release with the characters it composed.
    pub fn key(
        subkind: SubKind,
        keycode: i64,
        characters: impl Into<String>,
        position: (f64, f64),
        modifiers: ModifierSet,
    ) -> Self {
        Self {
            kind: EventKind::Keyboard,
            subkind,
            code: keycode,
            position,
            modifiers,
            payload: EventPayload::Characters(characters.into()),
        }
    }

    /// A modifier key changing state. `modifiers` is the set held after the change.
    pub fn modifier_change(keycode: i64, position: (f64, f64), modifiers: ModifierSet) -> Self {
        Self {
            kind: EventKind::Modifier,
            subkind: SubKind::Change,
            code: keycode,
            position,
            modifiers,
            payload: EventPayload::None,
        }
    }

    /// A different application came to the front.
    pub fn app_activation(name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::AppActivation,
            subkind: SubKind::Change,
            code: 0,
            position: (0.0, 0.0),
            modifiers: ModifierSet::empty(),
            payload: EventPayload::Application(name.into()),
        }
    }

    /// The synthetic event fired by the window-query timer.
    pub fn window_query() -> Self {
        Self {
            kind: EventKind::WindowQuery,
            subkind: SubKind::Change,
            code: 0,
            position: (0.0, 0.0),
            modifiers: ModifierSet::empty(),
            payload: EventPayload::None,
        }
    }

    /// Whether this is a pointer button press or release.
    pub fn is_pointer_button(&self) -> bool {
        self.kind == EventKind::Pointer && matches!(self.subkind, SubKind::Down | SubKind::Up)
    }

    /// Whether this is a key press or release.
    pub fn is_key_press(&self) -> bool {
        self.kind == EventKind::Keyboard && matches!(self.subkind, SubKind::Down | SubKind::Up)
    }
}

/// Decision returned to the OS for a captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Let the event reach applications.
    Propagate,
    /// Swallow the event system-wide.
    Suppress,
}

impl Verdict {
    pub fn is_suppress(self) -> bool {
        self == Verdict::Suppress
    }
}

impl From<bool> for Verdict {
    fn from(suppress: bool) -> Self {
        if suppress {
            Verdict::Suppress
        } else {
            Verdict::Propagate
        }
    }
}
