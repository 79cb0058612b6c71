//! Line encoding for captured events.
//!
//! Every line carries a sequence id drawn from a [`SequenceCounter`], so the
//! host can answer a decision request by echoing the id of the line it is
//! responding to. The encoder lives behind the [`Emitter`](crate::sink::Emitter)
//! lock; ids are only in order on the wire if lines are written under it.

use crate::capture::keys::{modifier_for_keycode, special_key_name};
use crate::capture::types::{CapturedEvent, EventKind, EventPayload, SubKind};
use crate::metadata::WindowInfo;
use crate::capture::types::ModifierSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Process-wide monotonic sequence id source. The first id handed out is 1.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently allocated id (0 before any allocation).
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

/// One output line and the id it was stamped with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    pub seq: u64,
    pub line: String,
}

/// Which `WINDOW_INFO` variant to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowScope {
    Active,
    All,
}

impl WindowScope {
    fn label(self) -> &'static str {
        match self {
            WindowScope::Active => "ACTIVE",
            WindowScope::All => "ALL",
        }
    }
}

/// Turns events into wire records.
#[derive(Debug)]
pub struct Encoder {
    counter: Arc<SequenceCounter>,
    /// Modifier flags seen on the previous modifier event
    last_modifiers: AtomicU8,
}

impl Encoder {
    pub fn new(counter: Arc<SequenceCounter>) -> Self {
        Self {
            counter,
            last_modifiers: AtomicU8::new(0),
        }
    }

    pub fn counter(&self) -> &Arc<SequenceCounter> {
        &self.counter
    }

    /// Encode an input event into one or more records.
    ///
    /// Window-query events produce nothing here; their lines come from
    /// [`Encoder::encode_windows`] once the metadata has been read.
    pub fn encode(&self, event: &CapturedEvent) -> Vec<EncodedRecord> {
        let (x, y) = event.position;
        let flags = event.modifiers;
        let mut records = Vec::new();

        match event.kind {
            EventKind::Pointer => match event.subkind {
                SubKind::Down | SubKind::Up => records.push(self.stamp(|seq| {
                    format!(
                        "MOUSE,{},{},{x},{y},{seq}",
                        event.subkind.wire_label(),
                        event.code
                    )
                })),
                SubKind::Move | SubKind::Change => {
                    records.push(self.stamp(|seq| format!("MOUSE,MOVE,{x},{y},{seq}")))
                }
            },
            EventKind::Scroll => records.push(self.stamp(|seq| {
                format!("MOUSE,SCROLL,{},{x},{y},{seq}", event.code)
            })),
            EventKind::Keyboard => {
                let action = event.subkind.wire_label();
                records.push(self.stamp(|seq| {
                    format!("KEYBOARD,{action},{},{x},{y},{seq},{flags}", event.code)
                }));

                if let Some(name) = special_key_name(event.code) {
                    records.push(self.stamp(|seq| {
                        format!("SPECIAL_KEY,{action},{name},{x},{y},{seq},{flags}")
                    }));
                } else if let EventPayload::Characters(chars) = &event.payload {
                    for ch in chars.chars().filter_map(character_field) {
                        records.push(self.stamp(|seq| {
                            format!("CHARACTER,{action},{ch},{x},{y},{seq},{flags}")
                        }));
                    }
                }
            }
            EventKind::Modifier => {
                let previous = ModifierSet::from_bits(
                    self.last_modifiers.swap(flags.bits(), Ordering::SeqCst),
                );
                let (name, held) = match modifier_for_keycode(event.code) {
                    Some(modifier) => (modifier.name().to_string(), flags.contains(modifier)),
                    // Unnamed modifier key: pressed if it added a flag.
                    None => (
                        event.code.to_string(),
                        !flags.pressed_since(previous).is_empty(),
                    ),
                };
                let action = if held { SubKind::Down } else { SubKind::Up }.wire_label();
                records.push(self.stamp(|seq| {
                    format!("MODIFIER,{name},{action},{x},{y},{seq},{flags}")
                }));
            }
            EventKind::AppActivation => {
                let name = match &event.payload {
                    EventPayload::Application(name) => name.replace([',', '\n', '\r'], " "),
                    _ => crate::metadata::UNKNOWN_NAME.to_string(),
                };
                records.push(self.stamp(|seq| format!("APPLICATION,{name},{seq}")));
            }
            EventKind::WindowQuery => {}
        }

        records
    }

    /// Encode a `WINDOW_INFO,ACTIVE` line. A missing active window is `null`.
    pub fn encode_active_window(&self, window: Option<&WindowInfo>) -> EncodedRecord {
        let json = serde_json::to_string(&window).unwrap_or_else(|_| "null".to_string());
        self.window_record(WindowScope::Active, &json)
    }

    /// Encode a `WINDOW_INFO,ALL` line.
    pub fn encode_windows(&self, windows: &[WindowInfo]) -> EncodedRecord {
        let json = serde_json::to_string(windows).unwrap_or_else(|_| "[]".to_string());
        self.window_record(WindowScope::All, &json)
    }

    fn window_record(&self, scope: WindowScope, json: &str) -> EncodedRecord {
        self.stamp(|seq| format!("WINDOW_INFO,{},{json},{seq}", scope.label()))
    }

    fn stamp(&self, format_line: impl FnOnce(u64) -> String) -> EncodedRecord {
        let seq = self.counter.next();
        EncodedRecord {
            seq,
            line: format_line(seq),
        }
    }
}

/// Field text for a composed character, or `None` if it should not be emitted.
fn character_field(ch: char) -> Option<String> {
    match ch {
        ',' => Some("COMMA".to_string()),
        c if c.is_control() => None,
        c => Some(c.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::{Modifier, ModifierSet};

    fn encoder() -> Encoder {
        Encoder::new(Arc::new(SequenceCounter::new()))
    }

    fn lines(records: &[EncodedRecord]) -> Vec<&str> {
        records.iter().map(|r| r.line.as_str()).collect()
    }

    #[test]
    fn test_pointer_lines() {
        let enc = encoder();
        let down = enc.encode(&CapturedEvent::pointer_button(SubKind::Down, 0, (10.0, 20.5)));
        let moved = enc.encode(&CapturedEvent::pointer_move((11.0, 21.0)));
        let scroll = enc.encode(&CapturedEvent::scroll(-3, (11.0, 21.0)));

        assert_eq!(lines(&down), vec!["MOUSE,DOWN,0,10,20.5,1"]);
        assert_eq!(lines(&moved), vec!["MOUSE,MOVE,11,21,2"]);
        assert_eq!(lines(&scroll), vec!["MOUSE,SCROLL,-3,11,21,3"]);
    }

    #[test]
    fn test_key_with_characters_emits_one_line_per_character() {
        let enc = encoder();
        let mods = ModifierSet::empty().with(Modifier::Shift);
        let records = enc.encode(&CapturedEvent::key(SubKind::Down, 0, "Aé", (0.0, 0.0), mods));

        assert_eq!(
            lines(&records),
            vec![
                "KEYBOARD,DOWN,0,0,0,1,SHIFT",
                "CHARACTER,DOWN,A,0,0,2,SHIFT",
                "CHARACTER,DOWN,é,0,0,3,SHIFT",
            ]
        );
    }

    #[test]
    fn test_special_key_and_escaped_characters() {
        let enc = encoder();
        let ret = enc.encode(&CapturedEvent::key(
            SubKind::Up,
            36,
            "\r",
            (1.0, 1.0),
            ModifierSet::empty(),
        ));
        assert_eq!(
            lines(&ret),
            vec!["KEYBOARD,UP,36,1,1,1,", "SPECIAL_KEY,UP,RETURN,1,1,2,"]
        );

        let comma = enc.encode(&CapturedEvent::key(
            SubKind::Down,
            43,
            ",",
            (1.0, 1.0),
            ModifierSet::empty(),
        ));
        assert_eq!(comma[1].line, "CHARACTER,DOWN,COMMA,1,1,4,");
    }

    #[test]
    fn test_modifier_direction_follows_held_flags() {
        let enc = encoder();
        let held = ModifierSet::empty().with(Modifier::Cmd);
        let down = enc.encode(&CapturedEvent::modifier_change(55, (0.0, 0.0), held));
        let up = enc.encode(&CapturedEvent::modifier_change(55, (0.0, 0.0), ModifierSet::empty()));

        assert_eq!(down[0].line, "MODIFIER,CMD,DOWN,0,0,1,CMD");
        assert_eq!(up[0].line, "MODIFIER,CMD,UP,0,0,2,");
    }

    #[test]
    fn test_unnamed_modifier_direction_follows_flag_change() {
        let enc = encoder();
        let fn_held = ModifierSet::empty().with(Modifier::Fn);
        let down = enc.encode(&CapturedEvent::modifier_change(200, (0.0, 0.0), fn_held));
        let up = enc.encode(&CapturedEvent::modifier_change(200, (0.0, 0.0), ModifierSet::empty()));

        assert_eq!(down[0].line, "MODIFIER,200,DOWN,0,0,1,FN");
        assert_eq!(up[0].line, "MODIFIER,200,UP,0,0,2,");
    }

    #[test]
    fn test_application_and_window_lines() {
        let enc = encoder();
        let app = enc.encode(&CapturedEvent::app_activation("Mail, Inc"));
        assert_eq!(app[0].line, "APPLICATION,Mail  Inc,1");

        let active = enc.encode_active_window(None);
        assert_eq!(active.line, "WINDOW_INFO,ACTIVE,null,2");

        let all = enc.encode_windows(&[WindowInfo::default()]);
        assert!(all.line.starts_with("WINDOW_INFO,ALL,[{\"ownerName\":\"Unknown\""));
        assert!(all.line.ends_with(",3"));
    }

    #[test]
    fn test_sequence_ids_strictly_increase() {
        let enc = encoder();
        let mut last = 0;
        for _ in 0..50 {
            for record in enc.encode(&CapturedEvent::pointer_move((0.0, 0.0))) {
                assert!(record.seq > last);
                last = record.seq;
            }
        }
        assert_eq!(enc.counter().last(), 50);
    }

    #[test]
    fn test_window_query_encodes_nothing() {
        let enc = encoder();
        assert!(enc.encode(&CapturedEvent::window_query()).is_empty());
        assert_eq!(enc.counter().last(), 0);
    }
}
