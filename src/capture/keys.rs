//! Virtual key code tables (macOS `kVK_*` values).

use super::types::Modifier;

/// Name of a non-printing key, if `keycode` is one.
pub fn special_key_name(keycode: i64) -> Option<&'static str> {
    let name = match keycode {
        36 => "RETURN",
        48 => "TAB",
        49 => "SPACE",
        51 => "DELETE",
        53 => "ESCAPE",
        76 => "ENTER",
        114 => "HELP",
        115 => "HOME",
        116 => "PAGE_UP",
        117 => "FORWARD_DELETE",
        119 => "END",
        121 => "PAGE_DOWN",
        123 => "LEFT",
        124 => "RIGHT",
        125 => "DOWN",
        126 => "UP",
        122 => "F1",
        120 => "F2",
        99 => "F3",
        118 => "F4",
        96 => "F5",
        97 => "F6",
        98 => "F7",
        100 => "F8",
        101 => "F9",
        109 => "F10",
        103 => "F11",
        111 => "F12",
        105 => "F13",
        107 => "F14",
        113 => "F15",
        106 => "F16",
        64 => "F17",
        79 => "F18",
        80 => "F19",
        90 => "F20",
        72 => "VOLUME_UP",
        73 => "VOLUME_DOWN",
        74 => "MUTE",
        _ => return None,
    };
    Some(name)
}

/// Modifier driven by a modifier key code (left and right variants alike).
pub fn modifier_for_keycode(keycode: i64) -> Option<Modifier> {
    match keycode {
        54 | 55 => Some(Modifier::Cmd),
        56 | 60 => Some(Modifier::Shift),
        57 => Some(Modifier::CapsLock),
        58 | 61 => Some(Modifier::Alt),
        59 | 62 => Some(Modifier::Ctrl),
        63 => Some(Modifier::Fn),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_keys() {
        assert_eq!(special_key_name(36), Some("RETURN"));
        assert_eq!(special_key_name(126), Some("UP"));
        assert_eq!(special_key_name(0), None); // 'a'
    }

    #[test]
    fn test_modifier_keycodes() {
        assert_eq!(modifier_for_keycode(55), Some(Modifier::Cmd));
        assert_eq!(modifier_for_keycode(60), Some(Modifier::Shift));
        assert_eq!(modifier_for_keycode(12), None);
    }
}
