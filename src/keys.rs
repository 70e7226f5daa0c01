//! X11 keysym constants and the named key-alias table used by
//! [`crate::facade::VncClient::key_press`] and friends.

/// Sequence of keysyms a single key name decodes to: almost always one
/// keysym, but a combo like `"ctrl-alt-del"` decodes to several.
pub type KeySequence = Vec<u32>;

pub const KEY_BACKSPACE: u32 = 0xFF08;
pub const KEY_TAB: u32 = 0xFF09;
pub const KEY_RETURN: u32 = 0xFF0D;
pub const KEY_ESCAPE: u32 = 0xFF1B;
pub const KEY_INSERT: u32 = 0xFF63;
pub const KEY_DELETE: u32 = 0xFFFF;
pub const KEY_HOME: u32 = 0xFF50;
pub const KEY_END: u32 = 0xFF57;
pub const KEY_PAGE_UP: u32 = 0xFF55;
pub const KEY_PAGE_DOWN: u32 = 0xFF56;
pub const KEY_LEFT: u32 = 0xFF51;
pub const KEY_UP: u32 = 0xFF52;
pub const KEY_RIGHT: u32 = 0xFF53;
pub const KEY_DOWN: u32 = 0xFF54;
pub const KEY_F1: u32 = 0xFFBE;
pub const KEY_F2: u32 = 0xFFBF;
pub const KEY_F3: u32 = 0xFFC0;
pub const KEY_F4: u32 = 0xFFC1;
pub const KEY_F5: u32 = 0xFFC2;
pub const KEY_F6: u32 = 0xFFC3;
pub const KEY_F7: u32 = 0xFFC4;
pub const KEY_F8: u32 = 0xFFC5;
pub const KEY_F9: u32 = 0xFFC6;
pub const KEY_F10: u32 = 0xFFC7;
pub const KEY_F11: u32 = 0xFFC8;
pub const KEY_F12: u32 = 0xFFC9;
pub const KEY_F13: u32 = 0xFFCA;
pub const KEY_F14: u32 = 0xFFCB;
pub const KEY_F15: u32 = 0xFFCC;
pub const KEY_F16: u32 = 0xFFCD;
pub const KEY_F17: u32 = 0xFFCE;
pub const KEY_F18: u32 = 0xFFCF;
pub const KEY_F19: u32 = 0xFFD0;
pub const KEY_F20: u32 = 0xFFD1;
pub const KEY_SHIFT_LEFT: u32 = 0xFFE1;
pub const KEY_SHIFT_RIGHT: u32 = 0xFFE2;
pub const KEY_CONTROL_LEFT: u32 = 0xFFE3;
pub const KEY_CONTROL_RIGHT: u32 = 0xFFE4;
pub const KEY_META_LEFT: u32 = 0xFFE7;
pub const KEY_META_RIGHT: u32 = 0xFFE8;
pub const KEY_ALT_LEFT: u32 = 0xFFE9;
pub const KEY_ALT_RIGHT: u32 = 0xFFEA;
pub const KEY_SCROLL_LOCK: u32 = 0xFF14;
pub const KEY_SYS_REQ: u32 = 0xFF15;
pub const KEY_NUM_LOCK: u32 = 0xFF7F;
pub const KEY_CAPS_LOCK: u32 = 0xFFE5;
pub const KEY_PAUSE: u32 = 0xFF13;
pub const KEY_SUPER_L: u32 = 0xFFEB;
pub const KEY_SUPER_R: u32 = 0xFFEC;
pub const KEY_HYPER_L: u32 = 0xFFED;
pub const KEY_HYPER_R: u32 = 0xFFEE;
pub const KEY_KP_0: u32 = 0xFFB0;
pub const KEY_KP_1: u32 = 0xFFB1;
pub const KEY_KP_2: u32 = 0xFFB2;
pub const KEY_KP_3: u32 = 0xFFB3;
pub const KEY_KP_4: u32 = 0xFFB4;
pub const KEY_KP_5: u32 = 0xFFB5;
pub const KEY_KP_6: u32 = 0xFFB6;
pub const KEY_KP_7: u32 = 0xFFB7;
pub const KEY_KP_8: u32 = 0xFFB8;
pub const KEY_KP_9: u32 = 0xFFB9;
pub const KEY_KP_ENTER: u32 = 0xFF8D;
pub const KEY_BACKSLASH: u32 = 0x005C;
pub const KEY_FORWARD_SLASH: u32 = 0x002F;
pub const KEY_SPACE_BAR: u32 = 0x0020;

/// The 14 US-layout symbols that require a shift key to type, used by
/// `force_caps` to decide when to prefix `shift-`.
pub const SPECIAL_KEYS_US: &str = "~!@#$%^&*()_+{}|:\"<>?";

/// Looks up a single alias segment (already split on `-`) against the
/// named-key table. Returns `None` for anything not in the table — the
/// caller falls back to treating the segment as a literal character.
#[must_use]
pub fn lookup_alias(name: &str) -> Option<u32> {
    Some(match name {
        "bsp" => KEY_BACKSPACE,
        "tab" => KEY_TAB,
        "return" | "enter" => KEY_RETURN,
        "esc" => KEY_ESCAPE,
        "ins" => KEY_INSERT,
        "delete" | "del" => KEY_DELETE,
        "home" => KEY_HOME,
        "end" => KEY_END,
        "pgup" => KEY_PAGE_UP,
        "pgdn" => KEY_PAGE_DOWN,
        "left" => KEY_LEFT,
        "up" => KEY_UP,
        "right" => KEY_RIGHT,
        "down" => KEY_DOWN,
        "slash" | "bslash" => KEY_BACKSLASH,
        "fslash" => KEY_FORWARD_SLASH,
        "spacebar" | "space" | "sb" => KEY_SPACE_BAR,
        "f1" => KEY_F1,
        "f2" => KEY_F2,
        "f3" => KEY_F3,
        "f4" => KEY_F4,
        "f5" => KEY_F5,
        "f6" => KEY_F6,
        "f7" => KEY_F7,
        "f8" => KEY_F8,
        "f9" => KEY_F9,
        "f10" => KEY_F10,
        "f11" => KEY_F11,
        "f12" => KEY_F12,
        "f13" => KEY_F13,
        "f14" => KEY_F14,
        "f15" => KEY_F15,
        "f16" => KEY_F16,
        "f17" => KEY_F17,
        "f18" => KEY_F18,
        "f19" => KEY_F19,
        "f20" => KEY_F20,
        "lshift" | "shift" => KEY_SHIFT_LEFT,
        "rshift" => KEY_SHIFT_RIGHT,
        "lctrl" | "ctrl" => KEY_CONTROL_LEFT,
        "rctrl" => KEY_CONTROL_RIGHT,
        "lmeta" | "meta" => KEY_META_LEFT,
        "rmeta" => KEY_META_RIGHT,
        "lalt" | "alt" => KEY_ALT_LEFT,
        "ralt" => KEY_ALT_RIGHT,
        "scrlk" => KEY_SCROLL_LOCK,
        "sysrq" => KEY_SYS_REQ,
        "numlk" => KEY_NUM_LOCK,
        "caplk" => KEY_CAPS_LOCK,
        "pause" => KEY_PAUSE,
        "lsuper" | "super" => KEY_SUPER_L,
        "rsuper" => KEY_SUPER_R,
        "lhyper" | "hyper" => KEY_HYPER_L,
        "rhyper" => KEY_HYPER_R,
        "kp0" => KEY_KP_0,
        "kp1" => KEY_KP_1,
        "kp2" => KEY_KP_2,
        "kp3" => KEY_KP_3,
        "kp4" => KEY_KP_4,
        "kp5" => KEY_KP_5,
        "kp6" => KEY_KP_6,
        "kp7" => KEY_KP_7,
        "kp8" => KEY_KP_8,
        "kp9" => KEY_KP_9,
        "kpenter" => KEY_KP_ENTER,
        _ => return None,
    })
}

/// Decodes a key name like `"a"`, `"ctrl-alt-del"`, or `"F5"` into the
/// keysym sequence it presses, applying `force_caps` if set.
///
/// A single character maps to its own ASCII value. Anything longer is
/// split on `-`; each segment is looked up in the alias table and, on a
/// miss, treated as the ASCII value of its (single) character.
#[must_use]
pub fn decode_key(key: &str, force_caps: bool) -> KeySequence {
    let owned;
    let key = if force_caps
        && (key.chars().next().is_some_and(char::is_uppercase) && key.chars().count() == 1
            || SPECIAL_KEYS_US.contains(key))
    {
        owned = format!("shift-{key}");
        owned.as_str()
    } else {
        key
    };

    if key.chars().count() == 1 {
        let ch = key.chars().next().expect("checked length above");
        return vec![u32::from(ch)];
    }

    key.split('-')
        .map(|segment| {
            lookup_alias(segment).unwrap_or_else(|| {
                u32::from(segment.chars().next().unwrap_or('\0'))
            })
        })
        .collect()
}
