//! Key codes, modifier flags, and layout-aware character translation.
//!
//! A key code here is the macOS hardware virtual keycode (`kVK_*`, the value
//! CoreGraphics reports in the keyboard-event keycode field). It identifies a
//! physical key position, not a character; the character a key produces
//! depends on the active keyboard layout, which is what [`KeyboardLayout`]
//! models.

/// Virtual keycode for the delete (backspace) key.
pub const BACKSPACE_KEY_CODE: u16 = 0x33;

/// Modifier state of a keyboard event, as the raw 64-bit CGEventFlags word.
///
/// macOS only reports generic modifier masks by default; which *side* of the
/// keyboard a modifier was pressed on lives in the device-dependent low bits
/// and has to be read out separately. The daemon's gating modifier is the
/// right command key, so the side-specific accessors matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierFlags(u64);

// Generic modifier masks (kCGEventFlagMask*).
const MASK_SHIFT: u64 = 1 << 17;
const MASK_CONTROL: u64 = 1 << 18;
const MASK_OPTION: u64 = 1 << 19;
const MASK_COMMAND: u64 = 1 << 20;

// Device-dependent side bits (NX_DEVICE*KEYMASK).
const DEVICE_LEFT_CONTROL: u64 = 0x0000_0001;
const DEVICE_LEFT_SHIFT: u64 = 0x0000_0002;
const DEVICE_RIGHT_SHIFT: u64 = 0x0000_0004;
const DEVICE_LEFT_COMMAND: u64 = 0x0000_0008;
const DEVICE_RIGHT_COMMAND: u64 = 0x0000_0010;
const DEVICE_RIGHT_CONTROL: u64 = 0x0000_2000;

impl ModifierFlags {
    /// No modifiers held.
    pub const NONE: Self = Self(0);

    /// The generic control mask, used when synthesizing Control+digit
    /// desktop-switch events.
    pub const CONTROL: Self = Self(MASK_CONTROL);

    /// Wraps a raw CGEventFlags word.
    #[must_use]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw CGEventFlags word.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Any shift key held.
    #[must_use]
    pub const fn shift(self) -> bool {
        self.0 & MASK_SHIFT != 0
    }

    /// Any control key held.
    #[must_use]
    pub const fn control(self) -> bool {
        self.0 & MASK_CONTROL != 0
    }

    /// Any option key held.
    #[must_use]
    pub const fn option(self) -> bool {
        self.0 & MASK_OPTION != 0
    }

    /// Any command key held.
    #[must_use]
    pub const fn command(self) -> bool {
        self.0 & MASK_COMMAND != 0
    }

    /// Left shift specifically.
    #[must_use]
    pub const fn left_shift(self) -> bool {
        self.0 & DEVICE_LEFT_SHIFT != 0
    }

    /// Right shift specifically.
    #[must_use]
    pub const fn right_shift(self) -> bool {
        self.0 & DEVICE_RIGHT_SHIFT != 0
    }

    /// Left command specifically.
    #[must_use]
    pub const fn left_command(self) -> bool {
        self.0 & DEVICE_LEFT_COMMAND != 0
    }

    /// Right command specifically. This is the daemon's gating modifier.
    #[must_use]
    pub const fn right_command(self) -> bool {
        self.0 & DEVICE_RIGHT_COMMAND != 0
    }

    /// Left control specifically.
    #[must_use]
    pub const fn left_control(self) -> bool {
        self.0 & DEVICE_LEFT_CONTROL != 0
    }

    /// Right control specifically.
    #[must_use]
    pub const fn right_control(self) -> bool {
        self.0 & DEVICE_RIGHT_CONTROL != 0
    }
}

/// Looks up the virtual keycode for a key name used in binding configuration.
///
/// Names are the ANSI letter and digit keys; matching is case-insensitive.
/// Returns `None` for anything else, which the binding parser reports as a
/// configuration error.
#[must_use]
pub fn key_code_for_name(name: &str) -> Option<u16> {
    let code = match name.to_ascii_lowercase().as_str() {
        "a" => 0x00,
        "s" => 0x01,
        "d" => 0x02,
        "f" => 0x03,
        "h" => 0x04,
        "g" => 0x05,
        "z" => 0x06,
        "x" => 0x07,
        "c" => 0x08,
        "v" => 0x09,
        "b" => 0x0B,
        "q" => 0x0C,
        "w" => 0x0D,
        "e" => 0x0E,
        "r" => 0x0F,
        "y" => 0x10,
        "t" => 0x11,
        "1" => 0x12,
        "2" => 0x13,
        "3" => 0x14,
        "4" => 0x15,
        "6" => 0x16,
        "5" => 0x17,
        "9" => 0x19,
        "7" => 0x1A,
        "8" => 0x1C,
        "0" => 0x1D,
        "o" => 0x1F,
        "u" => 0x20,
        "i" => 0x22,
        "p" => 0x23,
        "l" => 0x25,
        "j" => 0x26,
        "k" => 0x28,
        "n" => 0x2D,
        "m" => 0x2E,
        _ => return None,
    };
    Some(code)
}

/// Virtual keycode for the digit key `1`–`9` used by desktop switching.
///
/// The ANSI digit keys are not contiguous in keycode space (`5` is 0x17 but
/// `6` is 0x16), so this goes through a table rather than arithmetic.
#[must_use]
pub fn digit_key_code(digit: u8) -> Option<u16> {
    const DIGIT_CODES: [u16; 9] = [0x12, 0x13, 0x14, 0x15, 0x17, 0x16, 0x1A, 0x1C, 0x19];
    if (1..=9).contains(&digit) {
        Some(DIGIT_CODES[usize::from(digit) - 1])
    } else {
        None
    }
}

/// Bidirectional key-code / character translation under a keyboard layout.
///
/// Forward translation is the hot path (once per ungated keystroke) and must
/// be cheap. Reverse translation scans the layout's whole code space and is
/// only invoked while expanding a snippet.
pub trait KeyboardLayout: Send + Sync {
    /// Translates a key press to the character the layout would emit, or
    /// `None` when the key produces no single character (dead keys, function
    /// keys, unmapped codes). Dead-key composition is not attempted.
    fn key_to_char(&self, key_code: u16, flags: ModifierFlags) -> Option<char>;

    /// Finds the key code whose unmodified press produces `c`, or `None` when
    /// the layout cannot produce the character. Callers skip untranslatable
    /// characters rather than fail.
    fn char_to_key(&self, c: char) -> Option<u16>;
}

#[cfg(target_os = "macos")]
mod system {
    use std::os::raw::c_void;

    use core_foundation::{
        base::{CFRelease, CFTypeRef},
        data::{CFDataGetBytePtr, CFDataRef},
        string::CFStringRef,
    };

    use super::{KeyboardLayout, ModifierFlags};

    // UCKeyTranslate actions and options (HIToolbox/UnicodeUtilities.h).
    const UC_KEY_ACTION_DOWN: u16 = 0;
    const UC_KEY_ACTION_DISPLAY: u16 = 3;
    const UC_KEY_TRANSLATE_NO_DEAD_KEYS_MASK: u32 = 1;

    #[link(name = "Carbon", kind = "framework")]
    extern "C" {
        static kTISPropertyUnicodeKeyLayoutData: CFStringRef;

        fn TISCopyCurrentASCIICapableKeyboardLayoutInputSource() -> *mut c_void;
        fn TISGetInputSourceProperty(source: *mut c_void, key: CFStringRef) -> *mut c_void;
        fn LMGetKbdType() -> u8;
        fn UCKeyTranslate(
            key_layout_ptr: *const u8,
            virtual_key_code: u16,
            key_action: u16,
            modifier_key_state: u32,
            keyboard_type: u32,
            key_translate_options: u32,
            dead_key_state: *mut u32,
            max_string_length: usize,
            actual_string_length: *mut usize,
            unicode_string: *mut u16,
        ) -> i32;
    }

    /// Runs one `UCKeyTranslate` call and decodes the result, returning a
    /// character only when the key emits exactly one.
    unsafe fn translate_once(
        layout: *const u8,
        key_code: u16,
        action: u16,
        modifier_state: u32,
        keyboard_type: u32,
    ) -> Option<char> {
        let mut dead_key_state: u32 = 0;
        let mut length: usize = 0;
        let mut units = [0u16; 4];
        let status = UCKeyTranslate(
            layout,
            key_code,
            action,
            modifier_state,
            keyboard_type,
            UC_KEY_TRANSLATE_NO_DEAD_KEYS_MASK,
            &mut dead_key_state,
            units.len(),
            &mut length,
            units.as_mut_ptr(),
        );
        if status != 0 || length == 0 {
            return None;
        }
        let mut chars = char::decode_utf16(units[..length].iter().copied()).flatten();
        let first = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Calls `body` with the current ASCII-capable layout's key-layout data.
    fn with_layout_data<T>(body: impl FnOnce(*const u8, u32) -> T) -> Option<T> {
        unsafe {
            let source = TISCopyCurrentASCIICapableKeyboardLayoutInputSource();
            if source.is_null() {
                return None;
            }
            let data = TISGetInputSourceProperty(source, kTISPropertyUnicodeKeyLayoutData);
            let result = if data.is_null() {
                None
            } else {
                let bytes = CFDataGetBytePtr(data as CFDataRef);
                Some(body(bytes, u32::from(LMGetKbdType())))
            };
            CFRelease(source as CFTypeRef);
            result
        }
    }

    /// Translation against the OS's currently active keyboard layout.
    pub struct SystemLayout;

    impl KeyboardLayout for SystemLayout {
        fn key_to_char(&self, key_code: u16, flags: ModifierFlags) -> Option<char> {
            // UCKeyTranslate wants the Carbon-style modifier byte, which is
            // the CGEventFlags word shifted down 16 bits.
            let modifier_state = ((flags.raw() >> 16) & 0xFF) as u32;
            with_layout_data(|layout, keyboard_type| unsafe {
                translate_once(
                    layout,
                    key_code,
                    UC_KEY_ACTION_DOWN,
                    modifier_state,
                    keyboard_type,
                )
            })
            .flatten()
        }

        fn char_to_key(&self, c: char) -> Option<u16> {
            // Exhaustive scan over the code space and keyboard-type variants.
            // Only reached during snippet expansion, never per keystroke.
            with_layout_data(|layout, _| {
                for key_code in 0u16..=127 {
                    for keyboard_type in 0u32..=10 {
                        let produced = unsafe {
                            translate_once(layout, key_code, UC_KEY_ACTION_DISPLAY, 0, keyboard_type)
                        };
                        if produced == Some(c) {
                            return Some(key_code);
                        }
                    }
                }
                None
            })
            .flatten()
        }
    }
}

#[cfg(target_os = "macos")]
pub use system::SystemLayout;

/// Builds the platform layout.
///
/// # Errors
/// Never fails on macOS.
#[cfg(target_os = "macos")]
pub fn system_layout() -> anyhow::Result<std::sync::Arc<dyn KeyboardLayout>> {
    Ok(std::sync::Arc::new(SystemLayout))
}

/// Builds the platform layout, which no other OS provides.
///
/// # Errors
/// Always fails off macOS.
#[cfg(not(target_os = "macos"))]
pub fn system_layout() -> anyhow::Result<std::sync::Arc<dyn KeyboardLayout>> {
    anyhow::bail!("kbdcmd key translation requires macOS")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{KeyboardLayout, ModifierFlags};

    /// Deterministic US-ANSI letter/digit layout for tests. Forward
    /// translation ignores shift; reverse translation is a table scan, like
    /// the real thing.
    pub struct UsAnsiLayout;

    pub(crate) const TABLE: &[(u16, char)] = &[
        (0x00, 'a'),
        (0x01, 's'),
        (0x02, 'd'),
        (0x03, 'f'),
        (0x04, 'h'),
        (0x05, 'g'),
        (0x06, 'z'),
        (0x07, 'x'),
        (0x08, 'c'),
        (0x09, 'v'),
        (0x0B, 'b'),
        (0x0C, 'q'),
        (0x0D, 'w'),
        (0x0E, 'e'),
        (0x0F, 'r'),
        (0x10, 'y'),
        (0x11, 't'),
        (0x12, '1'),
        (0x13, '2'),
        (0x14, '3'),
        (0x15, '4'),
        (0x16, '6'),
        (0x17, '5'),
        (0x19, '9'),
        (0x1A, '7'),
        (0x1C, '8'),
        (0x1D, '0'),
        (0x1F, 'o'),
        (0x20, 'u'),
        (0x22, 'i'),
        (0x23, 'p'),
        (0x25, 'l'),
        (0x26, 'j'),
        (0x28, 'k'),
        (0x2D, 'n'),
        (0x2E, 'm'),
        (0x31, ' '),
    ];

    impl KeyboardLayout for UsAnsiLayout {
        fn key_to_char(&self, key_code: u16, _flags: ModifierFlags) -> Option<char> {
            TABLE
                .iter()
                .find(|(code, _)| *code == key_code)
                .map(|(_, c)| *c)
        }

        fn char_to_key(&self, c: char) -> Option<u16> {
            TABLE
                .iter()
                .find(|(_, ch)| *ch == c)
                .map(|(code, _)| *code)
        }
    }
}
