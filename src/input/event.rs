//! Keyboard event types shared across the tap, dispatcher, and engine.

use std::time::Instant;

use crate::keymap::ModifierFlags;

/// Marker value written into the event-source user-data field of every key
/// event this process injects, so the tap can recognize and skip its own
/// output before it reaches the dispatcher.
///
/// 'kbdc' in ASCII bytes: 0x6b 0x62 0x64 0x63 -> 1801610339
pub const SYNTH_EVENT_TAG: i64 = 1_801_610_339;

/// Whether a key event is a press or a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    /// Key pressed.
    Down,
    /// Key released.
    Up,
}

/// One keyboard event as observed by the tap. Produced by the OS, consumed
/// exactly once by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    /// Hardware virtual keycode.
    pub key_code: u16,
    /// Press or release.
    pub direction: KeyDirection,
    /// Modifier state at the time of the event.
    pub flags: ModifierFlags,
    /// When the tap observed the event.
    pub timestamp: Instant,
}

impl KeyEvent {
    /// Convenience constructor stamping the event with the current time.
    #[must_use]
    pub fn new(key_code: u16, direction: KeyDirection, flags: ModifierFlags) -> Self {
        Self {
            key_code,
            direction,
            flags,
            timestamp: Instant::now(),
        }
    }
}

/// The dispatcher's verdict on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Swallow the event; no other process sees it.
    Consume,
    /// Let the event continue to the rest of the system unmodified.
    PassThrough,
}
