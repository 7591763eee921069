//! Synthetic key-event injection.
//!
//! Everything the daemon types on the user's behalf (snippet deletions and
//! replacement text, the desktop-switch chord) goes through [`KeySink`].
//! The macOS poster tags each injected event with [`SYNTH_EVENT_TAG`] so the
//! event tap can filter the daemon's own output at the boundary; without the
//! tag, expansions would feed back into the input buffer.
//!
//! [`SYNTH_EVENT_TAG`]: crate::input::event::SYNTH_EVENT_TAG

use thiserror::Error;

use crate::keymap::ModifierFlags;

/// Synthetic-event injection errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthError {
    /// Failed to create the HID event source.
    #[error("failed to create event source (check Accessibility permission)")]
    EventSource,

    /// Failed to create a keyboard event.
    #[error("failed to create keyboard event")]
    EventCreate,
}

/// Sink for injected key presses.
///
/// One call posts a full down/up pair with the given modifier flags. Failures
/// are reported but callers treat them as per-event and keep going; a failed
/// injection never corrupts dispatcher state.
pub trait KeySink: Send + Sync {
    /// Posts a key-down/key-up pair for `key_code` with `flags` held.
    ///
    /// # Errors
    /// Returns [`SynthError`] when the underlying event objects cannot be
    /// created. Posting itself reports no errors on any platform.
    fn tap_key(&self, key_code: u16, flags: ModifierFlags) -> Result<(), SynthError>;
}

#[cfg(target_os = "macos")]
mod mac {
    use std::{thread, time::Duration};

    use core_graphics::{
        event::{CGEvent, CGEventFlags, CGEventTapLocation, EventField},
        event_source::{CGEventSource, CGEventSourceStateID},
    };
    use tracing::trace;

    use super::{KeySink, SynthError};
    use crate::{input::event::SYNTH_EVENT_TAG, keymap::ModifierFlags};

    /// Gap between the down and up posts, matching the pacing the target
    /// applications were observed to need.
    const DOWN_UP_GAP: Duration = Duration::from_micros(400);

    /// Posts tagged keyboard events to the HID stream.
    pub struct MacKeySink;

    impl MacKeySink {
        fn build_event(key_code: u16, flags: ModifierFlags, down: bool) -> Result<CGEvent, SynthError> {
            let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
                .map_err(|()| SynthError::EventSource)?;
            let event = CGEvent::new_keyboard_event(source, key_code, down)
                .map_err(|()| SynthError::EventCreate)?;
            event.set_flags(CGEventFlags::from_bits_retain(flags.raw()));
            event.set_integer_value_field(EventField::EVENT_SOURCE_USER_DATA, SYNTH_EVENT_TAG);
            Ok(event)
        }
    }

    impl KeySink for MacKeySink {
        fn tap_key(&self, key_code: u16, flags: ModifierFlags) -> Result<(), SynthError> {
            trace!(key_code, flags = flags.raw(), "injecting key tap");
            let key_down = Self::build_event(key_code, flags, true)?;
            let key_up = Self::build_event(key_code, flags, false)?;
            key_down.post(CGEventTapLocation::HID);
            thread::sleep(DOWN_UP_GAP);
            key_up.post(CGEventTapLocation::HID);
            Ok(())
        }
    }
}

#[cfg(target_os = "macos")]
pub use mac::MacKeySink;

/// Builds the platform key sink.
///
/// # Errors
/// Never fails on macOS.
#[cfg(target_os = "macos")]
pub fn system_sink() -> anyhow::Result<std::sync::Arc<dyn KeySink>> {
    Ok(std::sync::Arc::new(MacKeySink))
}

/// Builds the platform key sink, which no other OS provides.
///
/// # Errors
/// Always fails off macOS.
#[cfg(not(target_os = "macos"))]
pub fn system_sink() -> anyhow::Result<std::sync::Arc<dyn KeySink>> {
    anyhow::bail!("kbdcmd key synthesis requires macOS")
}
