//! macOS event tap and run loop.
//!
//! The tap sits at the HID level with head insertion, so this process sees
//! every keyboard event before any application. CoreGraphics only suppresses
//! delivery when the tap callback returns NULL; `CallbackResult::Drop` maps
//! to that at the C boundary, which is how [`Disposition::Consume`] takes
//! effect.
//!
//! Self-generated events are filtered here, at the boundary: anything tagged
//! with [`SYNTH_EVENT_TAG`] or originating from this pid is passed along
//! untouched and never reaches the dispatcher. Without this, snippet
//! expansions would loop back into the input buffer.

use std::{
    cell::RefCell,
    ffi::c_void,
    process,
    sync::{
        atomic::{AtomicPtr, Ordering},
        Arc,
    },
    time::Instant,
};

use core_foundation::{
    base::TCFType,
    mach_port::CFMachPortRef,
    runloop::{kCFRunLoopCommonModes, CFRunLoop},
};
use core_graphics::event::{self as cge, CallbackResult};
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::input::{
    dispatcher::Dispatcher,
    event::{Disposition, KeyDirection, KeyEvent, SYNTH_EVENT_TAG},
};
use crate::keymap::ModifierFlags;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
}

// Minimal subset of CGEventField constants read by the callback.
const FIELD_EVENT_SOURCE_UNIX_PROCESS_ID: u32 = 41;
const FIELD_EVENT_SOURCE_USER_DATA: u32 = 42;
const FIELD_KEYBOARD_EVENT_KEYCODE: u32 = 9;

/// Fatal tap-startup failures. None of these are retried; the operator has
/// to fix the capability grant and restart.
#[derive(Debug, Error)]
pub enum TapError {
    /// The OS refused to create the tap, almost always a missing
    /// Accessibility / Input Monitoring grant.
    #[error("failed to create event tap - check Accessibility and Input Monitoring grants")]
    Create,

    /// The tap's run-loop source could not be created.
    #[error("failed to create run loop source for event tap")]
    RunLoopSource,
}

/// Installs the tap and runs the event loop on the current thread.
///
/// Every event is handed to `dispatcher` synchronously and to completion
/// before the next is read; the call does not return in normal operation.
///
/// # Errors
/// Returns [`TapError`] when the tap cannot be installed.
pub fn run(dispatcher: Dispatcher) -> Result<(), TapError> {
    // The callback is re-entered only between events (injected events are
    // queued by the OS, not delivered inline), so single-threaded interior
    // mutability is enough.
    let dispatcher = RefCell::new(dispatcher);

    // Shared with the callback so it can re-enable the tap after the OS
    // disables it on timeout.
    let tap_port: Arc<AtomicPtr<c_void>> = Arc::new(AtomicPtr::new(std::ptr::null_mut()));
    let tap_port_cb = Arc::clone(&tap_port);

    let tap = cge::CGEventTap::new(
        cge::CGEventTapLocation::HID,
        cge::CGEventTapPlacement::HeadInsertEventTap,
        cge::CGEventTapOptions::Default,
        vec![cge::CGEventType::KeyDown, cge::CGEventType::KeyUp],
        move |_proxy, etype, event| {
            // Skip events we injected ourselves, by tag or by pid.
            let src_pid = event.get_integer_value_field(FIELD_EVENT_SOURCE_UNIX_PROCESS_ID) as u32;
            let user_tag = event.get_integer_value_field(FIELD_EVENT_SOURCE_USER_DATA);
            if user_tag == SYNTH_EVENT_TAG || src_pid == process::id() {
                trace!(src_pid, user_tag, "skipping self-generated event");
                return CallbackResult::Keep;
            }

            match etype {
                cge::CGEventType::KeyDown | cge::CGEventType::KeyUp => {
                    let key_code =
                        event.get_integer_value_field(FIELD_KEYBOARD_EVENT_KEYCODE) as u16;
                    let direction = if matches!(etype, cge::CGEventType::KeyDown) {
                        KeyDirection::Down
                    } else {
                        KeyDirection::Up
                    };
                    let key_event = KeyEvent {
                        key_code,
                        direction,
                        flags: ModifierFlags::from_raw(event.get_flags().bits()),
                        timestamp: Instant::now(),
                    };
                    match dispatcher.borrow_mut().handle(&key_event) {
                        Disposition::Consume => CallbackResult::Drop,
                        Disposition::PassThrough => CallbackResult::Keep,
                    }
                }
                cge::CGEventType::TapDisabledByTimeout
                | cge::CGEventType::TapDisabledByUserInput => {
                    let port = tap_port_cb.load(Ordering::SeqCst) as CFMachPortRef;
                    if !port.is_null() {
                        warn!("event tap disabled by OS, re-enabling");
                        unsafe { CGEventTapEnable(port, true) };
                    }
                    CallbackResult::Keep
                }
                _ => CallbackResult::Keep,
            }
        },
    )
    .map_err(|()| TapError::Create)?;

    tap_port.store(
        tap.mach_port().as_concrete_TypeRef() as *mut c_void,
        Ordering::SeqCst,
    );

    let source = tap
        .mach_port()
        .create_runloop_source(0)
        .map_err(|()| TapError::RunLoopSource)?;

    let run_loop = CFRunLoop::get_current();
    let mode = unsafe { kCFRunLoopCommonModes };
    run_loop.add_source(&source, mode);
    tap.enable();

    info!("event tap installed, entering run loop");
    CFRunLoop::run_current();

    Ok(())
}
