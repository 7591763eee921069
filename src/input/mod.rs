//! Keyboard input pipeline: event types, the rolling buffer, the dispatcher,
//! synthetic-event injection, and the macOS event tap.

/// Rolling input buffer with time-based invalidation.
pub mod buffer;
/// Modifier-gated event dispatch.
pub mod dispatcher;
/// Event types shared across the pipeline.
pub mod event;
/// Synthetic key-event injection.
pub mod synth;
/// macOS event tap and run loop.
#[cfg(target_os = "macos")]
pub mod tap;
