//! kbdcmd - macOS keyboard automation: global keybindings, snippet
//! expansion, window marks.
//!
//! This library exports core modules for testing and potential future reuse.

/// Bound actions and their execution
pub mod actions;
/// Configuration management
pub mod config;
/// Keyboard input pipeline (tap, dispatcher, buffer, synthesis)
pub mod input;
/// Key codes, modifier flags, and layout translation
pub mod keymap;
/// Window-mark persistence
pub mod marks;
/// macOS permission checks
pub mod permissions;
/// Snippet triggers and expansion
pub mod snippets;
/// Telemetry and logging
pub mod telemetry;
/// Window and application collaborators
pub mod workspace;
