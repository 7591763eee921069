//! Window and application collaborators.
//!
//! The dispatcher and CLI commands never touch platform window APIs
//! directly; they go through [`Workspace`], a small capability interface
//! with one canonical macOS implementation. Tests inject recording fakes.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[cfg(target_os = "macos")]
pub mod mac;
#[cfg(target_os = "macos")]
pub use mac::MacWorkspace;

/// Opaque on-screen window identifier.
pub type WindowId = u32;

/// One on-screen window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Window identifier.
    pub id: WindowId,
    /// Owning process.
    pub pid: i32,
    /// Window title; empty when the system withholds it.
    pub title: String,
    /// Owning application's name.
    pub app_name: String,
}

/// A running application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Process identifier.
    pub pid: i32,
    /// Whether the application is currently active (frontmost).
    pub is_active: bool,
}

/// Window/application collaborator errors.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The path does not name an application bundle.
    #[error("invalid application path: {0}")]
    InvalidAppPath(PathBuf),

    /// No application is frontmost.
    #[error("cannot determine frontmost application")]
    NoFrontmostApp,

    /// No on-screen window matched.
    #[error("window {0} not found")]
    WindowNotFound(WindowId),

    /// Launching the application failed.
    #[error("failed to launch {path}: {reason}")]
    Launch {
        /// Bundle path that failed to launch.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// Platform API failure.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Application enumeration, window enumeration, and focus operations.
///
/// Every method is synchronous and may block on the OS; callers run on the
/// event-loop thread and accept that an unresponsive target application
/// stalls keyboard processing.
pub trait Workspace: Send + Sync {
    /// The currently active application, if any.
    fn frontmost_app(&self) -> Option<AppInfo>;

    /// The running application backed by the bundle at `path`, if any.
    fn running_app_at(&self, path: &Path) -> Option<AppInfo>;

    /// All of `pid`'s ordinary on-screen windows, front to back.
    fn windows_for(&self, pid: i32) -> Vec<WindowInfo>;

    /// The current foreground window's identifier, owner, and title.
    ///
    /// # Errors
    /// Fails when no frontmost application or no layer-zero window for it
    /// can be found.
    fn foreground_window(&self) -> Result<WindowInfo, WorkspaceError>;

    /// Raises `window` within its application.
    ///
    /// # Errors
    /// Fails when the window cannot be located or the platform refuses.
    fn raise_window(&self, window: &WindowInfo) -> Result<(), WorkspaceError>;

    /// Brings the application owning `pid` to the front.
    ///
    /// # Errors
    /// Fails when no running application has that pid.
    fn activate_app(&self, pid: i32) -> Result<(), WorkspaceError>;

    /// Activates the application owning window `id`.
    ///
    /// # Errors
    /// Fails when the window no longer exists.
    fn activate_window(&self, id: WindowId) -> Result<(), WorkspaceError>;

    /// Launches (or re-opens) the application bundle at `path`.
    ///
    /// # Errors
    /// Fails when the launcher rejects the bundle.
    fn launch(&self, path: &Path) -> Result<(), WorkspaceError>;
}

/// Builds the platform workspace.
///
/// # Errors
/// Never fails on macOS.
#[cfg(target_os = "macos")]
pub fn system_workspace() -> anyhow::Result<std::sync::Arc<dyn Workspace>> {
    Ok(std::sync::Arc::new(MacWorkspace))
}

/// Builds the platform workspace, which no other OS provides.
///
/// # Errors
/// Always fails off macOS.
#[cfg(not(target_os = "macos"))]
pub fn system_workspace() -> anyhow::Result<std::sync::Arc<dyn Workspace>> {
    anyhow::bail!("kbdcmd window management requires macOS")
}
