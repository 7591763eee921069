//! Bound actions and their execution.
//!
//! Actions are a closed set of tagged variants dispatched exhaustively, not a
//! table of callbacks; what a binding can do is visible in one place. Each
//! action runs synchronously to completion on the event-loop thread.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    input::synth::KeySink,
    keymap::{self, ModifierFlags},
    workspace::{Workspace, WorkspaceError},
};

/// One bindable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Cycle the frontmost application's windows.
    CycleWindows,
    /// Focus the application at the given bundle path, launching if needed.
    OpenOrFocus(PathBuf),
    /// Open-or-focus, then cycle its windows.
    OpenCycle(PathBuf),
    /// Switch to a numbered virtual desktop (1–9).
    SwitchDesktop(u8),
    /// Reserved slot; does nothing.
    Nop,
}

/// Binding-parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    /// The action specification is not one of the known forms.
    #[error("unknown action spec '{0}'")]
    UnknownSpec(String),

    /// The desktop number is not 1–9.
    #[error("desktop number out of range in '{0}'")]
    DesktopOutOfRange(String),

    /// The binding key is not a known key name.
    #[error("unknown binding key '{0}'")]
    UnknownKey(String),
}

impl Action {
    /// Parses a config action spec: `cycle`, `open:<path>`,
    /// `open-cycle:<path>`, `desktop:<n>`, or `nop`.
    ///
    /// # Errors
    /// Returns [`ActionParseError`] for malformed specs.
    pub fn from_spec(spec: &str) -> Result<Self, ActionParseError> {
        if spec == "cycle" {
            return Ok(Self::CycleWindows);
        }
        if spec == "nop" {
            return Ok(Self::Nop);
        }
        if let Some(path) = spec.strip_prefix("open-cycle:") {
            return Ok(Self::OpenCycle(PathBuf::from(path)));
        }
        if let Some(path) = spec.strip_prefix("open:") {
            return Ok(Self::OpenOrFocus(PathBuf::from(path)));
        }
        if let Some(number) = spec.strip_prefix("desktop:") {
            let number: u8 = number
                .parse()
                .map_err(|_| ActionParseError::DesktopOutOfRange(spec.to_owned()))?;
            if !(1..=9).contains(&number) {
                return Err(ActionParseError::DesktopOutOfRange(spec.to_owned()));
            }
            return Ok(Self::SwitchDesktop(number));
        }
        Err(ActionParseError::UnknownSpec(spec.to_owned()))
    }
}

/// Immutable key-code → action table, built once from configuration.
#[derive(Debug, Default)]
pub struct ActionTable {
    bindings: HashMap<u16, Action>,
}

impl ActionTable {
    /// Builds the table from `(key name, action spec)` pairs.
    ///
    /// # Errors
    /// Returns the first unparsable key name or action spec.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, ActionParseError>
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut bindings = HashMap::new();
        for (key, spec) in entries {
            let code = keymap::key_code_for_name(key.as_ref())
                .ok_or_else(|| ActionParseError::UnknownKey(key.as_ref().to_owned()))?;
            bindings.insert(code, Action::from_spec(spec.as_ref())?);
        }
        Ok(Self { bindings })
    }

    /// Exact-match lookup by key code.
    #[must_use]
    pub fn get(&self, key_code: u16) -> Option<&Action> {
        self.bindings.get(&key_code)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the table has no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Outcome of an open-or-focus request, used to decide whether a follow-up
/// cycle makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStatus {
    /// The application was launched or re-opened.
    Opened,
    /// The application was already up with windows and is now focused.
    Focused,
}

/// Executes actions against the workspace and key-synthesis collaborators.
pub struct ActionRunner {
    workspace: Arc<dyn Workspace>,
    sink: Arc<dyn KeySink>,
}

impl ActionRunner {
    /// Creates a runner over the given collaborators.
    pub fn new(workspace: Arc<dyn Workspace>, sink: Arc<dyn KeySink>) -> Self {
        Self { workspace, sink }
    }

    /// Runs one action to completion. Failures are logged and absorbed; the
    /// event loop keeps going.
    pub fn run(&self, action: &Action) {
        match action {
            Action::CycleWindows => {
                if let Err(e) = self.cycle_windows() {
                    error!(error = %e, "cycle failed");
                }
            }
            Action::OpenOrFocus(path) => match self.open_or_focus(path) {
                Ok(status) => debug!(?status, path = %path.display(), "open-or-focus"),
                Err(e) => error!(error = %e, path = %path.display(), "open failed"),
            },
            Action::OpenCycle(path) => self.open_cycle(path),
            Action::SwitchDesktop(number) => self.switch_desktop(*number),
            Action::Nop => debug!("nop action"),
        }
    }

    /// Raises the frontmost application's other windows so the rearmost
    /// becomes frontmost. An application with zero or one window is left
    /// alone.
    ///
    /// # Errors
    /// Fails when no application is frontmost.
    pub fn cycle_windows(&self) -> Result<(), WorkspaceError> {
        let front = self
            .workspace
            .frontmost_app()
            .ok_or(WorkspaceError::NoFrontmostApp)?;
        let windows = self.workspace.windows_for(front.pid);
        if windows.is_empty() {
            return Ok(());
        }
        for window in windows[1..].iter().rev() {
            if let Err(e) = self.workspace.raise_window(window) {
                debug!(window = window.id, error = %e, "raise failed, continuing");
            }
        }
        Ok(())
    }

    /// Focuses the application at `path`, launching it when it is not
    /// running, and re-opening a window when it is running windowless.
    ///
    /// # Errors
    /// Fails when `path` is not an application bundle or launching fails.
    pub fn open_or_focus(&self, path: &std::path::Path) -> Result<OpenStatus, WorkspaceError> {
        if !path.exists() || !path.extension().is_some_and(|ext| ext == "app") {
            return Err(WorkspaceError::InvalidAppPath(path.to_path_buf()));
        }

        let Some(app) = self.workspace.running_app_at(path) else {
            self.workspace.launch(path)?;
            return Ok(OpenStatus::Opened);
        };

        if !app.is_active {
            self.workspace.activate_app(app.pid)?;
        }
        if self.workspace.windows_for(app.pid).is_empty() {
            // Running but windowless: re-open to get a fresh window.
            self.workspace.launch(path)?;
            Ok(OpenStatus::Opened)
        } else {
            Ok(OpenStatus::Focused)
        }
    }

    /// Open-or-focus, then cycle on success.
    pub fn open_cycle(&self, path: &std::path::Path) {
        match self.open_or_focus(path) {
            Ok(_) => {
                if let Err(e) = self.cycle_windows() {
                    error!(error = %e, "cycle after open failed");
                }
            }
            Err(e) => error!(error = %e, path = %path.display(), "open failed"),
        }
    }

    /// Simulates Control plus the desktop's digit key. Out-of-range numbers
    /// are rejected with a logged error and no synthesis.
    pub fn switch_desktop(&self, number: u8) {
        let Some(key_code) = keymap::digit_key_code(number) else {
            error!(number, "invalid desktop number, must be 1-9");
            return;
        };
        match self.sink.tap_key(key_code, ModifierFlags::CONTROL) {
            Ok(()) => info!(number, "switched desktop"),
            Err(e) => error!(error = %e, number, "desktop switch synthesis failed"),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{fixtures::FakeWorkspace, *};
    use crate::input::synth::fixtures::RecordingSink;

    fn runner(ws: Arc<FakeWorkspace>, sink: Arc<RecordingSink>) -> ActionRunner {
        ActionRunner::new(ws, sink)
    }

    #[test]
    fn parses_every_spec_form() {
        assert_eq!(Action::from_spec("cycle"), Ok(Action::CycleWindows));
        assert_eq!(Action::from_spec("nop"), Ok(Action::Nop));
        assert_eq!(
            Action::from_spec("open:/Applications/Safari.app"),
            Ok(Action::OpenOrFocus(PathBuf::from("/Applications/Safari.app")))
        );
        assert_eq!(
            Action::from_spec("open-cycle:/Applications/kitty.app"),
            Ok(Action::OpenCycle(PathBuf::from("/Applications/kitty.app")))
        );
        assert_eq!(Action::from_spec("desktop:3"), Ok(Action::SwitchDesktop(3)));
    }

    #[test]
    fn rejects_bad_specs() {
        assert!(matches!(
            Action::from_spec("desktop:0"),
            Err(ActionParseError::DesktopOutOfRange(_))
        ));
        assert!(matches!(
            Action::from_spec("desktop:10"),
            Err(ActionParseError::DesktopOutOfRange(_))
        ));
        assert!(matches!(
            Action::from_spec("desktop:x"),
            Err(ActionParseError::DesktopOutOfRange(_))
        ));
        assert!(matches!(
            Action::from_spec("fly"),
            Err(ActionParseError::UnknownSpec(_))
        ));
    }

    #[test]
    fn table_resolves_key_names() {
        let table =
            ActionTable::from_entries([("l", "cycle"), ("1", "desktop:1")]).unwrap();
        assert_eq!(table.get(0x25), Some(&Action::CycleWindows));
        assert_eq!(table.get(0x12), Some(&Action::SwitchDesktop(1)));
        assert_eq!(table.get(0x00), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn table_rejects_unknown_key_names() {
        let err = ActionTable::from_entries([("escape", "cycle")]).unwrap_err();
        assert!(matches!(err, ActionParseError::UnknownKey(_)));
    }

    #[test]
    fn switch_desktop_synthesizes_control_digit() {
        let ws = Arc::new(FakeWorkspace::default());
        let sink = Arc::new(RecordingSink::default());
        runner(ws, sink.clone()).switch_desktop(5);

        let taps = sink.taps();
        assert_eq!(taps.len(), 1);
        // Desktop 5 is the `5` key (0x17), with control held.
        assert_eq!(taps[0].0, 0x17);
        assert!(taps[0].1.control());
    }

    #[test]
    fn switch_desktop_rejects_out_of_range() {
        let ws = Arc::new(FakeWorkspace::default());
        let sink = Arc::new(RecordingSink::default());
        let r = runner(ws, sink.clone());
        r.switch_desktop(0);
        r.switch_desktop(10);
        assert!(sink.taps().is_empty());
    }

    #[test]
    fn cycle_raises_all_but_front_window_in_reverse() {
        let ws = Arc::new(FakeWorkspace::with_frontmost(77));
        ws.add_window(1, 77, "front");
        ws.add_window(2, 77, "middle");
        ws.add_window(3, 77, "back");
        ws.add_window(9, 99, "other app");
        let sink = Arc::new(RecordingSink::default());

        runner(ws.clone(), sink).cycle_windows().unwrap();
        assert_eq!(*ws.raised.lock().unwrap(), vec![3, 2]);
    }

    #[test]
    fn cycle_with_no_windows_is_a_no_op() {
        let ws = Arc::new(FakeWorkspace::with_frontmost(77));
        let sink = Arc::new(RecordingSink::default());
        runner(ws.clone(), sink).cycle_windows().unwrap();
        assert!(ws.raised.lock().unwrap().is_empty());
    }

    #[test]
    fn open_rejects_paths_that_are_not_bundles() {
        let ws = Arc::new(FakeWorkspace::default());
        let sink = Arc::new(RecordingSink::default());
        let err = runner(ws.clone(), sink)
            .open_or_focus(std::path::Path::new("/nonexistent/Thing.app"))
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidAppPath(_)));
        assert!(ws.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn open_launches_apps_that_are_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Demo.app");
        std::fs::create_dir(&bundle).unwrap();

        let ws = Arc::new(FakeWorkspace::default());
        let sink = Arc::new(RecordingSink::default());
        let status = runner(ws.clone(), sink).open_or_focus(&bundle).unwrap();
        assert_eq!(status, OpenStatus::Opened);
        assert_eq!(*ws.launched.lock().unwrap(), vec![bundle]);
    }

    #[test]
    fn open_focuses_running_app_with_windows() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Demo.app");
        std::fs::create_dir(&bundle).unwrap();

        let ws = Arc::new(FakeWorkspace::default());
        ws.running.lock().unwrap().push((
            bundle.clone(),
            crate::workspace::AppInfo {
                pid: 55,
                is_active: false,
            },
        ));
        ws.add_window(4, 55, "doc");
        let sink = Arc::new(RecordingSink::default());

        let status = runner(ws.clone(), sink).open_or_focus(&bundle).unwrap();
        assert_eq!(status, OpenStatus::Focused);
        assert_eq!(*ws.activated_apps.lock().unwrap(), vec![55]);
        assert!(ws.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn open_reopens_running_windowless_app() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Demo.app");
        std::fs::create_dir(&bundle).unwrap();

        let ws = Arc::new(FakeWorkspace::default());
        ws.running.lock().unwrap().push((
            bundle.clone(),
            crate::workspace::AppInfo {
                pid: 55,
                is_active: true,
            },
        ));
        let sink = Arc::new(RecordingSink::default());

        let status = runner(ws.clone(), sink).open_or_focus(&bundle).unwrap();
        assert_eq!(status, OpenStatus::Opened);
        assert_eq!(*ws.launched.lock().unwrap(), vec![bundle]);
        // Already active, so no activation call was needed.
        assert!(ws.activated_apps.lock().unwrap().is_empty());
    }
}
