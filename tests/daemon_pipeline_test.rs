//! Integration tests for the daemon's event pipeline.
//!
//! These drive a fully wired dispatcher - binding table, action runner,
//! snippet engine - through the public API with injected collaborators, the
//! same shape the daemon builds from config at startup. No OS tap is
//! involved, so everything here runs on any platform without permissions.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use kbdcmd::{
    actions::{ActionRunner, ActionTable},
    config::{Config, DEFAULT_CONFIG},
    input::{
        buffer::InputBuffer,
        dispatcher::Dispatcher,
        event::{Disposition, KeyDirection, KeyEvent},
        synth::{KeySink, SynthError},
    },
    keymap::{KeyboardLayout, ModifierFlags, BACKSPACE_KEY_CODE},
    snippets::{SnippetEngine, SnippetTable},
    workspace::{AppInfo, WindowId, WindowInfo, Workspace, WorkspaceError},
};

/// Raw flags for a right-command press: generic command mask plus the
/// right-side device bit.
const RIGHT_CMD: u64 = (1 << 20) | 0x10;

/// US-ANSI letters and digits, enough layout for the pipeline.
struct TestLayout;

const LAYOUT: &[(u16, char)] = &[
    (0x00, 'a'),
    (0x02, 'd'),
    (0x03, 'f'),
    (0x0E, 'e'),
    (0x11, 't'),
    (0x12, '1'),
    (0x17, '5'),
    (0x1F, 'o'),
    (0x23, 'p'),
    (0x25, 'l'),
    (0x2D, 'n'),
];

impl KeyboardLayout for TestLayout {
    fn key_to_char(&self, key_code: u16, _flags: ModifierFlags) -> Option<char> {
        LAYOUT
            .iter()
            .find(|(code, _)| *code == key_code)
            .map(|(_, c)| *c)
    }

    fn char_to_key(&self, c: char) -> Option<u16> {
        LAYOUT.iter().find(|(_, ch)| *ch == c).map(|(code, _)| *code)
    }
}

#[derive(Default)]
struct TestSink {
    taps: Mutex<Vec<(u16, ModifierFlags)>>,
}

impl KeySink for TestSink {
    fn tap_key(&self, key_code: u16, flags: ModifierFlags) -> Result<(), SynthError> {
        self.taps.lock().unwrap().push((key_code, flags));
        Ok(())
    }
}

#[derive(Default)]
struct TestWorkspace {
    raised: Mutex<Vec<WindowId>>,
}

impl Workspace for TestWorkspace {
    fn frontmost_app(&self) -> Option<AppInfo> {
        Some(AppInfo {
            pid: 100,
            is_active: true,
        })
    }

    fn running_app_at(&self, _path: &Path) -> Option<AppInfo> {
        None
    }

    fn windows_for(&self, pid: i32) -> Vec<WindowInfo> {
        (1..=3)
            .map(|id| WindowInfo {
                id,
                pid,
                title: format!("window {id}"),
                app_name: "Test".into(),
            })
            .collect()
    }

    fn foreground_window(&self) -> Result<WindowInfo, WorkspaceError> {
        Ok(WindowInfo {
            id: 1,
            pid: 100,
            title: "window 1".into(),
            app_name: "Test".into(),
        })
    }

    fn raise_window(&self, window: &WindowInfo) -> Result<(), WorkspaceError> {
        self.raised.lock().unwrap().push(window.id);
        Ok(())
    }

    fn activate_app(&self, _pid: i32) -> Result<(), WorkspaceError> {
        Ok(())
    }

    fn activate_window(&self, _id: WindowId) -> Result<(), WorkspaceError> {
        Ok(())
    }

    fn launch(&self, path: &Path) -> Result<(), WorkspaceError> {
        Err(WorkspaceError::InvalidAppPath(PathBuf::from(path)))
    }
}

fn build_dispatcher(
    ws: Arc<TestWorkspace>,
    sink: Arc<TestSink>,
) -> Dispatcher {
    let bindings = ActionTable::from_entries([("l", "cycle"), ("5", "desktop:5"), ("n", "nop")])
        .expect("test bindings parse");
    let runner = ActionRunner::new(ws, sink.clone());
    let engine = SnippetEngine::new(
        SnippetTable::from_entries([("tdf", "noted")]),
        InputBuffer::new(Duration::from_millis(400)),
        Arc::new(TestLayout),
        sink,
    );
    Dispatcher::new(bindings, runner, engine)
}

fn press(key_code: u16, raw_flags: u64, at: Instant) -> KeyEvent {
    KeyEvent {
        key_code,
        direction: KeyDirection::Down,
        flags: ModifierFlags::from_raw(raw_flags),
        timestamp: at,
    }
}

fn release(key_code: u16) -> KeyEvent {
    KeyEvent {
        key_code,
        direction: KeyDirection::Up,
        flags: ModifierFlags::from_raw(0),
        timestamp: Instant::now(),
    }
}

#[test]
fn typing_a_trigger_expands_and_swallows_the_last_keystroke() {
    let ws = Arc::new(TestWorkspace::default());
    let sink = Arc::new(TestSink::default());
    let mut dispatcher = build_dispatcher(ws, sink.clone());

    let start = Instant::now();
    let layout = TestLayout;
    let mut verdicts = Vec::new();
    for (i, c) in "tdf".chars().enumerate() {
        let code = layout.char_to_key(c).unwrap();
        verdicts.push(dispatcher.handle(&press(
            code,
            0,
            start + Duration::from_millis(50 * i as u64),
        )));
    }

    assert_eq!(
        verdicts,
        vec![
            Disposition::PassThrough,
            Disposition::PassThrough,
            Disposition::Consume
        ]
    );

    // Three deletions for the trigger, then "noted" typed back out.
    let taps = sink.taps.lock().unwrap().clone();
    assert_eq!(taps.len(), 3 + 5);
    assert!(taps[..3].iter().all(|(c, _)| *c == BACKSPACE_KEY_CODE));
    let typed: String = taps[3..]
        .iter()
        .map(|(code, _)| layout.key_to_char(*code, ModifierFlags::NONE).unwrap())
        .collect();
    assert_eq!(typed, "noted");

    // The trigger key's release is swallowed too.
    let f = layout.char_to_key('f').unwrap();
    assert_eq!(dispatcher.handle(&release(f)), Disposition::Consume);
}

#[test]
fn slow_typing_never_expands() {
    let ws = Arc::new(TestWorkspace::default());
    let sink = Arc::new(TestSink::default());
    let mut dispatcher = build_dispatcher(ws, sink.clone());

    let start = Instant::now();
    let layout = TestLayout;
    for (i, c) in "tdf".chars().enumerate() {
        let code = layout.char_to_key(c).unwrap();
        let verdict = dispatcher.handle(&press(
            code,
            0,
            // One second between keystrokes: each press starts a fresh buffer.
            start + Duration::from_millis(1000 * i as u64),
        ));
        assert_eq!(verdict, Disposition::PassThrough);
    }
    assert!(sink.taps.lock().unwrap().is_empty());
}

#[test]
fn right_command_binding_cycles_without_touching_the_buffer() {
    let ws = Arc::new(TestWorkspace::default());
    let sink = Arc::new(TestSink::default());
    let mut dispatcher = build_dispatcher(ws.clone(), sink);

    let now = Instant::now();
    // Some typing first.
    assert_eq!(
        dispatcher.handle(&press(0x11, 0, now)),
        Disposition::PassThrough
    );

    // Right-command + L cycles: windows 3 then 2 raised, front left alone.
    assert_eq!(
        dispatcher.handle(&press(0x25, RIGHT_CMD, now)),
        Disposition::Consume
    );
    assert_eq!(*ws.raised.lock().unwrap(), vec![3, 2]);

    // The earlier keystroke is still buffered.
    assert_eq!(dispatcher.buffer_contents(), "t");
}

#[test]
fn desktop_binding_synthesizes_control_digit() {
    let ws = Arc::new(TestWorkspace::default());
    let sink = Arc::new(TestSink::default());
    let mut dispatcher = build_dispatcher(ws, sink.clone());

    // Right-command + 5 -> control + the '5' key.
    assert_eq!(
        dispatcher.handle(&press(0x17, RIGHT_CMD, Instant::now())),
        Disposition::Consume
    );
    let taps = sink.taps.lock().unwrap().clone();
    assert_eq!(taps.len(), 1);
    assert_eq!(taps[0].0, 0x17);
    assert!(taps[0].1.control());
}

#[test]
fn gated_unbound_key_is_forwarded() {
    let ws = Arc::new(TestWorkspace::default());
    let sink = Arc::new(TestSink::default());
    let mut dispatcher = build_dispatcher(ws.clone(), sink.clone());

    // Right-command + E has no binding: forwarded, no action, no buffering.
    assert_eq!(
        dispatcher.handle(&press(0x0E, RIGHT_CMD, Instant::now())),
        Disposition::PassThrough
    );
    assert!(ws.raised.lock().unwrap().is_empty());
    assert!(sink.taps.lock().unwrap().is_empty());
    assert_eq!(dispatcher.buffer_contents(), "");
}

#[test]
fn default_config_wires_up_a_dispatcher() {
    let config = Config::from_toml(DEFAULT_CONFIG).expect("default config parses");
    let bindings = ActionTable::from_entries(
        config.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )
    .expect("default bindings parse");
    assert_eq!(bindings.len(), 17);

    let table = SnippetTable::from_entries(
        config.snippets.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    );
    assert_eq!(table.len(), 1);
    assert!(table.lookup("tdf").is_some());
    assert!(table.lookup("td").is_none());
}
