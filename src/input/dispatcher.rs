//! Modifier-gated event dispatch.
//!
//! Every tapped key event flows through [`Dispatcher::handle`] exactly once,
//! synchronously, on the event-loop thread. Right-command gates key-downs
//! into binding lookup; everything else feeds the snippet engine. Key-ups
//! mirror the verdict of their key-down so no application sees a release
//! without its press.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::{
    actions::{ActionRunner, ActionTable},
    input::event::{Disposition, KeyDirection, KeyEvent},
    snippets::SnippetEngine,
};

/// The daemon's per-event decision core.
pub struct Dispatcher {
    bindings: ActionTable,
    runner: ActionRunner,
    engine: SnippetEngine,
    /// Key codes whose key-down was consumed; the matching key-up is
    /// consumed too, preventing stuck-key artifacts in other applications.
    consumed_down: HashSet<u16>,
}

impl Dispatcher {
    /// Creates a dispatcher over an immutable binding table, an action
    /// runner, and the snippet engine.
    #[must_use]
    pub fn new(bindings: ActionTable, runner: ActionRunner, engine: SnippetEngine) -> Self {
        Self {
            bindings,
            runner,
            engine,
            consumed_down: HashSet::new(),
        }
    }

    /// Decides one event. Bindings fire only on key-down; a bound action
    /// runs to completion before this returns. Gated key-downs that match
    /// no binding pass through untouched so ordinary command shortcuts
    /// still reach their applications.
    pub fn handle(&mut self, event: &KeyEvent) -> Disposition {
        match event.direction {
            KeyDirection::Up => {
                if self.consumed_down.remove(&event.key_code) {
                    trace!(key_code = event.key_code, "consuming key-up of consumed key-down");
                    Disposition::Consume
                } else {
                    Disposition::PassThrough
                }
            }
            KeyDirection::Down => self.handle_key_down(event),
        }
    }

    fn handle_key_down(&mut self, event: &KeyEvent) -> Disposition {
        if event.flags.right_command() {
            return match self.bindings.get(event.key_code) {
                Some(action) => {
                    debug!(key_code = event.key_code, ?action, "binding hit");
                    self.runner.run(action);
                    self.consumed_down.insert(event.key_code);
                    Disposition::Consume
                }
                None => {
                    trace!(key_code = event.key_code, "gated key without binding, forwarding");
                    Disposition::PassThrough
                }
            };
        }

        let verdict = self
            .engine
            .handle_key_down(event.key_code, event.flags, event.timestamp);
        if verdict == Disposition::Consume {
            self.consumed_down.insert(event.key_code);
        }
        verdict
    }

    /// Current snippet buffer content, for diagnostics and tests.
    #[must_use]
    pub fn buffer_contents(&self) -> &str {
        self.engine.buffer_contents()
    }
}
