//! Snippet triggers and the text-expansion engine.
//!
//! The engine owns the process's single [`InputBuffer`]. Every ungated
//! key-down is translated to a character, appended, and the whole buffer is
//! looked up against the trigger table. A hit deletes the typed trigger with
//! synthetic backspaces, types the expansion, and swallows the triggering
//! keystroke.

use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::{
    input::{
        buffer::InputBuffer,
        event::Disposition,
        synth::KeySink,
    },
    keymap::{KeyboardLayout, ModifierFlags, BACKSPACE_KEY_CODE},
};

/// What a trigger expands to.
///
/// Expansions are tagged variants rather than callbacks so the set of
/// producers is closed and checkable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Literal replacement text.
    Text(String),
    /// Today's date, `YYYY-MM-DD`.
    CurrentDate,
}

impl Expansion {
    /// Parses a config value. `@date` selects the date producer; anything
    /// else is literal text.
    #[must_use]
    pub fn from_spec(spec: &str) -> Self {
        match spec {
            "@date" => Self::CurrentDate,
            text => Self::Text(text.to_owned()),
        }
    }

    /// Produces the replacement string.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::CurrentDate => Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// Immutable trigger table, loaded once at startup.
///
/// Lookup is an exact match against the buffer's entire content; the buffer
/// itself is the candidate trigger.
#[derive(Debug, Default)]
pub struct SnippetTable {
    entries: HashMap<String, Expansion>,
}

impl SnippetTable {
    /// Builds the table from `(trigger, expansion spec)` pairs.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(trigger, spec)| {
                (
                    trigger.as_ref().to_owned(),
                    Expansion::from_spec(spec.as_ref()),
                )
            })
            .collect();
        Self { entries }
    }

    /// Exact-match lookup.
    #[must_use]
    pub fn lookup(&self, candidate: &str) -> Option<&Expansion> {
        self.entries.get(candidate)
    }

    /// Number of configured triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no triggers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The rolling-buffer snippet engine.
pub struct SnippetEngine {
    table: SnippetTable,
    buffer: InputBuffer,
    layout: Arc<dyn KeyboardLayout>,
    sink: Arc<dyn KeySink>,
}

impl SnippetEngine {
    /// Creates the engine. `buffer` carries the configured staleness
    /// threshold.
    pub fn new(
        table: SnippetTable,
        buffer: InputBuffer,
        layout: Arc<dyn KeyboardLayout>,
        sink: Arc<dyn KeySink>,
    ) -> Self {
        Self {
            table,
            buffer,
            layout,
            sink,
        }
    }

    /// Handles one ungated key-down.
    ///
    /// Untranslatable keys pass through without touching the buffer. A
    /// matched trigger is replaced by its expansion and the keystroke is
    /// consumed; everything else passes through.
    pub fn handle_key_down(
        &mut self,
        key_code: u16,
        flags: ModifierFlags,
        now: Instant,
    ) -> Disposition {
        let Some(c) = self.layout.key_to_char(key_code, flags) else {
            return Disposition::PassThrough;
        };

        self.buffer.push(c, now);

        let Some(expansion) = self.table.lookup(self.buffer.as_str()) else {
            return Disposition::PassThrough;
        };

        let trigger_len = self.buffer.char_count();
        let replacement = expansion.render();
        info!(
            trigger = self.buffer.as_str(),
            replacement_len = replacement.len(),
            "expanding snippet"
        );
        self.type_replacement(trigger_len, &replacement);
        self.buffer.clear();
        Disposition::Consume
    }

    /// Deletes the typed trigger with one backspace per trigger character,
    /// then types the replacement.
    fn type_replacement(&self, trigger_len: usize, replacement: &str) {
        for _ in 0..trigger_len {
            if let Err(e) = self.sink.tap_key(BACKSPACE_KEY_CODE, ModifierFlags::NONE) {
                warn!(error = %e, "backspace injection failed");
            }
        }
        for c in replacement.chars() {
            match self.layout.char_to_key(c) {
                Some(code) => {
                    if let Err(e) = self.sink.tap_key(code, ModifierFlags::NONE) {
                        warn!(error = %e, character = %c, "replacement injection failed");
                    }
                }
                None => debug!(character = %c, "character not in layout, skipped"),
            }
        }
    }

    /// Current buffer content, for diagnostics and tests.
    #[must_use]
    pub fn buffer_contents(&self) -> &str {
        self.buffer.as_str()
    }
}
