//! Rolling input buffer with time-based invalidation.

use std::time::{Duration, Instant};

/// Default gap between keystrokes after which the buffer resets.
pub const DEFAULT_STALENESS: Duration = Duration::from_millis(400);

/// Time-windowed character buffer owned by the snippet engine.
///
/// There is exactly one buffer per process, mutated only on the event-loop
/// thread. It is cleared when a snippet matches or when the gap since the
/// previous accepted character exceeds the staleness threshold; it is never
/// persisted.
#[derive(Debug)]
pub struct InputBuffer {
    text: String,
    last_press: Option<Instant>,
    staleness: Duration,
}

impl InputBuffer {
    /// Creates an empty buffer with the given staleness threshold.
    #[must_use]
    pub fn new(staleness: Duration) -> Self {
        Self {
            text: String::new(),
            last_press: None,
            staleness,
        }
    }

    /// Appends a character observed at `now`, first discarding stale content.
    pub fn push(&mut self, c: char, now: Instant) {
        if let Some(last) = self.last_press {
            if now.saturating_duration_since(last) > self.staleness {
                self.text.clear();
            }
        }
        self.text.push(c);
        self.last_press = Some(now);
    }

    /// The buffer's full current content; this is the candidate trigger.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of characters currently buffered.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Discards all buffered content. The last-press timestamp is kept so a
    /// rapid keystroke after an expansion still counts as fresh input.
    pub fn clear(&mut self) {
        self.text.clear();
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_characters_in_order() {
        let mut buf = InputBuffer::default();
        let now = Instant::now();
        buf.push('t', now);
        buf.push('d', now + Duration::from_millis(50));
        buf.push('f', now + Duration::from_millis(100));
        assert_eq!(buf.as_str(), "tdf");
        assert_eq!(buf.char_count(), 3);
    }

    #[test]
    fn gap_beyond_threshold_starts_a_new_buffer() {
        let mut buf = InputBuffer::new(Duration::from_millis(400));
        let now = Instant::now();
        buf.push('t', now);
        buf.push('d', now + Duration::from_millis(100));
        buf.push('x', now + Duration::from_millis(600));
        assert_eq!(buf.as_str(), "x");
    }

    #[test]
    fn gap_exactly_at_threshold_is_not_stale() {
        let mut buf = InputBuffer::new(Duration::from_millis(400));
        let now = Instant::now();
        buf.push('t', now);
        buf.push('d', now + Duration::from_millis(400));
        assert_eq!(buf.as_str(), "td");
    }

    #[test]
    fn clear_empties_content() {
        let mut buf = InputBuffer::default();
        let now = Instant::now();
        buf.push('a', now);
        buf.clear();
        assert_eq!(buf.as_str(), "");
        assert_eq!(buf.char_count(), 0);
    }

    #[test]
    fn multibyte_characters_count_once() {
        let mut buf = InputBuffer::default();
        let now = Instant::now();
        buf.push('ł', now);
        buf.push('a', now);
        assert_eq!(buf.char_count(), 2);
    }
}
