//! Input state: read buffer, edit buffer, history, tab-completion state.
//!
//! Grounded on the reference implementation's `DrshInput` struct
//! layout (SPEC_FULL.md §3). History navigation (`history_up`/
//! `history_down`, temp-input preservation) follows
//! `examples/dumitru-stama-Bark/src/history.rs`'s `CommandHistory::up`/
//! `down`, adapted from `Vec<String>` + `Option<usize>` to the spec's
//! atom-handle array with an in-range cursor (`len` == "past the end").

use crate::atom::{Atom, AtomTable};
use crate::completion::CompletionState;
use crate::gbuf::GrowBuffer;

pub struct InputState {
    pub read_buffer: GrowBuffer,
    pub read_cursor: usize,

    /// The line currently being edited. Byte-oriented per Open
    /// Question (b) — no grapheme awareness.
    pub write_buffer: Vec<u8>,
    pub write_cursor: usize,

    pub prompt_buffer: Vec<u8>,
    pub prompt_visual_len: usize,

    history: Vec<Atom>,
    /// `history_cursor == history.len()` means "past the end, empty line".
    history_cursor: usize,
    /// Count loaded from disk at startup; only entries beyond this are
    /// flushed to the history file on exit.
    pub history_start: usize,
    temp_input: Vec<u8>,

    pub completion: CompletionState,

    pub needs_redisplay: bool,
    pub needs_clear_screen: bool,

    /// Cursor-line count from the previous redisplay frame, used by
    /// the `ESC[<n>A` up-move at the start of the next frame.
    pub prev_cursor_line_offset: usize,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            read_buffer: GrowBuffer::new(),
            read_cursor: 0,
            write_buffer: Vec::new(),
            write_cursor: 0,
            prompt_buffer: Vec::new(),
            prompt_visual_len: 0,
            history: Vec::new(),
            history_cursor: 0,
            history_start: 0,
            temp_input: Vec::new(),
            completion: CompletionState::new(),
            needs_redisplay: true,
            needs_clear_screen: false,
            prev_cursor_line_offset: 0,
        }
    }

    pub fn load_history(&mut self, entries: Vec<Atom>) {
        self.history = entries;
        self.history_start = self.history.len();
        self.history_cursor = self.history.len();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_entries_since_start(&self) -> &[Atom] {
        &self.history[self.history_start..]
    }

    pub fn history_push(&mut self, at: &mut AtomTable, line: &[u8]) {
        if line.is_empty() {
            self.history_reset_navigation();
            return;
        }
        let dup_of_last = self.history.last().map(|a| a.as_bytes()) == Some(line);
        if !dup_of_last {
            if let Ok(atom) = at.atomize(line) {
                self.history.push(atom);
                const MAX_HISTORY: usize = 1000;
                if self.history.len() > MAX_HISTORY {
                    self.history.remove(0);
                    self.history_start = self.history_start.saturating_sub(1);
                }
            }
        }
        self.history_reset_navigation();
    }

    pub fn history_reset_navigation(&mut self) {
        self.history_cursor = self.history.len();
        self.temp_input.clear();
    }

    /// Move to an older entry; reaching index 0 stops. No-op if history
    /// is empty.
    pub fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        if self.history_cursor == self.history.len() {
            self.temp_input = std::mem::take(&mut self.write_buffer);
            self.history_cursor = self.history.len() - 1;
        } else if self.history_cursor > 0 {
            self.history_cursor -= 1;
        } else {
            return;
        }
        self.write_buffer = self.history[self.history_cursor].as_bytes().to_vec();
        self.write_cursor = self.write_buffer.len();
        self.needs_redisplay = true;
    }

    /// Move to a newer entry; one past the last entry restores the
    /// in-progress line that was being typed before navigation started.
    pub fn history_down(&mut self) {
        if self.history_cursor >= self.history.len() {
            return;
        }
        self.history_cursor += 1;
        if self.history_cursor == self.history.len() {
            self.write_buffer = std::mem::take(&mut self.temp_input);
        } else {
            self.write_buffer = self.history[self.history_cursor].as_bytes().to_vec();
        }
        self.write_cursor = self.write_buffer.len();
        self.needs_redisplay = true;
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_line(at: &mut AtomTable, input: &mut InputState, s: &str) {
        input.history_push(at, s.as_bytes());
    }

    #[test]
    fn up_up_up_up_stops_at_oldest() {
        let mut at = AtomTable::new();
        let mut input = InputState::new();
        push_line(&mut at, &mut input, "a");
        push_line(&mut at, &mut input, "b");
        push_line(&mut at, &mut input, "c");

        input.history_up();
        assert_eq!(input.write_buffer, b"c");
        input.history_up();
        assert_eq!(input.write_buffer, b"b");
        input.history_up();
        assert_eq!(input.write_buffer, b"a");
        input.history_up(); // stays at oldest
        assert_eq!(input.write_buffer, b"a");
    }

    #[test]
    fn down_past_end_restores_temp_input() {
        let mut at = AtomTable::new();
        let mut input = InputState::new();
        push_line(&mut at, &mut input, "a");
        push_line(&mut at, &mut input, "b");

        input.write_buffer = b"typing...".to_vec();
        input.write_cursor = input.write_buffer.len();
        input.history_up();
        assert_eq!(input.write_buffer, b"b");
        input.history_down();
        assert_eq!(input.write_buffer, b"typing...");
    }

    #[test]
    fn duplicate_of_last_is_not_added_twice() {
        let mut at = AtomTable::new();
        let mut input = InputState::new();
        push_line(&mut at, &mut input, "a");
        push_line(&mut at, &mut input, "a");
        assert_eq!(input.history_len(), 1);
    }
}
