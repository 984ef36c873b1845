//! Bytes -> logical editing commands via a tiny ANSI escape recognizer.
//!
//! Transcribed from the reference implementation's key decoder table
//! (SPEC_FULL.md §4.4). `decode` consumes a prefix of `buf` and returns
//! the command plus how many bytes were consumed, or `None` if more
//! bytes are needed to resolve a pending escape sequence.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveHome,
    MoveLeft,
    Interrupt,
    DeleteForwardOrEof,
    MoveEnd,
    MoveRight,
    DeleteBack,
    Tab,
    ShiftTab,
    Accept,
    KillEndOfLine,
    ClearScreen,
    Enter,
    MoveDown,
    MoveUp,
    DeleteForward,
    Esc,
    Literal(u8),
    /// An unmapped control byte (e.g. Ctrl-G, Ctrl-Q). Consumed but
    /// has no editing effect, unlike `Literal` which inserts.
    Noop,
}

pub fn decode(buf: &[u8]) -> Option<(Command, usize)> {
    let b0 = *buf.first()?;
    match b0 {
        0x01 => Some((Command::MoveHome, 1)),       // Ctrl-A
        0x02 => Some((Command::MoveLeft, 1)),        // Ctrl-B
        0x03 => Some((Command::Interrupt, 1)),       // Ctrl-C
        0x04 => Some((Command::DeleteForwardOrEof, 1)), // Ctrl-D
        0x05 => Some((Command::MoveEnd, 1)),         // Ctrl-E
        0x06 => Some((Command::MoveRight, 1)),       // Ctrl-F
        0x08 => Some((Command::DeleteBack, 1)),      // Ctrl-H (backspace)
        0x09 => Some((Command::Tab, 1)),             // Ctrl-I / Tab
        0x0A => Some((Command::Accept, 1)),          // Ctrl-J / LF
        0x0B => Some((Command::KillEndOfLine, 1)),   // Ctrl-K
        0x0C => Some((Command::ClearScreen, 1)),     // Ctrl-L
        0x0D => Some((Command::Enter, 1)),           // Ctrl-M / CR
        0x0E => Some((Command::MoveDown, 1)),        // Ctrl-N
        0x10 => Some((Command::MoveUp, 1)),          // Ctrl-P
        0x7F => Some((Command::DeleteBack, 1)),
        0x1B => decode_escape(buf),
        0x00..=0x1F => Some((Command::Noop, 1)), // unmapped control bytes: consumed, no effect
        _ => Some((Command::Literal(b0), 1)), // printable bytes pass through
    }
}

fn decode_escape(buf: &[u8]) -> Option<(Command, usize)> {
    if buf.len() < 2 {
        return None; // need more bytes to know if this is a real sequence
    }
    match buf[1] {
        b'[' => decode_csi(buf),
        b'O' => {
            if buf.len() < 3 {
                return None;
            }
            match buf[2] {
                b'H' => Some((Command::MoveHome, 3)),
                b'F' => Some((Command::MoveEnd, 3)),
                _ => Some((Command::Esc, 1)),
            }
        }
        _ => Some((Command::Esc, 1)),
    }
}

fn decode_csi(buf: &[u8]) -> Option<(Command, usize)> {
    if buf.len() < 3 {
        return None;
    }
    match buf[2] {
        b'A' => Some((Command::MoveUp, 3)),
        b'B' => Some((Command::MoveDown, 3)),
        b'C' => Some((Command::MoveRight, 3)),
        b'D' => Some((Command::MoveLeft, 3)),
        b'H' => Some((Command::MoveHome, 3)),
        b'F' => Some((Command::MoveEnd, 3)),
        b'Z' => Some((Command::ShiftTab, 3)),
        b'3' => {
            if buf.len() < 4 {
                return None;
            }
            if buf[3] == b'~' {
                Some((Command::DeleteForward, 4))
            } else {
                Some((Command::Esc, 1))
            }
        }
        _ => Some((Command::Esc, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_chars() {
        assert_eq!(decode(&[0x01]), Some((Command::MoveHome, 1)));
        assert_eq!(decode(&[0x7F]), Some((Command::DeleteBack, 1)));
        assert_eq!(decode(&[0x0D]), Some((Command::Enter, 1)));
    }

    #[test]
    fn literal_chars() {
        assert_eq!(decode(b"x"), Some((Command::Literal(b'x'), 1)));
    }

    #[test]
    fn unmapped_control_bytes_are_noop_not_literal() {
        assert_eq!(decode(&[0x07]), Some((Command::Noop, 1)));
        assert_eq!(decode(&[0x11]), Some((Command::Noop, 1)));
        assert_eq!(decode(&[0x1F]), Some((Command::Noop, 1)));
    }

    #[test]
    fn arrow_sequences() {
        assert_eq!(decode(b"\x1b[D"), Some((Command::MoveLeft, 3)));
        assert_eq!(decode(b"\x1b[A"), Some((Command::MoveUp, 3)));
    }

    #[test]
    fn delete_forward_sequence() {
        assert_eq!(decode(b"\x1b[3~"), Some((Command::DeleteForward, 4)));
    }

    #[test]
    fn shift_tab() {
        assert_eq!(decode(b"\x1b[Z"), Some((Command::ShiftTab, 3)));
    }

    #[test]
    fn incomplete_escape_requests_more_bytes() {
        assert_eq!(decode(b"\x1b"), None);
        assert_eq!(decode(b"\x1b["), None);
        assert_eq!(decode(b"\x1b[3"), None);
    }

    #[test]
    fn bare_escape() {
        assert_eq!(decode(b"\x1bq"), Some((Command::Esc, 1)));
    }

    #[test]
    fn ss3_home_end() {
        assert_eq!(decode(b"\x1bOH"), Some((Command::MoveHome, 3)));
        assert_eq!(decode(b"\x1bOF"), Some((Command::MoveEnd, 3)));
    }
}
