use std::io::{self, BufRead, Write};

use crate::error::KeypadError;

/// KEYINPUT bit for the A button.
pub const KEY_A: u16 = 1 << 0;
/// KEYINPUT with nothing held. The register is active-low.
pub const KEYS_RELEASED: u16 = 0x03FF;

/// Line-oriented text display.
pub trait Console {
    fn clear(&mut self) -> io::Result<()>;
    fn line(&mut self, text: &str) -> io::Result<()>;
}

/// A [`Console`] over any writer, clearing with ANSI home + erase.
pub struct TextConsole<W: Write> {
    out: W,
}

impl<W: Write> TextConsole<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Console for TextConsole<W> {
    fn clear(&mut self) -> io::Result<()> {
        self.out.write_all(b"\x1b[1;1H\x1b[2J")?;
        self.out.flush()
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }
}

/// A KEYINPUT-style status register: a bit is clear while its key is held.
pub trait Keypad {
    fn status(&mut self) -> Result<u16, KeypadError>;
}

/// Block until a key in `mask` is pressed and then released.
///
/// Busy-polls: first while the key reads as released, then while it reads
/// as held.
pub fn wait_for_key<K: Keypad + ?Sized>(keypad: &mut K, mask: u16) -> Result<(), KeypadError> {
    while keypad.status()? & mask != 0 {}
    while !keypad.status()? & mask != 0 {}
    Ok(())
}

/// Turns each line read from `input` into one press-and-release of `key`.
///
/// Reading the status while released blocks for the next line and reports
/// the key held; the following read reports it released again.
pub struct StdinKeypad<R: BufRead> {
    input: R,
    key: u16,
    held: bool,
}

impl<R: BufRead> StdinKeypad<R> {
    pub fn new(input: R, key: u16) -> Self {
        Self {
            input,
            key,
            held: false,
        }
    }
}

impl<R: BufRead> Keypad for StdinKeypad<R> {
    fn status(&mut self) -> Result<u16, KeypadError> {
        if self.held {
            self.held = false;
            return Ok(KEYS_RELEASED);
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(KeypadError::Closed);
        }
        self.held = true;
        Ok(KEYS_RELEASED & !self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        reads: VecDeque<u16>,
        polls: usize,
    }

    impl Keypad for Scripted {
        fn status(&mut self) -> Result<u16, KeypadError> {
            self.polls += 1;
            self.reads.pop_front().ok_or(KeypadError::Closed)
        }
    }

    #[test]
    fn wait_spins_through_press_and_release() {
        let held = KEYS_RELEASED & !KEY_A;
        let mut keys = Scripted {
            reads: VecDeque::from([KEYS_RELEASED, KEYS_RELEASED, held, held, held, KEYS_RELEASED]),
            polls: 0,
        };
        wait_for_key(&mut keys, KEY_A).unwrap();
        assert_eq!(keys.polls, 6);
        assert!(keys.reads.is_empty());
    }

    #[test]
    fn other_keys_do_not_count() {
        // B (bit 1) held, then A pressed and released.
        let b_held = KEYS_RELEASED & !(1 << 1);
        let a_held = KEYS_RELEASED & !KEY_A;
        let mut keys = Scripted {
            reads: VecDeque::from([b_held, a_held, KEYS_RELEASED]),
            polls: 0,
        };
        wait_for_key(&mut keys, KEY_A).unwrap();
        assert_eq!(keys.polls, 3);
    }

    #[test]
    fn stdin_line_is_one_press() {
        let mut keys = StdinKeypad::new(&b"\n\n"[..], KEY_A);
        wait_for_key(&mut keys, KEY_A).unwrap();
        wait_for_key(&mut keys, KEY_A).unwrap();
        assert!(matches!(wait_for_key(&mut keys, KEY_A), Err(KeypadError::Closed)));
    }

    #[test]
    fn text_console_output() {
        let mut console = TextConsole::new(Vec::new());
        console.clear().unwrap();
        console.line("passed: 1 total: 2").unwrap();
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out, "\x1b[1;1H\x1b[2Jpassed: 1 total: 2\n");
    }
}
