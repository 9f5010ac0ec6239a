//! Digit-by-digit entry of a fixed-length number with four keys.

use crate::{app::input::Key, display::Display, Result};

const START_DIGIT: u8 = 5;

/// What the owner should do after a key went into the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Continue,
    /// LEFT with nothing left to delete, or LEFT on the confirmation screen.
    Exit,
    /// The last digit was committed; carries the full number.
    Submitted(String),
}

#[derive(Debug, Clone)]
pub struct NumericEntry {
    prompt: String,
    length: usize,
    typed: String,
    current: u8,
    complete: bool,
}

impl NumericEntry {
    pub fn new(prompt: impl Into<String>, length: usize) -> Self {
        Self {
            prompt: prompt.into(),
            length: length.max(1),
            typed: String::new(),
            current: START_DIGIT,
            complete: false,
        }
    }

    /// Reset and draw. A `start` value of at most `length` digits pre-fills the entry with
    /// its last digit left editable.
    pub fn enter(&mut self, start: Option<&str>, display: &mut dyn Display) -> Result<()> {
        self.reset(start);
        display.clear()?;
        self.render(display)
    }

    pub fn reset(&mut self, start: Option<&str>) {
        self.complete = false;
        self.typed.clear();
        self.current = START_DIGIT;
        let Some(start) = start.filter(|s| {
            !s.is_empty() && s.len() <= self.length && s.bytes().all(|b| b.is_ascii_digit())
        }) else {
            return;
        };
        let (head, last) = start.split_at(start.len() - 1);
        self.typed.push_str(head);
        self.current = last.as_bytes()[0] - b'0';
    }

    /// Apply one key without drawing.
    pub fn press(&mut self, key: Key) -> EntryOutcome {
        if self.complete {
            return if key == Key::Left {
                EntryOutcome::Exit
            } else {
                EntryOutcome::Continue
            };
        }
        match key {
            Key::Right => {
                self.typed.push(char::from(b'0' + self.current));
                if self.typed.len() == self.length {
                    self.complete = true;
                    return EntryOutcome::Submitted(self.typed.clone());
                }
                self.current = START_DIGIT;
            }
            Key::Left => match self.typed.pop() {
                Some(digit) => self.current = digit.to_digit(10).map_or(START_DIGIT, |d| d as u8),
                None => return EntryOutcome::Exit,
            },
            Key::Up => self.current = (self.current + 1) % 10,
            Key::Down => self.current = (self.current + 9) % 10,
            Key::Other => {}
        }
        EntryOutcome::Continue
    }

    /// Apply a key (or a tick, `None`) and redraw while still editing.
    pub fn update(&mut self, key: Option<Key>, display: &mut dyn Display) -> Result<EntryOutcome> {
        let Some(key) = key else {
            return Ok(EntryOutcome::Continue);
        };
        let outcome = self.press(key);
        if outcome == EntryOutcome::Continue && !self.complete {
            self.render(display)?;
        }
        Ok(outcome)
    }

    pub fn render(&self, display: &mut dyn Display) -> Result<()> {
        display.display_string(&self.prompt, 0)?;
        display.display_string(&self.shown(), 1)
    }

    /// Typed digits, the editable digit, then `_` up to the full length.
    pub fn shown(&self) -> String {
        let mut shown = format!("{}{}", self.typed, self.current);
        while shown.len() < self.length {
            shown.push('_');
        }
        shown
    }

    pub fn typed(&self) -> &str {
        &self.typed
    }

    pub fn current_digit(&self) -> u8 {
        self.current
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemoryDisplay;
    use proptest::prelude::*;

    /// Keys that move the editable digit from `from` to `to` the short way round.
    fn dial(from: u8, to: u8) -> Vec<Key> {
        let up = (to + 10 - from) % 10;
        if up <= 5 {
            vec![Key::Up; usize::from(up)]
        } else {
            vec![Key::Down; usize::from(10 - up)]
        }
    }

    #[test]
    fn starts_at_five_with_placeholders() {
        let mut display = MemoryDisplay::new(16, 2);
        let mut entry = NumericEntry::new("Enter Token", 9);
        entry.enter(None, &mut display).unwrap();
        assert_eq!(display.line(0), "Enter Token     ");
        assert_eq!(display.line(1), "5________       ");
    }

    #[test]
    fn digits_wrap_both_ways() {
        let mut entry = NumericEntry::new("x", 3);
        entry.reset(None);
        for _ in 0..5 {
            entry.press(Key::Up);
        }
        assert_eq!(entry.current_digit(), 0);
        entry.press(Key::Down);
        assert_eq!(entry.current_digit(), 9);
    }

    #[test]
    fn nine_digit_token_with_one_backspace() {
        let target = "314159265";
        let mut display = MemoryDisplay::new(16, 2);
        let mut entry = NumericEntry::new("Enter Token", 9);
        entry.enter(None, &mut display).unwrap();

        let mut outcome = EntryOutcome::Continue;
        let mut current = START_DIGIT;
        for (i, ch) in target.bytes().enumerate() {
            let digit = ch - b'0';
            for key in dial(current, digit) {
                entry.update(Some(key), &mut display).unwrap();
            }
            if i == 4 {
                // Commit a wrong digit, then take it back.
                entry.update(Some(Key::Right), &mut display).unwrap();
                entry.update(Some(Key::Up), &mut display).unwrap();
                entry.update(Some(Key::Left), &mut display).unwrap();
                assert_eq!(entry.current_digit(), digit);
            }
            outcome = entry.update(Some(Key::Right), &mut display).unwrap();
            current = START_DIGIT;
        }
        assert_eq!(outcome, EntryOutcome::Submitted(target.to_string()));
        assert!(entry.is_complete());
    }

    #[test]
    fn confirmation_only_exits_on_left() {
        let mut entry = NumericEntry::new("x", 1);
        entry.reset(None);
        assert_eq!(entry.press(Key::Right), EntryOutcome::Submitted("5".into()));
        assert_eq!(entry.press(Key::Up), EntryOutcome::Continue);
        assert_eq!(entry.press(Key::Right), EntryOutcome::Continue);
        assert_eq!(entry.press(Key::Left), EntryOutcome::Exit);
    }

    #[test]
    fn left_on_empty_entry_exits() {
        let mut entry = NumericEntry::new("x", 4);
        entry.reset(None);
        assert_eq!(entry.press(Key::Left), EntryOutcome::Exit);
    }

    #[test]
    fn starting_value_leaves_last_digit_editable() {
        let mut entry = NumericEntry::new("LVD Thres. (mV):", 5);
        entry.reset(Some("11500"));
        assert_eq!(entry.typed(), "1150");
        assert_eq!(entry.current_digit(), 0);
        assert_eq!(entry.shown(), "11500");

        entry.reset(Some("12a"));
        assert_eq!(entry.shown(), "5____");
    }

    proptest! {
        #[test]
        fn commit_then_delete_restores_previous_state(
            moves in proptest::collection::vec(prop_oneof![Just(Key::Up), Just(Key::Down), Just(Key::Right)], 0..12),
            bumps in proptest::collection::vec(prop_oneof![Just(Key::Up), Just(Key::Down)], 0..5),
        ) {
            let mut display = MemoryDisplay::new(16, 2);
            let mut entry = NumericEntry::new("Code", 20);
            entry.enter(None, &mut display).unwrap();
            for key in moves {
                entry.update(Some(key), &mut display).unwrap();
            }
            let before = (entry.typed().to_string(), entry.current_digit(), display.lines().to_vec());

            entry.update(Some(Key::Right), &mut display).unwrap();
            for key in bumps {
                entry.update(Some(key), &mut display).unwrap();
            }
            entry.update(Some(Key::Left), &mut display).unwrap();

            let after = (entry.typed().to_string(), entry.current_digit(), display.lines().to_vec());
            prop_assert_eq!(before, after);
        }
    }
}
