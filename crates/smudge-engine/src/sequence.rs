//! Digit-sequence controller.
//!
//! Tracks which of the N challenge slots is unlockable. Solved slots always
//! form a prefix; the active index moves forward by exactly one per correct
//! entry and only goes back when a new controller replaces this one.

use rand::Rng;
use serde::Serialize;

use smudge_common::SmudgeError;

/// Result of one slot submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    /// Not the active slot, already solved, or sequence finished
    Ignored,
    /// Text was not a single digit; the field should be cleared
    InvalidInput { index: usize },
    /// Wrong digit; the field should be cleared
    Rejected { index: usize },
    /// Correct digit; `next` is the newly active slot
    Accepted { index: usize, next: usize },
    /// Last slot solved. Fires once per controller.
    Complete {
        digits: Vec<u8>,
        elapsed_ms: Option<u64>,
    },
}

/// What the rendering layer may show for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "digit", rename_all = "snake_case")]
pub enum SlotView {
    Solved(u8),
    Active(u8),
    Obscured,
}

/// Ordered target digits with solved flags and a single active pointer
#[derive(Debug, Clone)]
pub struct DigitSequenceController {
    digits: Vec<u8>,
    solved: Vec<bool>,
    active: usize,
    completed: bool,
}

impl DigitSequenceController {
    /// Random digits 0-9
    pub fn generate<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let digits = (0..len).map(|_| rng.random_range(0..10u8)).collect();
        Self::with_digits(digits)
    }

    /// Fixed digits; each must be 0-9 and there must be at least one
    pub fn from_digits(digits: Vec<u8>) -> Result<Self, SmudgeError> {
        if digits.is_empty() {
            return Err(SmudgeError::InvalidInput("empty digit sequence".to_string()));
        }
        if let Some(bad) = digits.iter().find(|d| **d > 9) {
            return Err(SmudgeError::InvalidInput(format!("{} is not a digit", bad)));
        }
        Ok(Self::with_digits(digits))
    }

    fn with_digits(digits: Vec<u8>) -> Self {
        let len = digits.len();
        Self {
            digits,
            solved: vec![false; len],
            active: 0,
            completed: false,
        }
    }

    /// Submit raw field text for a slot
    pub fn submit_raw(&mut self, index: usize, text: &str, elapsed_ms: Option<u64>) -> SlotEvent {
        if !self.is_open(index) {
            return SlotEvent::Ignored;
        }
        match parse_digit(text) {
            Some(value) => self.submit(index, value, elapsed_ms),
            None => {
                tracing::debug!(index, "Non-digit input cleared");
                SlotEvent::InvalidInput { index }
            }
        }
    }

    /// Submit a digit for a slot.
    ///
    /// `elapsed_ms` is the time since first interaction and is carried by the
    /// completion event.
    pub fn submit(&mut self, index: usize, value: u8, elapsed_ms: Option<u64>) -> SlotEvent {
        if !self.is_open(index) {
            return SlotEvent::Ignored;
        }

        if self.digits[index] != value {
            tracing::debug!(index, "Slot rejected");
            return SlotEvent::Rejected { index };
        }

        self.solved[index] = true;
        self.active += 1;

        if self.active == self.digits.len() {
            self.completed = true;
            return SlotEvent::Complete {
                digits: self.digits.clone(),
                elapsed_ms,
            };
        }

        tracing::debug!(index, next = self.active, "Slot solved");
        SlotEvent::Accepted { index, next: self.active }
    }

    /// Only the active, unsolved slot of an unfinished sequence is interactive
    fn is_open(&self, index: usize) -> bool {
        !self.completed && index == self.active && !self.solved[index]
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn is_solved(&self, index: usize) -> bool {
        self.solved.get(index).copied().unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn digits(&self) -> &[u8] {
        &self.digits
    }

    /// Solved and active slots are revealed; the rest stay obscured
    pub fn reveal(&self) -> Vec<SlotView> {
        self.digits
            .iter()
            .enumerate()
            .map(|(i, &digit)| {
                if self.solved[i] {
                    SlotView::Solved(digit)
                } else if i == self.active {
                    SlotView::Active(digit)
                } else {
                    SlotView::Obscured
                }
            })
            .collect()
    }
}

fn parse_digit(text: &str) -> Option<u8> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_digit(10).map(|d| d as u8),
        _ => None,
    }
}
