//! # Numpad Module
//!
//! Modal capture of one numeric value (quantity, weight, cash or price).
//!
//! ## State Machine
//! ```text
//!                begin(mode, target?)
//!                       │
//!                       ▼
//!   ┌──────────────────────────────────────┐
//!   │ Capturing { mode, target, buffer }   │◄── press(Digit | Decimal |
//!   └───────────┬──────────────┬───────────┘         Backspace | Clear)
//!               │ commit()     │ cancel()
//!               ▼              ▼
//!        Committed(value)   Cancelled
//! ```
//!
//! A session captures exactly one value. It does not queue: the owner
//! decides whether a second capture may be opened.
//!
//! ## Parsing
//! The buffer is parsed on commit and fails closed to zero, so a buffer
//! like `"."` commits `0`.

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::quantity::Quantity;

/// Longest buffer the keypad accepts, decimal point included.
pub const NUMPAD_MAX_LEN: usize = 9;

/// What the capture is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NumpadMode {
    Quantity,
    Weight,
    Cash,
    Price,
}

impl NumpadMode {
    /// Fraction digits accepted in this mode.
    pub const fn scale(&self) -> usize {
        match self {
            NumpadMode::Quantity => 0,
            NumpadMode::Weight => 3,
            NumpadMode::Cash | NumpadMode::Price => 2,
        }
    }
}

impl fmt::Display for NumpadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumpadMode::Quantity => write!(f, "quantity"),
            NumpadMode::Weight => write!(f, "weight"),
            NumpadMode::Cash => write!(f, "cash"),
            NumpadMode::Price => write!(f, "price"),
        }
    }
}

/// A key on the numpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "key", content = "digit")]
pub enum NumpadKey {
    Digit(u8),
    Decimal,
    Backspace,
    Clear,
}

/// The committed value, typed by mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum NumpadValue {
    Quantity(Quantity),
    Weight(Quantity),
    Cash(Money),
    Price(Money),
}

impl NumpadValue {
    pub fn mode(&self) -> NumpadMode {
        match self {
            NumpadValue::Quantity(_) => NumpadMode::Quantity,
            NumpadValue::Weight(_) => NumpadMode::Weight,
            NumpadValue::Cash(_) => NumpadMode::Cash,
            NumpadValue::Price(_) => NumpadMode::Price,
        }
    }

    fn parse(mode: NumpadMode, buffer: &str) -> Self {
        match mode {
            NumpadMode::Quantity => NumpadValue::Quantity(
                buffer
                    .parse::<i64>()
                    .map(Quantity::units)
                    .unwrap_or_else(|_| Quantity::zero()),
            ),
            NumpadMode::Weight => {
                NumpadValue::Weight(Quantity::parse_decimal(buffer).unwrap_or_else(Quantity::zero))
            }
            NumpadMode::Cash => NumpadValue::Cash(Money::parse_decimal(buffer).unwrap_or_else(Money::zero)),
            NumpadMode::Price => NumpadValue::Price(Money::parse_decimal(buffer).unwrap_or_else(Money::zero)),
        }
    }
}

/// A value resolved by a capture, with the line it targets (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumpadCommit {
    pub target: Option<String>,
    pub value: NumpadValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NumpadState {
    Capturing {
        mode: NumpadMode,
        target: Option<String>,
        buffer: String,
    },
    Committed(NumpadCommit),
    Cancelled,
}

/// One numpad capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumpadSession {
    state: NumpadState,
}

impl NumpadSession {
    /// Opens a capture in `mode`, optionally aimed at a cart line.
    pub fn begin(mode: NumpadMode, target: Option<String>) -> Self {
        NumpadSession {
            state: NumpadState::Capturing {
                mode,
                target,
                buffer: String::new(),
            },
        }
    }

    pub fn state(&self) -> &NumpadState {
        &self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, NumpadState::Capturing { .. })
    }

    pub fn mode(&self) -> Option<NumpadMode> {
        match &self.state {
            NumpadState::Capturing { mode, .. } => Some(*mode),
            NumpadState::Committed(commit) => Some(commit.value.mode()),
            NumpadState::Cancelled => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.state {
            NumpadState::Capturing { target, .. } => target.as_deref(),
            NumpadState::Committed(commit) => commit.target.as_deref(),
            NumpadState::Cancelled => None,
        }
    }

    /// Current text buffer (empty once resolved).
    pub fn buffer(&self) -> &str {
        match &self.state {
            NumpadState::Capturing { buffer, .. } => buffer,
            _ => "",
        }
    }

    /// Applies a key. Returns `false` when the key was ignored.
    ///
    /// Ignored keys: anything after the capture resolved, a second decimal
    /// point, a decimal point in quantity mode, digits past the mode's
    /// fraction precision or past [`NUMPAD_MAX_LEN`], and backspace on an
    /// empty buffer.
    pub fn press(&mut self, key: NumpadKey) -> bool {
        let NumpadState::Capturing { mode, buffer, .. } = &mut self.state else {
            return false;
        };

        match key {
            NumpadKey::Digit(d) if d <= 9 => {
                if buffer.len() >= NUMPAD_MAX_LEN {
                    return false;
                }
                if let Some((_, fraction)) = buffer.split_once('.') {
                    if fraction.len() >= mode.scale() {
                        return false;
                    }
                }
                // Leading zeros collapse: "0" then "5" is "5".
                if buffer == "0" {
                    buffer.clear();
                }
                buffer.push(char::from(b'0' + d));
                true
            }
            NumpadKey::Digit(_) => false,
            NumpadKey::Decimal => {
                if mode.scale() == 0 || buffer.contains('.') || buffer.len() >= NUMPAD_MAX_LEN {
                    return false;
                }
                if buffer.is_empty() {
                    buffer.push('0');
                }
                buffer.push('.');
                true
            }
            NumpadKey::Backspace => buffer.pop().is_some(),
            NumpadKey::Clear => {
                buffer.clear();
                true
            }
        }
    }

    /// Resolves the capture with the parsed buffer.
    ///
    /// Returns `None` if the capture was already resolved.
    pub fn commit(&mut self) -> Option<NumpadCommit> {
        let NumpadState::Capturing { mode, target, buffer } = &self.state else {
            return None;
        };

        let commit = NumpadCommit {
            target: target.clone(),
            value: NumpadValue::parse(*mode, buffer),
        };
        self.state = NumpadState::Committed(commit.clone());
        Some(commit)
    }

    /// Abandons the capture. No side effects. Returns `false` if already resolved.
    pub fn cancel(&mut self) -> bool {
        if !self.is_capturing() {
            return false;
        }
        self.state = NumpadState::Cancelled;
        true
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
