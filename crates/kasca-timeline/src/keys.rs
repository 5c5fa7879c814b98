// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Physical key code resolution
//!
//! Maps a physical key code plus the current modifier state to the editing
//! action it performs on a US keyboard layout.

use std::collections::BTreeSet;

use crate::event::InputEvent;

pub const SHIFT_CODES: [&str; 3] = ["Shift", "ShiftLeft", "ShiftRight"];
pub const CAPS_LOCK: &str = "CapsLock";

/// Tracks Shift (held) and CapsLock (toggled) from the key event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierTracker {
    shift_held: BTreeSet<String>,
    caps_lock: bool,
}

impl ModifierTracker {
    pub fn observe(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown { code, .. } if is_shift(code) => {
                self.shift_held.insert(code.clone());
            }
            InputEvent::KeyUp { code, .. } if is_shift(code) => {
                self.shift_held.remove(code);
            }
            InputEvent::KeyDown { code, .. } if code == CAPS_LOCK => {
                self.caps_lock = !self.caps_lock;
            }
            _ => {}
        }
    }

    pub fn shift(&self) -> bool {
        !self.shift_held.is_empty()
    }

    pub fn caps_lock(&self) -> bool {
        self.caps_lock
    }
}

pub fn is_shift(code: &str) -> bool {
    SHIFT_CODES.contains(&code)
}

/// What a key press does to the text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Insert(char),
    Backspace,
    Delete,
    CursorLeft,
    CursorRight,
    /// Modifiers, function keys and anything else without a text effect.
    Ignore,
}

/// (code, unshifted, shifted) for the non-letter printable keys.
const SYMBOL_KEYS: &[(&str, char, char)] = &[
    ("Space", ' ', ' '),
    ("Minus", '-', '_'),
    ("Equal", '=', '+'),
    ("BracketLeft", '[', '{'),
    ("BracketRight", ']', '}'),
    ("Backslash", '\\', '|'),
    ("IntlBackslash", '\\', '|'),
    ("Semicolon", ';', ':'),
    ("Quote", '\'', '"'),
    ("Backquote", '`', '~'),
    ("Comma", ',', '<'),
    ("Period", '.', '>'),
    ("Slash", '/', '?'),
    ("NumpadDecimal", '.', '.'),
    ("NumpadAdd", '+', '+'),
    ("NumpadSubtract", '-', '-'),
    ("NumpadMultiply", '*', '*'),
    ("NumpadDivide", '/', '/'),
];

const SHIFTED_DIGITS: [char; 10] = [')', '!', '@', '#', '$', '%', '^', '&', '*', '('];

/// Resolve a key press against the current modifier state.
///
/// Besides physical codes, single-character keys (as logged by older
/// clients) are accepted and inserted verbatim, with letter case following
/// Shift/CapsLock.
pub fn resolve_key(code: &str, modifiers: &ModifierTracker) -> KeyAction {
    let shift = modifiers.shift();
    let upper = shift != modifiers.caps_lock();

    match code {
        "Backspace" => return KeyAction::Backspace,
        "Delete" => return KeyAction::Delete,
        "Enter" | "NumpadEnter" => return KeyAction::Insert('\n'),
        "Tab" => return KeyAction::Insert('\t'),
        "ArrowLeft" => return KeyAction::CursorLeft,
        "ArrowRight" => return KeyAction::CursorRight,
        _ => {}
    }

    if let Some(letter) = single_char(code.strip_prefix("Key").unwrap_or("")) {
        if letter.is_ascii_alphabetic() {
            return KeyAction::Insert(apply_case(letter, upper));
        }
    }

    if let Some(digit) = single_char(code.strip_prefix("Digit").unwrap_or("")) {
        if let Some(value) = digit.to_digit(10) {
            let c = if shift {
                SHIFTED_DIGITS[value as usize]
            } else {
                digit
            };
            return KeyAction::Insert(c);
        }
    }

    if let Some(digit) = single_char(code.strip_prefix("Numpad").unwrap_or("")) {
        if digit.is_ascii_digit() {
            return KeyAction::Insert(digit);
        }
    }

    if let Some((_, plain, shifted)) = SYMBOL_KEYS.iter().find(|(name, _, _)| *name == code) {
        return KeyAction::Insert(if shift { *shifted } else { *plain });
    }

    match single_char(code) {
        Some(c) if c.is_alphabetic() => KeyAction::Insert(apply_case(c, upper)),
        Some(c) if !c.is_control() => KeyAction::Insert(c),
        _ => KeyAction::Ignore,
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn apply_case(c: char, upper: bool) -> char {
    let converted: Vec<char> = if upper {
        c.to_uppercase().collect()
    } else {
        c.to_lowercase().collect()
    };
    // Multi-char case mappings (e.g. 'ß') keep the original character.
    match converted.as_slice() {
        [mapped] => *mapped,
        _ => c,
    }
}
