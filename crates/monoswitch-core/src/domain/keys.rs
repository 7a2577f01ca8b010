//! Key combinations for global hotkeys.
//!
//! A `KeyCombination` pairs a set of modifiers with one key, written in config
//! files as `"Ctrl+Alt+1"` or `"Win+F5"`.  The numeric values deliberately
//! line up with what the OS hotkey registration call expects: `Modifiers`
//! bits match the Win32 `MOD_*` constants and `Key` holds a Windows
//! virtual-key code.  Keeping the tables here (rather than in the FFI
//! adapter) means the config layer and tests can parse and format
//! combinations without touching any OS API.

use std::fmt;

use thiserror::Error;

/// Modifier set for a hotkey.  Bit values match the Win32 `MOD_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const ALT: u8 = 0x01;
    pub const CONTROL: u8 = 0x02;
    pub const SHIFT: u8 = 0x04;
    pub const WIN: u8 = 0x08;

    pub fn none() -> Self {
        Modifiers(0)
    }

    pub fn with(self, flag: u8) -> Self {
        Modifiers(self.0 | flag)
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in [
            (Modifiers::CONTROL, "Ctrl"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::WIN, "Win"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A Windows virtual-key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(pub u32);

/// Named non-alphanumeric keys accepted in config files.
const NAMED_KEYS: &[(&str, u32)] = &[
    ("Space", 0x20),
    ("Tab", 0x09),
    ("Enter", 0x0D),
    ("Return", 0x0D),
    ("Escape", 0x1B),
    ("Esc", 0x1B),
    ("Backspace", 0x08),
    ("Insert", 0x2D),
    ("Delete", 0x2E),
    ("Home", 0x24),
    ("End", 0x23),
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("Left", 0x25),
    ("Up", 0x26),
    ("Right", 0x27),
    ("Down", 0x28),
    ("Pause", 0x13),
    ("PrintScreen", 0x2C),
    ("ScrollLock", 0x91),
];

impl Key {
    pub fn code(self) -> u32 {
        self.0
    }

    /// Parses a single key token: a letter, a digit, `F1`–`F24`,
    /// `Numpad0`–`Numpad9`, or one of the named keys.
    pub fn parse(token: &str) -> Result<Key, KeyParseError> {
        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_alphanumeric() {
                return Ok(Key(c.to_ascii_uppercase() as u32));
            }
        }
        if let Some(n) = token.strip_prefix('F').and_then(|r| r.parse::<u32>().ok()) {
            if (1..=24).contains(&n) {
                return Ok(Key(0x70 + n - 1));
            }
        }
        if let Some(n) = token
            .strip_prefix("Numpad")
            .and_then(|r| r.parse::<u32>().ok())
        {
            if n <= 9 {
                return Ok(Key(0x60 + n));
            }
        }
        if let Some((_, code)) = NAMED_KEYS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
        {
            return Ok(Key(*code));
        }
        Err(KeyParseError::UnknownKey(token.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x30..=0x39 | 0x41..=0x5A => write!(f, "{}", self.0 as u8 as char),
            0x70..=0x87 => write!(f, "F{}", self.0 - 0x70 + 1),
            0x60..=0x69 => write!(f, "Numpad{}", self.0 - 0x60),
            code => match NAMED_KEYS.iter().find(|(_, c)| *c == code) {
                Some((name, _)) => write!(f, "{name}"),
                None => write!(f, "0x{code:02X}"),
            },
        }
    }
}

/// A global hotkey: modifier set plus one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombination {
    pub modifiers: Modifiers,
    pub key: Key,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("empty key combination")]
    Empty,
    #[error("unknown modifier \"{0}\"")]
    UnknownModifier(String),
    #[error("unknown key \"{0}\"")]
    UnknownKey(String),
}

impl KeyCombination {
    pub fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    /// Parses `"Ctrl+Alt+1"` style strings.  The last `+`-separated token is
    /// the key; everything before it must be a modifier name.
    pub fn parse(input: &str) -> Result<Self, KeyParseError> {
        let tokens: Vec<&str> = input
            .split('+')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        let (key_token, modifier_tokens) = tokens.split_last().ok_or(KeyParseError::Empty)?;

        let mut modifiers = Modifiers::none();
        for token in modifier_tokens {
            let flag = match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => Modifiers::CONTROL,
                "alt" => Modifiers::ALT,
                "shift" => Modifiers::SHIFT,
                "win" | "super" | "meta" => Modifiers::WIN,
                _ => return Err(KeyParseError::UnknownModifier(token.to_string())),
            };
            modifiers = modifiers.with(flag);
        }

        Ok(KeyCombination {
            modifiers,
            key: Key::parse(key_token)?,
        })
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}+{}", self.modifiers, self.key)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ctrl_alt_digit() {
        let combo = KeyCombination::parse("Ctrl+Alt+1").unwrap();
        assert!(combo.modifiers.contains(Modifiers::CONTROL));
        assert!(combo.modifiers.contains(Modifiers::ALT));
        assert!(!combo.modifiers.contains(Modifiers::SHIFT));
        assert_eq!(combo.key, Key('1' as u32));
    }

    #[test]
    fn test_parse_is_case_insensitive_for_modifiers() {
        let combo = KeyCombination::parse("ctrl+SHIFT+F5").unwrap();
        assert!(combo.modifiers.contains(Modifiers::CONTROL));
        assert!(combo.modifiers.contains(Modifiers::SHIFT));
        assert_eq!(combo.key, Key(0x74)); // VK_F5
    }

    #[test]
    fn test_parse_named_and_numpad_keys() {
        assert_eq!(Key::parse("ScrollLock").unwrap(), Key(0x91));
        assert_eq!(Key::parse("Numpad7").unwrap(), Key(0x67));
        assert_eq!(Key::parse("escape").unwrap(), Key(0x1B));
    }

    #[test]
    fn test_parse_bare_key_has_no_modifiers() {
        let combo = KeyCombination::parse("F12").unwrap();
        assert!(combo.modifiers.is_empty());
        assert_eq!(combo.key, Key(0x7B));
    }

    #[test]
    fn test_parse_rejects_unknown_tokens() {
        assert_eq!(
            KeyCombination::parse("Hyper+A"),
            Err(KeyParseError::UnknownModifier("Hyper".to_string()))
        );
        assert_eq!(
            KeyCombination::parse("Ctrl+NoSuchKey"),
            Err(KeyParseError::UnknownKey("NoSuchKey".to_string()))
        );
        assert_eq!(KeyCombination::parse("  "), Err(KeyParseError::Empty));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for input in ["Ctrl+Alt+1", "Shift+Win+F11", "Ctrl+Numpad3", "ScrollLock"] {
            let combo = KeyCombination::parse(input).unwrap();
            let reparsed = KeyCombination::parse(&combo.to_string()).unwrap();
            assert_eq!(combo, reparsed, "round trip failed for {input}");
        }
    }

    #[test]
    fn test_modifier_display_order_is_canonical() {
        let combo = KeyCombination::parse("alt+ctrl+D").unwrap();
        assert_eq!(combo.to_string(), "Ctrl+Alt+D");
    }
}
