#![warn(missing_docs)]
//! `quire-keys` - keyboard shortcut names for `quire-core`.
//!
//! Extensions declare bindings with human-friendly names such as `Mod-Shift-z` or
//! `Ctrl-Space`. This crate turns those names (and incoming key presses) into a single canonical
//! spelling so that bindings contributed by different extensions land in the same chain.
//!
//! Canonical form: modifiers in the fixed order `Alt-Ctrl-Meta-Shift`, followed by the key.
//! `Mod` resolves to `Meta` on macOS and to `Ctrl` everywhere else.
//!
//! ```rust
//! use quire_keys::{Platform, Shortcut};
//!
//! let shortcut = Shortcut::parse("Shift-Mod-Enter", Platform::Other).unwrap();
//! assert_eq!(shortcut.to_string(), "Ctrl-Shift-Enter");
//!
//! let shortcut = Shortcut::parse("Mod-Enter", Platform::Mac).unwrap();
//! assert_eq!(shortcut.to_string(), "Meta-Enter");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

/// Errors produced while parsing a shortcut name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutError {
    #[error("shortcut has no key: '{0}'")]
    /// The shortcut string names modifiers only (or is empty).
    EmptyKey(String),

    #[error("unrecognized modifier '{modifier}' in shortcut '{shortcut}'")]
    /// A modifier segment is not one of the known names.
    UnknownModifier {
        /// The offending segment.
        modifier: String,
        /// The full shortcut string.
        shortcut: String,
    },
}

/// The platform used to resolve the `Mod` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// macOS / iOS: `Mod` is the command key (`Meta`).
    Mac,
    /// Everything else: `Mod` is `Ctrl`.
    Other,
}

impl Platform {
    /// The platform of the compile target.
    pub fn current() -> Self {
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            Platform::Mac
        } else {
            Platform::Other
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Modifier keys held during a shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    /// Alt / Option.
    pub alt: bool,
    /// Control.
    pub ctrl: bool,
    /// Meta / Command.
    pub meta: bool,
    /// Shift.
    pub shift: bool,
}

impl Modifiers {
    /// No modifiers.
    pub const NONE: Self = Self {
        alt: false,
        ctrl: false,
        meta: false,
        shift: false,
    };

    /// Returns `true` if no modifier is held.
    pub fn is_empty(&self) -> bool {
        !(self.alt || self.ctrl || self.meta || self.shift)
    }

    fn write_prefix(&self, out: &mut String, include_shift: bool) {
        if self.alt {
            out.push_str("Alt-");
        }
        if self.ctrl {
            out.push_str("Ctrl-");
        }
        if self.meta {
            out.push_str("Meta-");
        }
        if self.shift && include_shift {
            out.push_str("Shift-");
        }
    }
}

/// A parsed, normalized shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shortcut {
    /// Held modifiers.
    pub modifiers: Modifiers,
    /// Key name (`Enter`, `a`, `ArrowUp`, `" "` for space, ...).
    pub key: String,
}

impl Shortcut {
    /// Parse a shortcut name such as `Mod-Shift-z`.
    ///
    /// Modifier names are case-insensitive and accept the usual aliases (`Cmd`, `Control`,
    /// `Option`, single letters `a`/`c`/`m`/`s`). A trailing `-` is the minus key, so `Ctrl--`
    /// is Ctrl + minus. `Space` becomes `" "`. With Shift held, a lowercase letter key becomes the
    /// uppercase character it produces, so `Mod-Shift-z` and `Shift-Mod-Z` name the same shortcut.
    pub fn parse(name: &str, platform: Platform) -> Result<Self, ShortcutError> {
        let (prefix, key) = split_key(name);
        if key.is_empty() {
            return Err(ShortcutError::EmptyKey(name.to_string()));
        }

        let mut modifiers = Modifiers::NONE;
        for segment in prefix.split('-').filter(|s| !s.is_empty()) {
            match segment.to_ascii_lowercase().as_str() {
                "cmd" | "command" | "meta" | "m" => modifiers.meta = true,
                "alt" | "option" | "a" => modifiers.alt = true,
                "ctrl" | "control" | "c" => modifiers.ctrl = true,
                "shift" | "s" => modifiers.shift = true,
                "mod" => match platform {
                    Platform::Mac => modifiers.meta = true,
                    Platform::Other => modifiers.ctrl = true,
                },
                _ => {
                    return Err(ShortcutError::UnknownModifier {
                        modifier: segment.to_string(),
                        shortcut: name.to_string(),
                    });
                }
            }
        }

        let key = if key == "Space" { " " } else { key };
        let key = if modifiers.shift {
            shifted(key)
        } else {
            key.to_string()
        };
        Ok(Self { modifiers, key })
    }

    /// The canonical name used as the keymap lookup key.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.modifiers.write_prefix(&mut out, true);
        out.push_str(&self.key);
        out
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Normalize a shortcut name into its canonical spelling.
pub fn normalize(name: &str, platform: Platform) -> Result<String, ShortcutError> {
    Shortcut::parse(name, platform).map(|s| s.canonical())
}

fn split_key(name: &str) -> (&str, &str) {
    // `X--` and `-` both name the minus key.
    if let Some(prefix) = name.strip_suffix('-')
        && (prefix.is_empty() || prefix.ends_with('-'))
    {
        return (prefix, "-");
    }
    match name.rsplit_once('-') {
        Some((prefix, key)) => (prefix, key),
        None => ("", name),
    }
}

/// The character Shift produces for a single lowercase letter; any other key is unchanged.
fn shifted(key: &str) -> String {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_lowercase() => c.to_uppercase().collect(),
        _ => key.to_string(),
    }
}

/// A key press delivered by the host, as produced by the editing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    /// The key value (`"a"`, `"A"`, `"Enter"`, `" "`...). For character keys this is the
    /// produced character, so Shift+a arrives as `"A"`.
    pub key: String,
    /// Held modifiers.
    pub modifiers: Modifiers,
}

impl KeyPress {
    /// Create a key press without modifiers.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Modifiers::NONE,
        }
    }

    /// Builder: hold Alt.
    pub fn alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }

    /// Builder: hold Ctrl.
    pub fn ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    /// Builder: hold Meta.
    pub fn meta(mut self) -> Self {
        self.modifiers.meta = true;
        self
    }

    /// Builder: hold Shift.
    pub fn shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    /// Returns `true` if the key produces a single visible character.
    pub fn is_char(&self) -> bool {
        self.key != " " && self.key.graphemes(true).count() == 1
    }

    /// Canonical names to look up, in order.
    ///
    /// Character keys already encode Shift in the produced character, so they are tried without
    /// `Shift-` first and with it second. The second name spells a letter key in uppercase, the
    /// way [`Shortcut::parse`] does. Other keys yield a single name.
    pub fn candidates(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(2);
        if self.is_char() {
            let mut plain = String::new();
            self.modifiers.write_prefix(&mut plain, false);
            plain.push_str(&self.key);
            out.push(plain);
            if self.modifiers.shift {
                let mut name = String::new();
                self.modifiers.write_prefix(&mut name, true);
                name.push_str(&shifted(&self.key));
                out.push(name);
            }
        } else {
            let mut name = String::new();
            self.modifiers.write_prefix(&mut name, true);
            name.push_str(&self.key);
            out.push(name);
        }
        out
    }
}
