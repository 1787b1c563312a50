use serde::{Deserialize, Serialize};
use std::fmt;

/// Which symbol kind a codec instance accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolMode {
    /// Raw byte streams (binary blobs, CSV/JSON read as bytes).
    Byte,
    /// Signed integer series (time series, counters, deltas).
    Numeric,
    /// UTF-8 tokens produced by [`tokenize`].
    Token,
}

impl SymbolMode {
    pub fn wire_tag(self) -> u8 {
        match self {
            SymbolMode::Byte => 0,
            SymbolMode::Numeric => 1,
            SymbolMode::Token => 2,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SymbolMode::Byte),
            1 => Some(SymbolMode::Numeric),
            2 => Some(SymbolMode::Token),
            _ => None,
        }
    }
}

/// The atomic unit processed by the codec. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Byte(u8),
    Number(i64),
    Token(String),
}

impl Symbol {
    pub fn mode(&self) -> SymbolMode {
        match self {
            Symbol::Byte(_) => SymbolMode::Byte,
            Symbol::Number(_) => SymbolMode::Numeric,
            Symbol::Token(_) => SymbolMode::Token,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Byte(b) => write!(f, "byte 0x{:02x}", b),
            Symbol::Number(n) => write!(f, "number {}", n),
            Symbol::Token(t) => write!(f, "token {:?}", t),
        }
    }
}

impl From<u8> for Symbol {
    fn from(b: u8) -> Self {
        Symbol::Byte(b)
    }
}

impl From<i64> for Symbol {
    fn from(n: i64) -> Self {
        Symbol::Number(n)
    }
}

impl From<&str> for Symbol {
    fn from(t: &str) -> Self {
        Symbol::Token(t.to_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Space,
    Other,
}

fn class_of(c: char) -> CharClass {
    if c.is_alphanumeric() || c == '_' {
        CharClass::Word
    } else if c.is_whitespace() {
        CharClass::Space
    } else {
        CharClass::Other
    }
}

/// Splits structured text into tokens for [`SymbolMode::Token`].
///
/// Word runs and whitespace runs become one token each; every other
/// character (quotes, commas, braces, colons) is its own token, so JSON keys,
/// CSV separators and log templates recur as identical symbols.
/// Concatenating the tokens reproduces `text` exactly.
pub fn tokenize(text: &str) -> Vec<Symbol> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<CharClass> = None;

    for (idx, c) in text.char_indices() {
        let class = class_of(c);
        match current {
            Some(prev) if prev == class && class != CharClass::Other => {}
            Some(_) => {
                tokens.push(Symbol::Token(text[start..idx].to_string()));
                start = idx;
            }
            None => {}
        }
        current = Some(class);
    }
    if start < text.len() {
        tokens.push(Symbol::Token(text[start..].to_string()));
    }
    tokens
}

/// Inverse of [`tokenize`]. Returns `None` if any symbol is not a token.
pub fn detokenize(symbols: &[Symbol]) -> Option<String> {
    let mut out = String::new();
    for symbol in symbols {
        match symbol {
            Symbol::Token(t) => out.push_str(t),
            _ => return None,
        }
    }
    Some(out)
}
