//! Static symbol table, name lookups and the text a symbol produces when typed.
use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;

mod case;
mod table;

pub use case::{convert_case, is_alphabetic, is_lower, is_upper, to_lower, to_upper};
pub use x11rb::protocol::xproto::Keysym;

pub const NO_SYMBOL: Keysym = 0;

/// Symbols at and above this value encode a unicode code point.
pub(crate) const UNICODE_OFFSET: Keysym = 0x0100_0000;

static BY_NAME: Lazy<HashMap<&'static str, Keysym>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(table::KEYSYMS.len());
    for (name, sym) in table::KEYSYMS {
        map.entry(*name).or_insert(*sym);
    }
    map
});

static BY_FOLDED_NAME: Lazy<HashMap<String, Keysym>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(table::KEYSYMS.len());
    for (name, sym) in table::KEYSYMS {
        map.entry(name.to_ascii_lowercase()).or_insert(*sym);
    }
    map
});

static BY_SYM: Lazy<HashMap<Keysym, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(table::KEYSYMS.len());
    for (name, sym) in table::KEYSYMS {
        map.entry(*sym).or_insert(*name);
    }
    map
});

static TEXT: Lazy<HashMap<Keysym, &'static str>> =
    Lazy::new(|| table::TEXT_OVERRIDES.iter().copied().collect());

/// Resolves a key name to its symbol.
///
/// Exact names win, after that the lowercased and capitalized spellings are tried
/// before falling back to a case-insensitive match. `U20AC` style unicode names and
/// `0x1008ff14` style hex literals are accepted as well.
#[must_use]
pub fn keysym_from_name(name: &str) -> Option<Keysym> {
    if name.is_empty() {
        return None;
    }
    if let Some(sym) = BY_NAME.get(name) {
        return Some(*sym);
    }
    let lower = name.to_lowercase();
    if let Some(sym) = BY_NAME.get(lower.as_str()) {
        return Some(*sym);
    }
    if let Some(sym) = BY_NAME.get(capitalize(&lower).as_str()) {
        return Some(*sym);
    }
    if let Some(sym) = BY_FOLDED_NAME.get(&name.to_ascii_lowercase()) {
        return Some(*sym);
    }
    parse_numeric(name)
}

/// The canonical name of a symbol, the first name registered for it wins.
#[must_use]
pub fn keysym_name(sym: Keysym) -> Option<&'static str> {
    BY_SYM.get(&sym).copied()
}

/// Printable text for a symbol.
///
/// Punctuation renders as its character, named symbols as their name and unicode symbols
/// as the encoded character. An empty string means the symbol has no printable form.
#[must_use]
pub fn keysym_text(sym: Keysym) -> Cow<'static, str> {
    if let Some(text) = TEXT.get(&sym) {
        return Cow::Borrowed(*text);
    }
    if let Some(name) = keysym_name(sym) {
        return Cow::Borrowed(name);
    }
    match unicode_char(sym) {
        Some(ch) => Cow::Owned(ch.to_string()),
        None => Cow::Borrowed(""),
    }
}

/// The character a unicode-range symbol encodes.
pub(crate) fn unicode_char(sym: Keysym) -> Option<char> {
    if (UNICODE_OFFSET..=UNICODE_OFFSET + 0x10_ffff).contains(&sym) {
        char::from_u32(sym - UNICODE_OFFSET)
    } else {
        None
    }
}

/// Maps a code point to its symbol, Latin-1 code points keep their legacy values.
pub(crate) fn keysym_for_char(ch: char) -> Keysym {
    let cp = u32::from(ch);
    if (0x20..=0x7e).contains(&cp) || (0xa0..=0xff).contains(&cp) {
        cp
    } else {
        UNICODE_OFFSET + cp
    }
}

fn parse_numeric(name: &str) -> Option<Keysym> {
    if let Some(hex) = name
        .strip_prefix("0x")
        .or_else(|| name.strip_prefix("0X"))
    {
        return Keysym::from_str_radix(hex, 16).ok();
    }
    let code_point = name
        .strip_prefix("U+")
        .or_else(|| name.strip_prefix('U'))
        .or_else(|| name.strip_prefix('u'))?;
    if code_point.is_empty() || !code_point.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let ch = u32::from_str_radix(code_point, 16)
        .ok()
        .and_then(char::from_u32)?;
    Some(keysym_for_char(ch))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
