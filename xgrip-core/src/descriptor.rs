//! Binding descriptors of the form `(Modifier-)*Key`, such as `Control-Shift-a` or `Mod4-3`.
use x11rb::protocol::xproto::{Button, Keycode, ModMask};

use crate::error::{Error, ParseFailure, Result};
use crate::keyboard::KeyboardMapping;
use crate::keysym::keysym_from_name;

const MODIFIERS: [(&str, ModMask); 9] = [
    ("shift", ModMask::SHIFT),
    ("lock", ModMask::LOCK),
    ("control", ModMask::CONTROL),
    ("mod1", ModMask::M1),
    ("mod2", ModMask::M2),
    ("mod3", ModMask::M3),
    ("mod4", ModMask::M4),
    ("mod5", ModMask::M5),
    ("any", ModMask::ANY),
];

fn modifier(token: &str) -> Option<u16> {
    MODIFIERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(token))
        .map(|(_, mask)| u16::from(*mask))
}

/// Splits a descriptor into its modifier mask and its single key token.
pub fn split(descriptor: &str) -> Result<(u16, &str)> {
    let mut mods = 0;
    let mut key: Option<&str> = None;
    for token in descriptor.split('-').filter(|token| !token.is_empty()) {
        if let Some(mask) = modifier(token) {
            mods |= mask;
        } else if let Some(previous) = key {
            return Err(Error::parse(
                descriptor,
                ParseFailure::MultipleKeys(previous.to_owned(), token.to_owned()),
            ));
        } else {
            key = Some(token);
        }
    }
    match key {
        Some(key) => Ok((mods, key)),
        None => Err(Error::parse(descriptor, ParseFailure::MissingKey)),
    }
}

/// Parses a key descriptor into a modifier mask and the code currently producing the key.
pub fn parse_key(descriptor: &str, keyboard: &KeyboardMapping) -> Result<(u16, Keycode)> {
    let (mods, key) = split(descriptor)?;
    let sym = keysym_from_name(key)
        .ok_or_else(|| Error::parse(descriptor, ParseFailure::UnknownKey(key.to_owned())))?;
    let code = keyboard
        .keycode_for(sym)
        .ok_or_else(|| Error::parse(descriptor, ParseFailure::Unmapped(key.to_owned())))?;
    Ok((mods, code))
}

/// Parses a button descriptor into a modifier mask and a button number.
pub fn parse_button(descriptor: &str) -> Result<(u16, Button)> {
    let (mods, key) = split(descriptor)?;
    match key.parse::<Button>() {
        Ok(button) if button > 0 => Ok((mods, button)),
        _ => Err(Error::parse(
            descriptor,
            ParseFailure::InvalidButton(key.to_owned()),
        )),
    }
}

/// Renders a mask the way a descriptor spells it, `shift-control` for example.
#[must_use]
pub fn modifier_string(mods: u16) -> String {
    MODIFIERS
        .iter()
        .filter(|(_, mask)| mods & u16::from(*mask) != 0)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join("-")
}
