//! Keyboard and modifier mappings and the rules that turn a key event into a symbol.
use std::borrow::Cow;
use std::collections::HashMap;

use x11rb::protocol::xproto::{Keycode, ModMask};

use crate::keysym::{convert_case, is_lower, keysym_text, to_upper, Keysym, NO_SYMBOL};

/// Symbol slots per code after interpretation, two per group.
pub const INTERPRETED_SYMBOLS: usize = 6;

const MODE_SWITCH: Keysym = 0xff7e;
const ISO_LEVEL3_SHIFT: Keysym = 0xfe03;

/// The symbols bound to each physical code, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardMapping {
    min_keycode: Keycode,
    keysyms_per_keycode: u8,
    keysyms: Vec<Keysym>,
}

impl KeyboardMapping {
    #[must_use]
    pub fn new(min_keycode: Keycode, keysyms_per_keycode: u8, keysyms: Vec<Keysym>) -> Self {
        Self {
            min_keycode,
            keysyms_per_keycode,
            keysyms,
        }
    }

    #[must_use]
    pub fn min_keycode(&self) -> Keycode {
        self.min_keycode
    }

    #[must_use]
    pub fn max_keycode(&self) -> Keycode {
        let last = usize::from(self.min_keycode) + self.keycode_count().saturating_sub(1);
        Keycode::try_from(last).unwrap_or(Keycode::MAX)
    }

    #[must_use]
    pub fn keysyms_per_keycode(&self) -> u8 {
        self.keysyms_per_keycode
    }

    fn keycode_count(&self) -> usize {
        if self.keysyms_per_keycode == 0 {
            return 0;
        }
        let count = self.keysyms.len() / usize::from(self.keysyms_per_keycode);
        count.min(256 - usize::from(self.min_keycode))
    }

    /// Every code this mapping describes, in ascending order.
    pub fn keycodes(&self) -> impl Iterator<Item = Keycode> + '_ {
        (0..self.keycode_count()).filter_map(|offset| {
            Keycode::try_from(usize::from(self.min_keycode) + offset).ok()
        })
    }

    /// The raw symbol row for a code, empty when the code is out of range.
    #[must_use]
    pub fn row(&self, code: Keycode) -> &[Keysym] {
        if code < self.min_keycode {
            return &[];
        }
        let per = usize::from(self.keysyms_per_keycode);
        let start = usize::from(code - self.min_keycode) * per;
        self.keysyms.get(start..start + per).unwrap_or(&[])
    }

    #[must_use]
    pub fn keysym(&self, code: Keycode, column: usize) -> Keysym {
        self.row(code).get(column).copied().unwrap_or(NO_SYMBOL)
    }

    /// Interprets the raw row of a code into three groups of (unshifted, shifted) symbols.
    ///
    /// A lone symbol is repeated into the second group and a lone group is copied into
    /// the second, an empty level three group mirrors the first. Any group with only its
    /// first slot filled gets the lower and upper case forms of that symbol.
    #[must_use]
    pub fn symbols(&self, code: Keycode) -> [Keysym; INTERPRETED_SYMBOLS] {
        let mut syms = [NO_SYMBOL; INTERPRETED_SYMBOLS];
        for (column, slot) in syms.iter_mut().enumerate() {
            *slot = self.keysym(code, column);
        }
        if syms[1] == NO_SYMBOL && syms[2] == NO_SYMBOL && syms[3] == NO_SYMBOL {
            syms[2] = syms[0];
        }
        if syms[2] == NO_SYMBOL && syms[3] == NO_SYMBOL {
            syms[2] = syms[0];
            syms[3] = syms[1];
        }
        if syms[4] == NO_SYMBOL && syms[5] == NO_SYMBOL {
            syms[4] = syms[0];
            syms[5] = syms[1];
        }
        for group in syms.chunks_exact_mut(2) {
            if group[1] == NO_SYMBOL {
                let (lower, upper) = convert_case(group[0]);
                group[0] = lower;
                group[1] = upper;
            }
        }
        syms
    }

    /// The first code whose raw row carries the symbol.
    #[must_use]
    pub fn raw_keycode_for(&self, sym: Keysym) -> Option<Keycode> {
        if sym == NO_SYMBOL {
            return None;
        }
        self.keycodes().find(|code| self.row(*code).contains(&sym))
    }

    /// The first code producing the symbol, looking at interpreted rows when no raw row
    /// carries it so that `A` finds the key labelled `a`.
    #[must_use]
    pub fn keycode_for(&self, sym: Keysym) -> Option<Keycode> {
        self.raw_keycode_for(sym).or_else(|| {
            if sym == NO_SYMBOL {
                return None;
            }
            self.keycodes()
                .find(|code| self.symbols(*code).contains(&sym))
        })
    }
}

/// Codes assigned to each of the eight modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierMapping {
    keycodes: Vec<Keycode>,
}

impl ModifierMapping {
    #[must_use]
    pub fn new(keycodes: Vec<Keycode>) -> Self {
        Self { keycodes }
    }

    #[must_use]
    pub fn keycodes_per_modifier(&self) -> usize {
        self.keycodes.len() / 8
    }

    /// Codes assigned to modifier `index`, where 0 is shift and 7 is mod5.
    #[must_use]
    pub fn modifier_keycodes(&self, index: usize) -> &[Keycode] {
        let per = self.keycodes_per_modifier();
        self.keycodes
            .get(index * per..(index + 1) * per)
            .unwrap_or(&[])
    }

    /// The mask of every modifier that has a key producing `sym` assigned to it.
    #[must_use]
    pub fn mask_for(&self, keyboard: &KeyboardMapping, sym: Keysym) -> u16 {
        (0..8).fold(0, |mask, index| {
            let carries = self
                .modifier_keycodes(index)
                .iter()
                .any(|code| *code != 0 && keyboard.row(*code).contains(&sym));
            if carries {
                mask | (1 << index)
            } else {
                mask
            }
        })
    }
}

/// A keyboard mapping paired with the modifier mapping that selects its groups.
#[derive(Debug, Clone)]
pub struct Keymap {
    keyboard: KeyboardMapping,
    modifiers: ModifierMapping,
    mode_switch: u16,
    level3_shift: u16,
}

impl Keymap {
    #[must_use]
    pub fn new(keyboard: KeyboardMapping, modifiers: ModifierMapping) -> Self {
        let mut keymap = Self {
            keyboard,
            modifiers,
            mode_switch: 0,
            level3_shift: 0,
        };
        keymap.update_group_masks();
        keymap
    }

    #[must_use]
    pub fn keyboard(&self) -> &KeyboardMapping {
        &self.keyboard
    }

    #[must_use]
    pub fn modifiers(&self) -> &ModifierMapping {
        &self.modifiers
    }

    pub fn set_keyboard(&mut self, keyboard: KeyboardMapping) {
        self.keyboard = keyboard;
        self.update_group_masks();
    }

    pub fn set_modifiers(&mut self, modifiers: ModifierMapping) {
        self.modifiers = modifiers;
        self.update_group_masks();
    }

    fn update_group_masks(&mut self) {
        self.mode_switch = self.modifiers.mask_for(&self.keyboard, MODE_SWITCH);
        self.level3_shift = self.modifiers.mask_for(&self.keyboard, ISO_LEVEL3_SHIFT);
        tracing::debug!(
            "Group modifiers resolved, mode switch {:#x}, level three {:#x}",
            self.mode_switch,
            self.level3_shift
        );
    }

    /// Mask of the modifiers carrying `Mode_switch`.
    #[must_use]
    pub fn mode_switch_mask(&self) -> u16 {
        self.mode_switch
    }

    /// Mask of the modifiers carrying `ISO_Level3_Shift`.
    #[must_use]
    pub fn level3_shift_mask(&self) -> u16 {
        self.level3_shift
    }

    fn group(&self, state: u16) -> usize {
        if state & self.level3_shift != 0 {
            2
        } else if state & self.mode_switch != 0 {
            1
        } else {
            0
        }
    }

    /// The symbol a key event with modifier `state` on `code` produces.
    #[must_use]
    pub fn resolve(&self, state: u16, code: Keycode) -> Keysym {
        let syms = self.keyboard.symbols(code);
        let group = self.group(state);
        let (first, second) = (syms[group * 2], syms[group * 2 + 1]);
        let shift = state & u16::from(ModMask::SHIFT) != 0;
        let lock = state & u16::from(ModMask::LOCK) != 0;
        match (shift, lock) {
            (false, false) => first,
            (false, true) if is_lower(first) => to_upper(first),
            (false, true) => first,
            (true, true) if is_lower(second) => to_upper(second),
            (true, _) => second,
        }
    }

    /// Printable text for a key event, empty when the symbol has none.
    #[must_use]
    pub fn lookup_string(&self, state: u16, code: Keycode) -> Cow<'static, str> {
        keysym_text(self.resolve(state, code))
    }
}

/// Maps each code whose symbols moved between two keyboard mappings to its new code.
///
/// A symbol is followed to its new code only if its old code no longer carries it, so
/// symbols that gain a second key keep their binding where it was.
#[must_use]
pub fn keycode_changes(old: &KeyboardMapping, new: &KeyboardMapping) -> HashMap<Keycode, Keycode> {
    let mut changes = HashMap::new();
    for code in new.keycodes() {
        for sym in new.row(code) {
            if *sym == NO_SYMBOL {
                continue;
            }
            if let Some(old_code) = old.raw_keycode_for(*sym) {
                if old_code != code && !new.row(old_code).contains(sym) {
                    changes.entry(old_code).or_insert(code);
                }
            }
        }
    }
    changes
}


#[cfg(test)]
mod tests {
    use crate::keyboard::fixture::{keyboard, modifiers, us_keymap, US_ROWS};
    use crate::keyboard::keycode_changes;

    const SHIFT: u16 = 1;
    const LOCK: u16 = 2;
    const MOD3: u16 = 0x20;
    const MOD5: u16 = 0x80;

    #[test]
    fn reports_code_range() {
        let keymap = us_keymap();
        assert_eq!(8, keymap.keyboard().min_keycode());
        assert_eq!(255, keymap.keyboard().max_keycode());
        assert_eq!(248, keymap.keyboard().keycodes().count());
        assert!(keymap.keyboard().row(7).is_empty());
    }

    #[test]
    fn interprets_symbol_lists() {
        let keymap = us_keymap();
        // Lone letter is case folded in every group
        assert_eq!([0x62, 0x42, 0x62, 0x42, 0x62, 0x42], keymap.keyboard().symbols(56));
        // Lone non letter repeats
        assert_eq!(
            [0xff1b, 0xff1b, 0xff1b, 0xff1b, 0xff1b, 0xff1b],
            keymap.keyboard().symbols(9)
        );
        // Group one copied into group two
        assert_eq!([0x31, 0x21, 0x31, 0x21, 0x31, 0x21], keymap.keyboard().symbols(10));
        // Explicit second group and level three
        assert_eq!([0x72, 0x52, 0x6cb, 0x6eb, 0x72, 0x52], keymap.keyboard().symbols(27));
        assert_eq!([0x65, 0x45, 0x65, 0x45, 0x20ac, 0x20ac], keymap.keyboard().symbols(26));
        assert_eq!([0; 6], keymap.keyboard().symbols(200));
    }

    #[test]
    fn finds_group_modifiers() {
        let keymap = us_keymap();
        assert_eq!(MOD3, keymap.mode_switch_mask());
        assert_eq!(MOD5, keymap.level3_shift_mask());
    }

    #[test]
    fn resolves_shift_and_lock() {
        let keymap = us_keymap();
        assert_eq!(0x61, keymap.resolve(0, 38));
        assert_eq!(0x41, keymap.resolve(SHIFT, 38));
        assert_eq!(0x41, keymap.resolve(LOCK, 38));
        assert_eq!(0x41, keymap.resolve(SHIFT | LOCK, 38));
        // Lock does not shift non letters
        assert_eq!(0x31, keymap.resolve(LOCK, 10));
        assert_eq!(0x21, keymap.resolve(SHIFT | LOCK, 10));
        assert_eq!(0xff1b, keymap.resolve(SHIFT, 9));
    }

    #[test]
    fn resolves_groups() {
        let keymap = us_keymap();
        assert_eq!(0x6cb, keymap.resolve(MOD3, 27));
        assert_eq!(0x6eb, keymap.resolve(MOD3 | SHIFT, 27));
        assert_eq!(0x6eb, keymap.resolve(MOD3 | LOCK, 27));
        assert_eq!(0x20ac, keymap.resolve(MOD5, 26));
        // Level three wins when both are held
        assert_eq!(0x72, keymap.resolve(MOD3 | MOD5, 27));
    }

    #[test]
    fn looks_up_strings() {
        let keymap = us_keymap();
        assert_eq!("a", keymap.lookup_string(0, 38));
        assert_eq!("A", keymap.lookup_string(SHIFT, 38));
        assert_eq!("[", keymap.lookup_string(0, 34));
        assert_eq!("{", keymap.lookup_string(SHIFT, 34));
        assert_eq!("Return", keymap.lookup_string(0, 36));
        assert_eq!("", keymap.lookup_string(0, 200));
    }

    #[test]
    fn finds_keycodes() {
        let keymap = us_keymap();
        assert_eq!(Some(38), keymap.keyboard().keycode_for(0x61));
        assert_eq!(Some(38), keymap.keyboard().keycode_for(0x41));
        // Only reachable through case folding
        assert_eq!(Some(56), keymap.keyboard().keycode_for(0x42));
        assert_eq!(None, keymap.keyboard().raw_keycode_for(0x42));
        assert_eq!(None, keymap.keyboard().keycode_for(0x7a));
        assert_eq!(None, keymap.keyboard().keycode_for(0));
    }

    #[test]
    fn computes_swapped_codes() {
        let old = keyboard(US_ROWS);
        let mut rows = US_ROWS.to_vec();
        for (code, row) in rows.iter_mut() {
            if *code == 38 {
                *row = &[0x62];
            } else if *code == 56 {
                *row = &[0x61, 0x41];
            }
        }
        let new = keyboard(&rows);
        let changes = keycode_changes(&old, &new);
        assert_eq!(2, changes.len());
        assert_eq!(Some(&56), changes.get(&38));
        assert_eq!(Some(&38), changes.get(&56));
        assert!(keycode_changes(&old, &old).is_empty());
    }

    #[test]
    fn keeps_codes_for_duplicated_symbols() {
        let old = keyboard(US_ROWS);
        let mut rows = US_ROWS.to_vec();
        rows.push((200, &[0xff1b]));
        let new = keyboard(&rows);
        assert!(keycode_changes(&old, &new).is_empty());
    }

    #[test]
    fn modifier_rows() {
        let mods = modifiers();
        assert_eq!(2, mods.keycodes_per_modifier());
        assert_eq!(&[50, 62], mods.modifier_keycodes(0));
        assert!(mods.modifier_keycodes(8).is_empty());
    }
}
