use super::{keysym_for_char, unicode_char, Keysym, UNICODE_OFFSET};

/// A run of uppercase symbols and the run of lowercase symbols it maps onto.
#[derive(Debug, Clone, Copy)]
struct CaseRange {
    first: Keysym,
    last: Keysym,
    lower: Keysym,
    fold: Fold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fold {
    Both,
    // The lowercase side keeps its own case when upcased
    LowerOnly,
}

const fn both(first: Keysym, last: Keysym, lower: Keysym) -> CaseRange {
    CaseRange {
        first,
        last,
        lower,
        fold: Fold::Both,
    }
}

const fn lower_only(first: Keysym, last: Keysym, lower: Keysym) -> CaseRange {
    CaseRange {
        first,
        last,
        lower,
        fold: Fold::LowerOnly,
    }
}

impl CaseRange {
    fn fold(&self, sym: Keysym) -> Option<(Keysym, Keysym)> {
        if (self.first..=self.last).contains(&sym) {
            return Some((self.lower + (sym - self.first), sym));
        }
        let lower_last = self.lower + (self.last - self.first);
        if self.fold == Fold::Both && (self.lower..=lower_last).contains(&sym) {
            return Some((sym, self.first + (sym - self.lower)));
        }
        None
    }
}

const LATIN1: &[CaseRange] = &[
    both(0x41, 0x5a, 0x61),
    both(0xc0, 0xd6, 0xe0),
    both(0xd8, 0xde, 0xf8),
];

const LATIN2: &[CaseRange] = &[
    both(0x1a1, 0x1a1, 0x1b1),
    both(0x1a3, 0x1a6, 0x1b3),
    both(0x1a9, 0x1ac, 0x1b9),
    both(0x1ae, 0x1af, 0x1be),
    both(0x1c0, 0x1de, 0x1e0),
];

const LATIN3: &[CaseRange] = &[
    both(0x2a1, 0x2a6, 0x2b1),
    both(0x2ab, 0x2ac, 0x2bb),
    both(0x2c5, 0x2de, 0x2e5),
];

const LATIN4: &[CaseRange] = &[
    both(0x3a3, 0x3ac, 0x3b3),
    both(0x3bd, 0x3bd, 0x3bf),
    both(0x3c0, 0x3de, 0x3e0),
];

const CYRILLIC: &[CaseRange] = &[both(0x6b1, 0x6bf, 0x6a1), both(0x6e0, 0x6ff, 0x6c0)];

// Dieresis-accented iota and upsilon and the final sigma have no capital form
const GREEK: &[CaseRange] = &[
    both(0x7a1, 0x7a5, 0x7b1),
    lower_only(0x7a6, 0x7a6, 0x7b6),
    both(0x7a7, 0x7a9, 0x7b7),
    lower_only(0x7aa, 0x7aa, 0x7ba),
    both(0x7ab, 0x7ab, 0x7bb),
    both(0x7c1, 0x7d2, 0x7e1),
    lower_only(0x7d3, 0x7d3, 0x7f3),
    both(0x7d4, 0x7d9, 0x7f4),
];

const LATIN9: &[CaseRange] = &[both(0x13bc, 0x13bc, 0x13bd), lower_only(0x13be, 0x13be, 0xff)];

const ARMENIAN: &[CaseRange] = &[both(0x0100_0531, 0x0100_0556, 0x0100_0561)];

/// Script blocks, keyed by the symbol with its low byte cleared.
const BLOCKS: &[(Keysym, &[CaseRange])] = &[
    (0x0000, LATIN1),
    (0x0100, LATIN2),
    (0x0200, LATIN3),
    (0x0300, LATIN4),
    (0x0600, CYRILLIC),
    (0x0700, GREEK),
    (0x1300, LATIN9),
    (0x0100_0500, ARMENIAN),
];

/// Returns the `(lower, upper)` pair for a symbol, both halves equal the input when
/// the symbol has no case.
#[must_use]
pub fn convert_case(sym: Keysym) -> (Keysym, Keysym) {
    let block = sym & !0xff;
    if let Some((_, ranges)) = BLOCKS.iter().find(|(b, _)| *b == block) {
        return ranges
            .iter()
            .find_map(|range| range.fold(sym))
            .unwrap_or((sym, sym));
    }
    if sym >= UNICODE_OFFSET {
        if let Some(ch) = unicode_char(sym) {
            return (single_char(ch.to_lowercase(), sym), single_char(ch.to_uppercase(), sym));
        }
    }
    (sym, sym)
}

// Case mappings that expand to several characters have no single symbol
fn single_char(mut mapped: impl Iterator<Item = char>, sym: Keysym) -> Keysym {
    match (mapped.next(), mapped.next()) {
        (Some(ch), None) => keysym_for_char(ch),
        _ => sym,
    }
}

#[must_use]
pub fn to_lower(sym: Keysym) -> Keysym {
    convert_case(sym).0
}

#[must_use]
pub fn to_upper(sym: Keysym) -> Keysym {
    convert_case(sym).1
}

#[must_use]
pub fn is_lower(sym: Keysym) -> bool {
    let (lower, upper) = convert_case(sym);
    lower == sym && upper != sym
}

#[must_use]
pub fn is_upper(sym: Keysym) -> bool {
    let (lower, upper) = convert_case(sym);
    upper == sym && lower != sym
}

/// Whether the symbol has distinct lower and upper case forms.
#[must_use]
pub fn is_alphabetic(sym: Keysym) -> bool {
    let (lower, upper) = convert_case(sym);
    lower != upper
}

#[cfg(test)]
mod tests {
    use crate::keysym::{convert_case, is_alphabetic, is_lower, is_upper, to_lower, to_upper};

    #[test]
    fn folds_latin1() {
        assert_eq!((0x61, 0x41), convert_case(0x41));
        assert_eq!((0x61, 0x41), convert_case(0x61));
        assert_eq!((0xe9, 0xc9), convert_case(0xc9));
        assert_eq!((0xf8, 0xd8), convert_case(0xf8));
        // Multiplication and division signs sit between the ranges
        assert_eq!((0xd7, 0xd7), convert_case(0xd7));
        assert_eq!((0xf7, 0xf7), convert_case(0xf7));
        assert_eq!((0x31, 0x31), convert_case(0x31));
    }

    #[test]
    fn folds_latin_extensions() {
        // Aogonek, Lstroke, Zabovedot, Racute
        assert_eq!(0x1b1, to_lower(0x1a1));
        assert_eq!(0x1a3, to_upper(0x1b3));
        assert_eq!(0x1bf, to_lower(0x1af));
        assert_eq!(0x1c0, to_upper(0x1e0));
        // Gbreve and Scircumflex
        assert_eq!(0x2bb, to_lower(0x2ab));
        assert_eq!(0x2de, to_upper(0x2fe));
        // ENG and eng are not sixteen apart
        assert_eq!((0x3bf, 0x3bd), convert_case(0x3bf));
        assert_eq!(0x3fe, to_lower(0x3de));
    }

    #[test]
    fn folds_cyrillic() {
        // Serbian dje and Cyrillic ya
        assert_eq!((0x6a1, 0x6b1), convert_case(0x6a1));
        assert_eq!((0x6d1, 0x6f1), convert_case(0x6f1));
        assert!(!is_alphabetic(0x6b0));
    }

    #[test]
    fn keeps_uncapitalizable_greek() {
        assert_eq!((0x7e1, 0x7c1), convert_case(0x7c1));
        assert_eq!((0x7b6, 0x7b6), convert_case(0x7b6));
        assert_eq!((0x7ba, 0x7ba), convert_case(0x7ba));
        assert_eq!((0x7f3, 0x7f3), convert_case(0x7f3));
        assert_eq!((0x7f2, 0x7d2), convert_case(0x7f2));
    }

    #[test]
    fn folds_latin9_one_way() {
        assert_eq!((0x13bd, 0x13bc), convert_case(0x13bd));
        assert_eq!(0xff, to_lower(0x13be));
        assert_eq!(0xff, to_upper(0xff));
    }

    #[test]
    fn folds_unicode() {
        // Armenian ayb
        assert_eq!((0x0100_0561, 0x0100_0531), convert_case(0x0100_0531));
        // Cyrillic be as a unicode symbol
        assert_eq!((0x0100_0431, 0x0100_0411), convert_case(0x0100_0431));
        // Sharp s uppercases to two characters
        assert_eq!(0x0100_00df, to_upper(0x0100_00df));
    }

    #[test]
    fn classifies() {
        assert!(is_lower(0x61));
        assert!(!is_upper(0x61));
        assert!(is_upper(0x41));
        assert!(!is_lower(0xff1b));
        assert!(!is_upper(0xff1b));
        assert!(is_alphabetic(0x7e1));
        assert!(!is_alphabetic(0x20));
    }
}
