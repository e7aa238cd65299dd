use x11rb::protocol::xproto::ModMask;

use crate::error::{Error, Result};

/**
The name the daemon runs as. Also decides where configuration is read from,
`$XDG_CONFIG_HOME/xgrip/xgrip.toml` or `$HOME/.config/xgrip/xgrip.toml`.
 **/
pub const APPLICATION_NAME: &str = "xgrip";

/**
How many modifiers can be ignored when matching bindings. Every subset of the ignored
modifiers is grabbed alongside a binding so this grows the grab count exponentially.
 **/
pub const IGNORED_MODIFIER_LIMIT: u32 = 4;

pub const IGNORED_MODIFIER_COMBINATIONS: usize = 1 << IGNORED_MODIFIER_LIMIT;

/// Attempts made by a retrying keyboard grab, one millisecond apart.
pub const GRAB_KEYBOARD_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "config-file",
    derive(serde::Deserialize),
    serde(rename_all = "kebab-case", default)
)]
pub struct Cfg {
    pub options: Options,
    pub key_bindings: Vec<Binding>,
    pub mouse_bindings: Vec<Binding>,
}

impl Cfg {
    /// Reads the user's config file, a missing file gives the defaults.
    pub fn new() -> Result<Self> {
        #[cfg(feature = "config-file")]
        match crate::util::load_cfg::load_cfg() {
            Ok(cfg) => return Ok(cfg),
            Err(Error::ConfigDirFind | Error::ConfigFileFind) => {
                tracing::info!("No config file found, falling back to defaults");
            }
            Err(e) => return Err(e),
        }
        Ok(Cfg::default())
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self {
            options: Options::default(),
            key_bindings: vec![
                Binding::new(
                    "mod4-Return",
                    Trigger::Press,
                    Action::Spawn(vec!["xterm".to_owned()]),
                ),
                Binding::new("mod4-shift-q", Trigger::Press, Action::Quit),
            ],
            mouse_bindings: vec![Binding::new(
                "mod4-3",
                Trigger::Release,
                Action::Spawn(vec!["xterm".to_owned()]),
            )],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "config-file",
    derive(serde::Deserialize),
    serde(rename_all = "kebab-case", default)
)]
pub struct Options {
    /// Display to connect to, `$DISPLAY` when unset.
    pub display: Option<String>,
    /// Modifiers that never prevent a binding from matching, num lock and caps lock by default.
    pub ignore_modifiers: ModMasks,
    pub coalesce_motion: bool,
    pub grab_keyboard_attempts: u32,
    /// A `tracing` filter directive.
    pub log_filter: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            display: None,
            ignore_modifiers: ModMasks::default(),
            coalesce_motion: true,
            grab_keyboard_attempts: GRAB_KEYBOARD_ATTEMPTS,
            log_filter: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "config-file",
    derive(serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct Binding {
    pub descriptor: String,
    #[cfg_attr(feature = "config-file", serde(default))]
    pub on: Trigger,
    pub action: Action,
}

impl Binding {
    #[must_use]
    pub fn new(descriptor: &str, on: Trigger, action: Action) -> Self {
        Self {
            descriptor: descriptor.to_owned(),
            on,
            action,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "config-file",
    derive(serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum Trigger {
    #[default]
    Press,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "config-file",
    derive(serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum Action {
    Quit,
    Spawn(Vec<String>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
pub enum ModMaskEnum {
    Shift,
    Lock,
    Control,
    M1,
    M2,
    M3,
    M4,
    M5,
    Any,
}

impl ModMaskEnum {
    #[must_use]
    pub fn to_mod_mask(&self) -> ModMask {
        match self {
            ModMaskEnum::Shift => ModMask::SHIFT,
            ModMaskEnum::Lock => ModMask::LOCK,
            ModMaskEnum::Control => ModMask::CONTROL,
            ModMaskEnum::M1 => ModMask::M1,
            ModMaskEnum::M2 => ModMask::M2,
            ModMaskEnum::M3 => ModMask::M3,
            ModMaskEnum::M4 => ModMask::M4,
            ModMaskEnum::M5 => ModMask::M5,
            ModMaskEnum::Any => ModMask::ANY,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModMasks {
    pub inner: ModMask,
}

impl Default for ModMasks {
    fn default() -> Self {
        Self {
            inner: ModMask::LOCK | ModMask::M2,
        }
    }
}

impl From<ModMask> for ModMasks {
    fn from(inner: ModMask) -> Self {
        Self { inner }
    }
}

impl ModMasks {
    #[must_use]
    pub fn mask(&self) -> u16 {
        u16::from(self.inner)
    }

    /// Every subset of the mask, ascending and starting with the empty one.
    pub fn combinations(&self) -> Result<heapless::Vec<u16, IGNORED_MODIFIER_COMBINATIONS>> {
        let mask = self.mask();
        let count = mask.count_ones();
        if count > IGNORED_MODIFIER_LIMIT {
            return Err(Error::IgnoreModifierLimit {
                count,
                limit: IGNORED_MODIFIER_LIMIT,
            });
        }
        let mut combinations = heapless::Vec::new();
        let mut subset = mask;
        loop {
            combinations
                .push(subset)
                .map_err(|_| Error::IgnoreModifierLimit {
                    count,
                    limit: IGNORED_MODIFIER_LIMIT,
                })?;
            if subset == 0 {
                break;
            }
            subset = (subset - 1) & mask;
        }
        combinations.reverse();
        Ok(combinations)
    }
}
