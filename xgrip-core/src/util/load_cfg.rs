use crate::config::{Cfg, ModMaskEnum, ModMasks, APPLICATION_NAME, IGNORED_MODIFIER_LIMIT};
use crate::error::{Error, Result};
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use x11rb::protocol::xproto::ModMask;

pub(crate) fn load_cfg() -> Result<Cfg> {
    if let Some(user_cfg_dir) = find_cfg_dir() {
        let file_path = user_cfg_dir
            .join(APPLICATION_NAME)
            .join(format!("{APPLICATION_NAME}.toml"));
        read_cfg(&file_path)
    } else {
        Err(Error::ConfigDirFind)
    }
}

pub(crate) fn read_cfg(file_path: &Path) -> Result<Cfg> {
    tracing::debug!("Attempting config read at {file_path:?}");
    match std::fs::read(file_path) {
        Ok(content) => Ok(toml::from_slice(content.as_slice())?),
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                Err(Error::ConfigFileFind)
            } else {
                Err(e.into())
            }
        }
    }
}

fn find_cfg_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .ok()
        })
}

pub(crate) struct ModMaskVisitor;

impl<'de> Visitor<'de> for ModMaskVisitor {
    type Value = ModMasks;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("Expected an array of ModMaskEnums")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut base = ModMask::from(0u16);
        while let Some(e) = seq.next_element::<ModMaskEnum>()? {
            if e == ModMaskEnum::Any {
                return Err(serde::de::Error::custom("Any can not be ignored"));
            }
            base = base | e.to_mod_mask();
        }
        let count = u16::from(base).count_ones();
        if count > IGNORED_MODIFIER_LIMIT {
            return Err(serde::de::Error::custom(format!(
                "At most {IGNORED_MODIFIER_LIMIT} modifiers can be ignored, got {count}"
            )));
        }
        Ok(ModMasks { inner: base })
    }
}

impl<'de> Deserialize<'de> for ModMasks {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(ModMaskVisitor)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Action, Binding, Cfg, Options, Trigger, APPLICATION_NAME};
    use crate::error::Error;
    use crate::util::load_cfg::{find_cfg_dir, read_cfg};
    use std::env;
    use std::path::PathBuf;

    #[test]
    fn will_read_environment_variables_to_find_config_falling_back() {
        env::remove_var("XDG_CONFIG_HOME");
        env::remove_var("HOME");
        assert!(find_cfg_dir().is_none());
        env::set_var("HOME", "here");
        assert_eq!(Some(PathBuf::from("here/.config")), find_cfg_dir());
        env::set_var("XDG_CONFIG_HOME", "there");
        assert_eq!(Some(PathBuf::from("there")), find_cfg_dir());
        env::remove_var("HOME");
        assert_eq!(Some(PathBuf::from("there")), find_cfg_dir());
        env::remove_var("XDG_CONFIG_HOME");
        assert!(find_cfg_dir().is_none());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn example_cfg_is_same_as_default() {
        let cfg = read_cfg(&shipped_cfg_path()).unwrap();
        assert_eq!(Cfg::default(), cfg);
    }

    #[test]
    fn missing_file_is_reported() {
        let missing = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("no-such-config.toml");
        assert!(matches!(read_cfg(&missing), Err(Error::ConfigFileFind)));
    }

    #[test]
    fn partial_cfg_uses_defaults() {
        let cfg: Cfg = toml::from_str(
            r#"
            [options]
            ignore-modifiers = ["Lock"]
            coalesce-motion = false

            [[key-bindings]]
            descriptor = "control-Escape"
            action = { spawn = ["rofi", "-show", "run"] }

            [[key-bindings]]
            descriptor = "mod4-q"
            on = "release"
            action = "quit"
            "#,
        )
        .unwrap();
        assert_eq!(2, cfg.options.ignore_modifiers.mask());
        assert!(!cfg.options.coalesce_motion);
        assert_eq!(Options::default().log_filter, cfg.options.log_filter);
        assert_eq!(
            vec![
                Binding::new(
                    "control-Escape",
                    Trigger::Press,
                    Action::Spawn(vec!["rofi".into(), "-show".into(), "run".into()])
                ),
                Binding::new("mod4-q", Trigger::Release, Action::Quit),
            ],
            cfg.key_bindings
        );
        assert_eq!(Cfg::default().mouse_bindings, cfg.mouse_bindings);
    }

    #[test]
    fn rejects_ignoring_any() {
        let cfg = toml::from_str::<Cfg>(
            r#"
            [options]
            ignore-modifiers = ["Any"]
            "#,
        );
        assert!(cfg.is_err());
        let cfg = toml::from_str::<Cfg>(
            r#"
            [options]
            ignore-modifiers = ["Lock", "M2", "M3", "M4", "M5"]
            "#,
        );
        assert!(cfg.is_err());
    }

    fn shipped_cfg_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join(format!("{APPLICATION_NAME}.toml"))
    }
}
