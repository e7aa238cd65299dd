pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to parse binding {descriptor:?}: {reason}")]
    Parse {
        descriptor: String,
        reason: ParseFailure,
    },
    #[error("At most {limit} modifiers can be ignored, got {count}")]
    IgnoreModifierLimit { count: u32, limit: u32 },
    #[error("Could not find a config directory, neither $XDG_CONFIG_HOME nor $HOME is set")]
    ConfigDirFind,
    #[error("Could not find a config file")]
    ConfigFileFind,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[cfg(feature = "config-file")]
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn parse(descriptor: &str, reason: ParseFailure) -> Self {
        Error::Parse {
            descriptor: descriptor.to_owned(),
            reason,
        }
    }
}

/// Why a binding descriptor was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no key or button given")]
    MissingKey,
    #[error("more than one key or button given ({0:?} and {1:?})")]
    MultipleKeys(String, String),
    #[error("unknown key name {0:?}")]
    UnknownKey(String),
    #[error("key {0:?} is not on the current keyboard mapping")]
    Unmapped(String),
    #[error("invalid button {0:?}, expected a number between 1 and 255")]
    InvalidButton(String),
}
