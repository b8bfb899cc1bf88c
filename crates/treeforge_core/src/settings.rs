//! Runtime configuration for the creation core.
//!
//! # Responsibility
//! - Load editing, logging and site settings from TOML.
//! - Build the per-request `EditContext` and item name validator.
//!
//! # Invariants
//! - Missing keys fall back to defaults; unknown keys are rejected.
//! - A configured name pattern must compile before it is used.

use crate::logging::default_log_level;
use crate::model::context::{ActingIdentity, EditContext, SiteSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default item name rule: word start, then words, spaces, dashes, `$`,
/// optionally followed by a `(n)` copy counter.
pub const DEFAULT_ITEM_NAME_VALIDATION: &str = r"^[\w\*\$][\w\s\-\$]*(\(\d{1,}\)){0,1}$";
pub const DEFAULT_MAX_ITEM_NAME_LENGTH: usize = 100;

static DEFAULT_ITEM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_ITEM_NAME_VALIDATION).expect("valid item name regex"));

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    InvalidNamePattern(regex::Error),
    /// `max_item_name_length` must be positive.
    InvalidMaxNameLength,
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read settings `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid settings: {err}"),
            Self::InvalidNamePattern(err) => write!(f, "invalid item name pattern: {err}"),
            Self::InvalidMaxNameLength => {
                write!(f, "max_item_name_length must be greater than zero")
            }
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidNamePattern(err) => Some(err),
            Self::InvalidMaxNameLength => None,
        }
    }
}

impl From<toml::de::Error> for SettingsError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub editing: EditingSettings,
    pub logging: LoggingSettings,
    pub sites: Vec<SiteSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditingSettings {
    /// Lock items for the acting identity before they can be edited.
    pub require_lock_before_editing: bool,
    pub item_name_validation: String,
    pub max_item_name_length: usize,
}

impl Default for EditingSettings {
    fn default() -> Self {
        Self {
            require_lock_before_editing: true,
            item_name_validation: DEFAULT_ITEM_NAME_VALIDATION.to_string(),
            max_item_name_length: DEFAULT_MAX_ITEM_NAME_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    /// Absolute log directory; file logging stays off when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            directory: None,
        }
    }
}

impl Settings {
    pub fn from_toml_str(value: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(value)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Looks up a site by case-insensitive name.
    pub fn site(&self, name: &str) -> Option<&SiteSettings> {
        self.sites
            .iter()
            .find(|site| site.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Builds the editing context for `identity` on `site_name`.
    ///
    /// An unknown or absent site yields a context without site, which
    /// disables workflow unless the engagement override enables it.
    pub fn edit_context(&self, identity: ActingIdentity, site_name: Option<&str>) -> EditContext {
        let mut context = EditContext::new(identity)
            .with_lock_before_editing(self.editing.require_lock_before_editing);
        if let Some(site) = site_name.and_then(|name| self.site(name)) {
            context = context.with_site(site.clone());
        }
        context
    }

    pub fn name_validator(&self) -> Result<ItemNameValidator, SettingsError> {
        ItemNameValidator::new(
            &self.editing.item_name_validation,
            self.editing.max_item_name_length,
        )
    }
}

/// Checks proposed item names against the configured rule.
#[derive(Debug, Clone)]
pub struct ItemNameValidator {
    pattern: Regex,
    max_length: usize,
}

impl Default for ItemNameValidator {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_ITEM_NAME_RE.clone(),
            max_length: DEFAULT_MAX_ITEM_NAME_LENGTH,
        }
    }
}

impl ItemNameValidator {
    pub fn new(pattern: &str, max_length: usize) -> Result<Self, SettingsError> {
        if max_length == 0 {
            return Err(SettingsError::InvalidMaxNameLength);
        }
        let pattern = Regex::new(pattern).map_err(SettingsError::InvalidNamePattern)?;
        Ok(Self {
            pattern,
            max_length,
        })
    }

    /// Returns whether `name` is an acceptable item name.
    pub fn is_valid(&self, name: &str) -> bool {
        name.chars().count() <= self.max_length && self.pattern.is_match(name)
    }
}
