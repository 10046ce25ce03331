//! Engine configuration
//!
//! [`WeaverConfig`] holds the names the engine matches against and the
//! defaults it applies. It loads from TOML; absent keys keep their defaults.

use crate::error::{Result, WeaveError};
use serde::{Deserialize, Serialize};
use stampweave_ir::FullName;
use std::path::{Path, PathBuf};

/// Weaver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeaverConfig {
    /// Marker attribute requesting the rewrite
    pub marker_attribute: String,
    /// Attribute telling persistence to skip a property
    pub exclusion_attribute: String,
    /// Attribute naming a property's storage column
    pub column_attribute: String,
    /// The structured timestamp type flagged properties must have
    pub timestamp_type: String,
    /// Type exposing the invariant culture
    pub culture_type: String,
    /// Static property of `culture_type` yielding the invariant culture
    pub culture_property: String,
    /// Third parameter type of the parse-exact operation
    pub format_provider_type: String,
    /// Format used when the marker does not supply one
    pub default_format: String,
    /// Suffix of shadow property names (and kept-original column names)
    pub shadow_suffix: String,
    /// Load and rewrite the debugging-symbol companion
    pub read_symbols: bool,
    /// Extra directories searched for referenced libraries
    pub search_dirs: Vec<PathBuf>,
}

impl WeaverConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With an extra library search directory
    #[inline]
    #[must_use]
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// With symbol loading switched on or off
    #[inline]
    #[must_use]
    pub fn with_read_symbols(mut self, read_symbols: bool) -> Self {
        self.read_symbols = read_symbols;
        self
    }

    /// With a different default format
    #[inline]
    #[must_use]
    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into();
        self
    }

    /// With a different marker attribute
    #[inline]
    #[must_use]
    pub fn with_marker_attribute(mut self, name: impl Into<String>) -> Self {
        self.marker_attribute = name.into();
        self
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns [`WeaveError::Config`] on malformed TOML or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| WeaveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns [`WeaveError::Config`] if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| WeaveError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check every name parses and no required value is empty
    ///
    /// # Errors
    /// Returns [`WeaveError::Config`] naming the first offending key
    pub fn validate(&self) -> Result<()> {
        self.names().map(|_| ())
    }

    /// Parsed, validated names
    ///
    /// # Errors
    /// Returns [`WeaveError::Config`] naming the first offending key
    pub fn names(&self) -> Result<WeaveNames> {
        fn full(key: &str, value: &str) -> Result<FullName> {
            if value.trim().is_empty() {
                return Err(WeaveError::Config(format!("{key} must not be empty")));
            }
            value
                .parse()
                .map_err(|e| WeaveError::Config(format!("{key} = {value:?}: {e}")))
        }
        fn non_empty(key: &str, value: &str) -> Result<String> {
            if value.is_empty() {
                Err(WeaveError::Config(format!("{key} must not be empty")))
            } else {
                Ok(value.to_string())
            }
        }

        Ok(WeaveNames {
            marker: full("marker_attribute", &self.marker_attribute)?,
            exclusion: full("exclusion_attribute", &self.exclusion_attribute)?,
            column: full("column_attribute", &self.column_attribute)?,
            timestamp: full("timestamp_type", &self.timestamp_type)?,
            culture: full("culture_type", &self.culture_type)?,
            format_provider: full("format_provider_type", &self.format_provider_type)?,
            culture_property: non_empty("culture_property", &self.culture_property)?,
            default_format: non_empty("default_format", &self.default_format)?,
            shadow_suffix: non_empty("shadow_suffix", &self.shadow_suffix)?,
        })
    }
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            marker_attribute: "SQLite.Net.DateTimeOffset.Attributes.DateTimeOffsetSerializeAttribute"
                .to_string(),
            exclusion_attribute: "SQLite.IgnoreAttribute".to_string(),
            column_attribute: "SQLite.ColumnAttribute".to_string(),
            timestamp_type: "System.DateTimeOffset".to_string(),
            culture_type: "System.Globalization.CultureInfo".to_string(),
            culture_property: "InvariantCulture".to_string(),
            format_provider_type: "System.IFormatProvider".to_string(),
            default_format: "yyyy-MM-dd HH:mm:ss zzzz".to_string(),
            shadow_suffix: "_Serialized".to_string(),
            read_symbols: true,
            search_dirs: Vec::new(),
        }
    }
}

/// Names and defaults the engine components work with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveNames {
    pub marker: FullName,
    pub exclusion: FullName,
    pub column: FullName,
    pub timestamp: FullName,
    pub culture: FullName,
    pub format_provider: FullName,
    pub culture_property: String,
    pub default_format: String,
    pub shadow_suffix: String,
}
