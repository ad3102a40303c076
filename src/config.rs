//! Key-value configuration sources.
//!
//! Every configurable piece of neve-web reads its settings through the
//! [`Properties`] trait using dotted keys such as `neve.web.log.requestBody`.
//! A key that is absent falls back to the documented default; a key that is
//! present but malformed is an [`Error::Config`].
//!
//! ```rust
//! use neve_web::config::{MapProperties, Properties};
//!
//! let props = MapProperties::from_iter([("neve.web.log.requestBody", "true")]);
//! assert_eq!(props.bool_or("neve.web.log.requestBody", false).unwrap(), true);
//! assert_eq!(props.bool_or("neve.web.log.responseBody", false).unwrap(), false);
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::Error;

/// A source of configuration values addressed by dotted keys.
pub trait Properties {
    /// Raw lookup. `None` means the key is not set.
    fn get(&self, key: &str) -> Option<String>;

    /// Reads a boolean. Accepts `true/false`, `yes/no`, `on/off`, `1/0`,
    /// case-insensitively. Blank values count as unset.
    fn bool_or(&self, key: &str, default: bool) -> Result<bool, Error> {
        let Some(raw) = self.get(key) else { return Ok(default) };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            other => Err(Error::config(key, format!("expected a boolean, got `{other}`"))),
        }
    }

    /// Reads any `FromStr` value, typically an integer.
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map_err(|e| Error::config(key, format!("cannot parse `{}`: {e}", raw.trim()))),
            _ => Ok(default),
        }
    }

    /// Reads a string, trimmed.
    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }
}

impl Properties for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

// ── MapProperties ─────────────────────────────────────────────────────────────

/// In-memory properties. Handy for tests and for programmatic setup.
#[derive(Clone, Debug, Default)]
pub struct MapProperties {
    values: HashMap<String, String>,
}

impl MapProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`. Returns `self` for chaining.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Properties for MapProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

// ── TomlProperties ────────────────────────────────────────────────────────────

/// Properties loaded from a TOML document.
///
/// Nested tables flatten into dotted keys, so
///
/// ```toml
/// [neve.web.log]
/// requestBody = true
/// level = "debug"
/// ```
///
/// answers `neve.web.log.requestBody` and `neve.web.log.level`. Arrays are
/// joined with commas.
#[derive(Clone, Debug, Default)]
pub struct TomlProperties {
    values: HashMap<String, String>,
}

impl TomlProperties {
    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }
}

impl FromStr for TomlProperties {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let table: toml::Table = s
            .parse()
            .map_err(|e: toml::de::Error| Error::config("<toml>", e.to_string()))?;
        let mut values = HashMap::new();
        for (key, value) in &table {
            flatten(key, value, &mut values);
        }
        Ok(Self { values })
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut HashMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, nested) in table {
                flatten(&format!("{prefix}.{key}"), nested, out);
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_owned(), s.clone());
        }
        toml::Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_owned(), joined);
        }
        other => {
            out.insert(prefix.to_owned(), other.to_string());
        }
    }
}

impl Properties for TomlProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

// ── EnvProperties ─────────────────────────────────────────────────────────────

/// Properties read from environment variables.
///
/// `neve.web.log.requestBody` is looked up as `NEVE_WEB_LOG_REQUESTBODY`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvProperties;

impl EnvProperties {
    pub(crate) fn var_name(key: &str) -> String {
        key.chars()
            .map(|c| if c == '.' || c == '-' { '_' } else { c.to_ascii_uppercase() })
            .collect()
    }
}

impl Properties for EnvProperties {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(Self::var_name(key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_keys_fall_back_to_defaults() {
        let props = MapProperties::new();
        assert!(!props.bool_or("neve.web.log.requestBody", false).unwrap());
        assert_eq!(props.parse_or::<u16>("neve.web.server.port", 8080).unwrap(), 8080);
        assert_eq!(props.string_or("neve.web.log.level", "info"), "info");
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let props = MapProperties::new()
            .set("a", "TRUE")
            .set("b", "off")
            .set("c", " 1 ")
            .set("d", "");
        assert!(props.bool_or("a", false).unwrap());
        assert!(!props.bool_or("b", true).unwrap());
        assert!(props.bool_or("c", false).unwrap());
        assert!(props.bool_or("d", true).unwrap());
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let props = MapProperties::new().set("flag", "maybe").set("port", "http");
        assert!(matches!(props.bool_or("flag", false), Err(Error::Config { key, .. }) if key == "flag"));
        assert!(props.parse_or::<u16>("port", 80).is_err());
    }

    #[test]
    fn toml_tables_flatten_into_dotted_keys() {
        let props: TomlProperties = r#"
            [neve.web.log]
            requestBody = true
            level = "debug"

            [neve.web.server]
            port = 9090
            hosts = ["a", "b"]
        "#
        .parse()
        .unwrap();

        assert!(props.bool_or("neve.web.log.requestBody", false).unwrap());
        assert_eq!(props.string_or("neve.web.log.level", "info"), "debug");
        assert_eq!(props.parse_or::<u16>("neve.web.server.port", 0).unwrap(), 9090);
        assert_eq!(props.get("neve.web.server.hosts").as_deref(), Some("a,b"));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!("[neve.web".parse::<TomlProperties>().is_err());
    }

    #[test]
    fn env_names_are_upper_snake_case() {
        assert_eq!(EnvProperties::var_name("neve.web.log.requestBody"), "NEVE_WEB_LOG_REQUESTBODY");
    }
}
