//! INI file configuration adapter.

use crate::domain::error::TrendpilotError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;
use std::str::FromStr;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TrendpilotError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| TrendpilotError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, TrendpilotError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| TrendpilotError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    /// Parse the raw value with `parse`, or `default` when the key is absent
    /// or blank.
    fn typed<T>(
        &self,
        section: &str,
        key: &str,
        default: T,
        expected: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<T, TrendpilotError> {
        let Some(raw) = self
            .config
            .get(section, key)
            .filter(|v| !v.trim().is_empty())
        else {
            return Ok(default);
        };
        parse(raw.trim()).ok_or_else(|| TrendpilotError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{}' is not {expected}", raw.trim()),
        })
    }

    fn parse_value<T: FromStr>(value: &str) -> Option<T> {
        value.parse().ok()
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, TrendpilotError> {
        self.typed(section, key, default, "an integer", Self::parse_value)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, TrendpilotError> {
        self.typed(section, key, default, "a number", Self::parse_value)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, TrendpilotError> {
        self.typed(section, key, default, "a boolean", Self::parse_bool)
    }
}
