//! INI file configuration adapter.

use crate::domain::error::LiqsimError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;
use std::str::FromStr;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LiqsimError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| LiqsimError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, LiqsimError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| LiqsimError::ConfigParse {
                file: "<string>".into(),
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

    fn parsed<T>(&self, section: &str, key: &str, default: T) -> Result<T, LiqsimError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_string(section, key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| LiqsimError::invalid(section, key, format!("'{}': {e}", raw.trim()))),
            None => Ok(default),
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key).filter(|v| !v.trim().is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, LiqsimError> {
        self.parsed(section, key, default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, LiqsimError> {
        self.parsed(section, key, default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, LiqsimError> {
        match self.get_string(section, key) {
            Some(raw) => Self::parse_bool(&raw)
                .ok_or_else(|| LiqsimError::invalid(section, key, format!("'{}' is not a boolean", raw.trim()))),
            None => Ok(default),
        }
    }
}
