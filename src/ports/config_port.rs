//! Configuration access port trait.

use crate::domain::error::LiqsimError;

/// Typed getters return `default` only when the key is absent or blank. A
/// value that is present but does not parse is `ConfigInvalid`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, LiqsimError>;
    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, LiqsimError>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, LiqsimError>;

    /// Comma-separated values, trimmed, empties dropped.
    fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get_string(section, key)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
