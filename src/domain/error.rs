//! Domain error types.

use chrono::NaiveDateTime;

use crate::domain::indicator::IndicatorError;

/// Top-level error type for liqsim.
#[derive(Debug, thiserror::Error)]
pub enum LiqsimError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("no {timeframe} candles for {symbol} in [{start}, {end})")]
    NoCandlesInWindow {
        symbol: String,
        timeframe: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("invalid candle for {symbol} at {timestamp}: {reason}")]
    InvalidCandle {
        symbol: String,
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LiqsimError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        LiqsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that only exclude one position from a run.
    pub fn is_position_local(&self) -> bool {
        matches!(
            self,
            LiqsimError::NoCandlesInWindow { .. } | LiqsimError::InvalidCandle { .. }
        )
    }
}

impl From<&LiqsimError> for std::process::ExitCode {
    fn from(err: &LiqsimError) -> Self {
        let code: u8 = match err {
            LiqsimError::Io(_) => 1,
            LiqsimError::ConfigParse { .. }
            | LiqsimError::ConfigMissing { .. }
            | LiqsimError::ConfigInvalid { .. } => 2,
            LiqsimError::Database { .. } | LiqsimError::DatabaseQuery { .. } => 3,
            LiqsimError::Indicator(_)
            | LiqsimError::NoCandlesInWindow { .. }
            | LiqsimError::InvalidCandle { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(2, 0, 0)
            .unwrap()
    }

    #[test]
    fn config_invalid_message_names_section_and_key() {
        let err = LiqsimError::invalid("simulation", "stop_loss", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid config value [simulation] stop_loss: must be positive"
        );
    }

    #[test]
    fn missing_candles_is_position_local() {
        let err = LiqsimError::NoCandlesInWindow {
            symbol: "BTCUSDT".into(),
            timeframe: "5m".into(),
            start: ts(),
            end: ts(),
        };
        assert!(err.is_position_local());
        assert!(!LiqsimError::Database { reason: "down".into() }.is_position_local());
    }

    #[test]
    fn indicator_error_converts() {
        let err: LiqsimError = IndicatorError::InsufficientData {
            required: 14,
            available: 3,
        }
        .into();
        assert!(matches!(err, LiqsimError::Indicator(_)));
    }
}
