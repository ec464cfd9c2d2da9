//! Runtime configuration.
//!
//! Configuration is read once when a [`Runtime`](crate::Runtime) is created and
//! never changes afterwards, so every adapter a runtime builds is a pure
//! function of the declared and requested descriptors.

use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`RuntimeConfig::conversion`].
pub const CONVERSION_ENV: &str = "FLUX_HANDLES_CONVERSION";

/// Which argument and return conversions adapting invocation may insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPolicy {
    /// Identity, primitive widening and reference upcasts only. Narrowing is
    /// refused when the adapter is built.
    WideningOnly,
    /// Additionally numeric narrowing, checked per value at invocation time.
    /// A value that would lose information fails the call.
    #[default]
    CheckedNarrowing,
}

impl ConversionPolicy {
    pub fn allows_narrowing(self) -> bool {
        matches!(self, ConversionPolicy::CheckedNarrowing)
    }

    fn label(self) -> &'static str {
        match self {
            ConversionPolicy::WideningOnly => "widening_only",
            ConversionPolicy::CheckedNarrowing => "checked_narrowing",
        }
    }
}

impl fmt::Display for ConversionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ConversionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "widening_only" => Ok(ConversionPolicy::WideningOnly),
            "checked_narrowing" => Ok(ConversionPolicy::CheckedNarrowing),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown conversion policy `{0}`")]
    UnknownPolicy(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub conversion: ConversionPolicy,
}

impl RuntimeConfig {
    pub fn with_conversion(mut self, conversion: ConversionPolicy) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Defaults overridden by `FLUX_HANDLES_CONVERSION` when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `get` yields for each known variable.
    pub(crate) fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = get(CONVERSION_ENV) {
            config.conversion = raw.parse()?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_checks_narrowing() {
        assert_eq!(
            RuntimeConfig::default().conversion,
            ConversionPolicy::CheckedNarrowing
        );
    }

    #[test]
    fn parses_json() {
        let config = RuntimeConfig::from_json(r#"{"conversion": "widening_only"}"#).unwrap();
        assert_eq!(config.conversion, ConversionPolicy::WideningOnly);
        assert_eq!(RuntimeConfig::from_json("{}").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(RuntimeConfig::from_json(r#"{"conversion": "loose"}"#).is_err());
        let err = "loose".parse::<ConversionPolicy>().unwrap_err();
        assert_eq!(err.to_string(), "unknown conversion policy `loose`");
    }

    fn source(value: Option<&str>) -> impl Fn(&str) -> Option<String> {
        let value = value.map(str::to_string);
        move |key: &str| (key == CONVERSION_ENV).then(|| value.clone()).flatten()
    }

    #[test]
    fn environment_overrides_the_policy() {
        let config = RuntimeConfig::from_source(source(Some("widening_only"))).unwrap();
        assert_eq!(config.conversion, ConversionPolicy::WideningOnly);
        let config = RuntimeConfig::from_source(source(Some(" checked_narrowing "))).unwrap();
        assert_eq!(config.conversion, ConversionPolicy::CheckedNarrowing);
        assert_eq!(
            RuntimeConfig::from_source(source(None)).unwrap(),
            RuntimeConfig::default()
        );

        let err = RuntimeConfig::from_source(source(Some("loose"))).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicy(ref raw) if raw == "loose"));
    }

    #[test]
    fn policy_round_trips_through_display() {
        for policy in [
            ConversionPolicy::WideningOnly,
            ConversionPolicy::CheckedNarrowing,
        ] {
            assert_eq!(policy.to_string().parse::<ConversionPolicy>().unwrap(), policy);
        }
    }
}
