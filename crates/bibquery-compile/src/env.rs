//! Environment-variable parsing shared by the compiler and service configs.
//!
//! Empty values mean "use the default"; unparseable values are errors that
//! name the variable.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}={value:?} (expected {expected})")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("failed to read {name}: {source}")]
    Read {
        name: &'static str,
        #[source]
        source: std::env::VarError,
    },

    #[error("{feature} support is not compiled in (rebuild with the `{feature}` cargo feature)")]
    FeatureDisabled { feature: &'static str },
}

/// Trimmed, non-empty value of `name`, or `None` when unset or blank.
pub fn env_string(name: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            Ok((!v.is_empty()).then(|| v.to_string()))
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::Read { name, source }),
    }
}

/// Integer variable clamped to `[min, max]`.
pub fn env_usize(
    name: &'static str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ConfigError> {
    match env_string(name)? {
        None => Ok(default),
        Some(v) => {
            let parsed = v.parse::<usize>().map_err(|_| ConfigError::Invalid {
                name,
                value: v.clone(),
                expected: "integer",
            })?;
            Ok(parsed.clamp(min, max))
        }
    }
}

/// Timeout in whole seconds; `0` disables the timeout.
pub fn env_timeout(name: &'static str, default_secs: u64) -> Result<Option<Duration>, ConfigError> {
    let secs = match env_string(name)? {
        None => default_secs,
        Some(v) => v.parse::<u64>().map_err(|_| ConfigError::Invalid {
            name,
            value: v.clone(),
            expected: "integer seconds; 0 disables",
        })?,
    };
    Ok((secs != 0).then(|| Duration::from_secs(secs)))
}

/// Boolean switch that defaults to on; `0`, `false`, `no` and `off` turn it off.
pub fn env_flag(name: &'static str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim().to_ascii_lowercase();
            !(v == "0" || v == "false" || v == "no" || v == "off")
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable name; the process environment is shared
    // between test threads.

    #[test]
    fn usize_defaults_parses_and_clamps() {
        const NAME: &str = "BIBQUERY_TEST_ENV_USIZE";
        std::env::remove_var(NAME);
        assert_eq!(env_usize(NAME, 10, 1, 100).unwrap(), 10);
        std::env::set_var(NAME, " 250 ");
        assert_eq!(env_usize(NAME, 10, 1, 100).unwrap(), 100);
        std::env::set_var(NAME, "ten");
        assert!(matches!(
            env_usize(NAME, 10, 1, 100),
            Err(ConfigError::Invalid { name: NAME, .. })
        ));
        std::env::remove_var(NAME);
    }

    #[test]
    fn zero_timeout_disables() {
        const NAME: &str = "BIBQUERY_TEST_ENV_TIMEOUT";
        std::env::set_var(NAME, "0");
        assert_eq!(env_timeout(NAME, 60).unwrap(), None);
        std::env::set_var(NAME, "5");
        assert_eq!(env_timeout(NAME, 60).unwrap(), Some(Duration::from_secs(5)));
        std::env::remove_var(NAME);
        assert_eq!(env_timeout(NAME, 60).unwrap(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn flag_defaults_on() {
        const NAME: &str = "BIBQUERY_TEST_ENV_FLAG";
        std::env::remove_var(NAME);
        assert!(env_flag(NAME));
        std::env::set_var(NAME, "off");
        assert!(!env_flag(NAME));
        std::env::remove_var(NAME);
    }
}
