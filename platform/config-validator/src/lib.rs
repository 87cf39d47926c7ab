//! A small builder for validating a service's environment at startup.
//!
//! Rather than `std::env::var("X").expect(...)`-ing one variable at a
//! time (which surfaces one missing variable per restart), [`EnvReader`]
//! collects every problem and reports them all together.

use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid configuration:\n{}", .0.join("\n"))]
pub struct ConfigError(pub Vec<String>);

pub struct EnvReader {
    errors: Vec<String>,
    source: HashMap<String, String>,
}

impl EnvReader {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self {
            errors: Vec::new(),
            source: std::env::vars().collect(),
        }
    }

    /// Read from a provided map (used by tests so they don't mutate the
    /// real process environment).
    pub fn from_map(source: HashMap<String, String>) -> Self {
        Self {
            errors: Vec::new(),
            source,
        }
    }

    /// A required variable of type `T`.
    pub fn required<T: FromStr>(&mut self, key: &str) -> Option<T> {
        match self.source.get(key) {
            Some(raw) => match raw.parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    self.errors
                        .push(format!("{key}: could not parse {raw:?}"));
                    None
                }
            },
            None => {
                self.errors.push(format!("{key}: missing"));
                None
            }
        }
    }

    /// An optional variable of type `T`, falling back to `default`.
    pub fn optional<T: FromStr>(&mut self, key: &str, default: T) -> T {
        match self.source.get(key) {
            Some(raw) => match raw.parse::<T>() {
                Ok(v) => v,
                Err(_) => {
                    self.errors
                        .push(format!("{key}: could not parse {raw:?}"));
                    default
                }
            },
            None => default,
        }
    }

    /// Finish, returning the accumulated errors if any were recorded.
    pub fn finish(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(self.errors))
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn collects_all_missing_vars_before_failing() {
        let mut r = EnvReader::from_map(map(&[]));
        let _: Option<String> = r.required("DATABASE_URL");
        let _: Option<u16> = r.required("PORT");
        let err = r.finish().unwrap_err();
        assert_eq!(err.0.len(), 2);
    }

    #[test]
    fn optional_falls_back_on_missing() {
        let mut r = EnvReader::from_map(map(&[]));
        let v: u64 = r.optional("LEASE_SECONDS", 30);
        assert_eq!(v, 30);
        assert!(!r.has_errors());
    }

    #[test]
    fn optional_records_error_on_unparseable_but_still_returns_default() {
        let mut r = EnvReader::from_map(map(&[("PORT", "not-a-number")]));
        let v: u16 = r.optional("PORT", 8080);
        assert_eq!(v, 8080);
        assert!(r.has_errors());
    }

    #[test]
    fn required_present_and_valid() {
        let mut r = EnvReader::from_map(map(&[("DATABASE_URL", "postgres://x")]));
        let v: Option<String> = r.required("DATABASE_URL");
        assert_eq!(v.as_deref(), Some("postgres://x"));
        assert!(r.finish().is_ok());
    }
}
