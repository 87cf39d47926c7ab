use once_cell::sync::Lazy;
use queue_errors::{CoreError, CoreResult};
use regex::Regex;

use crate::models::{SubscriptionTarget, DEFAULT_WEBHOOK_TIMEOUT_S, MAX_WEBHOOK_TIMEOUT_S};

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap());

pub const MAX_ORDERING_KEY_BYTES: usize = 256;

pub fn validate_name(name: &str) -> CoreResult<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "invalid name {name:?}: must match ^[A-Za-z0-9][A-Za-z0-9._-]{{0,127}}$"
        )))
    }
}

pub fn validate_ordering_key(key: &str) -> CoreResult<()> {
    if key.len() > MAX_ORDERING_KEY_BYTES {
        Err(CoreError::Validation(format!(
            "ordering_key exceeds {MAX_ORDERING_KEY_BYTES} bytes"
        )))
    } else {
        Ok(())
    }
}

/// A function subscription must not set workflow fields and vice versa —
/// this is enforced structurally by [`SubscriptionTarget`] being a tagged
/// variant, but callers building a target from separate id/name pairs
/// (e.g. deserializing an HTTP request) should run this check first.
pub fn validate_target_exclusivity(
    function: &Option<(String, String)>,
    workflow: &Option<(String, String)>,
) -> CoreResult<SubscriptionTarget> {
    match (function, workflow) {
        (Some((id, name)), None) => Ok(SubscriptionTarget::Function {
            id: id.clone(),
            name: name.clone(),
        }),
        (None, Some((id, name))) => Ok(SubscriptionTarget::Workflow {
            id: id.clone(),
            name: name.clone(),
        }),
        (None, None) => Err(CoreError::Validation(
            "subscription must set exactly one of function or workflow target".into(),
        )),
        (Some(_), Some(_)) => Err(CoreError::Validation(
            "subscription must not set both function and workflow target".into(),
        )),
    }
}

pub fn normalize_webhook_timeout(timeout_s: Option<i32>) -> i32 {
    let t = timeout_s.unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_S);
    t.clamp(1, MAX_WEBHOOK_TIMEOUT_S)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_accepted() {
        assert!(validate_name("orders.created").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn names_starting_with_punctuation_rejected() {
        assert!(validate_name(".orders").is_err());
        assert!(validate_name("-orders").is_err());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn name_over_128_chars_rejected() {
        let long = "a".repeat(129);
        assert!(validate_name(&long).is_err());
    }

    #[test]
    fn ordering_key_over_256_bytes_rejected() {
        let long = "k".repeat(257);
        assert!(validate_ordering_key(&long).is_err());
    }

    #[test]
    fn empty_ordering_key_is_valid() {
        assert!(validate_ordering_key("").is_ok());
    }

    #[test]
    fn target_exclusivity_rejects_both_set() {
        let f = Some(("f1".to_string(), "fn".to_string()));
        let w = Some(("w1".to_string(), "wf".to_string()));
        assert!(validate_target_exclusivity(&f, &w).is_err());
    }

    #[test]
    fn target_exclusivity_rejects_neither_set() {
        assert!(validate_target_exclusivity(&None, &None).is_err());
    }

    #[test]
    fn target_exclusivity_accepts_function_only() {
        let f = Some(("f1".to_string(), "fn".to_string()));
        let target = validate_target_exclusivity(&f, &None).unwrap();
        assert_eq!(target.kind(), "function");
    }

    #[test]
    fn webhook_timeout_defaults_and_caps() {
        assert_eq!(normalize_webhook_timeout(None), DEFAULT_WEBHOOK_TIMEOUT_S);
        assert_eq!(normalize_webhook_timeout(Some(999)), MAX_WEBHOOK_TIMEOUT_S);
        assert_eq!(normalize_webhook_timeout(Some(45)), 45);
    }
}
