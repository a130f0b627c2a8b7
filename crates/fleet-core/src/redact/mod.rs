//! Structural redaction of sensitive values before logging or auditing.
//!
//! Walks a [`Value`] tree and replaces the value of any object key whose
//! name matches the sensitive set with `"[REDACTED]"`. Pure: the input is
//! never mutated, and redacting an already-redacted tree is a no-op.

use serde_json::Value;

/// Object keys (case-insensitive, exact match) whose values are always
/// replaced. Confirmed against the original agent test suite's
/// `redact_sensitive_data` behavior.
const SENSITIVE_KEYS: &[&str] = &[
    "token",
    "password",
    "api_key",
    "secret",
    "private_key",
    "authorization",
    "cookie",
    "session",
];

const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Return a redacted copy of `value`. Objects have their sensitive keys'
/// values replaced; arrays and nested objects are walked recursively.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if is_sensitive_key(k) {
                        (k.clone(), Value::String(REDACTED_PLACEHOLDER.to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_token() {
        let data = json!({"token": "secret123", "other": "value"});
        let result = redact(&data);
        assert_eq!(result["token"], "[REDACTED]");
        assert_eq!(result["other"], "value");
    }

    #[test]
    fn redacts_password_case_insensitively() {
        let data = json!({"PASSWORD": "secret", "username": "user"});
        let result = redact(&data);
        assert_eq!(result["PASSWORD"], "[REDACTED]");
        assert_eq!(result["username"], "user");
    }

    #[test]
    fn redacts_nested_secrets() {
        let data = json!({
            "config": {"database": {"password": "dbpass", "host": "localhost"}},
        });
        let result = redact(&data);
        assert_eq!(result["config"]["database"]["password"], "[REDACTED]");
        assert_eq!(result["config"]["database"]["host"], "localhost");
    }

    #[test]
    fn redacts_secrets_inside_lists() {
        let data = json!({"items": [{"token": "secret1"}, {"token": "secret2"}]});
        let result = redact(&data);
        assert_eq!(result["items"][0]["token"], "[REDACTED]");
        assert_eq!(result["items"][1]["token"], "[REDACTED]");
    }

    #[test]
    fn does_not_mutate_input() {
        let data = json!({"token": "secret123"});
        let _ = redact(&data);
        assert_eq!(data["token"], "secret123");
    }

    proptest::proptest! {
        #[test]
        fn redacting_twice_is_the_same_as_once(s in "[a-zA-Z0-9]*") {
            let data = json!({"password": s, "nested": {"api_key": "x", "note": "keep"}});
            let once = redact(&data);
            let twice = redact(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
