//! Gateway callback payload parsing
//!
//! The gateway has shipped several payload shapes over time. The reference
//! may arrive as `reference` or `transaction_id`, and the outcome may be
//! signalled by a `success` boolean, a numeric or string `result_code`, or
//! a `status` string. Everything is normalized to one reference and one
//! boolean before it reaches the ledger.

use crate::error::{Error, Result};
use serde_json::Value;

/// Normalized callback event
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    /// Provider reference joining the callback to its transaction
    pub reference: String,

    /// Normalized outcome
    pub succeeded: bool,

    /// Gateway result description, when present
    pub description: Option<String>,

    /// The payload exactly as delivered (stored on the transaction row)
    pub raw: String,
}

/// Parse a raw callback body into a normalized event
pub fn parse(raw_body: &[u8]) -> Result<CallbackEvent> {
    let text = std::str::from_utf8(raw_body)
        .map_err(|_| Error::InvalidPayload("Body is not valid UTF-8".to_string()))?;

    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::InvalidPayload(format!("Body is not valid JSON: {}", e)))?;

    let reference = field_as_string(&value, "reference")
        .or_else(|| field_as_string(&value, "transaction_id"))
        .ok_or_else(|| Error::InvalidPayload("Missing provider reference".to_string()))?;

    // First matching signal wins: explicit success flag, zero result code,
    // or a recognized success status string
    let succeeded = value.get("success").and_then(Value::as_bool) == Some(true)
        || result_code_is_zero(&value)
        || matches!(
            value.get("status").and_then(Value::as_str),
            Some("SUCCESS") | Some("success")
        );

    let description = field_as_string(&value, "result_desc");

    Ok(CallbackEvent {
        reference,
        succeeded,
        description,
        raw: text.to_string(),
    })
}

/// Read a field as a string, accepting numbers (older payloads sent
/// numeric transaction ids)
fn field_as_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn result_code_is_zero(value: &Value) -> bool {
    match value.get("result_code") {
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        Some(Value::String(s)) => s == "0",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_flag() {
        let event = parse(br#"{"reference":"REF-1","success":true}"#).unwrap();
        assert_eq!(event.reference, "REF-1");
        assert!(event.succeeded);
    }

    #[test]
    fn test_parse_numeric_result_code() {
        let event = parse(br#"{"reference":"REF-1","result_code":0}"#).unwrap();
        assert!(event.succeeded);

        let event = parse(br#"{"reference":"REF-1","result_code":1032}"#).unwrap();
        assert!(!event.succeeded);
    }

    #[test]
    fn test_parse_string_result_code() {
        let event = parse(br#"{"reference":"REF-1","result_code":"0"}"#).unwrap();
        assert!(event.succeeded);
    }

    #[test]
    fn test_parse_status_string() {
        let event = parse(br#"{"reference":"REF-1","status":"SUCCESS"}"#).unwrap();
        assert!(event.succeeded);

        let event = parse(br#"{"reference":"REF-1","status":"success"}"#).unwrap();
        assert!(event.succeeded);

        let event = parse(br#"{"reference":"REF-1","status":"FAILED"}"#).unwrap();
        assert!(!event.succeeded);
    }

    #[test]
    fn test_parse_transaction_id_fallback() {
        let event = parse(br#"{"transaction_id":"TX-99","success":true}"#).unwrap();
        assert_eq!(event.reference, "TX-99");

        // Numeric ids are accepted
        let event = parse(br#"{"transaction_id":4711,"success":false}"#).unwrap();
        assert_eq!(event.reference, "4711");
    }

    #[test]
    fn test_parse_prefers_reference_over_transaction_id() {
        let event =
            parse(br#"{"reference":"REF-1","transaction_id":"TX-99","success":true}"#).unwrap();
        assert_eq!(event.reference, "REF-1");
    }

    #[test]
    fn test_parse_description_and_raw() {
        let body = br#"{"reference":"REF-1","success":false,"result_desc":"Request cancelled by user"}"#;
        let event = parse(body).unwrap();
        assert!(!event.succeeded);
        assert_eq!(
            event.description.as_deref(),
            Some("Request cancelled by user")
        );
        assert_eq!(event.raw.as_bytes(), body);
    }

    #[test]
    fn test_parse_missing_reference() {
        let result = parse(br#"{"success":true}"#);
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse(b"not json"),
            Err(Error::InvalidPayload(_))
        ));
        assert!(matches!(
            parse(&[0xFF, 0xFE]),
            Err(Error::InvalidPayload(_))
        ));
    }
}
