//! Payload encoding for stored values

use serde_json::Value;

/// Payload that the store may hold for an explicitly cached `null`; treated as absent.
pub const NULL_PAYLOAD: &str = "null";

/// Encode a value for storage. Never fails.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Decode a stored payload.
///
/// Payloads that are not valid JSON (for example plain strings written by
/// another client) come back unchanged as a string value.
pub fn decode(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_owned()))
}

pub fn is_null_payload(payload: &str) -> bool {
    payload == NULL_PAYLOAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json() {
        assert_eq!(decode("\"simple\""), json!("simple"));
        assert_eq!(decode("666"), json!(666));
        assert_eq!(
            decode(r#"{"some":"object","for":{"testing":123581321}}"#),
            json!({"some": "object", "for": {"testing": 123581321}})
        );
    }

    #[test]
    fn test_decode_falls_back_to_raw() {
        assert_eq!(decode("simple"), json!("simple"));
        assert_eq!(decode("{broken"), json!("{broken"));
        assert_eq!(decode(""), json!(""));
    }

    #[test]
    fn test_encode_nested_value() {
        let value = json!({"list": [1, 2.5, "three"], "flag": false});
        assert_eq!(decode(&encode(&value)), value);
    }

    #[test]
    fn test_null_payload() {
        assert!(is_null_payload(&encode(&Value::Null)));
        assert!(!is_null_payload("\"null\""));
    }
}
