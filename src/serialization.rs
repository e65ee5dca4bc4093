//! Value encoding for remote backends.
//!
//! Remote adapters store a value as its JSON text. Integers therefore stay
//! plain decimal text, which lets server-side increment/decrement operate on
//! them natively. Bytes that are not valid JSON (written by some other client)
//! are read back as a lossy UTF-8 string instead of failing the read.

use crate::error::Result;
use crate::value::Value;

/// Encode a value for storage.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode stored bytes.
pub fn decode(bytes: &[u8]) -> Value {
    match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(_) => {
            debug!("Stored bytes are not JSON, reading as raw string");
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers_stay_decimal_text() {
        assert_eq!(encode(&json!(42)).expect("encode"), b"42".to_vec());
        assert_eq!(encode(&json!(-7)).expect("encode"), b"-7".to_vec());
    }

    #[test]
    fn test_decode_falsy_values() {
        assert_eq!(decode(b"false"), json!(false));
        assert_eq!(decode(b"null"), Value::Null);
        assert_eq!(decode(b"0"), json!(0));
        assert_eq!(decode(b"\"\""), json!(""));
    }

    #[test]
    fn test_decode_foreign_bytes() {
        assert_eq!(decode(b"plain text"), json!("plain text"));
        assert_eq!(decode(b""), json!(""));
    }

    #[test]
    fn test_composite_roundtrip() {
        let value = json!({"a": [1, 2, {"b": null}], "c": "d"});
        assert_eq!(decode(&encode(&value).expect("encode")), value);
    }
}
