/// Type codec between typed values and the store's string attributes
///
/// Every column is written as a value attribute holding the text form and a
/// sibling type-tag attribute naming how to read it back. Decoding is
/// lenient: an unknown tag reads as `Null` and malformed text reads as the
/// tag's zero value, so items written by other clients never fail a query.

use crate::Value;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

/// Declared type of a stored column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Int64,
    Float64,
    Bool,
    Time,
    Binary,
    Null,
}

impl TypeTag {
    /// Tag text written to the type-tag attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Int64 => "int64",
            TypeTag::Float64 => "float64",
            TypeTag::Bool => "bool",
            TypeTag::Time => "time",
            TypeTag::Binary => "binary",
            TypeTag::Null => "null",
        }
    }

    /// Parse tag text. Returns `None` for tags this codec does not know.
    pub fn parse(tag: &str) -> Option<TypeTag> {
        match tag {
            "string" => Some(TypeTag::String),
            "int64" => Some(TypeTag::Int64),
            "float64" => Some(TypeTag::Float64),
            "bool" => Some(TypeTag::Bool),
            "time" => Some(TypeTag::Time),
            "binary" => Some(TypeTag::Binary),
            "null" => Some(TypeTag::Null),
            _ => None,
        }
    }

    pub fn of(value: &Value) -> TypeTag {
        match value {
            Value::Null => TypeTag::Null,
            Value::String(_) => TypeTag::String,
            Value::Int(_) => TypeTag::Int64,
            Value::Float(_) => TypeTag::Float64,
            Value::Bool(_) => TypeTag::Bool,
            Value::Timestamp(_) => TypeTag::Time,
            Value::Binary(_) => TypeTag::Binary,
        }
    }

    /// Value reported for a column whose value attribute is absent or
    /// unreadable
    pub fn zero_value(&self) -> Value {
        match self {
            TypeTag::String => Value::String(String::new()),
            TypeTag::Int64 => Value::Int(0),
            TypeTag::Float64 => Value::Float(0.0),
            TypeTag::Bool => Value::Bool(false),
            TypeTag::Time => Value::Timestamp(DateTime::<Utc>::default()),
            TypeTag::Binary => Value::Binary(Bytes::new()),
            TypeTag::Null => Value::Null,
        }
    }

    /// Decode the text form of a value of this type
    pub fn decode(&self, text: &str) -> Value {
        let decoded = match self {
            TypeTag::String => Some(Value::String(text.to_string())),
            TypeTag::Int64 => text.parse().ok().map(Value::Int),
            TypeTag::Float64 => text.parse().ok().map(Value::Float),
            TypeTag::Bool => parse_bool(text).map(Value::Bool),
            TypeTag::Time => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
            TypeTag::Binary => STANDARD.decode(text).ok().map(|b| Value::Binary(Bytes::from(b))),
            TypeTag::Null => Some(Value::Null),
        };
        decoded.unwrap_or_else(|| {
            warn!(tag = self.as_str(), text, "malformed attribute value, using zero value");
            self.zero_value()
        })
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "TRUE" | "True" | "t" | "T" | "1" => Some(true),
        "false" | "FALSE" | "False" | "f" | "F" | "0" => Some(false),
        _ => None,
    }
}

/// Attribute form of a value
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// Text for the value attribute. Empty text cannot be stored; the value
    /// attribute is removed instead and only the tag is written.
    pub text: String,
    pub tag: TypeTag,
}

impl Encoded {
    /// Returns true if the value attribute should be written
    pub fn is_storable(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Encode a value into its attribute text and type tag
pub fn encode(value: &Value) -> Encoded {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        Value::Binary(b) => STANDARD.encode(b),
    };
    Encoded {
        text,
        tag: TypeTag::of(value),
    }
}

/// Decode attribute text using the tag text stored beside it.
///
/// Unknown tags decode to `Null`.
pub fn decode(text: &str, tag: &str) -> Value {
    match TypeTag::parse(tag) {
        Some(tag) => tag.decode(text),
        None => {
            warn!(tag, "unknown type tag, reading as null");
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn round_trip(value: Value) -> Value {
        let encoded = encode(&value);
        decode(&encoded.text, encoded.tag.as_str())
    }

    #[test]
    fn test_encode_forms() {
        assert_eq!(encode(&Value::Int(-42)).text, "-42");
        assert_eq!(encode(&Value::Float(42.0)).text, "42");
        assert_eq!(encode(&Value::Float(0.1)).text, "0.1");
        assert_eq!(encode(&Value::Bool(true)).text, "true");
        assert_eq!(encode(&Value::binary(vec![0u8, 1, 2, 255])).text, "AAEC/w==");

        let ts = Utc.with_ymd_and_hms(2099, 12, 31, 23, 59, 59).unwrap();
        let encoded = encode(&Value::Timestamp(ts));
        assert_eq!(encoded.text, "2099-12-31T23:59:59Z");
        assert_eq!(encoded.tag, TypeTag::Time);

        let null = encode(&Value::Null);
        assert_eq!(null.tag, TypeTag::Null);
        assert!(!null.is_storable());
    }

    #[test]
    fn test_round_trip_each_type() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 1).unwrap();
        for value in [
            Value::string("hello world"),
            Value::Int(i64::MIN),
            Value::Int(i64::MAX),
            Value::Float(-1.25e-7),
            Value::Float(f64::MAX),
            Value::Bool(false),
            Value::Timestamp(ts),
            Value::binary(b"\x00binary\xff".to_vec()),
            Value::Null,
        ] {
            assert_eq!(round_trip(value.clone()), value);
        }
    }

    #[test]
    fn test_empty_string_is_not_storable() {
        let encoded = encode(&Value::string(""));
        assert!(!encoded.is_storable());
        assert_eq!(encoded.tag, TypeTag::String);
        // value attribute absent: the reader falls back to the tag's zero value
        assert_eq!(encoded.tag.zero_value(), Value::string(""));
    }

    #[test]
    fn test_lenient_decode() {
        assert_eq!(decode("abc", "int64"), Value::Int(0));
        assert_eq!(decode("abc", "float64"), Value::Float(0.0));
        assert_eq!(decode("maybe", "bool"), Value::Bool(false));
        assert_eq!(decode("yesterday", "time"), TypeTag::Time.zero_value());
        assert_eq!(decode("!!", "binary"), Value::binary(Vec::new()));
        assert_eq!(decode("42", "decimal"), Value::Null);
    }

    #[test]
    fn test_timestamp_offsets_normalize_to_utc() {
        let value = decode("2020-01-01T10:00:00+02:00", "time");
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(value, Value::Timestamp(expected));
    }

    proptest! {
        #[test]
        fn prop_string_round_trip(s in ".+") {
            prop_assert_eq!(round_trip(Value::String(s.clone())), Value::String(s));
        }

        #[test]
        fn prop_int_round_trip(n in any::<i64>()) {
            prop_assert_eq!(round_trip(Value::Int(n)), Value::Int(n));
        }

        #[test]
        fn prop_float_round_trip(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            prop_assert_eq!(round_trip(Value::Float(f)), Value::Float(f));
        }

        #[test]
        fn prop_binary_round_trip(b in proptest::collection::vec(any::<u8>(), 1..64)) {
            let value = Value::binary(b);
            prop_assert_eq!(round_trip(value.clone()), value);
        }

        #[test]
        fn prop_timestamp_round_trip(secs in 0i64..4_102_444_800) {
            let ts = Utc.timestamp_opt(secs, 0).unwrap();
            prop_assert_eq!(round_trip(Value::Timestamp(ts)), Value::Timestamp(ts));
        }
    }
}
