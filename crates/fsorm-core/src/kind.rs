//! Field kinds: the conversion hooks a [`ValueCell`](crate::ValueCell) is
//! generic over.
//!
//! A kind converts between three forms of a value:
//!
//! - what the application assigns (`set(v, from_storage = false)`),
//! - what the storage layer loads (`set(v, from_storage = true)`),
//! - what the cell keeps internally (the output of
//!   [`FieldKind::parse_for_storage`]).
//!
//! [`FieldKind::parse_for_application`] goes the other way, either to the
//! application form or, with `to_storage = true`, to the form handed to the
//! storage layer. The trait is open; the built-in kinds below cover the
//! column types of the persistence layer.

use fsorm_error::{OrmError, Result};
use fsorm_types::{Date, DateTime, Time, TimeDelta, Value};

/// Conversion hooks for one column type.
///
/// `parse_for_storage` is never called with [`Value::Null`]: null handling
/// belongs to the cell.
pub trait FieldKind: 'static {
    /// Short name used in error messages and logs.
    const NAME: &'static str;

    /// Convert an incoming value into the stored form.
    fn parse_for_storage(value: Value, from_storage: bool) -> Result<Value>;

    /// Convert a stored value for a reader.
    fn parse_for_application(value: &Value, to_storage: bool) -> Result<Value> {
        let _ = to_storage;
        Ok(value.clone())
    }
}

fn mismatch<K: FieldKind>(expected: &'static str, value: &Value) -> OrmError {
    OrmError::mismatch(K::NAME, expected, value.type_name())
}

/// Accepts anything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyKind;

impl FieldKind for AnyKind {
    const NAME: &'static str = "any";

    fn parse_for_storage(value: Value, _from_storage: bool) -> Result<Value> {
        Ok(value)
    }
}

/// Booleans; numbers convert by truthiness.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolKind;

impl FieldKind for BoolKind {
    const NAME: &'static str = "bool";

    fn parse_for_storage(value: Value, _from_storage: bool) -> Result<Value> {
        match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Integer(i) => Ok(Value::Bool(i != 0)),
            Value::Float(f) => Ok(Value::Bool(f != 0.0)),
            other => Err(mismatch::<Self>("number", &other)),
        }
    }
}

/// 64-bit integers; floats are truncated towards zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntKind;

impl FieldKind for IntKind {
    const NAME: &'static str = "int";

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn parse_for_storage(value: Value, _from_storage: bool) -> Result<Value> {
        match value {
            Value::Integer(i) => Ok(Value::Integer(i)),
            Value::Bool(b) => Ok(Value::Integer(i64::from(b))),
            Value::Float(f) => {
                let truncated = f.trunc();
                // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
                if !truncated.is_finite()
                    || truncated < i64::MIN as f64
                    || truncated >= i64::MAX as f64
                {
                    return Err(OrmError::parse(
                        Self::NAME,
                        format!("cannot convert {f} to an integer"),
                    ));
                }
                Ok(Value::Integer(truncated as i64))
            }
            other => Err(mismatch::<Self>("number", &other)),
        }
    }
}

/// 64-bit floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatKind;

impl FieldKind for FloatKind {
    const NAME: &'static str = "float";

    #[allow(clippy::cast_precision_loss)]
    fn parse_for_storage(value: Value, _from_storage: bool) -> Result<Value> {
        match value {
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Integer(i) => Ok(Value::Float(i as f64)),
            Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            other => Err(mismatch::<Self>("number", &other)),
        }
    }
}

/// Raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesKind;

impl FieldKind for BytesKind {
    const NAME: &'static str = "bytes";

    fn parse_for_storage(value: Value, _from_storage: bool) -> Result<Value> {
        match value {
            Value::Bytes(b) => Ok(Value::Bytes(b)),
            other => Err(mismatch::<Self>("bytes", &other)),
        }
    }
}

/// Unicode text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextKind;

impl FieldKind for TextKind {
    const NAME: &'static str = "text";

    fn parse_for_storage(value: Value, _from_storage: bool) -> Result<Value> {
        match value {
            Value::Text(s) => Ok(Value::Text(s)),
            other => Err(mismatch::<Self>("text", &other)),
        }
    }
}

/// Naive timestamps.
///
/// The application may assign epoch seconds (integer or float, UTC); storage
/// may hand back `YYYY-MM-DD HH:MM:SS[.ffffff]` text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeKind;

impl FieldKind for DateTimeKind {
    const NAME: &'static str = "datetime";

    #[allow(clippy::cast_precision_loss)]
    fn parse_for_storage(value: Value, from_storage: bool) -> Result<Value> {
        match (value, from_storage) {
            (Value::DateTime(dt), _) => Ok(Value::DateTime(dt)),
            (Value::Text(s), true) => Ok(Value::DateTime(DateTime::parse(&s)?)),
            (Value::Integer(secs), false) => {
                let micros = secs.checked_mul(1_000_000).ok_or_else(|| {
                    OrmError::parse(Self::NAME, format!("timestamp {secs} is out of range"))
                })?;
                Ok(Value::DateTime(DateTime::from_unix_micros(micros)?))
            }
            (Value::Float(secs), false) => Ok(Value::DateTime(DateTime::from_unix_seconds(secs)?)),
            (other, true) => Err(mismatch::<Self>("datetime or text", &other)),
            (other, false) => Err(mismatch::<Self>("datetime or epoch seconds", &other)),
        }
    }
}

/// Calendar dates. A datetime contributes its date part.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateKind;

impl FieldKind for DateKind {
    const NAME: &'static str = "date";

    fn parse_for_storage(value: Value, from_storage: bool) -> Result<Value> {
        match (value, from_storage) {
            (Value::Date(d), _) => Ok(Value::Date(d)),
            (Value::DateTime(dt), _) => Ok(Value::Date(dt.date())),
            (Value::Text(s), true) => {
                let date = s.split_once(' ').map_or(s.as_str(), |(date, _)| date);
                Ok(Value::Date(Date::parse(date)?))
            }
            (other, true) => Err(mismatch::<Self>("date or text", &other)),
            (other, false) => Err(mismatch::<Self>("date", &other)),
        }
    }
}

/// Times of day. A datetime contributes its time part.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeKind;

impl FieldKind for TimeKind {
    const NAME: &'static str = "time";

    fn parse_for_storage(value: Value, from_storage: bool) -> Result<Value> {
        match (value, from_storage) {
            (Value::Time(t), _) => Ok(Value::Time(t)),
            (Value::DateTime(dt), _) => Ok(Value::Time(dt.time())),
            (Value::Text(s), true) => {
                let time = s.split_once(' ').map_or(s.as_str(), |(_, time)| time);
                Ok(Value::Time(Time::parse(time)?))
            }
            (other, true) => Err(mismatch::<Self>("time or text", &other)),
            (other, false) => Err(mismatch::<Self>("time", &other)),
        }
    }
}

/// Signed durations; storage may hand back interval text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeDeltaKind;

impl FieldKind for TimeDeltaKind {
    const NAME: &'static str = "timedelta";

    fn parse_for_storage(value: Value, from_storage: bool) -> Result<Value> {
        match (value, from_storage) {
            (Value::TimeDelta(d), _) => Ok(Value::TimeDelta(d)),
            (Value::Text(s), true) => Ok(Value::TimeDelta(TimeDelta::parse(&s)?)),
            (other, true) => Err(mismatch::<Self>("timedelta or text", &other)),
            (other, false) => Err(mismatch::<Self>("timedelta", &other)),
        }
    }
}

/// JSON documents, persisted as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKind;

impl FieldKind for JsonKind {
    const NAME: &'static str = "json";

    fn parse_for_storage(value: Value, from_storage: bool) -> Result<Value> {
        let decode = |e: serde_json::Error| OrmError::parse(Self::NAME, e.to_string());
        match (value, from_storage) {
            (Value::Json(doc), _) => Ok(Value::Json(doc)),
            (Value::Text(s), true) => Ok(Value::Json(serde_json::from_str(&s).map_err(decode)?)),
            (Value::Bytes(b), true) => Ok(Value::Json(serde_json::from_slice(&b).map_err(decode)?)),
            (Value::Bool(b), false) => Ok(Value::Json(serde_json::Value::Bool(b))),
            (Value::Integer(i), false) => Ok(Value::Json(i.into())),
            (Value::Float(f), false) => serde_json::Number::from_f64(f)
                .map(|n| Value::Json(serde_json::Value::Number(n)))
                .ok_or_else(|| {
                    OrmError::parse(Self::NAME, format!("{f} has no JSON representation"))
                }),
            (Value::Text(s), false) => Ok(Value::Json(serde_json::Value::String(s))),
            (other, true) => Err(mismatch::<Self>("json text", &other)),
            (other, false) => Err(mismatch::<Self>("json document", &other)),
        }
    }

    fn parse_for_application(value: &Value, to_storage: bool) -> Result<Value> {
        match (value, to_storage) {
            (Value::Json(doc), true) => Ok(Value::Text(doc.to_string())),
            (other, _) => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use fsorm_error::ErrorKind;

    use super::*;

    #[test]
    fn test_bool_kind() {
        assert_eq!(
            BoolKind::parse_for_storage(Value::Integer(1), false).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            BoolKind::parse_for_storage(Value::Float(0.0), true).unwrap(),
            Value::Bool(false)
        );
        let err = BoolKind::parse_for_storage(Value::from("1"), false).unwrap_err();
        assert!(matches!(err, OrmError::TypeMismatch { kind: "bool", .. }));
    }

    #[test]
    fn test_int_kind_truncates_floats() {
        assert_eq!(
            IntKind::parse_for_storage(Value::Float(1.9), false).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(
            IntKind::parse_for_storage(Value::Float(-1.9), false).unwrap(),
            Value::Integer(-1)
        );
        assert_eq!(
            IntKind::parse_for_storage(Value::Bool(true), false).unwrap(),
            Value::Integer(1)
        );
        assert_eq!(
            IntKind::parse_for_storage(Value::Float(f64::NAN), false).unwrap_err().kind(),
            ErrorKind::Parse
        );
        assert!(IntKind::parse_for_storage(Value::Float(1e19), false).is_err());
        assert!(IntKind::parse_for_storage(Value::from("3"), false).is_err());
    }

    #[test]
    fn test_float_kind() {
        assert_eq!(
            FloatKind::parse_for_storage(Value::Integer(3), false).unwrap(),
            Value::Float(3.0)
        );
        assert!(FloatKind::parse_for_storage(Value::Bytes(vec![1]), true).is_err());
    }

    #[test]
    fn test_bytes_and_text_are_strict() {
        assert!(BytesKind::parse_for_storage(Value::from("x"), false).is_err());
        assert!(TextKind::parse_for_storage(Value::Bytes(b"x".to_vec()), false).is_err());
        assert_eq!(TextKind::parse_for_storage(Value::from("x"), true).unwrap(), Value::from("x"));
    }

    #[test]
    fn test_datetime_kind_from_storage_text() {
        let parsed =
            DateTimeKind::parse_for_storage(Value::from("1977-05-04 12:34:56.78"), true).unwrap();
        let Value::DateTime(dt) = parsed else {
            panic!("expected a datetime, got {parsed:?}");
        };
        assert_eq!(dt.to_string(), "1977-05-04 12:34:56.780000");

        let err = DateTimeKind::parse_for_storage(Value::from("foobar"), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_datetime_kind_from_epoch() {
        let parsed = DateTimeKind::parse_for_storage(Value::Integer(0), false).unwrap();
        assert_eq!(parsed.to_string(), "'1970-01-01 00:00:00'");
        let local = Value::from("1970-01-01 00:00:00");
        assert!(DateTimeKind::parse_for_storage(local, false).is_err());
        assert!(DateTimeKind::parse_for_storage(Value::Integer(0), true).is_err());
    }

    #[test]
    fn test_date_and_time_kinds_split_datetimes() {
        let date = DateKind::parse_for_storage(Value::from("1977-05-04 12:34:56"), true).unwrap();
        assert_eq!(date, Value::Date(Date::new(1977, 5, 4).unwrap()));
        let time = TimeKind::parse_for_storage(Value::from("1977-05-04 12:34:56"), true).unwrap();
        assert_eq!(time, Value::Time(Time::new(12, 34, 56, 0).unwrap()));
        assert!(DateKind::parse_for_storage(Value::from("1977-05-04"), false).is_err());
    }

    #[test]
    fn test_timedelta_kind() {
        let delta = TimeDeltaKind::parse_for_storage(Value::from("1 day, 12:34:56"), true).unwrap();
        assert_eq!(delta, Value::TimeDelta(TimeDelta::new(1, 12, 34, 56, 0).unwrap()));
        assert!(TimeDeltaKind::parse_for_storage(Value::from("42 months"), true).is_err());
    }

    #[test]
    fn test_json_kind_round_trips_through_text() {
        let stored = JsonKind::parse_for_storage(Value::from(r#"{"a": [1, 2]}"#), true).unwrap();
        assert_eq!(stored, Value::Json(serde_json::json!({"a": [1, 2]})));
        assert_eq!(
            JsonKind::parse_for_application(&stored, true).unwrap(),
            Value::from(r#"{"a":[1,2]}"#)
        );
        assert_eq!(JsonKind::parse_for_application(&stored, false).unwrap(), stored);
        assert!(JsonKind::parse_for_storage(Value::from("{"), true).is_err());
        assert_eq!(
            JsonKind::parse_for_storage(Value::from("plain"), false).unwrap(),
            Value::Json(serde_json::json!("plain"))
        );
    }

    #[test]
    fn test_any_kind_is_identity() {
        let value = Value::Bytes(vec![0, 1]);
        assert_eq!(AnyKind::parse_for_storage(value.clone(), true).unwrap(), value);
        assert_eq!(AnyKind::parse_for_application(&value, true).unwrap(), value);
    }
}
