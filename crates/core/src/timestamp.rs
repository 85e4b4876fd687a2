//! Timestamp encoding shared by every stored record.
//!
//! Records written by the hosted document store carry server timestamps as
//! `{ "seconds", "nanoseconds" }` objects, while client code writes RFC 3339
//! strings or epoch milliseconds. Everything is normalised to `DateTime<Utc>`
//! on read and written back as RFC 3339.

use chrono::{DateTime, Utc};
use serde_json::Value;

pub fn parse_str(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|at| at.with_timezone(&Utc))
}

pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => parse_str(raw),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => {
            let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

pub fn to_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339())
}

/// `#[serde(with = "timestamp::flexible")]`
pub mod flexible {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&at.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        super::from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("unsupported timestamp encoding: {value}")))
    }
}

/// `#[serde(default, with = "timestamp::flexible_option")]`
pub mod flexible_option {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(at: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match at {
            Some(at) => serializer.serialize_str(&at.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            value => super::from_value(&value).map(Some).ok_or_else(|| {
                D::Error::custom(format!("unsupported timestamp encoding: {value}"))
            }),
        }
    }
}
