//! Discord ids are persisted as decimal strings so the JSON documents stay
//! readable from JavaScript tooling. These helpers accept either a string or
//! a number on the way in.

use serde::{Deserialize, Deserializer, Serializer};
use std::collections::BTreeSet;

/// Parses a well-formed snowflake: 17 to 20 ascii digits that fit in a u64.
pub fn parse(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if !(17..=20).contains(&raw.len()) || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn from_value(value: serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::String(s) => parse(&s),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(id: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => s.serialize_str(&id.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(d)?;
        Ok(value.and_then(from_value))
    }
}

pub mod set {
    use super::*;

    pub fn serialize<S: Serializer>(ids: &BTreeSet<u64>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(ids.iter().map(|id| id.to_string()))
    }

    /// Anything that is not a list reads as an empty set.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<u64>, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        match value {
            serde_json::Value::Array(items) => Ok(items.into_iter().filter_map(from_value).collect()),
            _ => Ok(BTreeSet::new()),
        }
    }
}

/// Any field wrapped with this falls back to its default instead of failing
/// the whole record when the stored shape is wrong.
pub fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
