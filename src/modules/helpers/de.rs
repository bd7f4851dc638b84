//! deserializers for RaceSync payloads, which send numbers as strings or
//! numbers depending on the endpoint

use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// render a json scalar without quotes
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(string) => string.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// treat `null` as the default value
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(value) => {
            let string = value_to_string(&value);
            if string.trim().is_empty() {
                None
            } else {
                Some(string)
            }
        }
    })
}

pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string(deserializer)?.unwrap_or_default())
}

pub fn opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match opt_string(deserializer)? {
        None => Ok(None),
        Some(string) => string
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid number: {}", string))),
    }
}

pub fn u32_value<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_u32(deserializer)?.unwrap_or(0))
}

/// "1", 1 and true are set, everything else is unset
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => flag,
        Some(value) => value_to_string(&value).trim() == "1",
        None => false,
    })
}
