//! The JSON tree interchange format.
//!
//! Every node is an object whose `kind` field names the node variant; the
//! remaining fields mirror the variant's fields. Optional annotations are
//! written only once they are set. Reading dispatches on `kind` alone and
//! rejects unknown kinds.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ast::Codelet;
use crate::error::Mishap;

/// Reads one JSON document with serde_json's nesting limit switched off.
/// Each operand of an operator chain adds three levels, so ordinary
/// programs go past the default limit of 128.
pub(crate) fn read_unbounded<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

fn read_failure(error: serde_json::Error) -> Mishap {
    Mishap::interchange("Cannot read code-tree").culprit("reason", error)
}

fn write_failure(error: serde_json::Error) -> Mishap {
    Mishap::interchange("Cannot write code-tree").culprit("reason", error)
}

/// Compact, single-line form (one tree per line in a stream).
pub fn to_json(codelet: &Codelet) -> Result<String, Mishap> {
    serde_json::to_string(codelet).map_err(write_failure)
}

pub fn to_value(codelet: &Codelet) -> Result<Value, Mishap> {
    serde_json::to_value(codelet).map_err(write_failure)
}

pub fn from_json(text: &str) -> Result<Codelet, Mishap> {
    read_unbounded(text).map_err(read_failure)
}

pub fn from_value(value: Value) -> Result<Codelet, Mishap> {
    serde_json::from_value(value).map_err(read_failure)
}

/// Reads a stream holding one tree per non-blank line.
pub fn from_json_lines(text: &str) -> Result<Vec<Codelet>, Mishap> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| from_json(line).map_err(|m| m.culprit("line", index + 1)))
        .collect()
}

/// Integer constants are written as decimal strings.
pub(crate) mod int_text {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntText {
        Text(String),
        Number(i64),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match IntText::deserialize(deserializer)? {
            IntText::Number(n) => Ok(n),
            IntText::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid integer constant: {text}"))),
        }
    }
}

/// Boolean constants are written as `"true"`/`"false"`. Reading accepts
/// the usual spellings of yes and no.
pub(crate) mod bool_text {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolText {
        Text(String),
        Flag(bool),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match BoolText::deserialize(deserializer)? {
            BoolText::Flag(flag) => Ok(flag),
            BoolText::Text(text) => super::str_to_bool(&text).ok_or_else(|| {
                serde::de::Error::custom(format!("cannot safely convert string to bool: {text}"))
            }),
        }
    }
}

pub fn str_to_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Some(true),
        "no" | "false" | "f" | "n" | "0" => Some(false),
        _ => None,
    }
}
