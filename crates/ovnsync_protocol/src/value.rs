//! OVSDB datum type.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Store-assigned row identifier (the textual form of the row UUID).
pub type RowId = String;

/// A row: column name to datum.
///
/// Ordered so that two rows with the same content always compare and
/// print identically.
pub type Row = BTreeMap<String, Value>;

/// An OVSDB datum.
///
/// Atoms map to JSON scalars. Composite datums use the tagged array
/// notation of the OVSDB protocol: `["uuid", "..."]`, `["named-uuid", "..."]`,
/// `["set", [...]]` and `["map", [[key, value], ...]]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean atom.
    Boolean(bool),
    /// Integer atom.
    Integer(i64),
    /// Real atom.
    Real(f64),
    /// String atom.
    String(String),
    /// Reference to a row by its UUID.
    Uuid(String),
    /// Reference to a row inserted earlier in the same transaction.
    NamedUuid(String),
    /// Set of atoms.
    Set(Vec<Value>),
    /// Map of atom pairs.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Creates a string atom.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Creates a UUID reference.
    pub fn uuid(s: impl Into<String>) -> Self {
        Value::Uuid(s.into())
    }

    /// Creates a set, dropping duplicate elements while keeping first-seen order.
    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    /// Creates a map. A later pair replaces an earlier pair with the same key.
    pub fn map<I: IntoIterator<Item = (Value, Value)>>(pairs: I) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (k, v) in pairs {
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        Value::Map(out)
    }

    /// Creates a string-to-string map, the shape of `external_ids` and `options` columns.
    pub fn string_map<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(pairs: I) -> Self {
        Value::map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::string(k), Value::string(v))),
        )
    }

    /// Returns the string if this is a string atom.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer atom.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean atom.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the referenced UUID if this is a UUID atom.
    pub fn as_uuid(&self) -> Option<&str> {
        match self {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }

    /// Returns the elements of a set.
    ///
    /// A bare atom is a one-element set in OVSDB notation, so it is
    /// returned as such. Maps have no set view.
    pub fn set_elements(&self) -> Option<&[Value]> {
        match self {
            Value::Set(items) => Some(items),
            Value::Map(_) => None,
            atom => Some(std::slice::from_ref(atom)),
        }
    }

    /// Looks up a key in a map datum.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns true if this datum is a set or map.
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Set(_) | Value::Map(_))
    }

    /// Orders two atoms of the same kind. Returns `None` for mixed kinds and composites.
    pub fn compare_atom(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b),
            (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Converts to OVSDB JSON notation.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Real(r) => Json::from(*r),
            Value::String(s) => Json::String(s.clone()),
            Value::Uuid(u) => tagged("uuid", Json::String(u.clone())),
            Value::NamedUuid(n) => tagged("named-uuid", Json::String(n.clone())),
            Value::Set(items) => tagged("set", Json::Array(items.iter().map(Value::to_json).collect())),
            Value::Map(pairs) => tagged(
                "map",
                Json::Array(
                    pairs
                        .iter()
                        .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                        .collect(),
                ),
            ),
        }
    }

    /// Parses OVSDB JSON notation.
    pub fn from_json(json: &Json) -> ProtocolResult<Self> {
        match json {
            Json::Bool(b) => Ok(Value::Boolean(*b)),
            Json::Number(n) => {
                // A number written with a fraction or exponent is a real, even `1.0`.
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Real(f))
                } else {
                    Err(ProtocolError::invalid_value(format!("unrepresentable number {n}")))
                }
            }
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Array(parts) => parse_tagged(parts),
            Json::Null => Err(ProtocolError::invalid_value("null is not a datum")),
            Json::Object(_) => Err(ProtocolError::invalid_value("object is not a datum")),
        }
    }
}

fn tagged(tag: &str, body: Json) -> Json {
    Json::Array(vec![Json::String(tag.to_string()), body])
}

fn parse_tagged(parts: &[Json]) -> ProtocolResult<Value> {
    let [tag, body] = parts else {
        return Err(ProtocolError::invalid_value(format!(
            "expected [tag, body], got array of {}",
            parts.len()
        )));
    };
    let tag = tag
        .as_str()
        .ok_or_else(|| ProtocolError::invalid_value("datum tag must be a string"))?;

    match tag {
        "uuid" | "named-uuid" => {
            let id = body
                .as_str()
                .ok_or_else(|| ProtocolError::invalid_value(format!("{tag} body must be a string")))?
                .to_string();
            Ok(if tag == "uuid" {
                Value::Uuid(id)
            } else {
                Value::NamedUuid(id)
            })
        }
        "set" => {
            let items = body
                .as_array()
                .ok_or_else(|| ProtocolError::invalid_value("set body must be an array"))?;
            let items = items
                .iter()
                .map(Value::from_json)
                .collect::<ProtocolResult<Vec<_>>>()?;
            Ok(Value::set(items))
        }
        "map" => {
            let pairs = body
                .as_array()
                .ok_or_else(|| ProtocolError::invalid_value("map body must be an array"))?;
            let mut out = Vec::with_capacity(pairs.len());
            for pair in pairs {
                match pair.as_array().map(Vec::as_slice) {
                    Some([k, v]) => out.push((Value::from_json(k)?, Value::from_json(v)?)),
                    _ => {
                        return Err(ProtocolError::invalid_value(
                            "map entries must be [key, value] pairs",
                        ))
                    }
                }
            }
            Ok(Value::map(out))
        }
        other => Err(ProtocolError::invalid_value(format!("unknown datum tag {other:?}"))),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Value::from_json(&json).map_err(serde::de::Error::custom)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
