use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A converted field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    IntStrMap(BTreeMap<i64, String>),
    Timestamp(NaiveDateTime),
    /// Result of an `object:<Type>` converter
    Record(ParsedRecord),
    /// Result of a `parser:<Type>` converter
    Records(Vec<ParsedRecord>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[ParsedRecord]> {
        match self {
            FieldValue::Records(records) => Some(records),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            FieldValue::IntStrMap(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                Ok(())
            }
            FieldValue::Timestamp(ts) => write!(f, "{}", ts),
            FieldValue::Record(record) => write!(f, "{{{} fields}}", record.len()),
            FieldValue::Records(records) => write!(f, "[{} records]", records.len()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// One record extracted from command output.
///
/// Keys keep descriptor order. A key that is present with `None` means the
/// field is known but was not found in the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParsedRecord {
    fields: IndexMap<String, Option<FieldValue>>,
}

impl ParsedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<FieldValue>) {
        self.fields.insert(key.into(), value);
    }

    /// Value of `key`, or `None` when it is absent or unknown.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key).and_then(Option::as_ref)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FieldValue::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(FieldValue::as_bool)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// True when `key` is known but has no value.
    pub fn is_absent(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(None))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Folds `other` into this record.
    ///
    /// A value present in `other` replaces ours; an absent value in `other`
    /// never clears one we already have. Keys only `other` knows are
    /// appended.
    pub fn merge(&mut self, other: ParsedRecord) {
        for (key, value) in other.fields {
            match value {
                Some(value) => {
                    self.fields.insert(key, Some(value));
                }
                None => {
                    self.fields.entry(key).or_insert(None);
                }
            }
        }
    }

    /// Concatenated values of `keys`, used to group records.
    pub fn index_key<S: AsRef<str>>(&self, keys: &[S]) -> String {
        keys.iter()
            .map(|k| {
                self.get(k.as_ref())
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }
}

impl FromIterator<(String, Option<FieldValue>)> for ParsedRecord {
    fn from_iter<I: IntoIterator<Item = (String, Option<FieldValue>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
