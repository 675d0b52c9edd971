//! Converters turn captured text into typed field values.
//!
//! Converters are resolved by name when a descriptor set is built. An
//! unknown name is a configuration error, while a value that fails to
//! convert only makes that one field absent.

use chrono::NaiveDateTime;
use navi_common::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::parser::RecordParser;
use crate::record::FieldValue;

/// Text captured by a descriptor's pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Pattern with a single capture group
    Text(String),
    /// Pattern with several capture groups, in group order. Groups that did
    /// not participate in the match are empty.
    Groups(Vec<String>),
}

impl Captured {
    /// Whole capture as one string, groups joined by a space.
    pub fn text(&self) -> String {
        match self {
            Captured::Text(s) => s.clone(),
            Captured::Groups(groups) => groups.join(" "),
        }
    }
}

/// Names accepted by [`Converter::resolve`], besides the `parser:` and
/// `object:` prefixes.
pub const CONVERTER_NAMES: &[&str] = &[
    "str",
    "int",
    "float",
    "bool",
    "hex",
    "int_list",
    "str_list",
    "int_str_map",
    "timestamp",
    "size",
];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%a %b %e %H:%M:%S %Y",
    "%a %b %d %H:%M:%S %Y",
];

#[derive(Clone)]
pub enum Converter {
    Str,
    Int,
    Float,
    Bool,
    /// Hexadecimal integer, with or without `0x`
    Hex,
    IntList,
    StrList,
    /// Lines of `<int> <text>` pairs
    IntStrMap,
    Timestamp,
    /// Human readable size converted to bytes
    Size,
    /// Every record the nested parser finds
    Records(Arc<RecordParser>),
    /// First record the nested parser finds
    Record(Arc<RecordParser>),
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Converter {
    /// Resolves a converter by name.
    ///
    /// `nested` is asked for the parser behind `parser:<Type>` and
    /// `object:<Type>` names.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownConverter`] for a name that is not recognised,
    /// and whatever `nested` returns for a nested type.
    pub fn resolve(
        key: &str,
        name: &str,
        nested: &mut dyn FnMut(&str) -> Result<Arc<RecordParser>, ConfigError>,
    ) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownConverter {
            key: key.to_string(),
            name: name.to_string(),
        };

        let converter = match name.trim() {
            "str" => Converter::Str,
            "int" => Converter::Int,
            "float" => Converter::Float,
            "bool" => Converter::Bool,
            "hex" => Converter::Hex,
            "int_list" => Converter::IntList,
            "str_list" => Converter::StrList,
            "int_str_map" => Converter::IntStrMap,
            "timestamp" => Converter::Timestamp,
            "size" => Converter::Size,
            other => match other.split_once(':') {
                Some(("parser", ty)) if !ty.is_empty() => Converter::Records(nested(ty)?),
                Some(("object", ty)) if !ty.is_empty() => Converter::Record(nested(ty)?),
                _ => return Err(unknown()),
            },
        };
        Ok(converter)
    }

    /// Resolves a converter that does not refer to another parser.
    pub fn from_name(key: &str, name: &str) -> Result<Self, ConfigError> {
        Self::resolve(key, name, &mut |ty| {
            Err(ConfigError::UnknownParser(ty.to_string()))
        })
    }

    pub fn name(&self) -> String {
        match self {
            Converter::Str => "str".to_string(),
            Converter::Int => "int".to_string(),
            Converter::Float => "float".to_string(),
            Converter::Bool => "bool".to_string(),
            Converter::Hex => "hex".to_string(),
            Converter::IntList => "int_list".to_string(),
            Converter::StrList => "str_list".to_string(),
            Converter::IntStrMap => "int_str_map".to_string(),
            Converter::Timestamp => "timestamp".to_string(),
            Converter::Size => "size".to_string(),
            Converter::Records(p) => format!("parser:{}", p.name()),
            Converter::Record(p) => format!("object:{}", p.name()),
        }
    }

    /// Converts captured text. `None` means the value could not be converted.
    ///
    /// Scalar converters applied to several groups convert each group and
    /// yield a list.
    pub fn convert(&self, captured: &Captured) -> Option<FieldValue> {
        match (self, captured) {
            (Converter::Records(parser), c) => Some(FieldValue::Records(parser.parse_all(&c.text()))),
            (Converter::Record(parser), c) => Some(FieldValue::Record(parser.parse(&c.text()))),
            (_, Captured::Text(text)) => self.convert_text(text),
            (_, Captured::Groups(groups)) => groups
                .iter()
                .map(|g| self.convert_text(g))
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::List),
        }
    }

    fn convert_text(&self, text: &str) -> Option<FieldValue> {
        let text = text.trim();
        match self {
            Converter::Str => Some(FieldValue::Str(text.to_string())),
            Converter::Int => parse_int(text).map(FieldValue::Int),
            Converter::Float => parse_float(text).map(FieldValue::Float),
            Converter::Bool => parse_bool(text).map(FieldValue::Bool),
            Converter::Hex => parse_hex(text).map(FieldValue::Int),
            Converter::IntList => split_list(text)
                .map(|item| parse_int(item).map(FieldValue::Int))
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::List),
            Converter::StrList => Some(FieldValue::List(
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(FieldValue::from)
                    .collect(),
            )),
            Converter::IntStrMap => Some(FieldValue::IntStrMap(parse_int_str_map(text))),
            Converter::Timestamp => parse_timestamp(text).map(FieldValue::Timestamp),
            Converter::Size => parse_size(text).map(FieldValue::Int),
            Converter::Records(parser) => Some(FieldValue::Records(parser.parse_all(text))),
            Converter::Record(parser) => Some(FieldValue::Record(parser.parse(text))),
        }
    }
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parses an integer, falling back to the first token (`"5 (LUN)"` is 5).
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse().ok().or_else(|| {
        text.split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
    })
}

pub fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    text.parse().ok().or_else(|| {
        text.split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
    })
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "enabled" | "1" => Some(true),
        "no" | "false" | "off" | "disabled" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_hex(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    i64::from_str_radix(digits, 16).ok()
}

/// Parses `<int> <text>` lines, skipping lines that do not start with an
/// integer (table headers and separators).
pub fn parse_int_str_map(text: &str) -> BTreeMap<i64, String> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let key = tokens.next()?.parse().ok()?;
            let value = tokens.collect::<Vec<_>>().join(" ");
            Some((key, value))
        })
        .collect()
}

/// Parses a timestamp in one of the formats the CLI prints, or a Unix epoch
/// in seconds.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(epoch) = text.parse::<i64>() {
        return chrono::DateTime::from_timestamp(epoch, 0).map(|dt| dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

static SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^
        ([0-9]+(?:\.[0-9]+)?)   # 1: number
        [\ \t]*                 # optional space before the unit
        ([a-zA-Z]*)             # 2: unit
        $
        ",
    )
    .expect("valid size regex")
});

/// Parses a human readable size into bytes. Units are binary multiples;
/// `blocks` are 512 byte sectors.
pub fn parse_size(text: &str) -> Option<i64> {
    let caps = SIZE_REGEX.captures(text.trim())?;
    let number: f64 = caps[1].parse().ok()?;

    let multiplier: f64 = match caps[2].to_ascii_lowercase().as_str() {
        "" | "b" | "bytes" => 1.0,
        "k" | "kb" | "kib" => 1024.0,
        "m" | "mb" | "mib" => 1024f64.powi(2),
        "g" | "gb" | "gib" | "gbs" => 1024f64.powi(3),
        "t" | "tb" | "tib" | "tbs" => 1024f64.powi(4),
        "p" | "pb" | "pib" => 1024f64.powi(5),
        "blocks" | "block" => 512.0,
        _ => return None,
    };
    Some((number * multiplier).round() as i64)
}
