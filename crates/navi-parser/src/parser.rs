use indexmap::IndexMap;
use navi_common::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::converter::Captured;
use crate::descriptor::{capture, PropertyDescriptor};
use crate::record::{FieldValue, ParsedRecord};

#[derive(Debug)]
struct CompiledField {
    descriptor: PropertyDescriptor,
    regex: Regex,
}

impl CompiledField {
    /// Extracts and converts this field. `None` when it is missing from
    /// `chunk` or its value does not convert.
    fn extract(&self, chunk: &str) -> Option<FieldValue> {
        let captured = capture(&self.regex, chunk)?;
        match &self.descriptor.converter {
            Some(converter) => {
                let value = converter.convert(&captured);
                if value.is_none() {
                    debug!(
                        "Could not convert {:?} for '{}' with {:?}",
                        captured.text(),
                        self.descriptor.key,
                        converter
                    );
                }
                value
            }
            None => Some(match captured {
                Captured::Text(text) => FieldValue::Str(text.trim().to_string()),
                Captured::Groups(groups) => FieldValue::List(
                    groups
                        .into_iter()
                        .map(|g| FieldValue::Str(g.trim().to_string()))
                        .collect(),
                ),
            }),
        }
    }
}

/// Turns command output into records, driven by a descriptor set.
///
/// Parsing runs in three steps:
///
/// 1. The output is split into chunks. Every match of the index field
///    starts a chunk and text before the first match is discarded. Without
///    an index field the whole output is one chunk.
/// 2. Each descriptor is matched against each chunk. A chunk whose index
///    field is missing is dropped; other missing fields are kept as absent.
/// 3. Records with equal index values are merged.
///
/// # Example
///
/// ```
/// use navi_parser::{PropertyDescriptor, RecordParser};
///
/// let parser = RecordParser::new(
///     "Pool",
///     vec![
///         PropertyDescriptor::label("name", "Pool Name:").index(),
///         PropertyDescriptor::label("state", "State:"),
///     ],
/// )
/// .unwrap();
///
/// let records = parser.parse_all("Pool Name: p0\nState: Ready\n\nPool Name: p1\n");
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0].get_str("state"), Some("Ready"));
/// assert!(records[1].is_absent("state"));
/// ```
#[derive(Debug)]
pub struct RecordParser {
    name: String,
    fields: Vec<CompiledField>,
    /// Index field used to split the output into chunks
    splitter: Option<usize>,
    index_keys: Vec<String>,
}

impl RecordParser {
    /// Compiles a descriptor set. Declaration order is the position in
    /// `descriptors`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a descriptor does not compile or two
    /// descriptors share a key.
    pub fn new(
        name: impl Into<String>,
        descriptors: Vec<PropertyDescriptor>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(descriptors.len());

        for (order, mut descriptor) in descriptors.into_iter().enumerate() {
            if !seen.insert(descriptor.key.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate field '{}' in parser '{}'",
                    descriptor.key, name
                )));
            }
            descriptor.order = order;
            let regex = descriptor.compile()?;
            fields.push(CompiledField { descriptor, regex });
        }

        let index_fields: Vec<&CompiledField> =
            fields.iter().filter(|f| f.descriptor.is_index).collect();
        let index_keys: Vec<String> = index_fields
            .iter()
            .map(|f| f.descriptor.key.clone())
            .collect();
        let splitter = index_fields
            .iter()
            .min_by_key(|f| f.descriptor.order)
            .map(|f| f.descriptor.order);

        if let (Some(split), true) = (splitter, index_keys.len() > 1) {
            warn!(
                "Parser '{}' has {} index fields ({}), splitting on '{}'",
                name,
                index_keys.len(),
                index_keys.join(", "),
                fields[split].descriptor.key
            );
        }

        Ok(Self {
            name,
            fields,
            splitter,
            index_keys,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.fields.iter().map(|f| &f.descriptor)
    }

    /// Keys of the index fields, in declaration order.
    pub fn index_keys(&self) -> &[String] {
        &self.index_keys
    }

    /// Splits `text` into record chunks.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let Some(splitter) = self.splitter else {
            return vec![text];
        };

        let starts: Vec<usize> = self.fields[splitter]
            .regex
            .find_iter(text)
            .map(|m| m.start())
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(text.len());
                &text[start..end]
            })
            .collect()
    }

    /// Extracts one record from a chunk.
    ///
    /// Returns `None` when the index field that splits the output is missing
    /// from the chunk. Other index fields are absent like any other field and
    /// enter the merge key as empty.
    pub fn parse_single(&self, chunk: &str) -> Option<ParsedRecord> {
        let mut record = ParsedRecord::new();
        for field in &self.fields {
            let value = field.extract(chunk);
            if Some(field.descriptor.order) == self.splitter && value.is_none() {
                debug!(
                    "Dropping {} chunk without index field '{}'",
                    self.name, field.descriptor.key
                );
                return None;
            }
            record.insert(field.descriptor.key.clone(), value);
        }
        Some(record)
    }

    /// Merges records that share the same index values, keeping the order
    /// in which each index was first seen.
    pub fn merge_by_index(&self, records: Vec<ParsedRecord>) -> Vec<ParsedRecord> {
        if self.index_keys.is_empty() {
            return records;
        }

        let mut merged: IndexMap<String, ParsedRecord> = IndexMap::new();
        for record in records {
            let key = record.index_key(&self.index_keys);
            match merged.get_mut(&key) {
                Some(existing) => existing.merge(record),
                None => {
                    merged.insert(key, record);
                }
            }
        }
        merged.into_values().collect()
    }

    /// Parses every record in `text`.
    pub fn parse_all(&self, text: &str) -> Vec<ParsedRecord> {
        let text = text.replace("\r\n", "\n");
        let chunks = self.split(&text);
        let chunk_count = chunks.len();

        let records: Vec<ParsedRecord> = chunks
            .into_iter()
            .filter_map(|chunk| self.parse_single(chunk))
            .collect();
        let records = self.merge_by_index(records);

        debug!(
            "Parsed {} {} record(s) from {} chunk(s)",
            records.len(),
            self.name,
            chunk_count
        );
        records
    }

    /// First record in `text`, or an empty record when there is none.
    pub fn parse(&self, text: &str) -> ParsedRecord {
        self.parse_all(text).into_iter().next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;

    fn id_value_parser() -> RecordParser {
        RecordParser::new(
            "Sample",
            vec![
                PropertyDescriptor::label("id", "id:")
                    .index()
                    .with_converter(Converter::Int),
                PropertyDescriptor::label("value", "value:"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_two_paragraphs_two_records() {
        let text = "\
id: 123
value: abcde

id: 456
value: ghijk
";
        let records = id_value_parser().parse_all(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_int("id"), Some(123));
        assert_eq!(records[0].get_str("value"), Some("abcde"));
        assert_eq!(records[1].get_int("id"), Some(456));
        assert_eq!(records[1].get_str("value"), Some("ghijk"));
    }

    #[test]
    fn test_repeated_index_is_merged() {
        let text = "\
id: 123

id: 456
value: ghijk

id: 123
value: abcde
";
        let records = id_value_parser().parse_all(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_int("id"), Some(123));
        assert_eq!(records[0].get_str("value"), Some("abcde"));
        assert_eq!(records[1].get_int("id"), Some(456));
    }

    #[test]
    fn test_merge_keeps_earlier_value() {
        let text = "id: 1\nvalue: first\n\nid: 1\n";
        let records = id_value_parser().parse_all(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("value"), Some("first"));
    }

    #[test]
    fn test_prefix_before_first_index_is_discarded() {
        let text = "value: orphan\n\nid: 7\nvalue: kept\n";
        let parser = id_value_parser();
        assert_eq!(parser.split(text).len(), 1);
        let records = parser.parse_all(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("value"), Some("kept"));
    }

    #[test]
    fn test_chunk_with_unconvertible_index_is_dropped() {
        let text = "id: 1\nvalue: a\n\nid: none\nvalue: b\n";
        let records = id_value_parser().parse_all(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("value"), Some("a"));
    }

    #[test]
    fn test_parse_single_drops_chunk_without_index() {
        let parser = id_value_parser();
        assert!(parser.parse_single("value: lonely\n").is_none());
        let record = parser.parse_single("id: 3\n").unwrap();
        assert!(record.is_absent("value"));
    }

    #[test]
    fn test_no_index_whole_text_is_one_record() {
        let parser = RecordParser::new(
            "Agent",
            vec![
                PropertyDescriptor::label("revision", "Revision:"),
                PropertyDescriptor::label("model", "Model:"),
            ],
        )
        .unwrap();
        let records = parser.parse_all("Agent Rev:  7.33.9\nModel:  VNX5300\nRevision: 05.32\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("model"), Some("VNX5300"));
        assert_eq!(records[0].get_str("revision"), Some("05.32"));
    }

    #[test]
    fn test_parse_returns_first_or_empty() {
        let parser = id_value_parser();
        let first = parser.parse("id: 9\nvalue: x\nid: 10\n");
        assert_eq!(first.get_int("id"), Some(9));
        assert!(parser.parse("nothing here").is_empty());
    }

    #[test]
    fn test_crlf_output() {
        let records = id_value_parser().parse_all("id: 1\r\nvalue: a\r\n");
        assert_eq!(records[0].get_str("value"), Some("a"));
    }

    #[test]
    fn test_multiple_index_fields() {
        let parser = RecordParser::new(
            "Port",
            vec![
                PropertyDescriptor::label("sp", "SP Name:").index(),
                PropertyDescriptor::label("port", "SP Port ID:")
                    .index()
                    .with_converter(Converter::Int),
                PropertyDescriptor::label("speed", "Link Speed:"),
            ],
        )
        .unwrap();
        assert_eq!(parser.index_keys(), &["sp".to_string(), "port".to_string()]);

        let text = "\
SP Name: SP A
SP Port ID: 0
Link Speed: 8Gbps

SP Name: SP A
SP Port ID: 1

SP Name: SP A
SP Port ID: 0
";
        let records = parser.parse_all(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("speed"), Some("8Gbps"));
        assert_eq!(records[1].get_int("port"), Some(1));
    }

    #[test]
    fn test_missing_secondary_index_keeps_record() {
        let parser = RecordParser::new(
            "Port",
            vec![
                PropertyDescriptor::label("sp", "SP Name:").index(),
                PropertyDescriptor::label("port", "SP Port ID:")
                    .index()
                    .with_converter(Converter::Int),
                PropertyDescriptor::label("speed", "Link Speed:"),
            ],
        )
        .unwrap();

        let text = "SP Name: SP A\nLink Speed: 8Gbps\n\nSP Name: SP B\nSP Port ID: 1\n";
        let records = parser.parse_all(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("sp"), Some("SP A"));
        assert!(records[0].is_absent("port"));
        assert_eq!(records[0].get_str("speed"), Some("8Gbps"));
        assert_eq!(records[1].get_str("sp"), Some("SP B"));
        assert_eq!(records[1].get_int("port"), Some(1));

        // splitting index still required
        assert!(parser.parse_single("SP Port ID: 4\nLink Speed: 16Gbps\n").is_none());
    }

    #[test]
    fn test_nested_records() {
        let hba = std::sync::Arc::new(
            RecordParser::new(
                "HbaPort",
                vec![
                    PropertyDescriptor::pattern(
                        "pair",
                        r"^\s*((?:[0-9a-f]{2}:){31}[0-9a-f]{2})\s+(SP\s+[AB])\s+(\d+)",
                    )
                    .index(),
                    PropertyDescriptor::pattern("sp", r"\s(SP\s+[AB])\s"),
                    PropertyDescriptor::pattern("port", r"SP\s+[AB]\s+(\d+)")
                        .with_converter(Converter::Int),
                ],
            )
            .unwrap(),
        );
        let group = RecordParser::new(
            "StorageGroup",
            vec![
                PropertyDescriptor::label("name", "Storage Group Name:").index(),
                PropertyDescriptor::label("hbas", "HBA/SP Pairs:")
                    .with_end("HLU/ALU Pairs:")
                    .with_converter(Converter::Records(hba)),
            ],
        )
        .unwrap();

        let uid = "20:00:00:00:C9:12:34:56:10:00:00:00:C9:12:34:56:20:00:00:00:C9:12:34:56:10:00:00:00:C9:12:34:56";
        let text = format!(
            "Storage Group Name:    sg1\nHBA/SP Pairs:\n\n  HBA UID   SP Name   SPPort\n  -------   -------   ------\n  {uid}   SP A         0\n  {uid}   SP B         2\n\nHLU/ALU Pairs:\n"
        );
        let record = group.parse(&text);
        let hbas = record.get("hbas").and_then(FieldValue::as_records).unwrap();
        assert_eq!(hbas.len(), 2);
        assert_eq!(hbas[0].get_str("sp"), Some("SP A"));
        assert_eq!(hbas[1].get_int("port"), Some(2));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = RecordParser::new(
            "Dup",
            vec![
                PropertyDescriptor::label("name", "Name:"),
                PropertyDescriptor::label("name", "Pool Name:"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_descriptor_order_assigned() {
        let parser = id_value_parser();
        let orders: Vec<usize> = parser.descriptors().map(|d| d.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }
}
