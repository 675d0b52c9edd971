use navi_common::ConfigError;
use regex::Regex;

use crate::converter::{Captured, Converter};

/// How a descriptor finds its value in a chunk of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSpec {
    /// A literal `Label:` at the start of a line; the rest of the line, or
    /// everything up to the end marker, is the value.
    Label(String),
    /// A regular expression. Its capture groups are the value; without
    /// groups the whole match is.
    Pattern(String),
}

/// Describes one field of a record type.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub match_spec: MatchSpec,
    pub key: String,
    pub converter: Option<Converter>,
    /// Index fields start a new record and identify it when merging
    pub is_index: bool,
    /// Label of the line that ends a multi-line value
    pub end_marker: Option<String>,
    /// Declaration order within the descriptor set
    pub order: usize,
}

impl PropertyDescriptor {
    pub fn label(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_spec(key, MatchSpec::Label(label.into()))
    }

    pub fn pattern(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_spec(key, MatchSpec::Pattern(pattern.into()))
    }

    fn with_spec(key: impl Into<String>, match_spec: MatchSpec) -> Self {
        Self {
            match_spec,
            key: key.into(),
            converter: None,
            is_index: false,
            end_marker: None,
            order: 0,
        }
    }

    pub fn index(mut self) -> Self {
        self.is_index = true;
        self
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Makes a label value span lines, up to the line starting with
    /// `marker`.
    ///
    /// Like labels, the marker only matches at the start of a line, after
    /// optional indentation. A marker that only appears mid-line leaves the
    /// field absent, so text inside a value never ends it early.
    pub fn with_end(mut self, marker: impl Into<String>) -> Self {
        self.end_marker = Some(marker.into());
        self
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self.match_spec, MatchSpec::Pattern(_))
    }

    /// Builds the regex used to find this field.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EndMarkerWithPattern`] when an end marker is combined
    ///   with a pattern
    /// - [`ConfigError::InvalidPattern`] when the pattern does not compile
    pub fn compile(&self) -> Result<Regex, ConfigError> {
        let source = match (&self.match_spec, &self.end_marker) {
            (MatchSpec::Pattern(_), Some(_)) => {
                return Err(ConfigError::EndMarkerWithPattern(self.key.clone()))
            }
            (MatchSpec::Pattern(pattern), None) => format!("(?mi){}", pattern),
            (MatchSpec::Label(label), None) => {
                format!(r"(?mi)^[ \t]*{}[ \t]*(.*?)[ \t]*$", regex::escape(label))
            }
            (MatchSpec::Label(label), Some(end)) => format!(
                r"(?msi)^[ \t]*{}[ \t]*(.*?)\s*^[ \t]*{}",
                regex::escape(label),
                regex::escape(end)
            ),
        };

        Regex::new(&source).map_err(|source| ConfigError::InvalidPattern {
            key: self.key.clone(),
            source,
        })
    }
}

/// Captures the value of a compiled descriptor in `chunk`.
pub(crate) fn capture(regex: &Regex, chunk: &str) -> Option<Captured> {
    let caps = regex.captures(chunk)?;
    let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default();

    let captured = match regex.captures_len() {
        1 => Captured::Text(group(0)),
        2 => Captured::Text(group(1)),
        n => Captured::Groups((1..n).map(group).collect()),
    };
    Some(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(descriptor: &PropertyDescriptor, chunk: &str) -> Option<Captured> {
        capture(&descriptor.compile().unwrap(), chunk)
    }

    #[test]
    fn test_label_captures_rest_of_line() {
        let d = PropertyDescriptor::label("owner", "Current Owner:");
        let chunk = "LOGICAL UNIT NUMBER 5\nName:  lun5\n  Current owner:   SP B  \nState: Bound\n";
        assert_eq!(captured(&d, chunk), Some(Captured::Text("SP B".to_string())));
    }

    #[test]
    fn test_label_is_literal() {
        let d = PropertyDescriptor::label("capacity", "User Capacity (GBs):");
        let chunk = "User Capacity (Blocks): 2097152\nUser Capacity (GBs):  1.000\n";
        assert_eq!(captured(&d, chunk), Some(Captured::Text("1.000".to_string())));
    }

    #[test]
    fn test_empty_value_does_not_spill_into_next_line() {
        let d = PropertyDescriptor::label("description", "Description:");
        let chunk = "Description:\nName: pool0\n";
        assert_eq!(captured(&d, chunk), Some(Captured::Text(String::new())));
    }

    #[test]
    fn test_label_miss() {
        let d = PropertyDescriptor::label("name", "Name:");
        assert_eq!(captured(&d, "State: Ready\n"), None);
    }

    #[test]
    fn test_end_marker_spans_lines() {
        let d = PropertyDescriptor::label("hlu_alu", "HLU/ALU Pairs:").with_end("Shareable:");
        let chunk = "HLU/ALU Pairs:\n\n  HLU Number     ALU Number\n    0               5\n\nShareable:   YES\n";
        let text = match captured(&d, chunk) {
            Some(Captured::Text(text)) => text,
            other => panic!("unexpected capture: {other:?}"),
        };
        assert!(text.contains("HLU Number"));
        assert!(text.contains("0               5"));
        assert!(!text.contains("Shareable"));
    }

    #[test]
    fn test_end_marker_must_start_a_line() {
        let d = PropertyDescriptor::label("disks", "Disks:").with_end("LUNs:");

        let indented = "Disks:\nBus 0 Enclosure 0 Disk 4\n   LUNs:  12\n";
        let text = match captured(&d, indented) {
            Some(Captured::Text(text)) => text,
            other => panic!("unexpected capture: {other:?}"),
        };
        assert_eq!(text.trim(), "Bus 0 Enclosure 0 Disk 4");

        let mid_line = "Disks:\nBus 0 Enclosure 0 Disk 4 LUNs: 12\n";
        assert!(captured(&d, mid_line).is_none());
    }

    #[test]
    fn test_pattern_groups() {
        let d = PropertyDescriptor::pattern("lun", r"^LOGICAL UNIT NUMBER (\d+)$");
        assert_eq!(
            captured(&d, "logical unit number 12\n"),
            Some(Captured::Text("12".to_string()))
        );

        let d = PropertyDescriptor::pattern("port", r"SP\s+(A|B)\s+(\d+)");
        assert_eq!(
            captured(&d, "20:00:00  SP B  3\n"),
            Some(Captured::Groups(vec!["B".to_string(), "3".to_string()]))
        );

        let d = PropertyDescriptor::pattern("flag", r"^Thin$");
        assert_eq!(
            captured(&d, "Type: x\nThin\n"),
            Some(Captured::Text("Thin".to_string()))
        );
    }

    #[test]
    fn test_end_marker_with_pattern_is_rejected() {
        let d = PropertyDescriptor::pattern("x", r"(\d+)").with_end("Done");
        assert!(matches!(
            d.compile(),
            Err(ConfigError::EndMarkerWithPattern(key)) if key == "x"
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        let d = PropertyDescriptor::pattern("broken", r"(unclosed");
        assert!(matches!(
            d.compile(),
            Err(ConfigError::InvalidPattern { key, .. }) if key == "broken"
        ));
    }
}
