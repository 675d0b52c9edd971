//! Record parser for storage processor CLI output.
//!
//! The CLI prints `Label: value` lines grouped into blocks. A
//! [`RecordParser`] cuts such output into records using an ordered set of
//! [`PropertyDescriptor`]s, and a [`ParserRegistry`] loads those sets for
//! every record type from a YAML document.

pub mod config;
pub mod converter;
pub mod descriptor;
pub mod parser;
pub mod record;

pub use config::ParserRegistry;
pub use converter::{Captured, Converter};
pub use descriptor::{MatchSpec, PropertyDescriptor};
pub use parser::RecordParser;
pub use record::{FieldValue, ParsedRecord};
