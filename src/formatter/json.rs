//! JSON rendering of sample documents
//!
//! Documents are rendered as relaxed Extended JSON, so `_id` values keep
//! their BSON type (`{"$oid": ...}`) and can be compared with the source.

use colored_json::prelude::*;
use mongodb::bson::{Bson, Document};

use crate::error::{DocshiftError, Result};

/// Pretty JSON formatter
pub struct JsonFormatter {
    /// Indentation level
    indent: usize,

    /// Enable colored output
    use_colors: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    ///
    /// # Arguments
    /// * `use_colors` - Enable colored output
    /// * `indent` - Spaces per indentation level
    pub fn new(use_colors: bool, indent: usize) -> Self {
        Self { indent, use_colors }
    }

    /// Format a single document as relaxed Extended JSON
    ///
    /// # Arguments
    /// * `doc` - Document to format
    ///
    /// # Returns
    /// * `Result<String>` - JSON object string
    pub fn format_document(&self, doc: &Document) -> Result<String> {
        let value = Bson::Document(doc.clone()).into_relaxed_extjson();

        let json_str = self.to_pretty_string(&value)?;

        if self.use_colors {
            Ok(json_str.to_colored_json_auto().unwrap_or(json_str))
        } else {
            Ok(json_str)
        }
    }

    fn to_pretty_string<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let mut buf = Vec::new();
        let indent = " ".repeat(self.indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value
            .serialize(&mut ser)
            .map_err(|e| DocshiftError::Generic(format!("JSON serialization failed: {e}")))?;
        String::from_utf8(buf)
            .map_err(|e| DocshiftError::Generic(format!("JSON output is not UTF-8: {e}")))
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new(false, 2)
    }
}
