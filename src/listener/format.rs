//! Configuration document formats.

use super::error::{ListenerError, ListenerResult};
use serde_json::Value;
use std::fmt;

/// The format a configuration document is written in.
///
/// Listeners decode documents into a common tree before merging, so the
/// format is a passthrough option: the core never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// TOML documents.
    #[default]
    Toml,
    /// JSON documents.
    Json,
    /// YAML documents.
    Yaml,
}

impl DocumentFormat {
    /// Decode `raw` into a document tree. An empty document decodes to
    /// an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Decode`] when the document is malformed.
    pub fn decode_tree(self, raw: &str) -> ListenerResult<Value> {
        if raw.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        match self {
            Self::Toml => toml::from_str(raw).map_err(|err| ListenerError::Decode {
                format: self,
                message: err.to_string(),
            }),
            Self::Json => serde_json::from_str(raw).map_err(|err| ListenerError::Decode {
                format: self,
                message: err.to_string(),
            }),
            Self::Yaml => serde_yaml::from_str(raw).map_err(|err| ListenerError::Decode {
                format: self,
                message: err.to_string(),
            }),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => write!(f, "toml"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_toml() {
        let tree = DocumentFormat::Toml
            .decode_tree("[first]\nvalue = \"x\"\n")
            .unwrap();
        assert_eq!(tree, json!({"first": {"value": "x"}}));
    }

    #[test]
    fn test_decode_json() {
        let tree = DocumentFormat::Json
            .decode_tree(r#"{"first": {"value": true}}"#)
            .unwrap();
        assert_eq!(tree, json!({"first": {"value": true}}));
    }

    #[test]
    fn test_decode_yaml() {
        let tree = DocumentFormat::Yaml
            .decode_tree("first:\n  value: 3\n")
            .unwrap();
        assert_eq!(tree, json!({"first": {"value": 3}}));
    }

    #[test]
    fn test_empty_document_is_empty_mapping() {
        for format in [DocumentFormat::Toml, DocumentFormat::Json, DocumentFormat::Yaml] {
            assert_eq!(format.decode_tree("  \n").unwrap(), json!({}));
        }
    }

    #[test]
    fn test_malformed_document() {
        let result = DocumentFormat::Json.decode_tree("{not json");
        assert!(matches!(result, Err(ListenerError::Decode { .. })));
    }
}
