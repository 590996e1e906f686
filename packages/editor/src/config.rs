use crate::EditorError;
use serde::{Deserialize, Serialize};

/// Document configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Attribute keys stripped from pasted and cloned ideas
    pub non_cloned_attributes: Vec<String>,

    /// Maximum number of undo entries kept (0 = unlimited)
    pub max_undo_levels: usize,
}

impl Configuration {
    pub fn from_json(source: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_non_cloned_attributes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_cloned_attributes = keys.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_fields_are_missing() {
        let config = Configuration::from_json("{}").unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.max_undo_levels, 0);
    }

    #[test]
    fn test_camel_case_fields() {
        let config =
            Configuration::from_json(r#"{"nonClonedAttributes": ["noncloned"], "maxUndoLevels": 5}"#)
                .unwrap();
        assert_eq!(config.non_cloned_attributes, vec!["noncloned".to_string()]);
        assert_eq!(config.max_undo_levels, 5);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            Configuration::from_json("[1"),
            Err(EditorError::Json(_))
        ));
    }
}
