//! YAML documents with positioned parse errors

use modpreview_loader::{LoaderError, Position};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Parse a whole YAML document.
///
/// An empty document deserializes from an empty mapping, so files holding
/// nothing but comments are valid.
pub fn parse_yaml<T: DeserializeOwned>(resource: &str, text: &str) -> Result<T, LoaderError> {
    let text = if text.lines().all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')) {
        "{}"
    } else {
        text
    };

    serde_yaml::from_str(text).map_err(|e| {
        let position = e.location().map(|l| Position {
            line: l.line() as u32,
            column: l.column() as u32,
        });
        LoaderError::Parse {
            resource: resource.to_string(),
            position,
            message: e.to_string(),
        }
    })
}

/// 2D position of an element in a preview
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}
