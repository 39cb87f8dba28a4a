//! On-disk recording format
//!
//! Each test file run produces one JSON file holding an array of feature
//! recordings: the feature's declared structure plus one record per trace
//! call made while the file's tests ran.

use crate::structure::Structure;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// How a trace call named its requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementRef {
    /// A bare requirement name, resolved relative to the record's category.
    Name(String),
    /// A path of category names ending in the requirement name.
    Path(Vec<String>),
}

impl fmt::Display for RequirementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementRef::Name(name) => f.write_str(name),
            RequirementRef::Path(path) => f.write_str(&path.join(" / ")),
        }
    }
}

impl From<&str> for RequirementRef {
    fn from(name: &str) -> Self {
        RequirementRef::Name(name.to_string())
    }
}

impl From<String> for RequirementRef {
    fn from(name: String) -> Self {
        RequirementRef::Name(name)
    }
}

impl From<Vec<String>> for RequirementRef {
    fn from(path: Vec<String>) -> Self {
        RequirementRef::Path(path)
    }
}

/// One trace call: "this test exercised that requirement".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub requirement: RequirementRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    pub file_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title_path: Vec<String>,
}

impl RawRecord {
    /// Identity of the test that produced this record:
    /// `filePath#title/path/segments`.
    pub fn spec_id(&self) -> String {
        format!("{}#{}", self.file_path, self.title_path.join("/"))
    }

    /// The category scope the trace was made in (empty at feature level).
    pub fn category_path(&self) -> &[String] {
        self.category.as_deref().unwrap_or_default()
    }
}

/// A feature as recorded by one test file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRecording {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub structure: Structure,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub records: Vec<RawRecord>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the contents of one coverage file.
pub fn parse_recordings(json: &str) -> Result<Vec<FeatureRecording>> {
    serde_json::from_str(json).wrap_err("Failed to parse coverage recording JSON")
}

/// Serialize recordings in the on-disk format.
pub fn recordings_to_json(recordings: &[FeatureRecording]) -> Result<String> {
    serde_json::to_string_pretty(recordings).wrap_err("Failed to serialize coverage recordings")
}
