//! Serde model of the project manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use casegrid_types::{PartName, Result, RuleName, Variable, VariableName};

use crate::rule::{Requirement, Restriction};

/// The apiVersion this build understands.
pub const API_VERSION: &str = "casegrid.dev/v1alpha1";
/// The only kind this build understands.
pub const PROJECT_KIND: &str = "Project";

/// A project manifest as declared on disk.
///
/// Maps are ordered so that enumeration, validation output, and generated
/// case streams are deterministic for a given manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub api_version: String,
    pub kind: String,

    /// Path of the chart under test, relative to the working directory.
    /// Defaults to `.` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,

    /// Directories scanned for `*.yaml` / `*.yml` part files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts_dirs: Vec<PathBuf>,

    /// Inline parts, written out to the working root at resolution time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parts: BTreeMap<PartName, serde_yaml::Value>,

    pub variables: BTreeMap<VariableName, Variable>,

    /// Total order over the variables. When omitted, the variable map order
    /// is used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_order: Vec<VariableName>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirements: BTreeMap<RuleName, Requirement>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub restrictions: BTreeMap<RuleName, Restriction>,
}

impl Project {
    /// Parse a manifest from YAML source.
    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    /// The chart path, defaulted.
    pub fn chart_path(&self) -> &str {
        self.chart.as_deref().unwrap_or(".")
    }
}
