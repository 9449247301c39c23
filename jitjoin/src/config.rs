//! Run configuration: backend flags, join parameters and column selection.
//!
//! Every field has a default, so an empty JSON object `{}` is a valid
//! configuration file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::JitError;

/// Cranelift optimization level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Compilation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub opt_level: OptLevel,

    /// Run Cranelift's IR verifier on every function before emission.
    pub verify: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Speed,
            verify: true,
        }
    }
}

/// Parameters baked into the generated join function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinParams {
    /// Symbol name of the generated function.
    pub function_name: String,

    /// Marker written to result slots whose last comparison did not match.
    pub not_found: String,
}

impl Default for JoinParams {
    fn default() -> Self {
        Self {
            function_name: "nested_loop_join".to_string(),
            not_found: "Not Found".to_string(),
        }
    }
}

/// Complete configuration for one join run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JitjoinConfig {
    pub backend: BackendConfig,
    pub join: JoinParams,

    /// Zero-based column of the left table that is joined.
    pub left_column: usize,

    /// Zero-based column of the right table that is joined.
    pub right_column: usize,
}

impl Default for JitjoinConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            join: JoinParams::default(),
            left_column: 3,
            right_column: 1,
        }
    }
}

impl JitjoinConfig {
    pub fn from_json(text: &str) -> Result<Self, JitError> {
        serde_json::from_str(text).map_err(|e| JitError::InvalidParams(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, JitError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| JitError::InvalidParams(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}
