//! Patch module - Describe and apply a local change to a template.
//!
//! Two kinds of patch:
//! - `Set`: replace one existing value addressed by a dotted key path
//! - `ReplaceGroup`: swap a whole parameter group for the contents of
//!   `<group>_enabled.json` or `<group>_disabled.json`
//!
//! Applying a patch either yields the fully patched template or an error.
//! Validation walks the whole path before anything is mutated.

use crate::error::PatchError;
use crate::template::Template;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Key holding named parameter groups in a Remote Config template.
pub const PARAMETER_GROUPS_KEY: &str = "parameterGroups";

/// Which variant of a parameter group to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Enabled,
    Disabled,
}

impl ToggleState {
    /// Parse a state option. Absent or unknown values fail, there is no default.
    pub fn parse(option: &str, value: Option<&str>) -> Result<Self, PatchError> {
        let value = value.unwrap_or_default();
        value.parse().map_err(|_| PatchError::UnsetOption {
            option: option.to_string(),
            value: value.to_string(),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for ToggleState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change to make to a template before writing it back.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchSpec {
    /// Replace the value at `path`. The path must exist and the new value
    /// must have the same JSON kind as the old one.
    Set { path: Vec<String>, value: Value },
    /// Replace `parameterGroups.<group>` with `fragment`.
    ReplaceGroup {
        group: String,
        state: ToggleState,
        fragment: Map<String, Value>,
    },
}

impl PatchSpec {
    /// Build a `Set` patch from a dotted path like `parameters.test.defaultValue.value`.
    pub fn set(path: &str, value: Value) -> Result<Self, PatchError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if path.trim().is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(PatchError::EmptyPath);
        }
        Ok(Self::Set {
            path: segments,
            value,
        })
    }

    /// Parse `PATH=VALUE`. With `as_json` the value is parsed as JSON,
    /// otherwise it is taken as a plain string.
    pub fn parse_assignment(expr: &str, as_json: bool) -> Result<Self, PatchError> {
        let (path, raw) = expr
            .split_once('=')
            .ok_or_else(|| PatchError::InvalidAssignment(expr.to_string()))?;

        let value = if as_json {
            serde_json::from_str::<Value>(raw).map_err(|_| PatchError::InvalidAssignment(expr.to_string()))?
        } else {
            Value::String(raw.to_string())
        };

        Self::set(path.trim(), value)
    }

    /// Load the fragment for `group` in the requested state from `patch_dir`.
    ///
    /// `state` is validated first so an unset option fails even when the
    /// fragment files are missing.
    pub fn load_group(patch_dir: &Path, group: &str, state: Option<&str>) -> Result<Self, PatchError> {
        let state = ToggleState::parse(group, state)?;

        let group = group.trim();
        if group.is_empty() {
            return Err(PatchError::EmptyPath);
        }

        let path = patch_dir.join(format!("{}_{}.json", group, state));
        if !path.is_file() {
            return Err(PatchError::MissingFragment(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| PatchError::InvalidFragment {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let fragment = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(PatchError::InvalidFragment {
                    path,
                    reason: "expected a JSON object".to_string(),
                })
            }
            Err(e) => {
                return Err(PatchError::InvalidFragment {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        debug!("Loaded parameter group fragment from {}", path.display());

        Ok(Self::ReplaceGroup {
            group: group.to_string(),
            state,
            fragment,
        })
    }

    /// Dotted path of the value this patch replaces.
    pub fn target(&self) -> String {
        match self {
            Self::Set { path, .. } => path.join("."),
            Self::ReplaceGroup { group, .. } => format!("{}.{}", PARAMETER_GROUPS_KEY, group),
        }
    }
}

impl fmt::Display for PatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { value, .. } => write!(f, "set {} = {}", self.target(), value),
            Self::ReplaceGroup { state, .. } => write!(f, "{} {}", state, self.target()),
        }
    }
}

/// Apply `spec` to `template`, returning the patched template.
pub fn apply_patch(mut template: Template, spec: &PatchSpec) -> Result<Template, PatchError> {
    let target = spec.target();

    match spec {
        PatchSpec::Set { path, value } => {
            let slot = locate(template.as_map_mut(), path, &target)?;
            let (expected, found) = (kind(slot), kind(value));
            if expected != found {
                return Err(PatchError::KindMismatch {
                    path: target,
                    expected,
                    found,
                });
            }
            *slot = value.clone();
        }
        PatchSpec::ReplaceGroup {
            group, fragment, ..
        } => {
            let path = [PARAMETER_GROUPS_KEY.to_string(), group.clone()];
            let slot = locate(template.as_map_mut(), &path, &target)?;
            if !slot.is_object() {
                return Err(PatchError::NotAnObject { path: target });
            }
            *slot = Value::Object(fragment.clone());
        }
    }

    info!("Patched {}", spec);
    Ok(template)
}

/// Walk `path` through nested objects and return the existing value at its end.
fn locate<'a>(
    root: &'a mut Map<String, Value>,
    path: &[String],
    target: &str,
) -> Result<&'a mut Value, PatchError> {
    let (last, parents) = path.split_last().ok_or(PatchError::EmptyPath)?;

    let mut current = root;
    let mut walked: Vec<&str> = Vec::with_capacity(parents.len());
    for segment in parents {
        walked.push(segment);
        current = match current.get_mut(segment) {
            Some(next) => next.as_object_mut().ok_or_else(|| PatchError::NotAnObject {
                path: walked.join("."),
            })?,
            None => {
                return Err(PatchError::MissingKey {
                    path: target.to_string(),
                    key: segment.clone(),
                })
            }
        };
    }

    current.get_mut(last).ok_or_else(|| PatchError::MissingKey {
        path: target.to_string(),
        key: last.clone(),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
