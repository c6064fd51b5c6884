//! Deployment Merge Engine
//!
//! Folds the deployment descriptors found in resource metadata into the
//! list collected on earlier polls. The list is ordered: an entry keeps its
//! position when a newer descriptor with the same (collector, id) replaces
//! it, and new entries are appended in the order the service lists them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::MergeError;
use crate::orchestration::RawMetadata;

/// Field under which Heat nests software deployments
pub const DEFAULT_DEPLOYMENT_KEY: &str = "deployments";

/// Group of deployments without an explicit group
const UNGROUPED: &str = "Heat::Ungrouped";

/// Groups whose configuration is collected
const COLLECTED_GROUPS: [&str; 2] = ["os-apply-config", UNGROUPED];

/// One deployment's configuration, tagged with where it came from
///
/// Serializes flat: the descriptor's own fields sit next to the tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedEntry {
    /// Name of the collector that produced the entry
    pub collector: String,
    /// Deployment id, or its name when the descriptor has no id
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Remaining descriptor fields, `config` included when present
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Why a descriptor could not be turned into an entry
#[derive(Debug, PartialEq, Eq)]
enum Malformed {
    NotAnObject,
    MissingId,
    ConfigNotAnObject,
}

impl std::fmt::Display for Malformed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Malformed::NotAnObject => write!(f, "descriptor is not an object"),
            Malformed::MissingId => write!(f, "descriptor has neither id nor name"),
            Malformed::ConfigNotAnObject => write!(f, "descriptor config is not an object"),
        }
    }
}

/// A descriptor after its group has been checked
#[derive(Debug, PartialEq, Eq)]
enum Reading {
    Collected(MergedEntry),
    Uncollected { group: String },
}

fn string_field(descriptor: &Map<String, Value>, field: &str) -> Option<String> {
    descriptor
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_collected(group: Option<&str>) -> bool {
    COLLECTED_GROUPS.contains(&group.unwrap_or(UNGROUPED))
}

/// Read one descriptor; the group is checked before any other field
fn read_descriptor(descriptor: &Value, collector: &str) -> Result<Reading, Malformed> {
    let fields = descriptor.as_object().ok_or(Malformed::NotAnObject)?;

    let group = string_field(fields, "group");
    if !is_collected(group.as_deref()) {
        return Ok(Reading::Uncollected {
            group: group.unwrap_or_else(|| UNGROUPED.to_string()),
        });
    }

    if matches!(fields.get("config"), Some(config) if !config.is_object()) {
        return Err(Malformed::ConfigNotAnObject);
    }

    let name = string_field(fields, "name");
    let id = string_field(fields, "id")
        .or_else(|| name.clone())
        .ok_or(Malformed::MissingId)?;

    let fields = fields
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "collector" | "id" | "name" | "group"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Reading::Collected(MergedEntry {
        collector: collector.to_string(),
        id,
        name,
        group,
        fields,
    }))
}

/// Ordered list of merged configuration entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedList(Vec<MergedEntry>);

impl MergedList {
    pub fn new(entries: Vec<MergedEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[MergedEntry] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MergedEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_entries(self) -> Vec<MergedEntry> {
        self.0
    }

    /// Entry produced by `collector` for deployment `id`
    pub fn get(&self, collector: &str, id: &str) -> Option<&MergedEntry> {
        self.0
            .iter()
            .find(|entry| entry.collector == collector && entry.id == id)
    }
}

impl From<Vec<MergedEntry>> for MergedList {
    fn from(entries: Vec<MergedEntry>) -> Self {
        Self(entries)
    }
}

impl<'a> IntoIterator for &'a MergedList {
    type Item = &'a MergedEntry;
    type IntoIter = std::slice::Iter<'a, MergedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Descriptors under `deployment_key`, empty when there are none
fn deployments<'a>(
    raw: &'a RawMetadata,
    deployment_key: &str,
) -> Result<&'a [Value], MergeError> {
    let fields = match raw.as_value() {
        Value::Object(fields) => fields,
        Value::Null => return Ok(&[][..]),
        other => {
            return Err(MergeError::NotAnObject {
                kind: json_kind(other),
            })
        }
    };

    match fields.get(deployment_key) {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(descriptors)) => {
            debug!(
                deployment_key = deployment_key,
                count = descriptors.len(),
                "Deployment found for {}",
                deployment_key
            );
            Ok(descriptors.as_slice())
        }
        Some(other) => {
            warn!(
                deployment_key = deployment_key,
                kind = json_kind(other),
                "Deployment-key {} was found but does not contain a list.",
                deployment_key
            );
            Ok(&[][..])
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Merge the deployments in `raw` into `previous`
///
/// The previous list is not modified. A descriptor that cannot be read is
/// logged and skipped; only metadata that is not an object at all fails the
/// merge.
pub fn merge(
    raw: &RawMetadata,
    deployment_key: &str,
    collector_name: &str,
    previous: &MergedList,
) -> Result<MergedList, MergeError> {
    let descriptors = deployments(raw, deployment_key)?;

    let mut merged = previous.0.clone();
    let mut positions: HashMap<(String, String), usize> = HashMap::with_capacity(merged.len());
    for (index, entry) in merged.iter().enumerate() {
        positions
            .entry((entry.collector.clone(), entry.id.clone()))
            .or_insert(index);
    }

    for (index, descriptor) in descriptors.iter().enumerate() {
        let entry = match read_descriptor(descriptor, collector_name) {
            Ok(Reading::Collected(entry)) => entry,
            Ok(Reading::Uncollected { group }) => {
                debug!(index = index, group = %group, "Deployment group is not collected");
                continue;
            }
            Err(reason) => {
                warn!(
                    deployment_key = deployment_key,
                    index = index,
                    "Skipping deployment under {}: {}",
                    deployment_key,
                    reason
                );
                continue;
            }
        };

        let key = (entry.collector.clone(), entry.id.clone());
        match positions.get(&key) {
            Some(&position) => merged[position] = entry,
            None => {
                positions.insert(key, merged.len());
                merged.push(entry);
            }
        }
    }

    Ok(MergedList(merged))
}
