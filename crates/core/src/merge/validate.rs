//! Structural checks on merged documents.
//!
//! A merge may add entries but must parse, must not open new sections, must
//! not repeat a list item and must not drop anything that was there before.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::artifact::{Artifact, DocumentFormat};
use crate::rules::{family_depth, scalar_text};

/// A broken merge rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Output is not valid in the declared format
    Unparseable { reason: String },
    /// A mapping key appeared at section level or above
    NewSection { path: String },
    /// A key or list item present before is gone
    RemovedEntry { path: String },
    /// A list item was added although the list already holds it
    DuplicateEntry { path: String },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Unparseable { reason } => write!(f, "output does not parse: {}", reason),
            Violation::NewSection { path } => write!(f, "new section `{}`", path),
            Violation::RemovedEntry { path } => write!(f, "removed entry `{}`", path),
            Violation::DuplicateEntry { path } => write!(f, "duplicate entry `{}`", path),
        }
    }
}

fn parse(text: &str, format: DocumentFormat) -> Result<Value, String> {
    match format {
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    }
}

/// Compare the merged document against the one it was produced from
pub fn validate(artifact: Artifact, before: &str, after: &str) -> Vec<Violation> {
    let after = match parse(after, artifact.format()) {
        Ok(value) => value,
        Err(reason) => return vec![Violation::Unparseable { reason }],
    };
    // Nothing to compare against when the original itself is broken
    let Ok(before) = parse(before, artifact.format()) else {
        return Vec::new();
    };

    // Rule families may sit under a `rules` root or at the top level
    let max_depth = match artifact {
        Artifact::Rules => family_depth(&before),
        _ => artifact.section_depth(),
    };

    let mut violations = Vec::new();
    new_sections(&before, &after, 1, max_depth, "", &mut violations);
    removed_entries(&before, &after, "", &mut violations);
    duplicate_entries(&before, &after, "", &mut violations);
    violations
}

fn join(prefix: &str, key: &Value) -> String {
    let key = scalar_text(key).unwrap_or_else(|| "?".to_string());
    if prefix.is_empty() {
        key
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn new_sections(
    before: &Value,
    after: &Value,
    depth: usize,
    max_depth: usize,
    prefix: &str,
    out: &mut Vec<Violation>,
) {
    if depth > max_depth {
        return;
    }
    let (Value::Mapping(before), Value::Mapping(after)) = (before, after) else {
        return;
    };

    for (key, after_value) in after {
        let path = join(prefix, key);
        match before.get(key) {
            Some(before_value) => {
                new_sections(before_value, after_value, depth + 1, max_depth, &path, out)
            }
            None => out.push(Violation::NewSection { path }),
        }
    }
}

fn removed_entries(before: &Value, after: &Value, prefix: &str, out: &mut Vec<Violation>) {
    match (before, after) {
        (Value::Mapping(before), Value::Mapping(after)) => {
            for (key, before_value) in before {
                let path = join(prefix, key);
                match after.get(key) {
                    Some(after_value) => removed_entries(before_value, after_value, &path, out),
                    None => out.push(Violation::RemovedEntry { path }),
                }
            }
        }
        (Value::Sequence(before), Value::Sequence(after)) => {
            // Only scalar items are tracked; nested entries may be rewritten in place
            for item in before {
                if !is_scalar(item) || after.contains(item) {
                    continue;
                }
                let text = scalar_text(item).unwrap_or_default();
                out.push(Violation::RemovedEntry {
                    path: format!("{}[{}]", prefix, text),
                });
            }
        }
        (Value::Mapping(_), _) | (Value::Sequence(_), _) => out.push(Violation::RemovedEntry {
            path: prefix.to_string(),
        }),
        _ => {}
    }
}

fn is_scalar(item: &Value) -> bool {
    !(item.is_mapping() || item.is_sequence())
}

fn duplicate_entries(before: &Value, after: &Value, prefix: &str, out: &mut Vec<Violation>) {
    match (before, after) {
        (Value::Mapping(before), Value::Mapping(after)) => {
            for (key, after_value) in after {
                if let Some(before_value) = before.get(key) {
                    duplicate_entries(before_value, after_value, &join(prefix, key), out);
                }
            }
        }
        (Value::Sequence(before), Value::Sequence(after)) => {
            let mut reported: Vec<&Value> = Vec::new();
            for item in after.iter().filter(|item| is_scalar(item)) {
                if reported.contains(&item) {
                    continue;
                }
                let added = after.iter().filter(|other| *other == item).count();
                let existing = before.iter().filter(|other| *other == item).count();
                if added > existing.max(1) {
                    reported.push(item);
                    out.push(Violation::DuplicateEntry {
                        path: format!("{}[{}]", prefix, scalar_text(item).unwrap_or_default()),
                    });
                }
            }
        }
        _ => {}
    }
}
