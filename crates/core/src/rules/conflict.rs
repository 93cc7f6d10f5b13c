//! Exact-key collision detection between proposed rows and existing rules.

use serde::{Deserialize, Serialize};

use super::parse::{parse_existing, parse_rows, ExistingRules, RejectedRow};
use super::{RuleFamily, RuleKey, RuleRow};
use crate::error::RulesError;

/// A proposed row whose key is already mapped to a different value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Original row text
    pub row: String,
    pub line: usize,
    pub key: RuleKey,
    pub family: RuleFamily,
    pub existing_value: String,
    pub input_value: String,
    pub reason: String,
}

/// A well-formed row that matches no single rule family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclassifiedRow {
    pub line: usize,
    pub raw: String,
    pub reason: String,
}

/// Full outcome of checking a text batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictScan {
    pub conflicts: Vec<ConflictReport>,
    pub rejected: Vec<RejectedRow>,
    pub unclassified: Vec<UnclassifiedRow>,
}

impl ConflictScan {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Report every row whose key exists in its family map under a different
/// value. Values are compared as exact strings. Each row is judged on its
/// own, and the report is ordered by line then key, so the result does not
/// depend on row order.
pub fn detect_conflicts(existing: &ExistingRules, rows: &[RuleRow]) -> Vec<ConflictReport> {
    let mut conflicts: Vec<ConflictReport> = rows
        .iter()
        .filter_map(|row| check_row(existing, row))
        .collect();
    conflicts.sort_by(|a, b| (a.line, &a.key, &a.row).cmp(&(b.line, &b.key, &b.row)));
    conflicts
}

fn check_row(existing: &ExistingRules, row: &RuleRow) -> Option<ConflictReport> {
    let family = row.family()?;
    let key = row.key()?;
    let current = existing.get(family, key.as_str())?;
    if current == row.value {
        return None;
    }

    Some(ConflictReport {
        row: row.raw.clone(),
        line: row.line,
        reason: format!(
            "key {} already mapped to {} in {}",
            key,
            current,
            family.section()
        ),
        key,
        family,
        existing_value: current.to_string(),
        input_value: row.value.clone(),
    })
}

/// Parse an existing rules document and a text batch, then detect conflicts
pub fn scan(existing_blob: &str, rows_text: &str) -> Result<ConflictScan, RulesError> {
    let existing = parse_existing(existing_blob)?;
    let parsed = parse_rows(rows_text);

    let unclassified = parsed
        .rows
        .iter()
        .filter_map(|row| {
            RuleFamily::select(row).err().map(|reason| UnclassifiedRow {
                line: row.line,
                raw: row.raw.clone(),
                reason,
            })
        })
        .collect();

    Ok(ConflictScan {
        conflicts: detect_conflicts(&existing, &parsed.rows),
        rejected: parsed.rejected,
        unclassified,
    })
}
