//! Parsing of proposed rule rows and of the existing rules document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{Regime, RuleFamily, RuleRow};
use crate::error::RulesError;

/// Root key the rules document is nested under
const RULES_ROOT: &str = "rules";

/// A line that could not be turned into a [`RuleRow`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub line: usize,
    pub raw: String,
    pub reason: String,
}

/// Result of parsing a proposed batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedRows {
    pub rows: Vec<RuleRow>,
    pub rejected: Vec<RejectedRow>,
}

/// Parse comma-separated rule lines.
///
/// Field layouts by count:
/// - 7: `partition,country,lob,type,doc_cat,doc_type,rcc`
/// - 4: `partition,country,inv_ref,rcc`
/// - 8: `partition,country,lob,type,doc_cat,doc_type,inv_ref,rcc`
///
/// Blank lines, `#` comments and a `partition,...` header are skipped.
pub fn parse_rows(text: &str) -> ParsedRows {
    let mut parsed = ParsedRows::default();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<String> = trimmed.split(',').map(|f| f.trim().to_string()).collect();
        if fields[0].eq_ignore_ascii_case("partition") {
            continue;
        }

        match build_row(line, trimmed, fields) {
            Ok(row) => parsed.rows.push(row),
            Err(reason) => parsed.rejected.push(RejectedRow {
                line,
                raw: trimmed.to_string(),
                reason,
            }),
        }
    }

    parsed
}

fn build_row(line: usize, raw: &str, fields: Vec<String>) -> Result<RuleRow, String> {
    let count = fields.len();
    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or_default();

    let partition = next();
    if Regime::from_partition(&partition).is_none() {
        return Err(format!("unknown partition `{}`", partition));
    }

    let mut row = RuleRow {
        line,
        raw: raw.to_string(),
        partition,
        country: next(),
        lob: String::new(),
        rule_type: String::new(),
        doc_cat: String::new(),
        doc_type: String::new(),
        inv_ref: String::new(),
        value: String::new(),
    };

    match count {
        4 => {
            row.inv_ref = next();
        }
        7 | 8 => {
            row.lob = next();
            row.rule_type = next();
            row.doc_cat = next();
            row.doc_type = next();
            if count == 8 {
                row.inv_ref = next();
            }
        }
        other => return Err(format!("expected 4, 7 or 8 fields, found {}", other)),
    }
    row.value = next();

    Ok(row)
}

/// Existing rule configuration: family → rendered key → RCC value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRules {
    families: BTreeMap<RuleFamily, BTreeMap<String, String>>,
}

impl ExistingRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, family: RuleFamily, key: impl Into<String>, value: impl Into<String>) {
        self.families
            .entry(family)
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_rule(mut self, family: RuleFamily, key: &str, value: &str) -> Self {
        self.insert(family, key, value);
        self
    }

    pub fn get(&self, family: RuleFamily, key: &str) -> Option<&str> {
        self.families
            .get(&family)
            .and_then(|rules| rules.get(key))
            .map(String::as_str)
    }

    pub fn family(&self, family: RuleFamily) -> Option<&BTreeMap<String, String>> {
        self.families.get(&family)
    }

    /// Total number of rules across all families
    pub fn len(&self) -> usize {
        self.families.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse the rules document. Family sections are read from the `rules` root
/// when present, otherwise from the document root. Unknown sections are ignored.
pub fn parse_existing(blob: &str) -> Result<ExistingRules, RulesError> {
    let mut existing = ExistingRules::new();
    if blob.trim().is_empty() {
        return Ok(existing);
    }

    let document: Value = serde_yaml::from_str(blob)?;
    let root = family_root(&document);

    for family in RuleFamily::ALL {
        let section = match root.get(family.section()) {
            None | Some(Value::Null) => continue,
            Some(Value::Mapping(section)) => section,
            Some(_) => return Err(RulesError::InvalidSection(family.section().to_string())),
        };

        for (key, value) in section {
            if let (Some(key), Some(value)) = (scalar_text(key), scalar_text(value)) {
                existing.insert(family, key, value);
            }
        }
    }

    Ok(existing)
}

/// Mapping that holds the family sections: the `rules` root when present,
/// otherwise the document itself
pub(crate) fn family_root(document: &Value) -> &Value {
    document.get(RULES_ROOT).unwrap_or(document)
}

/// Mapping depth of the family sections (2 under `rules`, 1 at the root)
pub(crate) fn family_depth(document: &Value) -> usize {
    if document.get(RULES_ROOT).is_some() {
        2
    } else {
        1
    }
}

/// Text form of a scalar YAML node. A flow sequence key such as
/// `[US|123]` written without quotes renders back to the same text.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Sequence(items) => {
            let parts: Option<Vec<String>> = items.iter().map(scalar_text).collect();
            parts.map(|parts| format!("[{}]", parts.join("|")))
        }
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Mapping(_) => None,
    }
}
