//! # Rule Conflict Detection
//!
//! Classifies proposed RCC rule rows into rule families, derives their
//! canonical keys and reports collisions with the existing rule configuration.
//!
//! ```rust,ignore
//! use onboard_core::rules;
//!
//! let scan = rules::scan(existing_yaml, "P1,US,LOB1,ACCT,1,12,RCC2")?;
//! for conflict in &scan.conflicts {
//!     println!("line {}: {}", conflict.line, conflict.reason);
//! }
//! ```

mod conflict;
mod parse;

pub use conflict::{detect_conflicts, scan, ConflictReport, ConflictScan, UnclassifiedRow};
pub use parse::{parse_existing, parse_rows, ExistingRules, ParsedRows, RejectedRow};

pub(crate) use parse::{family_depth, scalar_text};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Regulatory regime, derived from the partition code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// P0
    Federated,
    /// P1 to P4
    NonRegulated,
    /// P5
    Regulated,
}

impl Regime {
    /// Map a partition code (`P0`..`P5`, case-insensitive)
    pub fn from_partition(code: &str) -> Option<Self> {
        let code = code.trim();
        let digits = code.strip_prefix('P').or_else(|| code.strip_prefix('p'))?;
        match digits {
            "0" => Some(Regime::Federated),
            "1" | "2" | "3" | "4" => Some(Regime::NonRegulated),
            "5" => Some(Regime::Regulated),
            _ => None,
        }
    }
}

/// Rule-key schema variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    /// `country|lob|type|doc_cat|doc_type`
    NonRegulatedComposite,
    /// `country|inv_ref` under the regulated regime
    RegulatedByReference,
    /// `country|inv_ref` under the non-regulated regime
    NonRegulatedByReference,
}

impl RuleFamily {
    pub const ALL: [RuleFamily; 3] = [
        RuleFamily::NonRegulatedComposite,
        RuleFamily::RegulatedByReference,
        RuleFamily::NonRegulatedByReference,
    ];

    /// Section name in the rules document
    pub fn section(&self) -> &'static str {
        match self {
            RuleFamily::NonRegulatedComposite => "non_regulated_rccRule",
            RuleFamily::RegulatedByReference => "inv_ref_id_rccRule",
            RuleFamily::NonRegulatedByReference => "non_regulated_inv_ref_id_rccRule",
        }
    }

    pub fn from_section(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|family| family.section() == name)
    }

    fn regime(&self) -> Regime {
        match self {
            RuleFamily::RegulatedByReference => Regime::Regulated,
            RuleFamily::NonRegulatedComposite | RuleFamily::NonRegulatedByReference => {
                Regime::NonRegulated
            }
        }
    }

    fn matches(&self, row: &RuleRow) -> bool {
        let populated = |value: &str| !value.is_empty();
        match self {
            RuleFamily::NonRegulatedComposite => [
                row.country.as_str(),
                row.lob.as_str(),
                row.rule_type.as_str(),
                row.doc_cat.as_str(),
                row.doc_type.as_str(),
            ]
            .into_iter()
            .all(populated),
            RuleFamily::RegulatedByReference | RuleFamily::NonRegulatedByReference => {
                populated(&row.country) && populated(&row.inv_ref)
            }
        }
    }

    /// Choose the family for a row. Exactly one family of the row's regime
    /// must match its populated fields.
    pub fn select(row: &RuleRow) -> Result<RuleFamily, String> {
        let regime = row.regime();
        if regime == Regime::Federated {
            return Err(format!("partition {} has no rule family", row.partition));
        }

        let candidates: Vec<RuleFamily> = Self::ALL
            .into_iter()
            .filter(|family| family.regime() == regime && family.matches(row))
            .collect();

        match candidates.as_slice() {
            [family] => Ok(*family),
            [] => Err(format!(
                "populated fields do not match any rule family for partition {}",
                row.partition
            )),
            many => Err(format!(
                "populated fields match several rule families: {}",
                many.iter().map(|f| f.section()).collect::<Vec<_>>().join(", ")
            )),
        }
    }

    fn key_fields<'a>(&self, row: &'a RuleRow) -> Vec<&'a str> {
        match self {
            RuleFamily::NonRegulatedComposite => vec![
                row.country.as_str(),
                row.lob.as_str(),
                row.rule_type.as_str(),
                row.doc_cat.as_str(),
                row.doc_type.as_str(),
            ],
            RuleFamily::RegulatedByReference | RuleFamily::NonRegulatedByReference => {
                vec![row.country.as_str(), row.inv_ref.as_str()]
            }
        }
    }
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Canonical rule key, rendered as `[a|b|c]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(String);

impl RuleKey {
    pub fn from_fields(fields: &[&str]) -> Self {
        Self(format!("[{}]", fields.join("|")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One proposed rule line. Blank attributes are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRow {
    /// 1-based line in the submitted batch
    pub line: usize,
    /// Original line text
    pub raw: String,
    pub partition: String,
    pub country: String,
    pub lob: String,
    pub rule_type: String,
    pub doc_cat: String,
    pub doc_type: String,
    pub inv_ref: String,
    /// RCC code
    pub value: String,
}

impl RuleRow {
    /// Regime of the row. Rows are only built with valid partitions.
    pub fn regime(&self) -> Regime {
        Regime::from_partition(&self.partition).unwrap_or(Regime::Federated)
    }

    pub fn family(&self) -> Option<RuleFamily> {
        RuleFamily::select(self).ok()
    }

    pub fn key(&self) -> Option<RuleKey> {
        self.family()
            .map(|family| RuleKey::from_fields(&family.key_fields(self)))
    }
}
