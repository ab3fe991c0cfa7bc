//! Transition rule table.
//!
//! A [`RuleTable`] maps a subject type tag (`"order"`, `"reservation"`, ...)
//! to its [`TransitionRuleSet`]: the allowed `from -> {to...}` edges and the
//! set of terminal statuses. Lookups are pure and total; anything the table
//! does not know about is simply not allowed.
//!
//! Subject types and statuses are compared case-insensitively.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Allowed transitions and terminal statuses for one subject type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRuleSet {
    #[serde(default, rename = "terminal")]
    pub terminal_statuses: BTreeSet<String>,
    #[serde(default)]
    pub allowed: BTreeMap<String, BTreeSet<String>>,
}

impl TransitionRuleSet {
    /// Build a rule set from string slices.
    pub fn new(terminal: &[&str], allowed: &[(&str, &[&str])]) -> Self {
        TransitionRuleSet {
            terminal_statuses: terminal.iter().map(|s| normalize(s)).collect(),
            allowed: allowed
                .iter()
                .map(|(from, tos)| (normalize(from), tos.iter().map(|t| normalize(t)).collect()))
                .collect(),
        }
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal_statuses.contains(&normalize(status))
    }

    /// Targets reachable from `from` in one step (empty for unknown statuses).
    pub fn targets(&self, from: &str) -> impl Iterator<Item = &str> {
        self.allowed
            .get(&normalize(from))
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    fn normalized(self) -> Self {
        TransitionRuleSet {
            terminal_statuses: self.terminal_statuses.iter().map(|s| normalize(s)).collect(),
            allowed: self
                .allowed
                .into_iter()
                .map(|(from, tos)| (normalize(&from), tos.iter().map(|t| normalize(t)).collect()))
                .collect(),
        }
    }
}

/// Outcome of evaluating a transition against the local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDecision {
    /// `from == to`; always permitted as an idempotent no-op.
    Unchanged,
    /// The edge exists in the table.
    Allowed,
    /// The subject is already in a terminal status.
    Terminal,
    /// No such edge.
    NotAllowed,
    /// The table has no entry for this subject type.
    UnknownSubjectType,
}

impl LocalDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LocalDecision::Unchanged | LocalDecision::Allowed)
    }

    /// Wire reason string, as used by the remote decision service.
    pub fn reason(&self) -> &'static str {
        match self {
            LocalDecision::Unchanged | LocalDecision::Allowed => "allowed",
            LocalDecision::Terminal => "terminal_state",
            LocalDecision::NotAllowed => "invalid_transition",
            LocalDecision::UnknownSubjectType => "unknown_subject_type",
        }
    }
}

/// Process-wide, read-only transition configuration keyed by subject type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    subjects: BTreeMap<String, TransitionRuleSet>,
}

impl RuleTable {
    /// An empty table. Every non-identity transition is rejected.
    pub fn empty() -> Self {
        RuleTable::default()
    }

    /// The default marketplace lifecycles.
    pub fn builtin() -> Self {
        RuleTable::empty()
            .with_subject(
                "order",
                TransitionRuleSet::new(
                    &["cancelled"],
                    &[("pending", &["paid", "cancelled"]), ("paid", &["cancelled"])],
                ),
            )
            .with_subject(
                "payment",
                TransitionRuleSet::new(
                    &["paid", "failed", "cancelled"],
                    &[("pending", &["paid", "failed", "cancelled"])],
                ),
            )
            .with_subject(
                "reservation",
                TransitionRuleSet::new(
                    &["cancelled", "completed"],
                    &[
                        ("pending", &["confirmed", "cancelled"]),
                        ("confirmed", &["checked_in", "cancelled"]),
                        ("checked_in", &["completed", "cancelled"]),
                    ],
                ),
            )
            .with_subject(
                "rental",
                TransitionRuleSet::new(
                    &["completed", "cancelled"],
                    &[
                        ("requested", &["accepted", "cancelled"]),
                        ("accepted", &["active", "cancelled"]),
                        ("active", &["completed"]),
                    ],
                ),
            )
    }

    /// Add or replace the rule set for a subject type.
    pub fn with_subject(mut self, subject_type: &str, rules: TransitionRuleSet) -> Self {
        self.subjects.insert(normalize(subject_type), rules.normalized());
        self
    }

    /// Parse and validate a TOML rule table.
    ///
    /// ```toml
    /// [subjects.order]
    /// terminal = ["cancelled"]
    ///
    /// [subjects.order.allowed]
    /// pending = ["paid", "cancelled"]
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, RuleError> {
        let raw: RuleTable = toml::from_str(source)?;
        let mut table = RuleTable::empty();
        for (subject_type, rules) in raw.subjects {
            if subject_type.trim().is_empty() {
                return Err(RuleError::EmptySubjectType);
            }
            table = table.with_subject(&subject_type, rules);
        }
        table.validate()?;
        Ok(table)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, RuleError> {
        let source = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), RuleError> {
        for (subject_type, rules) in &self.subjects {
            for status in &rules.terminal_statuses {
                if rules.allowed.get(status).is_some_and(|t| !t.is_empty()) {
                    return Err(RuleError::TerminalHasTransitions {
                        subject_type: subject_type.clone(),
                        status: status.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn rules_for(&self, subject_type: &str) -> Option<&TransitionRuleSet> {
        self.subjects.get(&normalize(subject_type))
    }

    pub fn subject_types(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }

    /// Whether `status` is terminal for `subject_type`. Unknown types have no
    /// terminal statuses.
    pub fn is_terminal(&self, subject_type: &str, status: &str) -> bool {
        self.rules_for(subject_type)
            .is_some_and(|rules| rules.is_terminal(status))
    }

    pub fn can_transition(&self, subject_type: &str, from: &str, to: &str) -> bool {
        self.evaluate(subject_type, from, to).is_allowed()
    }

    /// Full local decision. Identity transitions short-circuit before the
    /// terminal check, even for unknown subject types.
    pub fn evaluate(&self, subject_type: &str, from: &str, to: &str) -> LocalDecision {
        if same_status(from, to) {
            return LocalDecision::Unchanged;
        }
        let Some(rules) = self.rules_for(subject_type) else {
            return LocalDecision::UnknownSubjectType;
        };
        if rules.is_terminal(from) {
            return LocalDecision::Terminal;
        }
        let to = normalize(to);
        if rules.targets(from).any(|t| t == to) {
            LocalDecision::Allowed
        } else {
            LocalDecision::NotAllowed
        }
    }
}

/// Status equality as the rule table sees it.
pub fn same_status(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// The spelling statuses are stored under in the table, and the one written
/// back to a subject: trimmed and lowercase.
pub fn canonical_status(status: &str) -> String {
    normalize(status)
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}
