// src/rules.rs

//! Path rules for forcing classification outcomes
//!
//! Rules are pure configuration: an ordered list of glob patterns, each
//! tagged with the outcome it forces. The first matching rule wins; when no
//! rule matches the classifier has no opinion and the Decision Engine falls
//! back to content comparison. An empty rule set is valid and means every
//! file is decided by content alone.

use crate::error::Result;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome a rule forces for matching paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Matching files always go into the archive set
    Pack,
    /// Matching files always stay individually addressable on disk
    Loose,
}

/// What the rule set says about one relative path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    ForcedPack,
    ForcedLoose,
    /// No rule matched; defer to content comparison
    NoOpinion,
}

/// One configured rule, as it appears in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Glob pattern matched against the forward-slash relative path
    pub pattern: String,
    /// Outcome forced on a match
    pub force: RuleAction,
}

/// A compiled rule
#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Pattern,
    raw: String,
    action: RuleAction,
}

/// Ordered, compiled rule set
///
/// Compiled once at configuration load so invalid patterns fail early with
/// a configuration error instead of surfacing mid-run.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

/// Candidate trees commonly come from case-insensitive conventions, so
/// rules match without regard to case. Separators are not literal: `*`
/// spans directories, which keeps prefix rules like `textures*` working.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl RuleSet {
    /// Compile an ordered list of rule entries
    pub fn compile(entries: &[RuleEntry]) -> Result<Self> {
        let mut rules = Vec::with_capacity(entries.len());
        for entry in entries {
            rules.push(CompiledRule {
                pattern: Pattern::new(&entry.pattern)?,
                raw: entry.pattern.clone(),
                action: entry.force,
            });
        }
        Ok(Self { rules })
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are configured
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify a relative path; first matching rule wins
    pub fn classify(&self, relative: &Path) -> RuleVerdict {
        if self.rules.is_empty() {
            return RuleVerdict::NoOpinion;
        }

        let normalized = relative.to_string_lossy().replace('\\', "/");
        for rule in &self.rules {
            if rule.pattern.matches_with(&normalized, MATCH_OPTIONS) {
                tracing::debug!(
                    "Rule '{}' forces {:?} for {}",
                    rule.raw,
                    rule.action,
                    normalized
                );
                return match rule.action {
                    RuleAction::Pack => RuleVerdict::ForcedPack,
                    RuleAction::Loose => RuleVerdict::ForcedLoose,
                };
            }
        }
        RuleVerdict::NoOpinion
    }
}
