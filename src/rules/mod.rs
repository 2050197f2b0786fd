//! # Audit Rule Framework
//!
//! This module provides the framework for misconfiguration detection and
//! contains the built-in rule implementations.
//!
//! ## Architecture
//!
//! All rules implement the [`Rule`] trait: a declared default severity,
//! an `audit` entry point invoked for every directive in document order,
//! and a list of recorded [`Issue`]s. Applicability is each rule's own
//! concern; the traversal driver dispatches every node to every rule.
//!
//! Rules see the live [`ScopeStack`], so a rule inspecting a statement
//! already sees the variables that very statement defines.
//!
//! ## Available Rules
//!
//! | ID | Name | Severity |
//! |----|------|----------|
//! | NS001 | HTTP Splitting | High |
//! | NS002 | Alias Path Traversal | High |
//! | NS003 | Host Spoofing | Medium |

mod alias_traversal;
mod host_spoofing;
mod http_splitting;

pub use alias_traversal::AliasTraversalRule;
pub use host_spoofing::HostSpoofingRule;
pub use http_splitting::HttpSplittingRule;

use std::rc::Rc;

use serde::Serialize;

use crate::directives::Directive;
use crate::report::Severity;
use crate::scope::ScopeStack;

/// One recorded problem, keyed to the rule that found it.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    /// ID of the rule that recorded this issue.
    pub rule_id: String,

    /// Short title of the problem.
    pub summary: String,

    /// Detailed description.
    pub description: String,

    /// The offending directive, rendered back to text.
    pub directive: String,

    /// Optional severity override; `None` means the rule's declared
    /// default applies.
    pub severity: Option<Severity>,
}

impl Issue {
    /// Creates an issue with the rule's default severity.
    pub fn new(
        rule_id: &str,
        summary: impl Into<String>,
        description: impl Into<String>,
        directive: &Directive,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            summary: summary.into(),
            description: description.into(),
            directive: directive.to_string(),
            severity: None,
        }
    }

    /// Overrides the severity for this one issue.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Trait for implementing audit rules.
///
/// All rules must implement this trait to be registered with the
/// [`RuleRegistry`].
pub trait Rule {
    /// Returns the unique identifier for this rule.
    ///
    /// Format: "NSnnn" where nnn is a zero-padded number (e.g. "NS001").
    fn id(&self) -> &'static str;

    /// Returns the human-readable name of the misconfiguration.
    fn name(&self) -> &'static str;

    /// Returns a detailed description of what this rule looks for.
    fn description(&self) -> &'static str;

    /// Returns the default severity level for issues from this rule.
    fn severity(&self) -> Severity;

    /// Returns remediation advice for addressing this misconfiguration.
    fn remediation(&self) -> &'static str;

    /// Inspects one directive in the context of the active scope stack.
    ///
    /// Applicability logic is internal: rules ignore directives they do
    /// not care about. Matching problems are recorded via
    /// [`Rule::issues`].
    fn audit(&mut self, directive: &Rc<Directive>, scope: &ScopeStack);

    /// The issues recorded so far during this audit run.
    fn issues(&self) -> &[Issue];
}

/// Ordered registry containing the audit rules for one analyzer.
///
/// Built with explicit registration so the rule set is statically
/// inspectable. Rules accumulate issues across the run; construct a
/// fresh registry per analyzer to keep runs independent.
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// Creates a registry with all built-in rules.
    pub fn new() -> Self {
        Self::with_rules(vec![
            Box::new(HttpSplittingRule::new()),
            Box::new(AliasTraversalRule::new()),
            Box::new(HostSpoofingRule::new()),
        ])
    }

    /// Creates a registry from an explicit rule collection.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Drops rules by ID (`exclude`) or keeps only the listed IDs
    /// (`only`, when non-empty). IDs compare case-insensitively.
    pub fn filter(mut self, exclude: &[String], only: &[String]) -> Self {
        let upper = |s: &String| s.to_uppercase();
        let exclude: Vec<String> = exclude.iter().map(upper).collect();
        let only: Vec<String> = only.iter().map(upper).collect();

        self.rules.retain(|rule| {
            let id = rule.id().to_uppercase();
            !exclude.contains(&id) && (only.is_empty() || only.contains(&id))
        });
        self
    }

    /// Returns a reference to all registered rules, in order.
    pub fn rules(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    /// Dispatches a single directive to every registered rule.
    pub fn audit(&mut self, directive: &Rc<Directive>, scope: &ScopeStack) {
        for rule in &mut self.rules {
            rule.audit(directive, scope);
        }
    }

    /// The subset of rules that recorded at least one issue.
    pub fn results(&self) -> Vec<&dyn Rule> {
        self.rules
            .iter()
            .filter(|rule| !rule.issues().is_empty())
            .map(|rule| rule.as_ref())
            .collect()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = RuleRegistry::new();
        assert!(!registry.rules().is_empty());
    }

    #[test]
    fn test_rule_ids_unique() {
        let registry = RuleRegistry::new();
        let mut ids: Vec<_> = registry.rules().iter().map(|r| r.id()).collect();
        let len_before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), len_before, "Rule IDs must be unique");
    }

    #[test]
    fn test_filter_only_and_exclude() {
        let registry = RuleRegistry::new().filter(&[], &["ns001".to_string()]);
        assert_eq!(registry.rules().len(), 1);
        assert_eq!(registry.rules()[0].id(), "NS001");

        let registry = RuleRegistry::new().filter(&["NS001".to_string()], &[]);
        assert!(registry.rules().iter().all(|r| r.id() != "NS001"));
    }
}
