//! # Audit Driver
//!
//! One depth-first, pre-order walk of a directive tree, maintaining the
//! scope stack and dispatching every node to the rule engine.
//!
//! ## Algorithm
//!
//! For each node in document order:
//!
//! 1. If the node provides variables, compute them and insert each into
//!    the current scope frame, so a rule inspecting that very statement
//!    already sees the binding.
//! 2. Dispatch the node to the rule engine.
//! 3. If the node is a block that declares its own scope, push a frame,
//!    recurse into the children, and pop the frame on return; blocks
//!    without their own scope just recurse.
//!
//! The stack is run-scoped: owned by the driver, created fresh per
//! audit invocation and passed explicitly through the recursion, so two
//! runs never observe each other's bindings. A drop guard purges every
//! frame on all exit paths, errors included.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::directives::{Directive, DirectiveError};
use crate::parser::{NginxParser, ParseError};
use crate::report::{Finding, Severity};
use crate::rules::{Rule, RuleRegistry};
use crate::scope::{ScopeError, ScopeStack};

/// Errors that abort an audit run.
///
/// Partial results are discarded, never reported as complete.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The configuration text could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Variable extraction failed on a directive.
    #[error(transparent)]
    Directive(#[from] DirectiveError),

    /// The scope stack was driven out of balance: a driver defect, not
    /// an input problem.
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

/// Purges the scope stack when the run ends, normally or not.
struct ScopePurge<'a> {
    stack: &'a mut ScopeStack,
}

impl<'a> ScopePurge<'a> {
    fn new(stack: &'a mut ScopeStack) -> Self {
        Self { stack }
    }

    fn stack(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for ScopePurge<'_> {
    fn drop(&mut self) {
        self.stack.purge_all();
    }
}

/// Audits configuration trees against a rule registry.
///
/// Owns the rules for one logical run; issues accumulate in the rules
/// across `audit` calls, so use one analyzer per independent scan.
pub struct Analyzer {
    rules: RuleRegistry,
    allow_includes: bool,
}

impl Analyzer {
    /// Creates an analyzer over the given rule registry, with include
    /// resolution enabled.
    pub fn new(rules: RuleRegistry) -> Self {
        Self {
            rules,
            allow_includes: true,
        }
    }

    /// Controls whether `include` statements are resolved from disk.
    pub fn allow_includes(mut self, allow: bool) -> Self {
        self.allow_includes = allow;
        self
    }

    /// Parses and audits one configuration file's content.
    ///
    /// `path` locates the file for diagnostics and include resolution.
    ///
    /// # Errors
    ///
    /// Parser failures propagate unmodified; traversal failures indicate
    /// a defect (missing variant extraction, unbalanced scope). Either
    /// way the run is aborted and the scope stack released.
    pub fn audit(&mut self, path: &str, content: &str) -> Result<(), AuditError> {
        debug!("audit config file: {path}");

        let base_dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
        let parser = NginxParser::new(base_dir, self.allow_includes);
        let root = parser.parse(content, path)?;

        let mut stack = ScopeStack::new();
        let mut guard = ScopePurge::new(&mut stack);
        guard.stack().push(Some(root.clone()));
        self.audit_recursive(&root, guard.stack())
    }

    /// Walks `node`'s children in document order.
    fn audit_recursive(
        &mut self,
        node: &Rc<Directive>,
        stack: &mut ScopeStack,
    ) -> Result<(), AuditError> {
        for child in node.children() {
            self.update_variables(&child, stack)?;
            self.rules.audit(&child, stack);
            if child.is_block() {
                if child.self_context() {
                    stack.push(Some(child.clone()));
                }
                self.audit_recursive(&child, stack)?;
                if child.self_context() {
                    stack.pop()?;
                }
            }
        }
        Ok(())
    }

    /// Registers the variables a directive introduces into the current
    /// scope frame.
    fn update_variables(
        &self,
        directive: &Rc<Directive>,
        stack: &mut ScopeStack,
    ) -> Result<(), AuditError> {
        if !directive.provides_variables() {
            return Ok(());
        }
        // The "0" sentinel inside add_variable purges stale numbered
        // captures before the new regex binds its own.
        for var in directive.variables()? {
            stack.add_variable(var)?;
        }
        Ok(())
    }

    /// The subset of rules that recorded at least one issue.
    pub fn results(&self) -> Vec<&dyn Rule> {
        self.rules.results()
    }

    /// Per-severity issue counts over the full severity domain.
    ///
    /// An issue's own override wins over the rule's declared default;
    /// every known level is present in the result, zeroes included.
    pub fn stats(&self) -> BTreeMap<Severity, usize> {
        let mut stats: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();

        for rule in self.rules.rules() {
            let base_severity = rule.severity();
            for issue in rule.issues() {
                let severity = issue.severity.unwrap_or(base_severity);
                *stats.entry(severity).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Flattens all recorded issues into report findings for `path`.
    pub fn findings(&self, path: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for rule in self.rules.rules() {
            for issue in rule.issues() {
                findings.push(Finding {
                    rule_id: issue.rule_id.clone(),
                    title: issue.summary.clone(),
                    description: issue.description.clone(),
                    severity: issue.severity.unwrap_or_else(|| rule.severity()),
                    file_path: path.to_string(),
                    directive: issue.directive.clone(),
                    remediation: rule.remediation().to_string(),
                });
            }
        }
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Issue;
    use std::cell::RefCell;

    /// Records the scope depth and `$x` visibility at every directive.
    struct ProbeRule {
        log: Rc<RefCell<Vec<(String, usize, bool)>>>,
        issues: Vec<Issue>,
    }

    impl ProbeRule {
        fn new(log: Rc<RefCell<Vec<(String, usize, bool)>>>) -> Self {
            Self {
                log,
                issues: Vec::new(),
            }
        }
    }

    impl Rule for ProbeRule {
        fn id(&self) -> &'static str {
            "T000"
        }
        fn name(&self) -> &'static str {
            "Probe"
        }
        fn description(&self) -> &'static str {
            "records traversal state"
        }
        fn severity(&self) -> Severity {
            Severity::Low
        }
        fn remediation(&self) -> &'static str {
            ""
        }
        fn audit(&mut self, directive: &Rc<Directive>, scope: &ScopeStack) {
            self.log.borrow_mut().push((
                directive.name().to_string(),
                scope.depth(),
                scope.lookup("x").is_some(),
            ));
        }
        fn issues(&self) -> &[Issue] {
            &self.issues
        }
    }

    /// Records a fixed set of issues on the first directive it sees.
    struct StubRule {
        issues: Vec<Issue>,
        emitted: bool,
    }

    impl StubRule {
        fn new() -> Self {
            Self {
                issues: Vec::new(),
                emitted: false,
            }
        }
    }

    impl Rule for StubRule {
        fn id(&self) -> &'static str {
            "T001"
        }
        fn name(&self) -> &'static str {
            "Stub"
        }
        fn description(&self) -> &'static str {
            "emits one default and one overridden issue"
        }
        fn severity(&self) -> Severity {
            Severity::Medium
        }
        fn remediation(&self) -> &'static str {
            ""
        }
        fn audit(&mut self, directive: &Rc<Directive>, _scope: &ScopeStack) {
            if self.emitted {
                return;
            }
            self.emitted = true;
            self.issues
                .push(Issue::new(self.id(), "default", "d", directive));
            self.issues.push(
                Issue::new(self.id(), "overridden", "d", directive)
                    .with_severity(Severity::High),
            );
        }
        fn issues(&self) -> &[Issue] {
            &self.issues
        }
    }

    fn probe_audit(config: &str) -> Vec<(String, usize, bool)> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let rules = RuleRegistry::with_rules(vec![Box::new(ProbeRule::new(log.clone()))]);
        let mut analyzer = Analyzer::new(rules).allow_includes(false);
        analyzer.audit("nginx.conf", config).unwrap();
        let entries = log.borrow().clone();
        entries
    }

    #[test]
    fn test_scope_depth_is_balanced() {
        let entries = probe_audit(
            "user nginx;\nserver { location / { root /srv; } }\nworker_processes 1;",
        );
        let depths: Vec<_> = entries
            .iter()
            .map(|(name, depth, _)| (name.as_str(), *depth))
            .collect();
        // Root-level statements see only the root frame; each nested
        // self-scoped block adds exactly one.
        assert_eq!(
            depths,
            vec![
                ("user", 1),
                ("server", 1),
                ("location", 2),
                ("root", 3),
                ("worker_processes", 1),
            ]
        );
    }

    #[test]
    fn test_variable_visible_inside_scope_and_gone_after_pop() {
        let entries = probe_audit(
            "server { set $x 1; add_header X-Test Y; }\nroot /srv;",
        );
        let by_name = |name: &str| {
            entries
                .iter()
                .find(|(n, _, _)| n == name)
                .map(|(_, _, visible)| *visible)
                .unwrap()
        };
        assert!(by_name("set"), "binding visible at the defining statement");
        assert!(by_name("add_header"), "binding visible inside the block");
        assert!(!by_name("root"), "binding gone after the scope popped");
    }

    #[test]
    fn test_shadowing_across_frames() {
        let entries = probe_audit(
            "set $x outer;\nserver { add_header A B; }\nroot /srv;",
        );
        // $x bound in the root frame stays visible inside and after the
        // server block.
        assert!(entries.iter().all(|(_, _, visible)| *visible));
    }

    #[test]
    fn test_stale_captures_purged_by_new_regex_match() {
        let log = Rc::new(RefCell::new(Vec::new()));

        /// Watches the visibility of the numbered capture `$2`.
        struct CaptureProbe {
            log: Rc<RefCell<Vec<(String, bool)>>>,
            issues: Vec<Issue>,
        }
        impl Rule for CaptureProbe {
            fn id(&self) -> &'static str {
                "T002"
            }
            fn name(&self) -> &'static str {
                "CaptureProbe"
            }
            fn description(&self) -> &'static str {
                ""
            }
            fn severity(&self) -> Severity {
                Severity::Low
            }
            fn remediation(&self) -> &'static str {
                ""
            }
            fn audit(&mut self, directive: &Rc<Directive>, scope: &ScopeStack) {
                self.log
                    .borrow_mut()
                    .push((directive.name().to_string(), scope.lookup("2").is_some()));
            }
            fn issues(&self) -> &[Issue] {
                &self.issues
            }
        }

        let rules = RuleRegistry::with_rules(vec![Box::new(CaptureProbe {
            log: log.clone(),
            issues: Vec::new(),
        })]);
        let mut analyzer = Analyzer::new(rules).allow_includes(false);
        // The first `if` binds $1 and $2; the second matches a one-group
        // pattern, so its "0" sentinel must purge the stale $2.
        analyzer
            .audit(
                "nginx.conf",
                r#"server {
                    if ($uri ~ "^/(a)/(b)$") { root /srv; }
                    if ($uri ~ "^/(c)$") { root /srv; }
                    add_header X-After Y;
                }"#,
            )
            .unwrap();

        let entries = log.borrow().clone();
        let if_entries: Vec<_> = entries.iter().filter(|(n, _)| n == "if").collect();
        assert_eq!(if_entries.len(), 2);
        assert!(if_entries[0].1, "$2 bound by the first pattern");
        assert!(!if_entries[1].1, "$2 purged when the second pattern bound $0");
    }

    #[test]
    fn test_stats_counts_every_level_with_overrides() {
        let rules = RuleRegistry::with_rules(vec![Box::new(StubRule::new())]);
        let mut analyzer = Analyzer::new(rules).allow_includes(false);
        analyzer.audit("nginx.conf", "user nginx;").unwrap();

        let stats = analyzer.stats();
        assert_eq!(stats[&Severity::Medium], 1, "default severity applies");
        assert_eq!(stats[&Severity::High], 1, "override wins");
        assert_eq!(stats[&Severity::Low], 0, "zero levels still reported");
        assert_eq!(stats.len(), Severity::ALL.len());
    }

    #[test]
    fn test_results_only_rules_with_issues() {
        let rules = RuleRegistry::with_rules(vec![
            Box::new(StubRule::new()),
            Box::new(crate::rules::HostSpoofingRule::new()),
        ]);
        let mut analyzer = Analyzer::new(rules).allow_includes(false);
        analyzer.audit("nginx.conf", "user nginx;").unwrap();

        let results = analyzer.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "T001");
    }

    #[test]
    fn test_parse_error_aborts_run() {
        let rules = RuleRegistry::with_rules(vec![Box::new(StubRule::new())]);
        let mut analyzer = Analyzer::new(rules).allow_includes(false);
        let err = analyzer.audit("nginx.conf", "server {").unwrap_err();
        assert!(matches!(err, AuditError::Parse(_)));
    }

    #[test]
    fn test_findings_flattened_and_sorted() {
        let rules = RuleRegistry::with_rules(vec![Box::new(StubRule::new())]);
        let mut analyzer = Analyzer::new(rules).allow_includes(false);
        analyzer.audit("nginx.conf", "user nginx;").unwrap();

        let findings = analyzer.findings("nginx.conf");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[1].severity, Severity::Medium);
        assert_eq!(findings[0].file_path, "nginx.conf");
    }
}
