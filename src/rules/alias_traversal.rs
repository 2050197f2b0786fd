//! # NS002: Alias Path Traversal Rule
//!
//! Detects `alias` directives that let a request escape the aliased
//! directory.
//!
//! ## Vulnerability Description
//!
//! With `location /i { alias /data/images/; }` the prefix `/i` is
//! replaced by `/data/images/`, so a request for `/i../secret` maps to
//! `/data/images/../secret` and walks out of the directory. The classic
//! fix is ending the location prefix with a slash.
//!
//! ## Detection Strategy
//!
//! 1. On every `alias`, walk the parent back-links to the nearest
//!    enclosing `location`
//! 2. Prefix locations without a trailing slash combined with a
//!    directory alias are directly traversable
//! 3. Regex locations whose captures feed the alias path are flagged
//!    with lower confidence, since proving the capture safe would need
//!    full pattern reasoning

use std::rc::Rc;

use super::{Issue, Rule};
use crate::directives::{Directive, DirectiveKind};
use crate::report::Severity;
use crate::scope::ScopeStack;

/// Rule for path traversal through misconfigured `alias`.
pub struct AliasTraversalRule {
    issues: Vec<Issue>,
}

impl AliasTraversalRule {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// The nearest enclosing `location` block, if any.
    fn enclosing_location(directive: &Directive) -> Option<Rc<Directive>> {
        directive
            .parents()
            .find(|p| matches!(p.kind(), DirectiveKind::Location { .. }))
    }
}

impl Default for AliasTraversalRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for AliasTraversalRule {
    fn id(&self) -> &'static str {
        "NS002"
    }

    fn name(&self) -> &'static str {
        "Alias Path Traversal"
    }

    fn description(&self) -> &'static str {
        "Detects alias directives reachable through a location prefix \
         without a trailing slash, letting requests escape the aliased \
         directory via dot-dot segments."
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn remediation(&self) -> &'static str {
        "End the location prefix with a slash:\n\
         - `location /i/ { alias /data/images/; }`\n\
         - or serve the directory with `root` instead of `alias`"
    }

    fn audit(&mut self, directive: &Rc<Directive>, _scope: &ScopeStack) {
        let DirectiveKind::Alias { path } = directive.kind() else {
            return;
        };
        let Some(location) = Self::enclosing_location(directive) else {
            return;
        };
        let DirectiveKind::Location { modifier, path: loc_path } = location.kind().clone() else {
            return;
        };

        match modifier.as_deref() {
            None | Some("^~") => {
                if !loc_path.ends_with('/') && path.ends_with('/') {
                    self.issues.push(Issue::new(
                        self.id(),
                        format!("Path traversal via alias in location `{loc_path}`"),
                        format!(
                            "The location prefix `{loc_path}` does not end with a slash \
                             while the alias target `{path}` does: a request for \
                             `{loc_path}../` escapes the aliased directory."
                        ),
                        directive,
                    ));
                }
            }
            Some("~") | Some("~*") => {
                // Capture-fed alias paths would need full pattern
                // reasoning to prove safe.
                if path.contains('$') {
                    self.issues.push(
                        Issue::new(
                            self.id(),
                            format!("Possibly traversable alias in regex location `{loc_path}`"),
                            format!(
                                "The alias target `{path}` is built from captures of the \
                                 regex location `{loc_path}`; unless the pattern excludes \
                                 dot-dot segments, requests can escape the directory."
                            ),
                            directive,
                        )
                        .with_severity(Severity::Medium),
                    );
                }
            }
            _ => {}
        }
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Analyzer;
    use crate::rules::RuleRegistry;

    fn findings_for(config: &str) -> Vec<Issue> {
        let rules = RuleRegistry::with_rules(vec![Box::new(AliasTraversalRule::new())]);
        let mut analyzer = Analyzer::new(rules);
        analyzer.audit("nginx.conf", config).unwrap();
        analyzer
            .results()
            .iter()
            .flat_map(|rule| rule.issues().to_vec())
            .collect()
    }

    #[test]
    fn test_detect_slashless_prefix() {
        let issues =
            findings_for("server { location /i { alias /data/images/; } }");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].summary.contains("/i"));
        assert!(issues[0].severity.is_none());
    }

    #[test]
    fn test_trailing_slash_is_safe() {
        let issues =
            findings_for("server { location /i/ { alias /data/images/; } }");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_regex_location_with_captures_lower_confidence() {
        let issues = findings_for(
            r#"server { location ~ "^/img/(.+)$" { alias /data/$1; } }"#,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Some(Severity::Medium));
    }

    #[test]
    fn test_alias_outside_location_ignored() {
        let issues = findings_for("server { alias /data/; }");
        assert!(issues.is_empty());
    }
}
