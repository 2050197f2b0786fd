//! # NS003: Host Spoofing Rule
//!
//! Detects upstream Host headers taken from the spoofable
//! `$http_host` request header instead of the validated `$host`.
//!
//! `$host` falls back to the server name and is matched against the
//! `server_name` set, while `$http_host` is whatever the client sent.
//! Backends that build links or routing decisions from the forwarded
//! Host can be poisoned by a crafted request.

use std::rc::Rc;

use super::{Issue, Rule};
use crate::directives::Directive;
use crate::report::Severity;
use crate::scope::ScopeStack;

/// Rule for spoofable Host forwarding.
pub struct HostSpoofingRule {
    issues: Vec<Issue>,
}

impl HostSpoofingRule {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }
}

impl Default for HostSpoofingRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for HostSpoofingRule {
    fn id(&self) -> &'static str {
        "NS003"
    }

    fn name(&self) -> &'static str {
        "Host Spoofing"
    }

    fn description(&self) -> &'static str {
        "Detects proxy_set_header directives forwarding the client-\
         controlled $http_host header as the upstream Host."
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn remediation(&self) -> &'static str {
        "Forward the validated host instead:\n\
         - `proxy_set_header Host $host;`"
    }

    fn audit(&mut self, directive: &Rc<Directive>, _scope: &ScopeStack) {
        if directive.name() != "proxy_set_header" {
            return;
        }
        let [header, value, ..] = directive.args() else {
            return;
        };
        if header.eq_ignore_ascii_case("host") && value.contains("$http_host") {
            self.issues.push(Issue::new(
                self.id(),
                "Upstream Host taken from the spoofable $http_host",
                "The Host header forwarded upstream is copied verbatim from \
                 the client request. Use $host, which is validated against \
                 the configured server names."
                    .to_string(),
                directive,
            ));
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
        let rules = RuleRegistry::with_rules(vec![Box::new(HostSpoofingRule::new())]);
        let mut analyzer = Analyzer::new(rules);
        analyzer.audit("nginx.conf", config).unwrap();
        analyzer
            .results()
            .iter()
            .flat_map(|rule| rule.issues().to_vec())
            .collect()
    }

    #[test]
    fn test_detect_http_host_forwarding() {
        let issues = findings_for(
            "server { location / { proxy_set_header Host $http_host; } }",
        );
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_validated_host_is_safe() {
        let issues =
            findings_for("server { location / { proxy_set_header Host $host; } }");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_other_headers_ignored() {
        let issues = findings_for(
            "server { proxy_set_header X-Forwarded-Host $http_host; }",
        );
        assert!(issues.is_empty());
    }
}
