//! # NS001: HTTP Splitting Rule
//!
//! Detects variables that may contain CR/LF characters reaching response
//! headers, redirects or proxied requests.
//!
//! ## Vulnerability Description
//!
//! nginx url-decodes some variables (`$uri`, `$document_uri`) and regex
//! captures inherit whatever the matched pattern permits. When such a
//! value is spliced into `add_header`, `return`, `rewrite` replacements
//! or an upstream request line, an attacker who can smuggle an encoded
//! `%0d%0a` splits the response or request and injects arbitrary headers.
//!
//! ## Detection Strategy
//!
//! 1. Watch the directives that write attacker-influenced text into
//!    headers or request lines
//! 2. Extract `$variable` references from their arguments
//! 3. Resolve each through the active scope stack (captures, `set`
//!    results, built-ins)
//! 4. Flag variables whose boundary or derived shape cannot rule out a
//!    raw CR or LF

use std::rc::Rc;

use regex::Regex;

use super::{Issue, Rule};
use crate::directives::{Directive, DirectiveKind};
use crate::report::Severity;
use crate::scope::{ScopeStack, Variable};

/// Rule for HTTP splitting via CR/LF-capable variables.
pub struct HttpSplittingRule {
    issues: Vec<Issue>,
}

impl HttpSplittingRule {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// The argument strings of `directive` that end up in a header or
    /// request line, if this directive is a sink at all.
    fn sink_args(directive: &Directive) -> Vec<String> {
        match directive.kind() {
            DirectiveKind::AddHeader { value, .. } => vec![value.clone()],
            DirectiveKind::Rewrite { replace, .. } => vec![replace.clone()],
            _ => match directive.name() {
                "return" => directive.args().iter().skip(1).cloned().collect(),
                "proxy_set_header" => directive.args().iter().skip(1).cloned().collect(),
                "proxy_pass" => directive.args().to_vec(),
                _ => Vec::new(),
            },
        }
    }

    /// True when the variable's shape cannot rule out a raw CR or LF.
    fn can_split(var: &Variable) -> bool {
        var.can_contain('\n') || var.can_contain('\r')
    }

    /// True when nothing at all is known about the value: no literal, no
    /// derived pattern, no boundary. Flagged with lower confidence.
    fn shape_unknown(var: &Variable) -> bool {
        var.value().is_none() && var.boundary().is_none()
    }
}

impl Default for HttpSplittingRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for HttpSplittingRule {
    fn id(&self) -> &'static str {
        "NS001"
    }

    fn name(&self) -> &'static str {
        "HTTP Splitting"
    }

    fn description(&self) -> &'static str {
        "Detects variables that may carry CR/LF characters into response \
         headers, redirect targets or proxied request lines, allowing \
         response splitting and header injection."
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn remediation(&self) -> &'static str {
        "Avoid interpolating url-decoded variables into headers:\n\
         - use $request_uri instead of $uri in redirects\n\
         - constrain regex captures with an explicit character class\n\
         - validate script-produced variables before use"
    }

    fn audit(&mut self, directive: &Rc<Directive>, scope: &ScopeStack) {
        for arg in Self::sink_args(directive) {
            for name in extract_var_refs(&arg) {
                let Some(var) = scope.resolve(&name) else {
                    continue;
                };
                if !Self::can_split(&var) {
                    continue;
                }

                let mut issue = Issue::new(
                    self.id(),
                    format!("Possible HTTP splitting via ${name}"),
                    format!(
                        "The variable ${name} may contain CR/LF characters and is \
                         written into a header or request line by `{directive}`. \
                         An encoded %0d%0a in the request would split the response.",
                    ),
                    directive,
                );
                // Script-produced values with no known shape are flagged
                // with lower confidence.
                if Self::shape_unknown(&var) && var.provider().is_some() {
                    issue = issue.with_severity(Severity::Medium);
                }
                self.issues.push(issue);
            }
        }
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

/// Extracts variable names referenced as `$name` or `${name}` in `text`.
fn extract_var_refs(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*|[0-9]+)\}?") else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
