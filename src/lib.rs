//! # nginx-sentinel Library
//!
//! A static analysis library for auditing nginx configuration files.
//!
//! This library parses nginx configurations into a directive tree, walks
//! the tree while tracking variable definitions across nested scopes, and
//! dispatches every directive to a set of audit rules.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions and argument parsing
//! - [`parser`] - Tokenizer and parser for nginx configuration syntax
//! - [`directives`] - Typed directive model and construction registry
//! - [`regexp`] - Variable extraction from regular expression patterns
//! - [`scope`] - Variable tracking across nested configuration scopes
//! - [`audit`] - Traversal driver connecting parser, scopes and rules
//! - [`rules`] - Audit rule implementations
//! - [`report`] - Report generation in multiple formats
//!
//! ## Example
//!
//! ```rust,ignore
//! use nginx_sentinel::{Analyzer, RuleRegistry};
//!
//! let mut analyzer = Analyzer::new(RuleRegistry::new());
//! analyzer.audit("nginx.conf", &content)?;
//! for rule in analyzer.results() {
//!     println!("{}: {} issue(s)", rule.id(), rule.issues().len());
//! }
//! ```

pub mod audit;
pub mod cli;
pub mod directives;
pub mod parser;
pub mod regexp;
pub mod report;
pub mod rules;
pub mod scope;

pub use audit::Analyzer;
pub use cli::Cli;
pub use report::{Finding, Report, Severity};
pub use rules::RuleRegistry;
