//! # Finding and Severity Definitions
//!
//! Defines the core data structures for representing audit findings and
//! their severity classification.

use colored::*;
use serde::{Deserialize, Serialize};

/// Severity level classification for audit findings.
///
/// Ordered from lowest to highest severity. This is the fixed domain
/// shared by the rule engine and the stats view: every level is reported
/// in per-severity counts, zeroes included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity, hardening advice rather than a direct exposure.
    Low = 0,

    /// Medium severity, exploitable under additional conditions.
    Medium = 1,

    /// High severity, directly exploitable misconfiguration.
    High = 2,
}

impl Severity {
    /// Every severity level, lowest first.
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    /// Parses a severity level from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of severity
    ///
    /// # Returns
    ///
    /// The corresponding `Severity` variant, defaulting to `Low` for
    /// unknown values.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Returns a colored label for terminal output.
    pub fn colored_label(&self) -> ColoredString {
        match self {
            Severity::High => "HIGH".white().on_red().bold(),
            Severity::Medium => "MEDIUM".black().on_yellow().bold(),
            Severity::Low => "LOW".black().on_white().bold(),
        }
    }

    /// Returns a text indicator for the severity.
    pub fn indicator(&self) -> &'static str {
        match self {
            Severity::High => "[!]",
            Severity::Medium => "[~]",
            Severity::Low => "[-]",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
        }
    }
}

/// Represents one reported problem from a configuration audit.
///
/// A flattened view of a rule issue: the severity here is already the
/// effective one (the issue's override when present, else the rule's
/// declared default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// ID of the rule that produced this finding (e.g. "NS001").
    pub rule_id: String,

    /// Short, descriptive title of the finding.
    pub title: String,

    /// Detailed description of the misconfiguration.
    pub description: String,

    /// Effective severity classification.
    pub severity: Severity,

    /// Path to the configuration file containing the directive.
    pub file_path: String,

    /// The offending directive, rendered back to text.
    pub directive: String,

    /// Remediation guidance.
    pub remediation: String,
}

impl Finding {
    /// Prints the finding to terminal with color formatting.
    ///
    /// # Arguments
    ///
    /// * `index` - The finding number for display.
    pub fn print_terminal(&self, index: usize) {
        println!();
        println!(
            "{} {} [{}] {}",
            format!("#{}", index).cyan().bold(),
            self.severity.colored_label(),
            self.rule_id.yellow(),
            self.title.white().bold()
        );

        println!("   {} {}", "File:".dimmed(), self.file_path.blue());
        println!("   {} {}", "Directive:".dimmed(), self.directive.bright_white());

        for line in self.description.lines() {
            println!("   {}", line.dimmed());
        }

        println!("\n   {}", "Remediation:".green());
        for line in self.remediation.lines().take(3) {
            println!("   {}", line.green().dimmed());
        }

        println!("{}", "-".repeat(60).dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("high"), Severity::High);
        assert_eq!(Severity::parse("MEDIUM"), Severity::Medium);
        assert_eq!(Severity::parse("unknown"), Severity::Low);
    }

    #[test]
    fn test_all_levels_ascending() {
        let mut sorted = Severity::ALL;
        sorted.sort();
        assert_eq!(sorted, Severity::ALL);
    }
}
