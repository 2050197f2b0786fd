//! # Report Generation Module
//!
//! Generates audit reports in terminal, JSON and Markdown formats.
//!
//! ## Key Types
//!
//! - [`Report`] - Complete audit report
//! - [`Finding`] - Individual misconfiguration finding
//! - [`Severity`] - Severity classification for findings

mod finding;

pub use finding::{Finding, Severity};

use colored::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration audit report.
///
/// Contains metadata about the scan, all findings, and summary
/// statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata about the scan operation.
    pub metadata: ReportMetadata,

    /// All findings from the audit.
    pub findings: Vec<Finding>,

    /// Summary statistics by severity.
    pub summary: ReportSummary,
}

/// Metadata about the scan operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Tool version used for the scan.
    pub version: String,

    /// Timestamp when the scan was performed.
    pub timestamp: String,

    /// Path that was scanned.
    pub scanned_path: String,

    /// Number of configuration files analyzed.
    pub files_analyzed: usize,
}

/// Summary of findings by severity level.
///
/// Every level of the severity domain is present, zeroes included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Count of high severity findings.
    pub high: usize,

    /// Count of medium severity findings.
    pub medium: usize,

    /// Count of low severity findings.
    pub low: usize,

    /// Total count of all findings.
    pub total: usize,
}

impl Report {
    /// Creates a new report from a collection of findings.
    ///
    /// Automatically calculates summary statistics from the findings.
    ///
    /// # Arguments
    ///
    /// * `findings` - Vector of audit findings
    /// * `scanned_path` - Path that was analyzed
    pub fn new(findings: Vec<Finding>, scanned_path: PathBuf) -> Self {
        let summary = ReportSummary::from_findings(&findings);

        let metadata = ReportMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: unix_timestamp(),
            scanned_path: scanned_path.display().to_string(),
            files_analyzed: findings
                .iter()
                .map(|f| &f.file_path)
                .collect::<std::collections::HashSet<_>>()
                .len(),
        };

        Self {
            metadata,
            findings,
            summary,
        }
    }

    /// Prints colorized output to the terminal.
    pub fn print_terminal(&self) {
        if self.findings.is_empty() {
            println!("\n{}", "[+] No problems found.".green().bold());
            return;
        }

        println!("\n{}", "[!] Audit Findings:".red().bold());
        println!("{}", "=".repeat(60).cyan());

        for (i, finding) in self.findings.iter().enumerate() {
            finding.print_terminal(i + 1);
        }
    }

    /// Prints summary statistics to the terminal.
    pub fn print_summary(&self) {
        println!(
            "{}",
            format!(
                "[*] Summary: {} High | {} Medium | {} Low",
                self.summary.high, self.summary.medium, self.summary.low
            )
            .bold()
        );

        if self.summary.total == 0 {
            println!("{}", "[+] No issues found.".green().bold());
        } else {
            let message = format!("[!] Total: {} issue(s) found", self.summary.total);
            if self.summary.high > 0 {
                println!("{}", message.red().bold());
            } else if self.summary.medium > 0 {
                println!("{}", message.yellow().bold());
            } else {
                println!("{}", message.blue().bold());
            }
        }
    }

    /// Converts the report to Markdown format.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# nginx-sentinel Audit Report\n\n");
        md.push_str(&format!(
            "- **Scanned path:** `{}`\n- **Files analyzed:** {}\n- **Tool version:** {}\n\n",
            self.metadata.scanned_path, self.metadata.files_analyzed, self.metadata.version
        ));
        md.push_str(&format!(
            "**Summary:** {} high, {} medium, {} low ({} total)\n\n",
            self.summary.high, self.summary.medium, self.summary.low, self.summary.total
        ));

        if self.findings.is_empty() {
            md.push_str("No problems found.\n");
            return md;
        }

        md.push_str("| Severity | Rule | Finding | File | Directive |\n");
        md.push_str("|----------|------|---------|------|-----------|\n");
        for finding in &self.findings {
            md.push_str(&format!(
                "| {} | {} | {} | `{}` | `{}` |\n",
                finding.severity, finding.rule_id, finding.title, finding.file_path,
                finding.directive
            ));
        }

        md.push('\n');
        for finding in &self.findings {
            md.push_str(&format!(
                "## {} {} - {}\n\n{}\n\n**Remediation:** {}\n\n",
                finding.severity.indicator(),
                finding.rule_id,
                finding.title,
                finding.description,
                finding.remediation
            ));
        }

        md
    }
}

impl ReportSummary {
    /// Creates a summary from a collection of findings.
    fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = ReportSummary {
            high: 0,
            medium: 0,
            low: 0,
            total: findings.len(),
        };

        for finding in findings {
            match finding.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }

        summary
    }
}

/// Generates a simple timestamp without external dependencies.
fn unix_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", duration.as_secs())
}
