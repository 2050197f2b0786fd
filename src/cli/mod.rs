//! # CLI Module
//!
//! This module defines the command-line interface for nginx-sentinel using
//! the `clap` derive macros for declarative argument parsing.
//!
//! ## Commands
//!
//! - `scan` - Audit nginx configuration files for misconfigurations
//! - `diff` - Compare audit findings between two configuration trees
//! - `list` - Display available audit rules
//! - `version` - Show version information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// nginx-sentinel command-line interface.
///
/// A static analysis auditor for nginx configuration files. Detects
/// common misconfigurations such as HTTP splitting, alias path traversal
/// and Host header spoofing.
#[derive(Parser, Debug)]
#[command(name = "nginx-sentinel")]
#[command(version)]
#[command(about = "Static analysis auditor for nginx configuration files")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the nginx-sentinel CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit nginx configuration files for misconfigurations.
    ///
    /// Analyzes configuration files for common security issues including
    /// HTTP response splitting, path traversal through alias, and more.
    Scan {
        /// Path to the file or directory to audit.
        ///
        /// If a directory is specified, all `.conf` files within it will
        /// be analyzed.
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Scan directories recursively.
        ///
        /// When enabled, subdirectories will also be searched for
        /// configuration files.
        #[arg(short, long, default_value_t = true)]
        recursive: bool,

        /// Output format for the audit report.
        ///
        /// Supported formats:
        /// - `terminal`: Colorized console output (default)
        /// - `json`: Machine-readable JSON format
        /// - `markdown`: Human-readable Markdown report
        #[arg(short, long, default_value = "terminal")]
        format: String,

        /// Output directory for Markdown reports.
        ///
        /// If not specified, reports are printed to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum severity level to include in results.
        ///
        /// Valid values: high, medium, low
        #[arg(short, long)]
        severity: Option<String>,

        /// Exclude specific rules from the audit.
        ///
        /// Comma-separated list of rule IDs to skip.
        /// Example: --exclude NS002,NS003
        #[arg(short = 'x', long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Include only specific rules in the audit.
        ///
        /// Comma-separated list of rule IDs to run.
        /// Example: --only NS001,NS002
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Do not resolve `include` directives from disk.
        #[arg(long)]
        no_includes: bool,
    },

    /// Compare audit findings between two configuration trees.
    ///
    /// Runs a full audit on both directories and reports:
    /// - New issues (regressions)
    /// - Fixed issues
    Diff {
        /// Path to the old version (base).
        #[arg(value_name = "OLD_PATH")]
        old_path: PathBuf,

        /// Path to the new version (target).
        #[arg(value_name = "NEW_PATH")]
        new_path: PathBuf,
    },

    /// List all available audit rules.
    ///
    /// Displays the ID, name, severity, and description of each
    /// registered rule.
    List,

    /// Print version information.
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify that the CLI definition is valid.
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
