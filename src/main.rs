//! # nginx-sentinel CLI Entry Point
//!
//! This module provides the main entry point for the nginx-sentinel
//! command-line configuration auditor.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};

use nginx_sentinel::report::Finding;
use nginx_sentinel::{Analyzer, Cli, Report, RuleRegistry, Severity};

/// ASCII art banner displayed at startup.
const BANNER: &str = r#"
                _                                 _   _            _
  _ __   __ _(_)_ __ __  __     ___  ___ _ __ | |_(_)_ __   ___| |
 | '_ \ / _` | | '_ \\ \/ /____/ __|/ _ \ '_ \| __| | '_ \ / _ \ |
 | | | | (_| | | | | |>  <_____\__ \  __/ | | | |_| | | | |  __/ |
 |_| |_|\__, |_|_| |_/_/\_\    |___/\___|_| |_|\__|_|_| |_|\___|_|
        |___/
                  nginx Configuration Security Auditor
"#;

/// Application entry point.
///
/// Initializes the logging system, displays the banner, parses
/// command-line arguments, and dispatches to the appropriate command
/// handler.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("{}", BANNER.cyan().bold());

    let cli = Cli::parse();

    match cli.command {
        nginx_sentinel::cli::Commands::Scan {
            path,
            recursive,
            format,
            output,
            severity,
            exclude,
            only,
            no_includes,
        } => {
            run_scan(ScanOptions {
                path,
                recursive,
                format,
                output,
                min_severity: severity,
                exclude,
                only,
                allow_includes: !no_includes,
            })?;
        }
        nginx_sentinel::cli::Commands::List => {
            list_rules();
        }
        nginx_sentinel::cli::Commands::Version => {
            println!(
                "{} {}",
                "nginx-sentinel version:".green(),
                env!("CARGO_PKG_VERSION").yellow()
            );
        }
        nginx_sentinel::cli::Commands::Diff { old_path, new_path } => {
            run_diff(old_path, new_path)?;
        }
    }

    Ok(())
}

/// Options for a single scan invocation.
struct ScanOptions {
    path: PathBuf,
    recursive: bool,
    format: String,
    output: Option<PathBuf>,
    min_severity: Option<String>,
    exclude: Vec<String>,
    only: Vec<String>,
    allow_includes: bool,
}

/// Executes the audit operation.
///
/// This function orchestrates the complete scanning workflow:
/// 1. Collects configuration files from the specified path
/// 2. Parses and audits each file against the registered rules
/// 3. Applies the severity floor and rule filters
/// 4. Generates reports in the specified format
///
/// # Arguments
///
/// * `opts` - The scan configuration from the command line
///
/// # Returns
///
/// Returns `Ok(())` on success, or an error if scanning fails.
fn run_scan(opts: ScanOptions) -> Result<()> {
    println!(
        "{} {}",
        "[*] Auditing:".green().bold(),
        opts.path.display().to_string().yellow()
    );

    let all_findings = perform_scan(
        &opts.path,
        opts.recursive,
        &opts.exclude,
        &opts.only,
        opts.allow_includes,
    )?;

    let findings = if let Some(ref min_sev) = opts.min_severity {
        let min = Severity::parse(min_sev);
        all_findings
            .into_iter()
            .filter(|f| f.severity >= min)
            .collect()
    } else {
        all_findings
    };

    let report = Report::new(findings, opts.path.clone());

    match opts.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "markdown" => {
            let md = report.to_markdown();
            if let Some(ref out_path) = opts.output {
                let report_path = out_path.join("audit_report.md");
                std::fs::write(&report_path, &md)?;
                println!(
                    "{} {}",
                    "[+] Report saved to:".green(),
                    report_path.display().to_string().yellow()
                );
            } else {
                println!("{}", md);
            }
        }
        "github" => {
            // GitHub Actions annotations:
            // ::error file={name},title={title}::{message}
            for finding in &report.findings {
                let level = match finding.severity {
                    Severity::High => "error",
                    Severity::Medium => "warning",
                    Severity::Low => "notice",
                };

                println!(
                    "::{} file={},title={}::{}",
                    level, finding.file_path, finding.title, finding.description
                );
            }
        }
        _ => {
            report.print_terminal();
        }
    }

    println!("\n{}", "=".repeat(60).cyan());
    report.print_summary();

    Ok(())
}

/// Audits every configuration file under `path` and collects findings.
fn perform_scan(
    path: &Path,
    recursive: bool,
    exclude: &[String],
    only: &[String],
    allow_includes: bool,
) -> Result<Vec<Finding>> {
    use indicatif::{ProgressBar, ProgressStyle};

    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        collect_conf_files(path, recursive)?
    };

    if files.is_empty() {
        return Ok(Vec::new());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut all_findings = Vec::new();

    for file_path in &files {
        pb.set_message(format!(
            "Auditing {}",
            file_path.file_name().unwrap_or_default().to_string_lossy()
        ));

        let file_str = file_path.display().to_string();
        match std::fs::read_to_string(file_path) {
            Ok(content) => {
                let rules = RuleRegistry::new().filter(exclude, only);
                let mut analyzer = Analyzer::new(rules).allow_includes(allow_includes);
                match analyzer.audit(&file_str, &content) {
                    Ok(()) => all_findings.extend(analyzer.findings(&file_str)),
                    Err(e) => log::warn!("Failed to audit {}: {}", file_str, e),
                }
            }
            Err(e) => {
                log::warn!("Failed to read {}: {}", file_str, e);
            }
        }

        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(all_findings)
}

/// Compares findings between two configuration trees.
fn run_diff(old_path: PathBuf, new_path: PathBuf) -> Result<()> {
    println!("{}", "[*] Running Differential Analysis...".blue().bold());

    // Canonicalize paths to ensure consistent diffs
    let old_abs = std::fs::canonicalize(&old_path).unwrap_or(old_path.clone());
    let new_abs = std::fs::canonicalize(&new_path).unwrap_or(new_path.clone());

    println!("{} {}", "[base]".dimmed(), old_abs.display());
    let old_findings = perform_scan(&old_abs, true, &[], &[], true)?;

    println!("{} {}", "[target]".dimmed(), new_abs.display());
    let new_findings = perform_scan(&new_abs, true, &[], &[], true)?;

    // Findings are compared by rule, relative file path and the rendered
    // directive, so renaming a directory does not drown the diff in
    // noise.
    let get_key = |f: &Finding, base_path: &Path| -> String {
        let relative = pathdiff::diff_paths(PathBuf::from(&f.file_path), base_path)
            .unwrap_or_else(|| PathBuf::from(&f.file_path));
        format!("{}:{}:{}", f.rule_id, relative.display(), f.directive)
    };

    let mut old_map = std::collections::HashMap::new();
    for f in &old_findings {
        old_map.insert(get_key(f, &old_abs), f);
    }

    let mut new_map = std::collections::HashMap::new();
    for f in &new_findings {
        new_map.insert(get_key(f, &new_abs), f);
    }

    let mut new_risks = Vec::new();
    let mut fixed_issues = Vec::new();

    for (key, finding) in &new_map {
        if !old_map.contains_key(key) {
            new_risks.push(finding);
        }
    }

    for (key, finding) in &old_map {
        if !new_map.contains_key(key) {
            fixed_issues.push(finding);
        }
    }

    println!("\n{}", "=== Differential Analysis Results ===".white().bold());

    if new_risks.is_empty() && fixed_issues.is_empty() {
        println!("{}", "No security changes detected.".green());
        return Ok(());
    }

    if !new_risks.is_empty() {
        println!("\n{}", "[NEW RISKS DETECTED]".red().bold());
        for f in new_risks {
            println!("  [{}] {} ({})", f.rule_id.red(), f.title, f.directive);
        }
    }

    if !fixed_issues.is_empty() {
        println!("\n{}", "[ISSUES FIXED]".green().bold());
        for f in fixed_issues {
            println!("  [{}] {} ({})", f.rule_id.green(), f.title, f.directive);
        }
    }

    Ok(())
}

/// Collects nginx configuration files from a directory.
///
/// Traverses the specified directory and collects all `.conf` files.
///
/// # Arguments
///
/// * `dir` - The directory to search
/// * `recursive` - Whether to search subdirectories
///
/// # Returns
///
/// A vector of paths to configuration files.
fn collect_conf_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    use walkdir::WalkDir;

    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "conf"))
        .map(|e| e.path().to_path_buf())
        .collect();

    files.sort();
    Ok(files)
}

/// Displays all available audit rules.
///
/// Prints a formatted list of registered rules including their IDs,
/// names, severity levels, and descriptions.
fn list_rules() {
    let registry = RuleRegistry::new();

    println!("{}", "[*] Available Audit Rules:".green().bold());
    println!("{}", "-".repeat(60).cyan());

    for rule in registry.rules() {
        println!(
            "  {} {} [{}]",
            rule.id().cyan().bold(),
            rule.name().white(),
            format!("{:?}", rule.severity()).yellow()
        );
        println!("     {}", rule.description().dimmed());
        println!();
    }
}
