//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the Scholar Agent CLI.

use crate::types::{RankedEntry, ResearchReport, SynthesisStatus};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

/// `[i] Title — Authors (year) | DOI | URL`
pub fn bibliography_line(ranked: &RankedEntry) -> String {
    let entry = &ranked.entry;
    let mut line = format!(
        "[{}] {} — {} ({})",
        ranked.citation_index,
        entry.title,
        entry.author_line(),
        entry.year_label()
    );
    if let Some(doi) = entry.doi() {
        line.push_str(&format!(" | DOI: {}", doi));
    }
    if let Some(link) = entry.link() {
        line.push_str(&format!(" | {}", link));
    }
    line
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a subheader
    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    /// Print a table header row
    pub fn table_header(&self, columns: &[&str]) {
        let header: String = columns
            .iter()
            .map(|c| format!("{:<15}", c))
            .collect::<Vec<_>>()
            .join(" ");
        if self.colored {
            println!("    {}", header.bright_white().bold());
            println!("    {}", "─".repeat(columns.len() * 16).dimmed());
        } else {
            println!("    {}", header);
            println!("    {}", "-".repeat(columns.len() * 16));
        }
    }

    /// Print a table row
    pub fn table_row(&self, values: &[&str]) {
        let row: String = values
            .iter()
            .map(|v| format!("{:<15}", v))
            .collect::<Vec<_>>()
            .join(" ");
        println!("    {}", row);
    }

    /// Print one bibliography entry, flagging it when the narrative never cites it
    pub fn reference(&self, ranked: &RankedEntry, cited: bool) {
        let line = bibliography_line(ranked);
        match (self.colored, cited) {
            (true, true) => println!("  {}", line),
            (true, false) => println!("  {} {}", line.dimmed(), "(uncited)".yellow()),
            (false, true) => println!("  {}", line),
            (false, false) => println!("  {} (uncited)", line),
        }
    }

    /// Print a complete research report
    pub fn report(&self, report: &ResearchReport) {
        let synthesis = &report.synthesis;

        self.header(&report.query);
        if let SynthesisStatus::Degraded { reason } = &synthesis.status {
            self.warning(&format!("Synthesis degraded: {:?}", reason));
        }
        println!();
        println!("{}", synthesis.narrative.trim_end());

        self.subheader("References");
        for ranked in &synthesis.bibliography {
            let cited = !synthesis.uncited_indices.contains(&ranked.citation_index);
            self.reference(ranked, cited);
        }

        if !report.source_errors.is_empty() {
            self.subheader("Retrieval Issues");
            for err in &report.source_errors {
                let retry = if err.retryable { " (retryable)" } else { "" };
                self.list_item(&format!("{}{}", err, retry));
            }
        }

        self.subheader("Summary");
        self.kv("Queries", &report.expanded_queries.join(" | "));
        self.kv("Records retrieved", &report.counts.records_seen.to_string());
        self.kv("Distinct works", &report.counts.canonical_entries.to_string());
        self.kv(
            "Cited",
            &format!("{} of {}", report.counts.cited, report.counts.ranked),
        );
        if let Some(model) = &synthesis.model {
            self.kv("Model", model);
        }
        self.kv("Attempts", &synthesis.attempts.to_string());
        self.kv("Duration", &format!("{} ms", report.duration_ms));
    }
}
