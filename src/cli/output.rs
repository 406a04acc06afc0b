//! Styled terminal output for textsplit
//!
//! Results go to stdout so they can be piped. Status messages, metrics and
//! progress go to stderr.

use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};

use crate::diff::{DiffEntry, DiffKind, WordDiff, WordDiffKind};

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a result line to stdout
    pub fn result(&self, line: &str) {
        println!("{line}");
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("✔").green(), message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("ℹ").blue(), message);
        }
    }

    /// Print a message only in verbose mode
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            eprintln!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    pub fn header(&self, title: &str) {
        if !self.quiet {
            eprintln!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn table_row(&self, key: &str, value: &str) {
        if !self.quiet {
            eprintln!("  {:<20} {}", style(key).dim(), value);
        }
    }

    /// A 0-100 progress bar, or `None` when stderr is not a terminal
    pub fn progress_bar(&self, message: &str) -> Option<ProgressBar> {
        if self.quiet || !Term::stderr().is_term() {
            return None;
        }
        let pb = ProgressBar::new(100);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(bar_style);
        pb.set_message(message.to_string());
        Some(pb)
    }

    /// One line of a line-level diff
    pub fn diff_entry(&self, entry: &DiffEntry) {
        let number = style(format!("{:>4}", entry.line_number)).dim();
        let line = match entry.kind {
            DiffKind::Added => format!("{} {} {}", number, style("+").green(), style(&entry.text).green()),
            DiffKind::Removed => format!("{} {} {}", number, style("-").red(), style(&entry.text).red()),
            DiffKind::Moved => format!("{} {} {}", number, style("~").yellow(), style(&entry.text).yellow()),
            DiffKind::Unchanged => format!("{}   {}", number, entry.text),
        };
        println!("{line}");
    }

    /// A changed line rendered word by word
    pub fn word_diff(&self, line_number: usize, words: &[WordDiff]) {
        let rendered: String = words
            .iter()
            .map(|word| match word.kind {
                WordDiffKind::Added => style(&word.text).green().to_string(),
                WordDiffKind::Removed => style(&word.text).red().strikethrough().to_string(),
                WordDiffKind::Moved => style(&word.text).yellow().to_string(),
                WordDiffKind::Changed => style(&word.text).cyan().to_string(),
                WordDiffKind::Unchanged => word.text.clone(),
            })
            .collect();
        println!("{} {} {}", style(format!("{line_number:>4}")).dim(), style("*").cyan(), rendered);
    }
}
