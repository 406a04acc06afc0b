use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommonArgs, print_stats, read_input, with_progress};
use crate::cli::Output;
use crate::diff::DiffKind;
use crate::operations::{DiffParams, OperationConfig, OperationKind, parse_diff_entries};
use crate::service::Engine;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Original file
    pub old: PathBuf,

    /// Changed file
    pub new: PathBuf,

    /// Compare lines with whitespace removed
    #[arg(long)]
    pub ignore_whitespace: bool,

    /// Compare lines case-insensitively
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Show word-level changes for lines that were edited in place
    #[arg(short, long)]
    pub words: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn execute(args: DiffArgs, engine: &Engine, output: &Output) -> Result<()> {
    let old_text = read_input(Some(&args.old))?;
    let new_text = read_input(Some(&args.new))?;
    let params = DiffParams {
        case_sensitive: !args.ignore_case,
        ignore_whitespace: args.ignore_whitespace,
    };
    let config = OperationConfig::new(old_text, new_text, params);
    let result = with_progress(engine, output, "diffing", engine.diff(config))
        .await
        .context("Diff failed")?;

    let text: String = result.try_convert()?;
    let entries = parse_diff_entries(&text)?;
    if entries.is_empty() {
        output.info("Both inputs are empty");
    }

    if args.words {
        for pair in Engine::pair_diff_results(&entries) {
            match (&pair.left, &pair.right) {
                (Some(left), Some(right)) if left.kind == DiffKind::Removed && right.kind == DiffKind::Added => {
                    output.word_diff(right.line_number, &Engine::word_diffs(&left.text, &right.text));
                }
                (Some(same), Some(other)) if same == other => output.diff_entry(same),
                (left, right) => {
                    left.iter().chain(right.iter()).for_each(|entry| output.diff_entry(entry));
                }
            }
        }
    } else {
        entries.iter().for_each(|entry| output.diff_entry(entry));
    }

    let groups = Engine::group_diff_results(&entries);
    output.verbose(&format!(
        "{} added, {} removed, {} other",
        groups.added.len(),
        groups.removed.len(),
        groups.other.len()
    ));

    if args.common.stats {
        print_stats(engine, OperationKind::Diff, output);
    }
    Ok(())
}
