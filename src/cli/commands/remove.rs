use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommonArgs, print_stats, read_input, with_progress};
use crate::cli::Output;
use crate::envelope::RichText;
use crate::operations::{OperationConfig, OperationKind, RemoveMode, RemoveParams};
use crate::service::Engine;

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Input file (stdin when omitted or `-`)
    pub input: Option<PathBuf>,

    /// Which lines to remove
    #[arg(short = 'm', long, value_enum, default_value_t = RemoveMode::Containing)]
    pub remove_mode: RemoveMode,

    /// Substring or regular expression (unused for duplicates)
    #[arg(short, long, default_value = "")]
    pub pattern: String,

    /// Treat the pattern as a regular expression
    #[arg(long)]
    pub regex: bool,

    /// Match case-insensitively
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Compare lines with surrounding whitespace trimmed
    #[arg(long)]
    pub trim: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn execute(args: RemoveArgs, engine: &Engine, output: &Output) -> Result<()> {
    let text = read_input(args.input.as_deref())?;
    let params = RemoveParams {
        case_sensitive: !args.ignore_case,
        use_regex: args.regex,
        trim_parts: args.trim,
        remove_mode: args.remove_mode,
    };
    let config = OperationConfig::new(text, args.pattern, params);
    let result = with_progress(engine, output, "removing", engine.remove(config))
        .await
        .context("Remove failed")?;

    let rich: RichText = result.try_convert()?;
    if !rich.result_text.is_empty() {
        output.result(&rich.result_text);
    }
    output.success(&format!("Removed {} line(s)", rich.removed_count));

    if args.common.stats {
        print_stats(engine, OperationKind::Remove, output);
    }
    Ok(())
}
