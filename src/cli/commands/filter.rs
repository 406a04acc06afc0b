use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommonArgs, print_stats, read_input, with_progress};
use crate::cli::Output;
use crate::operations::{FilterMode, FilterParams, OperationConfig, OperationKind};
use crate::service::Engine;

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Regular expression to match
    #[arg(short, long)]
    pub pattern: String,

    /// Input file (stdin when omitted or `-`)
    pub input: Option<PathBuf>,

    /// Strip matches instead of keeping them
    #[arg(long)]
    pub remove: bool,

    /// Match case-insensitively
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Put every kept match on its own line
    #[arg(long)]
    pub split_matches: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn execute(args: FilterArgs, engine: &Engine, output: &Output) -> Result<()> {
    let text = read_input(args.input.as_deref())?;
    let params = FilterParams {
        case_sensitive: !args.ignore_case,
        filter_mode: if args.remove { FilterMode::Remove } else { FilterMode::Keep },
        split_matches: args.split_matches,
    };
    let config = OperationConfig::new(text, args.pattern, params);
    let result = with_progress(engine, output, "filtering", engine.filter(config))
        .await
        .context("Filter failed")?;

    let text: String = result.try_convert()?;
    if !text.is_empty() {
        output.result(&text);
    }

    if args.common.stats {
        print_stats(engine, OperationKind::Filter, output);
    }
    Ok(())
}
