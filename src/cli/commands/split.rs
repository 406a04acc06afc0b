use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommonArgs, print_stats, read_input, with_progress};
use crate::cli::Output;
use crate::operations::{OperationConfig, OperationKind, SplitParams};
use crate::service::Engine;

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Column separator
    pub separator: String,

    /// Input file (stdin when omitted or `-`)
    pub input: Option<PathBuf>,

    /// Treat the separator as a regular expression
    #[arg(long)]
    pub regex: bool,

    /// Trim whitespace around every cell
    #[arg(long)]
    pub trim: bool,

    /// Print every cell on its own line, column after column
    #[arg(long)]
    pub flat: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn execute(args: SplitArgs, engine: &Engine, output: &Output) -> Result<()> {
    let text = read_input(args.input.as_deref())?;
    let params = SplitParams {
        trim_parts: args.trim,
        use_regex: args.regex,
    };
    let config = OperationConfig::new(text, args.separator, params);
    let result = with_progress(engine, output, "splitting", engine.split(config))
        .await
        .context("Split failed")?;

    if args.flat {
        let cells: Vec<String> = result.try_convert()?;
        cells.iter().for_each(|cell| output.result(cell));
    } else {
        let columns: Vec<Vec<String>> = result.try_convert()?;
        let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        for row in 0..rows {
            let cells: Vec<&str> = columns
                .iter()
                .map(|column| column.get(row).map(String::as_str).unwrap_or(""))
                .collect();
            output.result(&cells.join("\t"));
        }
    }

    if args.common.stats {
        print_stats(engine, OperationKind::Split, output);
    }
    Ok(())
}
