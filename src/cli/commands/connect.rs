use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::read_input;
use crate::cli::Output;
use crate::service::Engine;

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// File whose lines come first in each row
    pub left: PathBuf,

    /// File whose lines are appended to each row
    pub right: PathBuf,

    /// Text placed between the two lines of a row
    #[arg(short, long, default_value = "\t")]
    pub separator: String,
}

pub async fn execute(args: ConnectArgs, engine: &Engine, output: &Output) -> Result<()> {
    let left = read_input(Some(&args.left))?;
    let right = read_input(Some(&args.right))?;
    let joined = engine
        .connect(&left, &right, &args.separator)
        .await
        .context("Connect failed")?;

    if !joined.is_empty() {
        output.result(&joined);
    }
    Ok(())
}
