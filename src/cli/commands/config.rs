use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::config::TextsplitConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Display current merged configuration
    Show {
        /// Output format: toml, json, yaml
        #[arg(short, long, default_value = "toml")]
        format: String,

        /// Only show one section, e.g. `pool`
        #[arg(short, long)]
        section: Option<String>,
    },
}

pub async fn execute(args: ConfigArgs, custom_config: Option<&str>) -> Result<()> {
    match args.command {
        ConfigCommand::Show { format, section } => {
            let config = TextsplitConfig::load_with_custom_config(custom_config)?;
            let rendered = match section {
                Some(path) => render(&config.get_section(&path)?, &format)?,
                None => render(&config.settings()?, &format)?,
            };
            println!("{}", rendered.trim_end());
        }
    }
    Ok(())
}

fn render<T: Serialize>(value: &T, format: &str) -> Result<String> {
    Ok(match format.to_lowercase().as_str() {
        "toml" => toml::to_string_pretty(value)?,
        "json" => serde_json::to_string_pretty(value)?,
        "yaml" | "yml" => serde_yml::to_string(value)?,
        other => bail!("Unsupported format: {}. Use toml, json, or yaml", other),
    })
}
