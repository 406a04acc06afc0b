use std::path::Path;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Json, Toml, Yaml},
};

use super::Settings;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

pub struct TextsplitConfig {
    figment: Figment,
}

impl TextsplitConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_custom_config(None)
    }

    pub fn load_with_custom_config(custom_config: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        // A custom config replaces the user and repository layers
        if let Some(custom_path) = custom_config {
            figment = match Path::new(custom_path).extension().and_then(|e| e.to_str()) {
                Some("json") => figment.merge(Json::file(custom_path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(custom_path)),
                _ => figment.merge(Toml::file(custom_path)),
            };
        } else {
            let user = Self::user_config_path();
            figment = figment
                .merge(Toml::file(&user))
                .merge(Json::file(user.replace(".toml", ".json")))
                .merge(Yaml::file(user.replace(".toml", ".yaml")))
                .merge(Yaml::file(user.replace(".toml", ".yml")))
                .merge(Toml::file("textsplit.toml"))
                .merge(Json::file("textsplit.json"))
                .merge(Yaml::file("textsplit.yaml"))
                .merge(Yaml::file("textsplit.yml"));
        }

        // TEXTSPLIT_POOL__IDLE_TIMEOUT_SECS -> pool.idle_timeout_secs
        figment = figment.merge(Env::prefixed("TEXTSPLIT_").split("__"));

        Ok(TextsplitConfig { figment })
    }

    /// Typed view of the merged configuration
    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .context("Invalid textsplit configuration")
    }

    /// Get a nested object/section as JSON
    pub fn get_section(&self, path: &str) -> Result<serde_json::Value> {
        Ok(self.figment.extract_inner(path)?)
    }

    /// Get the full merged configuration as a structured value
    pub fn get_full_config(&self) -> Result<serde_json::Value> {
        Ok(self.figment.extract()?)
    }

    fn user_config_path() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/.config/textsplit/config.toml"),
            Err(_) => "~/.config/textsplit/config.toml".to_string(),
        }
    }
}
