use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChunkPosition, ChunkTransform, JobConfig, Operation, OperationConfig, OperationKind, require_source};
use crate::backend::{NativeRequest, ProcessedText, RemoveArgs};
use crate::envelope::{Envelope, RichText};
use crate::error::{ProcessingError, validate_regex};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum RemoveMode {
    /// Drop lines that match the pattern
    #[default]
    Containing,
    /// Drop lines that do not match the pattern
    NotContaining,
    /// Drop repeated lines, keeping the first occurrence
    Duplicates,
}

impl RemoveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoveMode::Containing => "containing",
            RemoveMode::NotContaining => "notContaining",
            RemoveMode::Duplicates => "duplicates",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveParams {
    pub case_sensitive: bool,
    pub use_regex: bool,
    pub trim_parts: bool,
    pub remove_mode: RemoveMode,
}

impl Default for RemoveParams {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            use_regex: false,
            trim_parts: false,
            remove_mode: RemoveMode::Containing,
        }
    }
}

pub struct Remove;

impl Operation for Remove {
    const KIND: OperationKind = OperationKind::Remove;
    type Params = RemoveParams;

    fn validate(config: &OperationConfig<RemoveParams>) -> Result<(), ProcessingError> {
        require_source(&config.source_text)?;
        let params = &config.config_params;
        if params.remove_mode == RemoveMode::Duplicates {
            return Ok(());
        }
        if config.main_param.is_empty() {
            return Err(ProcessingError::MissingInput("pattern is empty"));
        }
        if params.use_regex {
            validate_regex(&config.main_param)?;
        }
        Ok(())
    }

    fn into_job(config: OperationConfig<RemoveParams>) -> JobConfig {
        JobConfig::Remove(config)
    }

    fn native_request(config: &OperationConfig<RemoveParams>) -> NativeRequest {
        let params = &config.config_params;
        NativeRequest::Remove(RemoveArgs {
            text: config.source_text.clone(),
            pattern: config.main_param.clone(),
            removemode: params.remove_mode.as_str().to_string(),
            casesensitive: params.case_sensitive,
            useregex: params.use_regex,
            trimparts: params.trim_parts,
        })
    }

    fn from_native(reply: ProcessedText<Value>) -> Result<Envelope, ProcessingError> {
        let result_text: String = Envelope::wrap(reply.result_text).try_convert()?;
        Ok(Envelope::RichText(RichText {
            result_text,
            removed_count: reply.removed_lines,
            metrics: reply.metrics,
        }))
    }
}

enum LineRule {
    Duplicates {
        seen: HashSet<String>,
        trim: bool,
        case_sensitive: bool,
    },
    Pattern {
        regex: Regex,
        keep_matching: bool,
    },
    Substring {
        needle: String,
        case_sensitive: bool,
        keep_matching: bool,
    },
}

/// Line removal. The duplicate set spans every chunk of a job.
pub struct RemoveTransform {
    rule: LineRule,
}

impl RemoveTransform {
    pub fn new(config: &OperationConfig<RemoveParams>) -> Result<Self, ProcessingError> {
        let params = &config.config_params;
        let keep_matching = params.remove_mode == RemoveMode::NotContaining;
        let rule = match params.remove_mode {
            RemoveMode::Duplicates => LineRule::Duplicates {
                seen: HashSet::new(),
                trim: params.trim_parts,
                case_sensitive: params.case_sensitive,
            },
            _ if params.use_regex => {
                validate_regex(&config.main_param)?;
                let regex = RegexBuilder::new(&config.main_param)
                    .case_insensitive(!params.case_sensitive)
                    .build()
                    .map_err(|e| ProcessingError::invalid_pattern(&config.main_param, e))?;
                LineRule::Pattern {
                    regex,
                    keep_matching,
                }
            }
            _ => LineRule::Substring {
                needle: if params.case_sensitive {
                    config.main_param.clone()
                } else {
                    config.main_param.to_lowercase()
                },
                case_sensitive: params.case_sensitive,
                keep_matching,
            },
        };
        Ok(Self { rule })
    }

    fn keep(&mut self, line: &str) -> bool {
        match &mut self.rule {
            LineRule::Duplicates {
                seen,
                trim,
                case_sensitive,
            } => {
                let line = if *trim { line.trim() } else { line };
                let key = if *case_sensitive {
                    line.to_string()
                } else {
                    line.to_lowercase()
                };
                seen.insert(key)
            }
            LineRule::Pattern {
                regex,
                keep_matching,
            } => regex.is_match(line) == *keep_matching,
            LineRule::Substring {
                needle,
                case_sensitive,
                keep_matching,
            } => {
                let hit = if *case_sensitive {
                    line.contains(needle.as_str())
                } else {
                    line.to_lowercase().contains(needle.as_str())
                };
                hit == *keep_matching
            }
        }
    }
}

impl ChunkTransform for RemoveTransform {
    fn apply(&mut self, lines: &[&str], _at: ChunkPosition) -> Result<Envelope, ProcessingError> {
        let kept: Vec<&str> = lines.iter().copied().filter(|line| self.keep(line)).collect();
        let removed = lines.len() - kept.len();
        Ok(Envelope::rich_text(kept.join("\n"), removed))
    }
}
