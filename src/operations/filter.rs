use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChunkPosition, ChunkTransform, JobConfig, Operation, OperationConfig, OperationKind, require_source};
use crate::backend::{FilterArgs, NativeRequest, ProcessedText};
use crate::envelope::Envelope;
use crate::error::{ProcessingError, validate_regex};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Keep only the matched fragments of each line
    #[default]
    Keep,
    /// Strip matched fragments from each line
    Remove,
}

impl FilterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Keep => "keep",
            FilterMode::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterParams {
    pub case_sensitive: bool,
    pub filter_mode: FilterMode,
    pub split_matches: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            filter_mode: FilterMode::Keep,
            split_matches: false,
        }
    }
}

pub struct Filter;

impl Operation for Filter {
    const KIND: OperationKind = OperationKind::Filter;
    type Params = FilterParams;

    fn validate(config: &OperationConfig<FilterParams>) -> Result<(), ProcessingError> {
        require_source(&config.source_text)?;
        if config.main_param.is_empty() {
            return Err(ProcessingError::MissingInput("pattern is empty"));
        }
        validate_regex(&config.main_param)
    }

    fn into_job(config: OperationConfig<FilterParams>) -> JobConfig {
        JobConfig::Filter(config)
    }

    fn native_request(config: &OperationConfig<FilterParams>) -> NativeRequest {
        let params = &config.config_params;
        NativeRequest::Filter(FilterArgs {
            text: config.source_text.clone(),
            pattern: config.main_param.clone(),
            filtermode: params.filter_mode.as_str().to_string(),
            casesensitive: params.case_sensitive,
            splitmatches: params.split_matches,
        })
    }

    fn from_native(reply: ProcessedText<Value>) -> Result<Envelope, ProcessingError> {
        let text: String = Envelope::wrap(reply.result_text).try_convert()?;
        Ok(Envelope::text(text))
    }
}

pub struct FilterTransform {
    regex: Regex,
    mode: FilterMode,
    split_matches: bool,
}

impl FilterTransform {
    pub fn new(config: &OperationConfig<FilterParams>) -> Result<Self, ProcessingError> {
        validate_regex(&config.main_param)?;
        let regex = RegexBuilder::new(&config.main_param)
            .case_insensitive(!config.config_params.case_sensitive)
            .build()
            .map_err(|e| ProcessingError::invalid_pattern(&config.main_param, e))?;
        Ok(Self {
            regex,
            mode: config.config_params.filter_mode,
            split_matches: config.config_params.split_matches,
        })
    }

    fn filter_line(&self, line: &str) -> String {
        if line.trim().is_empty() {
            return String::new();
        }
        match self.mode {
            FilterMode::Remove => self.regex.replace_all(line, "").into_owned(),
            FilterMode::Keep => {
                let matches: Vec<&str> = self.regex.find_iter(line).map(|m| m.as_str()).collect();
                let joiner = if self.split_matches { "\n" } else { "" };
                matches.join(joiner)
            }
        }
    }
}

impl ChunkTransform for FilterTransform {
    /// Lines that end up empty are dropped.
    fn apply(&mut self, lines: &[&str], _at: ChunkPosition) -> Result<Envelope, ProcessingError> {
        let kept: Vec<String> = lines
            .iter()
            .map(|line| self.filter_line(line))
            .filter(|line| !line.is_empty())
            .collect();
        Ok(Envelope::text(kept.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, pattern: &str, params: FilterParams) -> String {
        let config = OperationConfig::new(text, pattern, params);
        let mut transform = FilterTransform::new(&config).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        match transform.apply(&lines, ChunkPosition::WHOLE).unwrap() {
            Envelope::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_keep_joins_matches() {
        assert_eq!(run("a1b2", r"\d+", FilterParams::default()), "12");

        let split = FilterParams {
            split_matches: true,
            ..Default::default()
        };
        assert_eq!(run("a1b2", r"\d+", split), "1\n2");
    }

    #[test]
    fn test_keep_drops_lines_without_match() {
        assert_eq!(run("abc\nx9\n\n   \n7", r"\d", FilterParams::default()), "9\n7");
    }

    #[test]
    fn test_remove_mode_strips_matches() {
        let params = FilterParams {
            filter_mode: FilterMode::Remove,
            ..Default::default()
        };
        assert_eq!(run("a1b2\n33\nc", r"\d", params), "ab\nc");
    }

    #[test]
    fn test_case_insensitive() {
        let params = FilterParams {
            case_sensitive: false,
            ..Default::default()
        };
        assert_eq!(run("Foo foo FOO", "foo", params), "FoofooFOO");
        assert_eq!(run("Foo foo FOO", "foo", FilterParams::default()), "foo");
    }

    #[test]
    fn test_validation() {
        let missing = OperationConfig::new("text", "", FilterParams::default());
        assert!(matches!(Filter::validate(&missing), Err(ProcessingError::MissingInput(_))));

        let bad = OperationConfig::new("text", "(", FilterParams::default());
        assert!(matches!(
            Filter::validate(&bad),
            Err(ProcessingError::InvalidPattern { .. })
        ));
    }
}
