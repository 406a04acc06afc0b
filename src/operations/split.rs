use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChunkPosition, ChunkTransform, JobConfig, Operation, OperationConfig, OperationKind, require_source};
use crate::backend::{NativeRequest, ProcessedText, SplitArgs};
use crate::envelope::Envelope;
use crate::error::{ProcessingError, validate_regex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitParams {
    pub trim_parts: bool,
    pub use_regex: bool,
}

/// Split every line on a separator and lay the parts out as columns.
pub struct Split;

impl Operation for Split {
    const KIND: OperationKind = OperationKind::Split;
    type Params = SplitParams;

    fn validate(config: &OperationConfig<SplitParams>) -> Result<(), ProcessingError> {
        require_source(&config.source_text)?;
        if config.main_param.is_empty() {
            return Err(ProcessingError::MissingInput("separator is empty"));
        }
        if config.config_params.use_regex {
            validate_regex(&config.main_param)?;
        }
        Ok(())
    }

    fn into_job(config: OperationConfig<SplitParams>) -> JobConfig {
        JobConfig::Split(config)
    }

    fn native_request(config: &OperationConfig<SplitParams>) -> NativeRequest {
        NativeRequest::Split(SplitArgs {
            text: config.source_text.clone(),
            delimiter: config.main_param.clone(),
            trimparts: config.config_params.trim_parts,
            useregex: config.config_params.use_regex,
        })
    }

    /// The backend joins each column's cells with newlines.
    fn from_native(reply: ProcessedText<Value>) -> Result<Envelope, ProcessingError> {
        match Envelope::wrap(reply.result_text) {
            Envelope::Column(joined) => Ok(Envelope::column_list(
                joined
                    .iter()
                    .map(|column| column.split('\n').map(str::to_string).collect())
                    .collect(),
            )),
            Envelope::Text(text) if text.is_empty() => Ok(Envelope::column_list(Vec::new())),
            other => Err(ProcessingError::TransportFailure(format!(
                "split reply has unexpected shape {}",
                other.kind()
            ))),
        }
    }
}

enum Separator {
    Literal(String),
    Pattern(Regex),
}

pub struct SplitTransform {
    separator: Separator,
    trim: bool,
}

impl SplitTransform {
    pub fn new(config: &OperationConfig<SplitParams>) -> Result<Self, ProcessingError> {
        let separator = if config.config_params.use_regex {
            validate_regex(&config.main_param)?;
            let re = Regex::new(&config.main_param)
                .map_err(|e| ProcessingError::invalid_pattern(&config.main_param, e))?;
            Separator::Pattern(re)
        } else {
            Separator::Literal(config.main_param.clone())
        };
        Ok(Self {
            separator,
            trim: config.config_params.trim_parts,
        })
    }

    fn parts<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let parts: Vec<&str> = match &self.separator {
            Separator::Literal(sep) => line.split(sep.as_str()).collect(),
            Separator::Pattern(re) => re.split(line).collect(),
        };
        if self.trim {
            parts.into_iter().map(str::trim).collect()
        } else {
            parts
        }
    }
}

impl ChunkTransform for SplitTransform {
    fn apply(&mut self, lines: &[&str], _at: ChunkPosition) -> Result<Envelope, ProcessingError> {
        let mut columns: Vec<Vec<String>> = Vec::new();
        for (row, line) in lines.iter().enumerate() {
            let parts = self.parts(line);
            // A column first seen on this row is back-filled for earlier rows.
            while columns.len() < parts.len() {
                columns.push(vec![String::new(); row]);
            }
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(parts.get(i).map(|p| p.to_string()).unwrap_or_default());
            }
        }
        Ok(Envelope::column_list(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, sep: &str, params: SplitParams) -> Vec<Vec<String>> {
        let config = OperationConfig::new(text, sep, params);
        let mut transform = SplitTransform::new(&config).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        match transform.apply(&lines, ChunkPosition::WHOLE).unwrap() {
            Envelope::ColumnList(columns) => columns,
            other => panic!("expected column list, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_split() {
        let columns = run("a_b_c", "_", SplitParams::default());
        assert_eq!(columns, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let columns = run("a,b\nc\nd,e,f", ",", SplitParams::default());
        assert_eq!(
            columns,
            vec![
                vec!["a", "c", "d"],
                vec!["b", "", "e"],
                vec!["", "", "f"],
            ]
        );
    }

    #[test]
    fn test_regex_and_trim() {
        let params = SplitParams {
            trim_parts: true,
            use_regex: true,
        };
        let columns = run("one ;  two;three", r";\s*", params);
        assert_eq!(columns, vec![vec!["one"], vec!["two"], vec!["three"]]);
    }

    #[test]
    fn test_validation() {
        let empty = OperationConfig::new("", "_", SplitParams::default());
        assert_eq!(
            Split::validate(&empty),
            Err(ProcessingError::MissingInput("source text is empty"))
        );

        let no_sep = OperationConfig::new("abc", "", SplitParams::default());
        assert!(matches!(Split::validate(&no_sep), Err(ProcessingError::MissingInput(_))));

        let bad = OperationConfig::new(
            "abc",
            "[",
            SplitParams {
                use_regex: true,
                ..Default::default()
            },
        );
        assert!(matches!(
            Split::validate(&bad),
            Err(ProcessingError::InvalidPattern { .. })
        ));

        // A literal "[" is fine without regex mode.
        let literal = OperationConfig::new("a[b", "[", SplitParams::default());
        assert!(Split::validate(&literal).is_ok());
    }

    #[test]
    fn test_native_reply_translation() {
        let reply = ProcessedText {
            result_text: serde_json::json!(["a\nc", "b\n"]),
            removed_lines: 0,
            metrics: Default::default(),
        };
        let env = Split::from_native(reply).unwrap();
        assert_eq!(
            env,
            Envelope::column_list(vec![
                vec!["a".into(), "c".into()],
                vec!["b".into(), "".into()],
            ])
        );
    }
}
