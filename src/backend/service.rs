//! Reference native service: answers the backend procedures over JSON lines.
//!
//! Runs the same transforms as the in-process route and reports results in
//! the backend naming convention.

use std::time::Instant;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::wire::{RpcError, RpcReply, RpcRequest};
use super::{BackendDiffEntry, ConnectArgs, DiffArgs, FilterArgs, ProcessedText, RemoveArgs, SplitArgs};
use crate::diff::diff_texts;
use crate::envelope::{BackendMetrics, Envelope, MemoryProbe};
use crate::error::ProcessingError;
use crate::operations::{
    DiffParams, Filter, FilterMode, FilterParams, JobConfig, Operation, OperationConfig, Remove, RemoveMode,
    RemoveParams, Split, SplitParams, connect_texts,
};
use crate::worker::run_in_process;

/// Serve requests until `reader` reaches EOF.
pub async fn serve<R, W>(reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => {
                let id = request.id;
                // Transforms are CPU bound.
                tokio::task::spawn_blocking(move || handle(request))
                    .await
                    .unwrap_or_else(|e| {
                        RpcReply::failure(id, RpcError::from(&ProcessingError::Unknown(e.to_string())))
                    })
            }
            Err(e) => {
                warn!("Malformed request: {}", e);
                RpcReply::failure(
                    0,
                    RpcError::from(&ProcessingError::TransportFailure(format!("malformed request: {e}"))),
                )
            }
        };
        let mut out = serde_json::to_string(&reply).context("Failed to encode reply")?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await.context("Failed to write reply")?;
        writer.flush().await.context("Failed to flush reply")?;
    }
    debug!("Native service input closed");
    Ok(())
}

/// Dispatch one request to its procedure.
pub fn handle(request: RpcRequest) -> RpcReply {
    let id = request.id;
    debug!("Native call {} ({})", request.command, id);
    let outcome = match request.command.as_str() {
        "is_backend_available" => Ok(Value::Bool(true)),
        "process_text_block" => args(request.args).and_then(process_text_block),
        "get_text_diff" => args(request.args).and_then(get_text_diff),
        "filter_text" => args(request.args).and_then(filter_text),
        "remove_lines" => args(request.args).and_then(remove_lines),
        "connect_texts" => args(request.args).map(|a: ConnectArgs| {
            Value::String(connect_texts(&a.text1, &a.text2, &a.separator))
        }),
        other => Err(ProcessingError::Unknown(format!("unknown command '{other}'"))),
    };
    match outcome {
        Ok(result) => RpcReply::success(id, result),
        Err(err) => RpcReply::failure(id, RpcError::from(&err)),
    }
}

fn args<T: DeserializeOwned>(value: Value) -> Result<T, ProcessingError> {
    serde_json::from_value(value).map_err(|e| ProcessingError::Unknown(format!("bad arguments: {e}")))
}

/// Validate and run a job, packaging the result with backend metrics.
fn execute<O: Operation>(
    config: OperationConfig<O::Params>,
    render: impl FnOnce(Envelope) -> Result<(Value, usize), ProcessingError>,
) -> Result<Value, ProcessingError> {
    let started = Instant::now();
    O::validate(&config)?;
    let job: JobConfig = O::into_job(config);
    let (result, _) = run_in_process(&job)?;
    let (result_text, removed_lines) = render(result)?;
    let metrics = BackendMetrics::new(
        started.elapsed().as_secs_f64() * 1000.0,
        MemoryProbe::new().sample(),
    );
    serde_json::to_value(ProcessedText {
        result_text,
        removed_lines,
        metrics,
    })
    .map_err(|e| ProcessingError::Unknown(e.to_string()))
}

fn process_text_block(args: SplitArgs) -> Result<Value, ProcessingError> {
    let params = SplitParams {
        trim_parts: args.trimparts,
        use_regex: args.useregex,
    };
    execute::<Split>(OperationConfig::new(args.text, args.delimiter, params), |env| {
        let columns: Vec<Vec<String>> = env.try_convert()?;
        let joined: Vec<String> = columns.iter().map(|c| c.join("\n")).collect();
        Ok((json!(joined), 0))
    })
}

fn get_text_diff(args: DiffArgs) -> Result<Value, ProcessingError> {
    let params = DiffParams {
        case_sensitive: args.casesensitive,
        ignore_whitespace: args.ignorewhitespace,
    };
    let started = Instant::now();
    let entries = diff_texts(&args.oldtext, &args.newtext, &params.line_options());
    let lines = entries
        .iter()
        .map(|e| serde_json::to_string(&BackendDiffEntry::from(e)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProcessingError::Unknown(e.to_string()))?;
    let metrics = BackendMetrics::new(
        started.elapsed().as_secs_f64() * 1000.0,
        MemoryProbe::new().sample(),
    );
    serde_json::to_value(ProcessedText {
        result_text: lines.join("\n"),
        removed_lines: 0,
        metrics,
    })
    .map_err(|e| ProcessingError::Unknown(e.to_string()))
}

fn filter_text(args: FilterArgs) -> Result<Value, ProcessingError> {
    let filter_mode = match args.filtermode.as_str() {
        "remove" => FilterMode::Remove,
        _ => FilterMode::Keep,
    };
    let params = FilterParams {
        case_sensitive: args.casesensitive,
        filter_mode,
        split_matches: args.splitmatches,
    };
    execute::<Filter>(OperationConfig::new(args.text, args.pattern, params), |env| {
        let text: String = env.try_convert()?;
        Ok((json!(text), 0))
    })
}

fn remove_lines(args: RemoveArgs) -> Result<Value, ProcessingError> {
    let remove_mode = match args.removemode.as_str() {
        "notContaining" | "not_containing" => RemoveMode::NotContaining,
        "duplicates" => RemoveMode::Duplicates,
        _ => RemoveMode::Containing,
    };
    let params = RemoveParams {
        case_sensitive: args.casesensitive,
        use_regex: args.useregex,
        trim_parts: args.trimparts,
        remove_mode,
    };
    execute::<Remove>(OperationConfig::new(args.text, args.pattern, params), |env| match env {
        Envelope::RichText(rich) => Ok((json!(rich.result_text), rich.removed_count)),
        other => Err(ProcessingError::Unknown(format!(
            "remove produced {}",
            other.kind()
        ))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn request(command: &str, args: Value) -> RpcRequest {
        RpcRequest {
            id: 1,
            command: command.to_string(),
            args,
        }
    }

    #[test]
    fn test_split_reply_joins_columns() {
        let reply = handle(request(
            "process_text_block",
            json!({"text": "a_b\nc_d", "delimiter": "_", "trimparts": false, "useregex": false}),
        ));
        assert!(reply.ok);
        let result = reply.result.unwrap();
        assert_eq!(result["result_text"], json!(["a\nc", "b\nd"]));
        assert!(result["metrics"]["execution_time_ms"].is_number());
    }

    #[test]
    fn test_diff_reply_uses_backend_names() {
        let reply = handle(request(
            "get_text_diff",
            json!({"oldtext": "a", "newtext": "b", "ignorewhitespace": false}),
        ));
        let text = reply.result.unwrap()["result_text"].as_str().unwrap().to_string();
        assert!(text.contains("\"diff_type\":\"added\""));
        assert!(text.contains("\"diff_type\":\"removed\""));
    }

    #[test]
    fn test_remove_reports_count() {
        let reply = handle(request(
            "remove_lines",
            json!({
                "text": "x\ny\nx", "pattern": "", "removemode": "duplicates",
                "casesensitive": true, "useregex": false, "trimparts": false
            }),
        ));
        let result = reply.result.unwrap();
        assert_eq!(result["result_text"], "x\ny");
        assert_eq!(result["removed_lines"], 1);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let reply = handle(request(
            "filter_text",
            json!({"text": "a", "pattern": "(", "filtermode": "keep", "casesensitive": true, "splitmatches": false}),
        ));
        assert!(!reply.ok);
        assert_eq!(reply.error.unwrap().code, "invalid_pattern");
    }

    #[test]
    fn test_connect_replies_with_bare_text() {
        let reply = handle(request(
            "connect_texts",
            json!({"text1": "a\nb", "text2": "1", "separator": "="}),
        ));
        assert_eq!(reply, RpcReply::success(1, json!("a=1\nb=")));
    }

    #[test]
    fn test_unknown_command() {
        let reply = handle(request("explode", Value::Null));
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn test_serve_loop() {
        let input = concat!(
            "{\"id\":3,\"command\":\"is_backend_available\"}\n",
            "\n",
            "not json\n"
        );
        let mut output = Vec::new();
        serve(BufReader::new(input.as_bytes()), &mut output).await.unwrap();

        let replies: Vec<RpcReply> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], RpcReply::success(3, Value::Bool(true)));
        assert!(!replies[1].ok);
    }
}
