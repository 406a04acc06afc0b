use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::wire::{RpcReply, RpcRequest};
use super::{ConnectArgs, DiffArgs, FilterArgs, NativeBackend, NativeResult, ProcessedText, RemoveArgs, SplitArgs};
use crate::error::ProcessingError;

struct Connection {
    // Held so the child is killed when the connection drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Client for a native service running as a child process, speaking one JSON
/// object per line over stdio.
///
/// The child is spawned on first use and respawned after any I/O failure.
/// Calls are serialized.
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    probe_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            probe_timeout: Duration::from_secs(2),
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// The current executable's own `serve` subcommand.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["serve".to_string()]))
    }

    /// Build from a configured command line; empty means [`Self::current_exe`].
    pub fn from_command(command: &[String]) -> std::io::Result<Self> {
        match command.split_first() {
            Some((program, args)) => Ok(Self::new(program, args.to_vec())),
            None => Self::current_exe(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<Connection, ProcessingError> {
        debug!("Spawning native backend: {} {:?}", self.program.display(), self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProcessingError::TransportFailure(format!(
                    "failed to start {}: {e}",
                    self.program.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProcessingError::TransportFailure("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessingError::TransportFailure("child stdout unavailable".into()))?;

        Ok(Connection {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn call(&self, command: &str, args: Value) -> Result<Value, ProcessingError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            command: command.to_string(),
            args,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| ProcessingError::TransportFailure(e.to_string()))?;
        line.push('\n');

        // Out of the slot until the matching reply is read. A call dropped
        // mid-exchange leaves the slot empty and the child is killed.
        let mut guard = self.connection.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.spawn()?,
        };

        let outcome = async {
            conn.stdin.write_all(line.as_bytes()).await?;
            conn.stdin.flush().await?;
            conn.stdout.next_line().await
        }
        .await;
        let reply_line = match outcome {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                warn!("Native backend closed its output");
                return Err(ProcessingError::TransportFailure(
                    "native backend exited".into(),
                ));
            }
            Err(e) => {
                error!("Native backend I/O failed: {}", e);
                return Err(ProcessingError::TransportFailure(e.to_string()));
            }
        };

        let reply: RpcReply = serde_json::from_str(&reply_line)
            .map_err(|e| ProcessingError::TransportFailure(format!("malformed reply: {e}")))?;
        if reply.id != id {
            return Err(ProcessingError::TransportFailure(format!(
                "reply id {} does not match request {id}",
                reply.id
            )));
        }
        *guard = Some(conn);
        drop(guard);

        if reply.ok {
            Ok(reply.result.unwrap_or(Value::Null))
        } else {
            Err(reply
                .error
                .map(ProcessingError::from)
                .unwrap_or_else(|| ProcessingError::Unknown("native call failed".into())))
        }
    }

    async fn call_text(&self, command: &str, args: impl Serialize) -> NativeResult {
        let args = serde_json::to_value(args)
            .map_err(|e| ProcessingError::TransportFailure(e.to_string()))?;
        let value = self.call(command, args).await?;
        serde_json::from_value::<ProcessedText<Value>>(value)
            .map_err(|e| ProcessingError::TransportFailure(format!("unexpected reply: {e}")))
    }
}

#[async_trait]
impl NativeBackend for ProcessBackend {
    async fn is_available(&self) -> bool {
        let probe = self.call("is_backend_available", Value::Null);
        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(value)) => value.as_bool().unwrap_or(false),
            Ok(Err(e)) => {
                debug!("Native backend probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Native backend probe timed out");
                false
            }
        }
    }

    async fn process_text_block(&self, args: SplitArgs) -> NativeResult {
        self.call_text("process_text_block", args).await
    }

    async fn get_text_diff(&self, args: DiffArgs) -> NativeResult {
        self.call_text("get_text_diff", args).await
    }

    async fn filter_text(&self, args: FilterArgs) -> NativeResult {
        self.call_text("filter_text", args).await
    }

    async fn remove_lines(&self, args: RemoveArgs) -> NativeResult {
        self.call_text("remove_lines", args).await
    }

    async fn connect_texts(&self, args: ConnectArgs) -> Result<String, ProcessingError> {
        let args = serde_json::to_value(args)
            .map_err(|e| ProcessingError::TransportFailure(e.to_string()))?;
        match self.call("connect_texts", args).await? {
            Value::String(text) => Ok(text),
            other => Err(ProcessingError::TransportFailure(format!(
                "unexpected reply: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let backend = ProcessBackend::new("/nonexistent/textsplit-native", Vec::new());
        assert!(!backend.is_available().await);

        let err = backend
            .filter_text(FilterArgs {
                text: "a".into(),
                pattern: "a".into(),
                filtermode: "keep".into(),
                casesensitive: true,
                splitmatches: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::TransportFailure(_)));
    }

    /// A service that answers every request correctly, but only after 300ms.
    #[cfg(unix)]
    fn slow_service() -> ProcessBackend {
        let script = r#"while read -r line; do
  id=$(printf '%s' "$line" | sed 's/^{"id":\([0-9]*\).*/\1/')
  sleep 0.3
  printf '{"id":%s,"ok":true,"result":"joined"}\n' "$id"
done"#;
        ProcessBackend::new("sh", vec!["-c".to_string(), script.to_string()])
            .with_probe_timeout(Duration::from_millis(100))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_probe_does_not_poison_next_call() {
        let backend = slow_service();
        assert!(!backend.is_available().await);

        let joined = backend
            .connect_texts(ConnectArgs {
                text1: "a".into(),
                text2: "b".into(),
                separator: ",".into(),
            })
            .await
            .unwrap();
        assert_eq!(joined, "joined");
    }

    #[test]
    fn test_from_command() {
        let backend = ProcessBackend::from_command(&["native".into(), "--stdio".into()]).unwrap();
        assert_eq!(backend.program, PathBuf::from("native"));
        assert_eq!(backend.args, vec!["--stdio".to_string()]);
    }
}
