//! codex-relayd - line-delimited JSON relay over stdio
//!
//! Each stdin line is one request; each stdout line is one message. Requests
//! run concurrently and share a single chunk cache, so change-mode
//! continuations work across requests for as long as the daemon lives.
//!
//! ```text
//! > {"id": 1, "prompt": "rename Foo to Bar", "change_mode": true}
//! < {"type":"result","id":1,"ok":true,"text":"## Change Summary ..."}
//! > {"id": 2, "prompt": "rename Foo to Bar", "change_mode": true, "chunk_index": 2, "chunk_cache_key": "..."}
//! > {"id": 3, "method": "brainstorm", "prompt": "faster builds", "methodology": "scamper"}
//! ```
//!
//! Methods: `ask` (default), `brainstorm`, `help`, `version`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn, Instrument, Level};

use codex_relay_core::{
    engine_help, engine_version, request_span, version_message, AskRequest, AskService,
    BrainstormRequest, ChangeModeProcessor, ChunkCache, CodexEngine, ProgressFn, RelayConfig,
    METRICS,
};

#[derive(Parser)]
#[command(name = "codex-relayd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "codex-relay daemon: JSON requests on stdin, responses on stdout", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Relay configuration file (JSON)
    #[arg(long, env = "CODEX_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Engine executable (overrides the config file)
    #[arg(long, env = "CODEX_RELAY_BIN")]
    engine_bin: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Method {
    #[default]
    Ask,
    Brainstorm,
    Help,
    Version,
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Method,
    /// Forward engine output as `progress` messages while it runs.
    #[serde(default)]
    stream: bool,
    /// Method parameters, decoded once the method is known.
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl Request {
    fn params<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.params.clone()))
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Message {
    Progress {
        id: Option<Value>,
        text: String,
    },
    Result {
        id: Option<Value>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<&'static str>,
    },
}

impl Message {
    fn success(id: Option<Value>, text: String) -> Self {
        Message::Result {
            id,
            ok: true,
            text: Some(text),
            error: None,
            error_kind: None,
        }
    }

    fn failure(id: Option<Value>, kind: &'static str, error: String) -> Self {
        Message::Result {
            id,
            ok: false,
            text: None,
            error: Some(error),
            error_kind: Some(kind),
        }
    }
}

#[derive(Clone)]
struct Daemon {
    service: AskService,
    engine_bin: String,
}

impl Daemon {
    fn new(config: &RelayConfig) -> Self {
        let processor = ChangeModeProcessor::new(
            Arc::new(ChunkCache::new(config.cache.clone())),
            config.chunker.clone(),
        );
        let service = AskService::new(
            Arc::new(CodexEngine::from_config(config)),
            processor,
            config.execution.clone(),
        );
        Self {
            service,
            engine_bin: config.engine_bin.clone(),
        }
    }

    async fn handle_line(&self, line: &str, tx: &mpsc::UnboundedSender<Message>) -> Message {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!(event = "daemon.invalid_request", error = %err);
                return Message::failure(None, "invalid_request", format!("invalid request: {err}"));
            }
        };

        let progress_id = request.id.clone();
        let progress_tx = tx.clone();
        let forward: &ProgressFn = &move |text: &str| {
            let _ = progress_tx.send(Message::Progress {
                id: progress_id.clone(),
                text: text.to_string(),
            });
        };
        let on_progress = request.stream.then_some(forward);

        let outcome = match request.method {
            Method::Version => {
                let version = engine_version(&self.engine_bin).await;
                return Message::success(
                    request.id,
                    version_message(&self.engine_bin, version.as_deref()),
                );
            }
            Method::Help => engine_help(&self.engine_bin).await,
            Method::Ask => match request.params::<AskRequest>() {
                Ok(ask) => self.service.ask(&ask, on_progress).await,
                Err(err) => return invalid_params(request.id, err),
            },
            Method::Brainstorm => match request.params::<BrainstormRequest>() {
                Ok(brainstorm) => self.service.brainstorm(&brainstorm, on_progress).await,
                Err(err) => return invalid_params(request.id, err),
            },
        };
        match outcome {
            Ok(text) => Message::success(request.id, text),
            Err(err) => Message::failure(request.id, err.kind(), err.to_string()),
        }
    }
}

fn invalid_params(id: Option<Value>, err: serde_json::Error) -> Message {
    warn!(event = "daemon.invalid_params", error = %err);
    Message::failure(id, "invalid_request", format!("invalid parameters: {err}"))
}

/// Request tasks still running, reaped as they finish.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<()>,
}

impl InFlight {
    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Collect every finished task without waiting. Returns how many.
    fn reap_finished(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(joined) = self.tasks.try_join_next() {
            report_join(joined);
            reaped += 1;
        }
        reaped
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            report_join(joined);
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

fn report_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(event = "daemon.request_panicked", error = %err);
    }
}

async fn write_messages(mut rx: mpsc::UnboundedReceiver<Message>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_string(&message).context("Failed to encode response")?;
        line.push('\n');
        stdout
            .write_all(line.as_bytes())
            .await
            .context("Failed to write response")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_json_file(path)
            .with_context(|| format!("Failed to load relay config from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(bin) = &args.engine_bin {
        config.engine_bin = bin.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    codex_relay_core::init_tracing(args.json, level);

    let config = load_config(&args)?;
    let daemon = Daemon::new(&config);
    info!(
        event = "daemon.started",
        version = codex_relay_core::VERSION,
        engine = %config.engine_bin
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_messages(rx));
    let mut requests = InFlight::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sequence: u64 = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        requests.reap_finished();
        sequence += 1;
        let daemon = daemon.clone();
        let tx = tx.clone();
        let span = request_span(&format!("req-{sequence}"));
        requests.spawn(
            async move {
                let message = daemon.handle_line(&line, &tx).await;
                let _ = tx.send(message);
            }
            .instrument(span),
        );
    }

    requests.drain().await;
    drop(tx);
    writer.await.context("Response writer task failed")??;

    METRICS.flush();
    info!(event = "daemon.stopped", requests = sequence);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daemon() -> Daemon {
        Daemon::new(&RelayConfig {
            engine_bin: "/nonexistent/codex".to_string(),
            ..RelayConfig::default()
        })
    }

    #[test]
    fn test_request_deserializes_flattened_ask_fields() {
        let request: Request = serde_json::from_str(
            r#"{"id": 7, "prompt": "p", "change_mode": true, "chunk_index": "2", "chunk_cache_key": "k", "sandbox_mode": "read-only"}"#,
        )
        .unwrap();
        assert_eq!(request.id, Some(Value::from(7)));
        assert_eq!(request.method, Method::Ask);
        let ask: AskRequest = request.params().unwrap();
        assert!(ask.change_mode);
        assert_eq!(ask.chunk_cache_key.as_deref(), Some("k"));
        assert!(ask.sandbox_mode.is_some());
    }

    #[test]
    fn test_brainstorm_params_decode() {
        let request: Request = serde_json::from_str(
            r#"{"id": 8, "method": "brainstorm", "prompt": "p", "methodology": "design-thinking", "idea_count": 4, "include_analysis": false}"#,
        )
        .unwrap();
        assert_eq!(request.method, Method::Brainstorm);
        let brainstorm: BrainstormRequest = request.params().unwrap();
        assert_eq!(brainstorm.idea_count, 4);
        assert!(!brainstorm.include_analysis);
        assert_eq!(brainstorm.methodology.as_str(), "design-thinking");
    }

    #[tokio::test]
    async fn test_bad_params_are_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let line = r#"{"id": 9, "method": "brainstorm", "prompt": "p", "methodology": "six-hats"}"#;
        match daemon().handle_line(line, &tx).await {
            Message::Result { ok, error_kind, error, .. } => {
                assert!(!ok);
                assert_eq!(error_kind, Some("invalid_request"));
                assert!(error.unwrap().starts_with("invalid parameters:"));
            }
            Message::Progress { .. } => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_brainstorm_streams_session_line_before_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let line = r#"{"id": 10, "method": "brainstorm", "stream": true, "prompt": "p", "idea_count": 2}"#;
        let message = daemon().handle_line(line, &tx).await;
        assert_eq!(
            rx.recv().await,
            Some(Message::Progress {
                id: Some(Value::from(10)),
                text: "Generating 2 ideas via auto methodology...".to_string(),
            })
        );
        match message {
            Message::Result { ok, error_kind, .. } => {
                assert!(!ok);
                assert_eq!(error_kind, Some("launch"));
            }
            Message::Progress { .. } => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_help_without_engine_is_launch_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        match daemon().handle_line(r#"{"id": 11, "method": "help"}"#, &tx).await {
            Message::Result { ok, error_kind, .. } => {
                assert!(!ok);
                assert_eq!(error_kind, Some("launch"));
            }
            Message::Progress { .. } => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_finished_requests_are_reaped_while_serving() {
        let mut in_flight = InFlight::default();
        for _ in 0..3 {
            in_flight.spawn(async {});
        }
        in_flight.spawn(async { panic!("request task failed") });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(in_flight.reap_finished(), 4);
        assert_eq!(in_flight.len(), 0);
        assert_eq!(in_flight.reap_finished(), 0);
    }

    #[test]
    fn test_message_encoding() {
        let ok = serde_json::to_value(Message::success(Some(Value::from(1)), "hi".into())).unwrap();
        assert_eq!(ok, serde_json::json!({"type": "result", "id": 1, "ok": true, "text": "hi"}));

        let progress = serde_json::to_value(Message::Progress {
            id: None,
            text: "partial".into(),
        })
        .unwrap();
        assert_eq!(progress["type"], "progress");
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let message = daemon().handle_line("{not json", &tx).await;
        match message {
            Message::Result { ok, error_kind, .. } => {
                assert!(!ok);
                assert_eq!(error_kind, Some("invalid_request"));
            }
            Message::Progress { .. } => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_continuation_is_served_without_engine() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let line = r#"{"id": "a", "prompt": "p", "change_mode": true, "chunk_index": 2, "chunk_cache_key": "feedfacefeedface"}"#;
        let message = daemon().handle_line(line, &tx).await;
        assert_eq!(
            message,
            Message::success(
                Some(Value::from("a")),
                "Cache key 'feedfacefeedface' not found or expired. Please regenerate the response."
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_missing_engine_is_reported_as_launch_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let message = daemon().handle_line(r#"{"id": 3, "prompt": "hello"}"#, &tx).await;
        match message {
            Message::Result { ok, error_kind, .. } => {
                assert!(!ok);
                assert_eq!(error_kind, Some("launch"));
            }
            Message::Progress { .. } => panic!("expected a result"),
        }
    }

    #[tokio::test]
    async fn test_version_without_engine() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let message = daemon().handle_line(r#"{"id": 4, "method": "version"}"#, &tx).await;
        match message {
            Message::Result { ok, text, .. } => {
                assert!(ok);
                assert!(text.unwrap().contains("not installed"));
            }
            Message::Progress { .. } => panic!("expected a result"),
        }
    }
}
