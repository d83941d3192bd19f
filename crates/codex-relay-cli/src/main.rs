//! codex-relay - one-shot access to the reasoning engine
//!
//! ## Commands
//!
//! - `ask`: run a prompt through the engine, optionally in change mode
//! - `brainstorm`: generate ideas with a structured methodology
//! - `engine-help`: print the engine's own help
//! - `version`: report the installed engine version
//!
//! Chunk continuation needs the cache of a long-running process; use
//! `codex-relayd` for multi-chunk change-mode sessions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Instrument, Level};

use codex_relay_core::{
    engine_help, engine_version, request_span, version_message, ApprovalPolicy, AskRequest,
    AskService, BrainstormRequest, ChangeModeProcessor, ChunkCache, CodexEngine, Methodology,
    ProgressFn, RawChunkIndex, RelayConfig, SandboxMode, METRICS,
};

#[derive(Parser)]
#[command(name = "codex-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay prompts to the Codex CLI and page through structured edits", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Relay configuration file (JSON)
    #[arg(long, global = true, env = "CODEX_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Engine executable (overrides the config file)
    #[arg(long, global = true, env = "CODEX_RELAY_BIN")]
    engine_bin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Engine settings shared by every command that runs a prompt.
#[derive(Args, Debug)]
struct EngineArgs {
    /// Model to request
    #[arg(short, long)]
    model: Option<String>,

    /// Workspace-write sandbox with on-failure approval
    #[arg(long)]
    full_auto: bool,

    /// never | on-request | on-failure | untrusted
    #[arg(long)]
    approval_policy: Option<ApprovalPolicy>,

    /// read-only | workspace-write | danger-full-access
    #[arg(long)]
    sandbox_mode: Option<SandboxMode>,

    /// Bypass every approval and sandbox (isolated environments only)
    #[arg(long)]
    yolo: bool,

    /// Working directory handed to the engine
    #[arg(long = "cd")]
    working_dir: Option<String>,

    /// Per-attempt timeout in milliseconds (overrides the config file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Echo engine output to stderr while it runs
    #[arg(long)]
    stream: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the engine a question
    Ask {
        /// Prompt text
        prompt: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// Return OLD/NEW edit blocks instead of conversational text
        #[arg(long)]
        change_mode: bool,

        /// Chunk to return (1-based)
        #[arg(long)]
        chunk_index: Option<String>,

        /// Cache key from an earlier multi-chunk response
        #[arg(long)]
        chunk_cache_key: Option<String>,

        /// Render configuration, reasoning and token usage from the transcript
        #[arg(long)]
        pretty: bool,
    },

    /// Generate ideas with a structured methodology
    Brainstorm {
        /// Challenge or question to explore
        prompt: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// divergent | convergent | scamper | design-thinking | lateral | auto
        #[arg(long, default_value_t = Methodology::Auto)]
        methodology: Methodology,

        /// Domain context, e.g. software, product, research
        #[arg(long)]
        domain: Option<String>,

        /// Known limitations or requirements
        #[arg(long)]
        constraints: Option<String>,

        /// Background, previous attempts or current state
        #[arg(long = "context")]
        existing_context: Option<String>,

        /// Number of ideas to generate
        #[arg(long, default_value_t = codex_relay_core::brainstorm::DEFAULT_IDEA_COUNT)]
        ideas: u32,

        /// Skip feasibility, impact and innovation ratings
        #[arg(long)]
        no_analysis: bool,
    },

    /// Show the engine's own help
    EngineHelp,

    /// Show the engine version
    Version,
}

fn echo_to_stderr(text: &str) {
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(text.as_bytes());
    let _ = stderr.flush();
}

fn load_config(path: Option<&Path>, engine_bin: Option<String>) -> Result<RelayConfig> {
    let mut config = match path {
        Some(path) => RelayConfig::from_json_file(path)
            .with_context(|| format!("Failed to load relay config from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(bin) = engine_bin {
        config.engine_bin = bin;
    }
    Ok(config)
}

fn with_timeout(mut config: RelayConfig, timeout_ms: Option<u64>) -> RelayConfig {
    if let Some(timeout_ms) = timeout_ms {
        config.execution.timeout_ms = timeout_ms;
    }
    config
}

fn build_service(config: &RelayConfig) -> AskService {
    let processor = ChangeModeProcessor::new(
        Arc::new(ChunkCache::new(config.cache.clone())),
        config.chunker.clone(),
    );
    AskService::new(
        Arc::new(CodexEngine::from_config(config)),
        processor,
        config.execution.clone(),
    )
}

async fn cmd_ask(config: &RelayConfig, request: AskRequest, stream: bool) -> Result<()> {
    let service = build_service(config);
    let echo: &ProgressFn = &echo_to_stderr;
    let on_progress = stream.then_some(echo);

    let request_id = uuid::Uuid::new_v4().to_string();
    let text = service
        .ask(&request, on_progress)
        .instrument(request_span(&request_id))
        .await
        .context("Engine request failed")?;
    println!("{text}");
    info!(event = "cli.ask_complete", request_id = %request_id, chars = text.len());
    Ok(())
}

async fn cmd_brainstorm(config: &RelayConfig, request: BrainstormRequest, stream: bool) -> Result<()> {
    let service = build_service(config);
    let echo: &ProgressFn = &echo_to_stderr;
    let on_progress = stream.then_some(echo);

    let request_id = uuid::Uuid::new_v4().to_string();
    let text = service
        .brainstorm(&request, on_progress)
        .instrument(request_span(&request_id))
        .await
        .context("Brainstorm request failed")?;
    println!("{text}");
    info!(event = "cli.brainstorm_complete", request_id = %request_id, chars = text.len());
    Ok(())
}

async fn cmd_engine_help(config: &RelayConfig) -> Result<()> {
    let text = engine_help(&config.engine_bin)
        .await
        .with_context(|| format!("Failed to run `{} --help`", config.engine_bin))?;
    print!("{text}");
    Ok(())
}

async fn cmd_version(config: &RelayConfig) -> Result<()> {
    let version = engine_version(&config.engine_bin).await;
    println!("codex-relay {}", codex_relay_core::VERSION);
    println!("{}", version_message(&config.engine_bin, version.as_deref()));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    codex_relay_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.engine_bin)?;

    let result = match cli.command {
        Commands::Ask {
            prompt,
            engine,
            change_mode,
            chunk_index,
            chunk_cache_key,
            pretty,
        } => {
            let config = with_timeout(config, engine.timeout_ms);
            let request = AskRequest {
                prompt,
                model: engine.model,
                full_auto: engine.full_auto,
                approval_policy: engine.approval_policy,
                sandbox_mode: engine.sandbox_mode,
                yolo: engine.yolo,
                working_dir: engine.working_dir,
                change_mode,
                chunk_index: chunk_index.map(RawChunkIndex::Text),
                chunk_cache_key,
                format_transcript: pretty,
            };
            cmd_ask(&config, request, engine.stream).await
        }
        Commands::Brainstorm {
            prompt,
            engine,
            methodology,
            domain,
            constraints,
            existing_context,
            ideas,
            no_analysis,
        } => {
            let config = with_timeout(config, engine.timeout_ms);
            let request = BrainstormRequest {
                prompt,
                methodology,
                domain,
                constraints,
                existing_context,
                idea_count: ideas,
                include_analysis: !no_analysis,
                model: engine.model,
                full_auto: engine.full_auto,
                approval_policy: engine.approval_policy,
                sandbox_mode: engine.sandbox_mode,
                yolo: engine.yolo,
                working_dir: engine.working_dir,
            };
            cmd_brainstorm(&config, request, engine.stream).await
        }
        Commands::EngineHelp => cmd_engine_help(&config).await,
        Commands::Version => cmd_version(&config).await,
    };

    METRICS.flush();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_flags_parse() {
        let cli = Cli::try_parse_from([
            "codex-relay",
            "ask",
            "refactor the parser",
            "--model",
            "o3",
            "--approval-policy",
            "on-failure",
            "--sandbox-mode",
            "read-only",
            "--cd",
            "/work",
            "--change-mode",
            "--chunk-index",
            "2",
            "--chunk-cache-key",
            "abc",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                prompt,
                engine,
                change_mode,
                chunk_index,
                ..
            } => {
                assert_eq!(prompt, "refactor the parser");
                assert_eq!(engine.approval_policy, Some(ApprovalPolicy::OnFailure));
                assert_eq!(engine.sandbox_mode, Some(SandboxMode::ReadOnly));
                assert_eq!(engine.working_dir.as_deref(), Some("/work"));
                assert!(change_mode);
                assert_eq!(chunk_index.as_deref(), Some("2"));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_brainstorm_flags_parse() {
        let cli = Cli::try_parse_from([
            "codex-relay",
            "brainstorm",
            "ways to cut build times",
            "--methodology",
            "scamper",
            "--domain",
            "software",
            "--context",
            "we already cache dependencies",
            "--ideas",
            "8",
            "--no-analysis",
            "-m",
            "o4-mini",
        ])
        .unwrap();
        match cli.command {
            Commands::Brainstorm {
                prompt,
                engine,
                methodology,
                domain,
                existing_context,
                ideas,
                no_analysis,
                ..
            } => {
                assert_eq!(prompt, "ways to cut build times");
                assert_eq!(methodology, Methodology::Scamper);
                assert_eq!(domain.as_deref(), Some("software"));
                assert_eq!(existing_context.as_deref(), Some("we already cache dependencies"));
                assert_eq!(ideas, 8);
                assert!(no_analysis);
                assert_eq!(engine.model.as_deref(), Some("o4-mini"));
            }
            _ => panic!("expected brainstorm"),
        }
    }

    #[test]
    fn test_brainstorm_defaults() {
        let cli = Cli::try_parse_from(["codex-relay", "brainstorm", "p"]).unwrap();
        match cli.command {
            Commands::Brainstorm {
                methodology, ideas, ..
            } => {
                assert_eq!(methodology, Methodology::Auto);
                assert_eq!(ideas, 12);
            }
            _ => panic!("expected brainstorm"),
        }
        assert!(Cli::try_parse_from(["codex-relay", "brainstorm", "p", "--methodology", "six-hats"]).is_err());
        assert!(Cli::try_parse_from(["codex-relay", "engine-help"]).is_ok());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let parsed = Cli::try_parse_from(["codex-relay", "ask", "p", "--approval-policy", "sometimes"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_engine_bin_overrides_config() {
        let config = load_config(None, Some("/opt/codex".into())).unwrap();
        assert_eq!(config.engine_bin, "/opt/codex");
        assert!(load_config(Some(Path::new("/nonexistent/relay.json")), None).is_err());
    }
}
