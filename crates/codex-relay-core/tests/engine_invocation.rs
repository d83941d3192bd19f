//! Engine invocation against stand-in executables.
#![cfg(unix)]

use codex_relay_core::engine::{
    engine_help, engine_version, CodexEngine, EngineOptions, ReasoningEngine, CONCISE_PREFIX,
};
use codex_relay_core::exec::{ExecError, ExecutionOptions};
use codex_relay_core::RelayConfig;

#[tokio::test]
async fn test_argv_reaches_engine_with_concise_prefix() {
    // `echo` prints its argv, which is exactly what the engine would receive.
    let engine = CodexEngine::new("echo");
    let options = EngineOptions {
        model: Some("o4-mini".into()),
        full_auto: true,
        ..EngineOptions::default()
    };
    let text = engine.ask("list the modules", &options, None).await.unwrap();
    assert_eq!(
        text.trim_end(),
        format!("--full-auto -m o4-mini --skip-git-repo-check exec {CONCISE_PREFIX}list the modules")
    );
}

#[tokio::test]
async fn test_large_prompt_goes_through_stdin() {
    let config = RelayConfig {
        engine_bin: "echo".into(),
        large_prompt_threshold_bytes: 64,
        ..RelayConfig::default()
    };
    let engine = CodexEngine::from_config(&config);
    let text = engine
        .ask(&"x".repeat(200), &EngineOptions::default(), None)
        .await
        .unwrap();
    // the prompt itself is no longer on the command line
    assert_eq!(text.trim_end(), "--skip-git-repo-check exec -");
}

#[tokio::test]
async fn test_missing_engine_is_launch_error() {
    let engine = CodexEngine::new("/nonexistent/codex");
    let err = engine
        .ask("hi", &EngineOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Launch { attempts: 1, .. }));
}

#[tokio::test]
async fn test_engine_failure_reports_exit_code() {
    // `false` ignores its arguments and exits 1 without output.
    let engine = CodexEngine::new("false");
    let options = EngineOptions {
        execution: ExecutionOptions::default().with_timeout_ms(5_000),
        ..EngineOptions::default()
    };
    let err = engine.ask("hi", &options, None).await.unwrap_err();
    assert_eq!(err.to_string(), "engine failed with exit code 1: Unknown error");
}

#[tokio::test]
async fn test_version_lookup_without_engine() {
    assert!(engine_version("/nonexistent/codex").await.is_none());
}

#[tokio::test]
async fn test_help_passes_engine_output_through() {
    // `echo --help` prints either its own usage or the argument itself.
    let text = engine_help("echo").await.unwrap();
    assert!(!text.trim().is_empty());

    let err = engine_help("/nonexistent/codex").await.unwrap_err();
    assert!(matches!(err, ExecError::Launch { .. }));
}
