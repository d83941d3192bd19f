//! Structured observability hooks for engine runs and change-mode responses.
//!
//! This module provides:
//! - Request-scoped tracing spans via [`request_span`]
//! - Emission functions for process attempts, retries and completion
//! - Distinct `degrade.*` events for every graceful-degradation branch
//!
//! Events are emitted at `info!`/`debug!` level; degradation branches use
//! `warn!` so they stand out. Filter with `RUST_LOG`.

use tracing::{debug, info, warn};

use crate::exec::{ExecutionResult, FailureKind};

/// Request-scoped tracing span.
///
/// Attach it to a request's future with `tracing::Instrument`.
///
/// # Example
///
/// ```ignore
/// service.ask(&request, None).instrument(request_span("req-42")).await
/// // every event inside is tagged with request_id = "req-42"
/// ```
pub fn request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!("relay.request", request_id = %request_id)
}

pub fn emit_process_attempt(program: &str, attempt: u32, max_attempts: u32) {
    debug!(
        event = "process.attempt",
        program = %program,
        attempt = attempt,
        max_attempts = max_attempts,
    );
}

pub fn emit_process_retry(program: &str, attempt: u32, failure: FailureKind, delay_ms: u64) {
    warn!(
        event = "process.retry",
        program = %program,
        attempt = attempt,
        failure = %failure,
        delay_ms = delay_ms,
    );
}

/// Emit event: process run finished (after any retries).
pub fn emit_process_finished(program: &str, result: &ExecutionResult) {
    info!(
        event = "process.finished",
        program = %program,
        ok = result.ok,
        code = ?result.code,
        timed_out = result.timed_out,
        truncated = result.truncated,
        attempts = result.attempts,
        duration_ms = result.duration_ms,
    );
}

pub fn emit_prompt_staged(bytes: usize) {
    debug!(event = "engine.prompt_staged", bytes = bytes);
}

/// Emit event: a failed run's partial stdout is used as the response.
pub fn emit_salvaged_partial_output(program: &str, chars: usize, failure: Option<FailureKind>) {
    warn!(
        event = "degrade.salvaged_partial_output",
        program = %program,
        chars = chars,
        failure = ?failure,
    );
}

/// Emit event: chunking failed and all edits are served as one chunk.
pub fn emit_single_chunk_fallback(edit_count: usize, error: &dyn std::fmt::Display) {
    warn!(
        event = "degrade.single_chunk_fallback",
        edit_count = edit_count,
        error = %error,
    );
}

/// Emit event: chunks could not be cached; the response carries no cache key.
pub fn emit_cache_store_failed(error: &dyn std::fmt::Display) {
    warn!(event = "degrade.cache_store_failed", error = %error);
}

pub fn emit_cache_stored(key: &str, chunk_count: usize) {
    debug!(event = "cache.stored", key = %key, chunk_count = chunk_count);
}

pub fn emit_cache_lookup(key: &str, hit: bool) {
    debug!(event = "cache.lookup", key = %key, hit = hit);
}

pub fn emit_cache_evicted(key: &str, reason: &str) {
    debug!(event = "cache.evicted", key = %key, reason = %reason);
}

/// Emit event: a change-mode chunk was rendered for the caller.
pub fn emit_change_mode_served(edit_count: usize, chunk_count: usize, chunk_index: usize) {
    info!(
        event = "change_mode.served",
        edit_count = edit_count,
        chunk_count = chunk_count,
        chunk_index = chunk_index,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_span_create() {
        let _entered = request_span("test-request").entered();
        emit_cache_lookup("abc", false);
    }
}
