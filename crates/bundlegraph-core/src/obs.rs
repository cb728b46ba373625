//! Structured observability hooks for session and resolution events.
//!
//! This module provides:
//! - Session-scoped tracing spans via the `SessionSpan` RAII guard
//! - Emission functions for lifecycle events: open/close, enumeration,
//!   resolution, cache traffic and per-permutation failures
//!
//! Events are emitted at `info!` level unless noted (filter with `RUST_LOG`).

use tracing::{debug, info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = SessionSpan::enter("3f2a9c01");
/// // every event logged while the guard lives carries session = "3f2a9c01"
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    /// Create and enter a span tagged with the session's project-set identity.
    pub fn enter(session: &str) -> Self {
        let span = tracing::info_span!("bundlegraph.session", session = %session);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: session opened.
pub fn emit_session_opened(projects: usize, classes: usize) {
    info!(event = "session.opened", projects = projects, classes = classes);
}

/// Emit event: session closed.
pub fn emit_session_closed(projects: usize) {
    info!(event = "session.closed", projects = projects);
}

/// Emit event: permutations enumerated.
pub fn emit_permutations_enumerated(count: usize, variable_fields: usize) {
    info!(
        event = "permutations.enumerated",
        count = count,
        variable_fields = variable_fields,
    );
}

/// Emit event: a closure was resolved and sorted.
pub fn emit_resolve_finished(checksum: &str, classes: usize, cached: bool) {
    debug!(
        event = "resolve.finished",
        checksum = %checksum,
        classes = classes,
        cached = cached,
    );
}

/// Emit event: cache hit.
pub fn emit_cache_hit(key: &str) {
    debug!(event = "cache.hit", key = %key);
}

/// Emit event: cache miss, optionally with the backing-store error that
/// caused it (warning level in that case).
pub fn emit_cache_miss(key: &str, error: Option<&dyn std::fmt::Display>) {
    match error {
        Some(error) => warn!(event = "cache.miss", key = %key, error = %error),
        None => debug!(event = "cache.miss", key = %key),
    }
}

/// Emit event: a cache write failed (warning level; the result is still used).
pub fn emit_cache_write_failed(key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cache.write_failed", key = %key, error = %error);
}

/// Emit event: cache cleared.
pub fn emit_cache_cleared() {
    info!(event = "cache.cleared");
}

/// Emit event: kept classes depend on excluded ones (warning level).
///
/// Exclusion does not make an artifact self-contained; completeness holds
/// only across all artifacts sharing the permutation.
pub fn emit_exclusion_unsatisfied(count: usize, class: &str, dependency: &str) {
    warn!(
        event = "exclusion.unsatisfied",
        count = count,
        class = %class,
        dependency = %dependency,
        "kept classes depend on excluded classes; they must ship in an earlier artifact"
    );
}

/// Emit event: one permutation of an artifact failed (warning level).
pub fn emit_permutation_failed(artifact: &str, checksum: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "permutation.failed",
        artifact = %artifact,
        checksum = %checksum,
        error = %error,
    );
}

/// Emit event: an artifact plan was stored by a sink.
pub fn emit_artifact_stored(file_name: &str, classes: usize) {
    info!(event = "artifact.stored", file_name = %file_name, classes = classes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_create() {
        let _span = SessionSpan::enter("test-session");
        emit_cache_miss("k", None);
        emit_exclusion_unsatisfied(1, "a.A", "a.B");
    }
}
