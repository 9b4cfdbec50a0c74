// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for userdata-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `userdata_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `kind`: settings, progress
//! - `operation`: fetch, upsert, read, write
//! - `status`: success, error, queued, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// REMOTE - Gateway calls
// ═══════════════════════════════════════════════════════════════════════════

/// Record a gateway call outcome
pub fn record_remote_call(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "userdata_sync_remote_calls_total",
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record gateway call latency
pub fn record_remote_latency(operation: &str, duration: Duration) {
    histogram!(
        "userdata_sync_remote_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the outcome of uploading one record
pub fn record_upload(kind: &str, status: &str) {
    counter!(
        "userdata_sync_uploads_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a read that returned the remote copy instead of the local one
pub fn record_remote_adopted(kind: &str) {
    counter!(
        "userdata_sync_remote_adopted_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// WRITE PATH - Debounce and pending queue
// ═══════════════════════════════════════════════════════════════════════════

/// Record a save that replaced a still-sleeping upload timer
pub fn record_debounce_coalesced(kind: &str) {
    counter!(
        "userdata_sync_debounce_coalesced_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a record parked in the pending queue
pub fn record_enqueue(kind: &str) {
    counter!(
        "userdata_sync_queue_enqueued_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set pending queue depth
pub fn set_queue_depth(count: usize) {
    gauge!("userdata_sync_queue_depth").set(count as f64);
}

/// Record a pending queue drain
pub fn record_drain(count: usize, success: bool) {
    let status = if success { "success" } else { "halted" };
    counter!(
        "userdata_sync_queue_drain_total",
        "status" => status
    )
    .increment(1);
    counter!("userdata_sync_queue_drained_items_total").increment(count as u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// MERGE - Sign-in and reconnect reconciliation
// ═══════════════════════════════════════════════════════════════════════════

/// Record a merge run (`uploaded`, `queued`, `coalesced`)
pub fn record_merge(outcome: &str) {
    counter!(
        "userdata_sync_merges_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a merge that discarded one side's differing content
pub fn record_merge_degraded(kind: &str) {
    counter!(
        "userdata_sync_merge_degraded_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCAL - Storage health and session state
// ═══════════════════════════════════════════════════════════════════════════

/// Record a swallowed local storage failure
pub fn record_local_error(operation: &str) {
    counter!(
        "userdata_sync_local_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set session gauges (1 = true, 0 = false)
pub fn set_session(signed_in: bool, online: bool) {
    gauge!("userdata_sync_signed_in").set(if signed_in { 1.0 } else { 0.0 });
    gauge!("userdata_sync_online").set(if online { 1.0 } else { 0.0 });
}

/// Scoped latency timer for gateway calls
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_remote_latency(self.operation, self.start.elapsed());
    }
}
