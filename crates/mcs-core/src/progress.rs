//! Progress event streaming (spec.md §4.3, §4.8)
//!
//! Structured events for the two long-running operations that benefit from
//! incremental feedback: repository cloning and lifecycle transitions. Kept
//! deliberately thin — rendering these events into a terminal UI is out of
//! scope here and lives in the `mcs` CLI crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Monotonic event ID, used to order events emitted across threads.
pub static EVENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn next_event_id() -> u64 {
    EVENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub fn unix_now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// A single tick of clone progress, reported from [`crate::repo`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloneProgress {
    pub phase: String,
    pub current: u64,
    pub total: u64,
}

/// The named phases of a lifecycle operation (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    PhaseBegin { id: u64, timestamp_ms: u64, codespace: String, phase: String },
    PhaseEnd { id: u64, timestamp_ms: u64, codespace: String, phase: String, success: bool },
    HealthcheckWaiting { id: u64, timestamp_ms: u64, codespace: String, attempt: u32, max_attempts: u32 },
    HealthcheckReady { id: u64, timestamp_ms: u64, codespace: String, attempt: u32 },
}

impl LifecycleEvent {
    pub fn phase_begin(codespace: impl Into<String>, phase: impl Into<String>) -> Self {
        Self::PhaseBegin {
            id: next_event_id(),
            timestamp_ms: unix_now_ms(),
            codespace: codespace.into(),
            phase: phase.into(),
        }
    }

    pub fn phase_end(codespace: impl Into<String>, phase: impl Into<String>, success: bool) -> Self {
        Self::PhaseEnd {
            id: next_event_id(),
            timestamp_ms: unix_now_ms(),
            codespace: codespace.into(),
            phase: phase.into(),
            success,
        }
    }

    pub fn healthcheck_waiting(codespace: impl Into<String>, attempt: u32, max_attempts: u32) -> Self {
        Self::HealthcheckWaiting {
            id: next_event_id(),
            timestamp_ms: unix_now_ms(),
            codespace: codespace.into(),
            attempt,
            max_attempts,
        }
    }

    pub fn healthcheck_ready(codespace: impl Into<String>, attempt: u32) -> Self {
        Self::HealthcheckReady {
            id: next_event_id(),
            timestamp_ms: unix_now_ms(),
            codespace: codespace.into(),
            attempt,
        }
    }
}

/// A destination for progress events of type `T`. Implementations must be
/// cheap to call from a hot loop (e.g. per-object clone progress).
pub trait ProgressSink<T>: Send + Sync {
    fn emit(&self, event: T);
}

/// A sink that discards every event, used in tests and headless contexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<T> ProgressSink<T> for NullSink {
    fn emit(&self, _event: T) {}
}

/// Collects every event it receives, used by tests to assert on ordering.
#[derive(Debug, Default)]
pub struct CollectingSink<T> {
    events: std::sync::Mutex<Vec<T>>,
}

impl<T: Clone> CollectingSink<T> {
    pub fn new() -> Self {
        Self { events: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn events(&self) -> Vec<T> {
        self.events.lock().expect("collecting sink lock poisoned").clone()
    }
}

impl<T: Clone + Send + Sync> ProgressSink<T> for CollectingSink<T> {
    fn emit(&self, event: T) {
        self.events.lock().expect("collecting sink lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_monotonic() {
        let a = next_event_id();
        let b = next_event_id();
        assert!(b > a);
    }

    #[test]
    fn collecting_sink_preserves_order() {
        let sink: CollectingSink<u32> = CollectingSink::new();
        sink.emit(1);
        sink.emit(2);
        sink.emit(3);
        assert_eq!(sink.events(), vec![1, 2, 3]);
    }
}
