// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Observability counters.
//!
//! Each error path bumps its own counter so transient network noise can be
//! told apart from structural breakage.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Successful outbound requests
    RequestTotal,
    /// Failed outbound requests (transport, non-2xx, decode)
    RequestError,
    /// Failed login or token refresh
    LoginError,
    /// Collector-level failures (cycle or race week aborted)
    CollectorError,
    /// Race weeks the service answered with an empty result set
    EmptyResultSet,
    /// Single records skipped after a decode or persistence error
    RecordSkipped,
    TracksSeen,
    CarsSeen,
}

/// Destination for counter increments.
pub trait MetricsSink: Send + Sync {
    fn incr_by(&self, counter: Counter, value: u64);

    fn incr(&self, counter: Counter) {
        self.incr_by(counter, 1);
    }

    /// Overwrite a gauge-like counter with an absolute value.
    fn set(&self, counter: Counter, value: u64);
}

/// In-process atomic counters.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    request_total: AtomicU64,
    request_error: AtomicU64,
    login_error: AtomicU64,
    collector_error: AtomicU64,
    empty_result_set: AtomicU64,
    record_skipped: AtomicU64,
    tracks_seen: AtomicU64,
    cars_seen: AtomicU64,
}

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub request_total: u64,
    pub request_error: u64,
    pub login_error: u64,
    pub collector_error: u64,
    pub empty_result_set: u64,
    pub record_skipped: u64,
    pub tracks_seen: u64,
    pub cars_seen: u64,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::RequestTotal => &self.request_total,
            Counter::RequestError => &self.request_error,
            Counter::LoginError => &self.login_error,
            Counter::CollectorError => &self.collector_error,
            Counter::EmptyResultSet => &self.empty_result_set,
            Counter::RecordSkipped => &self.record_skipped,
            Counter::TracksSeen => &self.tracks_seen,
            Counter::CarsSeen => &self.cars_seen,
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.slot(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            request_total: self.get(Counter::RequestTotal),
            request_error: self.get(Counter::RequestError),
            login_error: self.get(Counter::LoginError),
            collector_error: self.get(Counter::CollectorError),
            empty_result_set: self.get(Counter::EmptyResultSet),
            record_skipped: self.get(Counter::RecordSkipped),
            tracks_seen: self.get(Counter::TracksSeen),
            cars_seen: self.get(Counter::CarsSeen),
        }
    }
}

impl MetricsSink for CounterRegistry {
    fn incr_by(&self, counter: Counter, value: u64) {
        self.slot(counter).fetch_add(value, Ordering::Relaxed);
    }

    fn set(&self, counter: Counter, value: u64) {
        self.slot(counter).store(value, Ordering::Relaxed);
    }
}
