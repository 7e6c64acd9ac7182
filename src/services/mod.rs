// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - remote access and collection logic.

pub mod clock;
pub mod collector;
pub mod executor;
pub mod iracing;
pub mod legacy;
pub mod metrics;
pub mod policy;
pub mod resolver;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::Collector;
pub use executor::{RateLimitPolicy, RequestExecutor};
pub use iracing::IracingClient;
pub use metrics::{Counter, CounterRegistry, MetricsSink};
pub use resolver::Resolver;
pub use session::SessionManager;
