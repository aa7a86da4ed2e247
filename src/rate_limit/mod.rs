//! Rate Limiting and Admission Control Module
//!
//! This module decides, per event and per key, whether to admit or reject
//! work under a configurable quota policy of `limit` events per `window`.
//!
//! # Features
//!
//! - Fixed-window (default), sliding-window and token-bucket accounting behind
//!   one [`Decision`] contract
//! - Caller-supplied timestamps for deterministic decisions, plus an injected
//!   [`Clock`] for the convenience path
//! - Sharded per-key counters so unrelated keys never share a lock
//! - Owned background sweep that evicts idle keys
//! - Capacity alarm when the tracked key set outgrows eviction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Admission Controller                       │
//! │        allow(key, now) -> Admitted | Rejected{retry_after}   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │  Shard 0    │  │  Shard 1    │  │  Shard N    │         │
//! │  │ key→counter │  │ key→counter │  │ key→counter │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │         Eviction Sweeper (owned tokio task)          │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod quota;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Algorithm, ControllerOptions, QuotaPolicy};
pub use controller::{AdmissionController, ControllerStats};
pub use dashboard::DashboardData;
pub use error::RateLimitError;
pub use quota::{Decision, KeyUsage};
pub use store::CounterStore;
pub use sweeper::EvictionSweeper;
