// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running task actions against the
//! warehouse and reporting back to the orchestration runtime via
//! `RuntimeEvent`s.
//!
//! - [`actions`] performs one attempt of an action (`ActionRunner`).
//! - [`executor`] wraps attempts with timeouts, retries and cancellation.
//! - [`retry`] holds the retry policy and backoff calculation.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod actions;
pub mod backend;
pub mod executor;
pub mod retry;

pub use actions::{ActionRunner, WarehouseActionRunner};
pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor::Executor;
pub use retry::RetryPolicy;
