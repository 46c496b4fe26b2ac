//! # Workers
//! src/workers/mod.rs
//!
//! Pool de threads donde corren los handlers de conexión.

pub mod pool;

pub use pool::{PoolError, WorkerPool};
