//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - TTL Sweep: removes expired cache, limiter and token entries at a fixed interval

mod cleanup;

pub use cleanup::{spawn_sweep_task, sweep_once, SweepHandle};
