//! Exam State - the in-process state layer of an exam-management backend
//!
//! Cache-aside repositories with negative caching, an exam clock with lazily
//! loaded question sets, a sliding-window rate limiter and single-use
//! password-change and account-confirmation tokens, served over HTTP.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod exam;
pub mod layer;
pub mod limiter;
pub mod mail;
pub mod models;
pub mod repository;
pub mod store;
pub mod tasks;
pub mod tokens;

pub use api::{create_router, AppState};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{EntityKind, Result, StateError};
pub use layer::{LayerStats, StateLayer};
pub use mail::{LogMailer, Mailer};
pub use tasks::{spawn_sweep_task, SweepHandle};
