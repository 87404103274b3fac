#![forbid(unsafe_code)]

//! Core library for the Lift workout session engine.
//!
//! This crate provides:
//! - Domain types (plans, exercises, set records, workout logs)
//! - The live session with set logging and exercise navigation
//! - A wall-clock rest timer and its asynchronous ticker
//! - Completion summaries and their persistence (JSONL store, outbox)
//! - Configuration, logging, and CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod clock;
pub mod plan;
pub mod rest_timer;
pub mod aggregate;
pub mod session;
pub mod store;
pub mod outbox;
pub mod engine;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use clock::{Clock, ManualClock, SystemClock};
pub use plan::{load_plan, sample_plan};
pub use rest_timer::{RestStatus, RestTick, RestTimer};
pub use session::{IgnoreReason, SessionSnapshot, SetOutcome, WorkoutSession};
pub use store::{JsonlLogStore, MemoryLogStore, WorkoutLogStore};
pub use outbox::Outbox;
pub use engine::SessionEngine;
