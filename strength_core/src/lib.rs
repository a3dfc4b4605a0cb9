#![forbid(unsafe_code)]

//! Core domain model and business logic for lift, a strength training engine.
//!
//! This crate provides:
//! - Domain types (lifts, maxes, programs, sessions, progressions)
//! - Load strategies and set schemes behind typed configuration blobs
//! - Day resolution and the program navigator
//! - Workout sessions and the progression engine
//! - A transactional store (in-memory or file-backed)
//! - Program bundle import, dashboard queries and CSV export

pub mod types;
pub mod error;
pub mod rounding;
pub mod blob;
pub mod convert;
pub mod config;
pub mod logging;
pub mod database;
pub mod store;
pub mod load_strategy;
pub mod set_scheme;
pub mod maxes;
pub mod prescription;
pub mod navigator;
pub mod session;
pub mod progression;
pub mod engine;
pub mod bundle;
pub mod dashboard;
pub mod export;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use store::{FileStore, MemoryStore, Store};
pub use database::Database;
pub use bundle::{import_bundle, ProgramBundle};
pub use engine::{AppliedProgression, BindingOutcome};
pub use prescription::{resolve_today, ResolvedDay};
pub use session::{abandon_session, complete_session, log_set, start_session, SessionSummary};
