#![warn(clippy::all, missing_docs)]

//! Core domain logic for Mapty.
//!
//! This crate hosts the workout models, the session store that keeps
//! them in sync with a key-value medium, configuration handling, and the
//! positioning providers used by the terminal UI.

pub mod config;
pub mod error;
pub mod models;
pub mod position;
pub mod storage;
pub mod store;

pub use config::AppConfig;
pub use error::{InvalidInputError, StoreError};
pub use models::{Coordinates, Cycling, Running, Workout, WorkoutFields, WorkoutKind};
pub use position::Locator;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{Added, LoadReport, SessionState, WorkoutStore};
