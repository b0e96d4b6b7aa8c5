//! # pulse-core
//!
//! Core crate for the Pulse realtime engine. Contains collaborator traits,
//! configuration schemas, typed identifiers, the wire event protocol spoken
//! between clients and the dispatcher, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Pulse crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
