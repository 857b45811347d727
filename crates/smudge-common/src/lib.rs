//! # Smudge Common
//!
//! Shared types, wire contracts, and constants used across Smudge components.
//!
//! ## Modules
//! - `types` - Core data structures (DeviceClass, Difficulty, AttemptSnapshot, wire contracts)
//! - `error` - Common error types
//! - `constants` - Shared defaults and persistence key names

pub mod constants;
pub mod error;
pub mod types;

pub use error::SmudgeError;
pub use types::*;
