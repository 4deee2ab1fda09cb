//! Shared types and models for the Farm Surveillance Platform
//!
//! This crate contains the domain rules shared between the backend, the
//! offline field client (via WASM), and other components of the system.

pub mod models;
pub mod sampling;
pub mod types;
pub mod validation;

pub use models::*;
pub use sampling::*;
pub use types::*;
pub use validation::*;
