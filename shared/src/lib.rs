//! Shared types and models for the Stock Ledger service
//!
//! This crate contains the domain documents, request inputs and pure
//! validation helpers shared between the backend and any client tooling.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
