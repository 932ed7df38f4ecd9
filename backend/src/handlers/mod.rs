//! HTTP handlers for the Stock Ledger service

pub mod health;
pub mod operation;
pub mod product;
pub mod transaction;
pub mod warehouse;

pub use health::*;
pub use operation::*;
pub use product::*;
pub use transaction::*;
pub use warehouse::*;
