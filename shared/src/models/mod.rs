//! Domain models for the Stock Ledger service

mod directory;
mod operation;
mod product;
mod transaction;

pub use directory::*;
pub use operation::*;
pub use product::*;
pub use transaction::*;
