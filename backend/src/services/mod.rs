//! Business logic services for the Stock Ledger service

pub mod ledger;
pub mod operation;
pub mod product;
pub mod reference;
pub mod resolve;
pub mod transaction_log;

pub use ledger::StockLedger;
pub use operation::OperationService;
pub use product::ProductService;
pub use reference::ReferenceGenerator;
pub use resolve::Resolver;
pub use transaction_log::TransactionLog;
