//! MailCRM Storage - Database access for the dispatch core
//!
//! Every repository is a trait with a PostgreSQL implementation and an
//! in-memory implementation sharing the same semantics. [`Store`] bundles one
//! of each so services can be wired against either backend.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
pub use store::Store;
