//! # Infrastructure Adapters
//!
//! Concrete implementations of the core trait seams that do not need
//! external services. Production adapters backed by real infrastructure
//! live in the service crate.

mod memory_store;

pub use memory_store::InMemoryUserStore;
