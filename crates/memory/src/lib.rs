//! Storage-side collaborators for QueryLens.
//!
//! - [`MokaCache`]: bounded TTL cache for profiles and extraction results
//! - [`InMemoryFeedbackRepository`]: rolling validation scores per key
//! - [`InMemoryCatalog`]: business catalog serving metadata lookups and
//!   schema linking

pub mod cache;
pub mod catalog;
pub mod feedback;

pub use cache::MokaCache;
pub use catalog::{Catalog, CatalogColumn, CatalogTable, InMemoryCatalog};
pub use feedback::InMemoryFeedbackRepository;
