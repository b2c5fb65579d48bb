//! Downstream collaborator seams
//!
//! The harvester creates and advances workflow records but does not own the
//! workflow system. Everything it needs from it goes through [`WorkflowStore`];
//! bibliographic lookups go through [`CatalogLookup`].

pub mod store;

pub use store::{CatalogError, CatalogLookup, StoreError, WorkflowStore};
