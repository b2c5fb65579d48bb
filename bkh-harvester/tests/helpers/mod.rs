//! Test Helper Utilities
//!
//! Shared utilities for harvester integration tests

#![allow(dead_code)]

pub mod fake_catalog;
pub mod fake_store;
pub mod fixtures;
pub mod harness;

pub use fake_catalog::FakeCatalog;
pub use fake_store::{FakeStore, StoredRecord};
pub use fixtures::{mets_with_control_number, mets_with_holdings, write_package};
pub use harness::Harness;
