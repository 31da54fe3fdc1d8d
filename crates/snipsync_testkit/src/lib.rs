//! # snipsync testkit
//!
//! Test utilities for snipsync.
//!
//! This crate provides:
//! - Item, fingerprint and ledger fixtures
//! - A temporary workspace and an in-memory sync harness
//! - A fault-injecting item set wrapper
//! - Property-based scenario generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snipsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_harness() {
//!     let harness = SyncHarness::new();
//!     harness.local.insert("a", item("fn a() {}", 0));
//!     let run = harness.run().await;
//!     assert!(run.report().is_clean());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
