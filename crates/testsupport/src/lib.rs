//! Test support utilities for the storage engine workspace.
//!
//! This crate provides shared testing infrastructure:
//! - Isolated database contexts backed by temporary directories
//! - Setup macros for pagers, record stores, and index trees
//! - Common key and record fixtures
//! - Property-based test generators for column types, keys, and operators
//! - Assertion helpers that run the structural checks of stores and trees
//!
//! # Example Usage
//!
//! ```
//! use testsupport::prelude::*;
//! use testsupport::{key, test_tree};
//! use types::SqlType;
//!
//! test_tree!(tree, types: [SqlType::Int], leaf_order: 3, internal_order: 3);
//! for i in 0..20 {
//!     tree.insert(&key![int: i], rid(i as u32, 8)).unwrap();
//! }
//! let stats = assert_tree_valid(&tree);
//! assert_eq!(stats.entries, 20);
//! ```

pub mod assertions;
pub mod context;
pub mod fixtures;
pub mod macros;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::context::*;
    pub use crate::fixtures::*;
}
