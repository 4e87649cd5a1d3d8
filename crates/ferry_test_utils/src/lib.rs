//! Ferry Test Utilities
//!
//! In-memory stand-ins for remote projects.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ferry_test_utils::{fixtures, Call, MemoryProject};
//!
//! let source = MemoryProject::new("record_id")
//!     .with_dictionary(fixtures::dictionary(&[("record_id", "demo"), ("age", "demo")]))
//!     .with_records(fixtures::numbered_records(10, |i, r| r.with("age", i.to_string())));
//! source.fail_import_call(1);
//! // ... run a transfer ...
//! assert!(source.calls().iter().all(|c| !matches!(c, Call::DeleteRecords { .. })));
//! ```

pub mod fixtures;
pub mod memory;

pub use memory::{Call, MemoryProject};
