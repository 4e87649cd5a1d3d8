//! Validated, batched record transfer between two projects.
//!
//! # Run
//!
//! 1. [`check_compatibility`] compares the two projects once, up front.
//! 2. Rules for the forms in scope are loaded and the validation engine built.
//! 3. Candidate record ids are exported once and [`plan_batches`] splits them.
//! 4. Each batch is exported, validated, imported, optionally deleted from the
//!    source, and its rejected rows are written back with an error report.
//!
//! Deletion from the source happens only after the destination confirmed the
//! import, and never when only a subset of the project was validated.

pub mod batch;
pub mod compat;
pub mod datastore;
pub mod error;
pub mod report;
pub mod tally;
pub mod transfer;

pub use batch::{plan_batches, Batch};
pub use compat::{check_compatibility, compare};
pub use datastore::ProjectDatastore;
pub use error::{Aspect, Incompatibility, Side, TransferError};
pub use report::{ErrorReporter, RejectedRecord, ReportFile};
pub use tally::{TransferReport, TransferTally};
pub use transfer::{CheckedProjects, Transfer, TransferSettings, TransferState};
