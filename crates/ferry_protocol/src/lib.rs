//! Shared data model for moving records between two data-capture projects.
//!
//! Everything that crosses a crate boundary lives here: the raw [`Record`]
//! exported from a project, its identity, the query used to export it, the
//! project metadata consulted by the compatibility check, and the uniform
//! failure type returned by every remote call.
//!
//! # Remote call results
//!
//! Every remote operation returns [`ConnectorResult`]. A count of zero is a
//! legitimate `Ok(0)`; a failed round trip is always `Err(ConnectorError)`.

pub mod defaults;
pub mod dictionary;
pub mod error;
pub mod keys;
pub mod record;
pub mod types;

pub use dictionary::{DataDictionary, DictionaryField};
pub use error::{ConnectorError, ConnectorResult};
pub use record::{Record, RecordId, RecordIdentity};
pub use types::{FormInfo, ProjectInfo, RecordQuery};
