//! Transfer errors.

use ferry_protocol::ConnectorError;
use ferry_rules::{EngineError, SchemaError};
use std::fmt;
use thiserror::Error;

/// Which project a metadata export came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Destination => f.write_str("destination"),
        }
    }
}

/// Structural aspect compared between the two projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    DataDictionary,
    Arms,
    Events,
    FormEventMappings,
    RepeatingInstruments,
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aspect::DataDictionary => "data dictionary",
            Aspect::Arms => "arms definitions",
            Aspect::Events => "event definitions",
            Aspect::FormEventMappings => "form-event mappings",
            Aspect::RepeatingInstruments => "repeating instrument definitions",
        })
    }
}

/// First difference found between source and destination.
#[derive(Debug, Error)]
pub enum Incompatibility {
    #[error("could not export the {aspect} of the {side} project: {source}")]
    Unavailable {
        aspect: Aspect,
        side: Side,
        #[source]
        source: ConnectorError,
    },

    #[error("source and destination data dictionaries are empty or do not match")]
    Dictionary,

    #[error("source and destination project longitudinal settings do not match")]
    LongitudinalFlag,

    #[error("source and destination project {0} do not match")]
    Mismatch(Aspect),

    #[error("source and destination project repeated instruments settings do not match")]
    RepeatingFlag,
}

/// Run-level failures. Each one ends the run in the failed state.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid transfer settings: {0}")]
    Config(String),

    #[error("malformed rule definitions: {0}")]
    Schema(#[from] SchemaError),

    #[error("cannot build the validation engine: {0}")]
    Engine(#[from] EngineError),

    #[error("rule definitions name variables missing from the data dictionary: {}", fields.join(", "))]
    UnknownRuleFields { fields: Vec<String> },

    #[error("projects are not compatible: {0}")]
    Incompatible(#[from] Incompatibility),

    #[error("connectivity failure: {0}")]
    Connectivity(#[from] ConnectorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatibility_messages() {
        assert_eq!(
            Incompatibility::Mismatch(Aspect::Events).to_string(),
            "source and destination project event definitions do not match"
        );
        let err = Incompatibility::Unavailable {
            aspect: Aspect::Arms,
            side: Side::Destination,
            source: ConnectorError::empty("export arms"),
        };
        assert!(err.to_string().contains("arms definitions of the destination project"));
    }

    #[test]
    fn test_unknown_fields_lists_names() {
        let err = TransferError::UnknownRuleFields {
            fields: vec!["agee".to_string(), "wieght".to_string()],
        };
        assert!(err.to_string().ends_with("agee, wieght"));
    }
}
