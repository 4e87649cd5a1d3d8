//! Project compatibility check.
//!
//! Runs once, before any record moves. Aspects are compared in a fixed order
//! and the first difference ends the check:
//!
//! 1. data dictionary of the selected forms (must be non-empty and equal)
//! 2. longitudinal flag; when both are longitudinal: arms, events, form-event mappings
//! 3. repeating-instrument flag; when both repeat: repeating definitions

use crate::error::{Aspect, Incompatibility, Side};
use ferry_connector::ProjectConnector;
use ferry_protocol::{ConnectorResult, DataDictionary};
use serde_json::Value;
use tracing::{error, info};

/// Compare the two projects, returning the source dictionary when they match.
pub fn check_compatibility(
    source: &dyn ProjectConnector,
    destination: &dyn ProjectConnector,
    forms: Option<&[String]>,
) -> Result<DataDictionary, Incompatibility> {
    let src_dict = export(Aspect::DataDictionary, Side::Source, source.export_schema(forms))?;
    let dest_dict = export(
        Aspect::DataDictionary,
        Side::Destination,
        destination.export_schema(forms),
    )?;
    if src_dict.is_empty() || dest_dict.is_empty() || src_dict != dest_dict {
        return Err(Incompatibility::Dictionary);
    }

    let longitudinal = (source.is_longitudinal(), destination.is_longitudinal());
    match longitudinal {
        (true, true) => {
            same(Aspect::Arms, source.export_arms(), destination.export_arms())?;
            same(Aspect::Events, source.export_events(), destination.export_events())?;
            same(
                Aspect::FormEventMappings,
                source.export_form_event_mappings(),
                destination.export_form_event_mappings(),
            )?;
        }
        (false, false) => {}
        _ => return Err(Incompatibility::LongitudinalFlag),
    }

    match (
        source.has_repeating_instruments(),
        destination.has_repeating_instruments(),
    ) {
        (true, true) => same(
            Aspect::RepeatingInstruments,
            source.export_repeating_instruments(),
            destination.export_repeating_instruments(),
        )?,
        (false, false) => {}
        _ => return Err(Incompatibility::RepeatingFlag),
    }

    info!(
        "Source and destination projects match ({} variables compared)",
        src_dict.len()
    );
    Ok(src_dict)
}

/// Boolean form of [`check_compatibility`]; the reason is logged.
pub fn compare(
    source: &dyn ProjectConnector,
    destination: &dyn ProjectConnector,
    forms: Option<&[String]>,
) -> bool {
    match check_compatibility(source, destination, forms) {
        Ok(_) => true,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

fn export<T>(aspect: Aspect, side: Side, result: ConnectorResult<T>) -> Result<T, Incompatibility> {
    result.map_err(|source| Incompatibility::Unavailable {
        aspect,
        side,
        source,
    })
}

fn same(
    aspect: Aspect,
    source: ConnectorResult<Value>,
    destination: ConnectorResult<Value>,
) -> Result<(), Incompatibility> {
    let src = export(aspect, Side::Source, source)?;
    let dest = export(aspect, Side::Destination, destination)?;
    if src == dest {
        Ok(())
    } else {
        Err(Incompatibility::Mismatch(aspect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_test_utils::{fixtures, Call, MemoryProject};
    use serde_json::json;

    fn project() -> MemoryProject {
        MemoryProject::new("record_id").with_dictionary(fixtures::dictionary(&[
            ("record_id", "demo"),
            ("age", "demo"),
        ]))
    }

    fn longitudinal(events: &[&str]) -> MemoryProject {
        project().longitudinal(
            fixtures::arms(1),
            fixtures::events(events),
            json!([{"arm_num": 1, "unique_event_name": "baseline_arm_1", "form": "demo"}]),
        )
    }

    #[test]
    fn test_identical_classic_projects_match() {
        let dict = check_compatibility(&project(), &project(), None).unwrap();
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_empty_dictionaries_never_match() {
        let empty = MemoryProject::new("record_id");
        assert!(matches!(
            check_compatibility(&empty, &empty, None),
            Err(Incompatibility::Dictionary)
        ));
    }

    #[test]
    fn test_dictionary_difference() {
        let other = MemoryProject::new("record_id").with_dictionary(fixtures::dictionary(&[
            ("record_id", "demo"),
            ("age_years", "demo"),
        ]));
        assert!(!compare(&project(), &other, None));
    }

    #[test]
    fn test_one_sided_longitudinal() {
        assert!(matches!(
            check_compatibility(&longitudinal(&["baseline"]), &project(), None),
            Err(Incompatibility::LongitudinalFlag)
        ));
    }

    #[test]
    fn test_event_difference_stops_before_mappings() {
        let source = longitudinal(&["baseline", "followup"]);
        let destination = longitudinal(&["baseline"]);
        assert!(matches!(
            check_compatibility(&source, &destination, None),
            Err(Incompatibility::Mismatch(Aspect::Events))
        ));
        assert!(!source.calls().contains(&Call::ExportFormEventMappings));
        assert!(!source.calls().contains(&Call::ExportRepeatingInstruments));
    }

    #[test]
    fn test_repeating_definitions_compared() {
        let source = project().repeating(json!([{"form_name": "demo", "custom_form_label": ""}]));
        let destination = project().repeating(json!([]));
        assert!(matches!(
            check_compatibility(&source, &destination, None),
            Err(Incompatibility::Mismatch(Aspect::RepeatingInstruments))
        ));
        assert!(matches!(
            check_compatibility(&source, &project(), None),
            Err(Incompatibility::RepeatingFlag)
        ));
    }
}
