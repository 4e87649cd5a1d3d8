//! Reserved attribute names used by the remote project API.
//!
//! Use these constants everywhere to avoid stringly-typed drift.

/// Event the row belongs to (longitudinal projects only).
pub const EVENT_NAME: &str = "redcap_event_name";
/// Repeating instrument the row belongs to.
pub const REPEAT_INSTRUMENT: &str = "redcap_repeat_instrument";
/// Repeat instance number of the row.
pub const REPEAT_INSTANCE: &str = "redcap_repeat_instance";

/// Suffix of the per-form completion status field.
pub const FORM_COMPLETE_SUFFIX: &str = "_complete";

/// Identity fields that are present on exported rows without being declared
/// by any rule document.
pub const IDENTITY_FIELDS: [&str; 3] = [EVENT_NAME, REPEAT_INSTRUMENT, REPEAT_INSTANCE];

/// Build the completion status field name of a form.
pub fn form_complete_field(form: &str) -> String {
    let mut key = String::with_capacity(form.len() + FORM_COMPLETE_SUFFIX.len());
    key.push_str(form);
    key.push_str(FORM_COMPLETE_SUFFIX);
    key
}
