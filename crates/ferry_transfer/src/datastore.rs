//! Project-backed previous-instance lookup.

use ferry_connector::ProjectConnector;
use ferry_protocol::{keys, Record, RecordQuery};
use ferry_rules::Datastore;
use tracing::{info, warn};

/// Looks up earlier instances of a record in a remote project.
pub struct ProjectDatastore<'a> {
    project: &'a dyn ProjectConnector,
    forms: Option<Vec<String>>,
    events: Option<Vec<String>>,
}

impl<'a> ProjectDatastore<'a> {
    pub fn new(
        project: &'a dyn ProjectConnector,
        forms: Option<Vec<String>>,
        events: Option<Vec<String>>,
    ) -> Self {
        Self {
            project,
            forms,
            events,
        }
    }
}

impl Datastore for ProjectDatastore<'_> {
    /// Latest instance whose `order_by` value sorts before the current one.
    ///
    /// First instances (no repeat instance number) have no predecessor.
    fn previous_instance(&self, order_by: &str, current: &Record) -> Option<Record> {
        current
            .get(keys::REPEAT_INSTANCE)
            .map(str::trim)
            .filter(|v| !v.is_empty())?;

        let primary_key = self.project.primary_key();
        let record_id = current.record_id(primary_key)?;
        let filter = format!("[{}] < '{}'", order_by, current.get(order_by).unwrap_or_default());
        let query = RecordQuery::all()
            .with_ids(vec![record_id.clone()])
            .with_forms(self.forms.clone())
            .with_events(self.events.clone())
            .with_filter(filter.as_str());

        let rows = match self.project.export_records(&query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Previous instance lookup failed for {}={}: {}", primary_key, record_id, e);
                return None;
            }
        };

        let latest = rows.into_iter().fold(None::<Record>, |best, row| match best {
            Some(best) if row.get(order_by) <= best.get(order_by) => Some(best),
            _ => Some(row),
        });
        if latest.is_none() {
            info!(
                "No previous records found for {}={} and {}",
                primary_key, record_id, filter
            );
        }
        latest
    }
}
