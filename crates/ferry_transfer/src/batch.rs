//! Batch planning.

use ferry_protocol::RecordId;

/// One contiguous slice of the candidate identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position in the plan.
    pub index: usize,
    pub ids: Vec<RecordId>,
    /// False when the batch is the whole candidate set and the export needs no id filter.
    pub filter_by_ids: bool,
}

impl Batch {
    /// Identifier filter for the export request.
    pub fn export_ids(&self) -> Option<Vec<RecordId>> {
        self.filter_by_ids.then(|| self.ids.clone())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Split `ids` into `ceil(N / batch_size)` contiguous batches.
///
/// A batch size of zero or less, or one covering every id, yields a single
/// batch exported without an id filter.
pub fn plan_batches(ids: &[RecordId], batch_size: i64) -> Vec<Batch> {
    if ids.is_empty() {
        return Vec::new();
    }

    let size = usize::try_from(batch_size).unwrap_or(0);
    if size == 0 || size >= ids.len() {
        return vec![Batch {
            index: 1,
            ids: ids.to_vec(),
            filter_by_ids: false,
        }];
    }

    ids.chunks(size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            ids: chunk.to_vec(),
            filter_by_ids: true,
        })
        .collect()
}
