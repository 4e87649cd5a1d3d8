//! Previous-instance lookup.

use ferry_protocol::Record;

/// Capability to fetch the chronologically previous instance of a record.
///
/// Implemented once per backing store. `None` means there is no previous
/// instance or it could not be fetched.
pub trait Datastore {
    fn previous_instance(&self, order_by: &str, current: &Record) -> Option<Record>;
}

impl<T: Datastore + ?Sized> Datastore for &T {
    fn previous_instance(&self, order_by: &str, current: &Record) -> Option<Record> {
        (**self).previous_instance(order_by, current)
    }
}
