//! Canonical default values shared by the binary and the transfer crate.

pub const DEFAULT_BATCH_SIZE: i64 = 100;
pub const DEFAULT_RULES_DIR: &str = "./rules";
pub const DEFAULT_ERRORS_FIELD: &str = "val_errs";
pub const DEFAULT_TIMESTAMP_FIELD: &str = "timestamp";
pub const REPORT_TIMESTAMP_FORMAT: &str = "%m-%d-%y %H:%M:%S";
pub const REPORT_FILE_PREFIX: &str = "validation-errors-";
