//! Ferry: validated record transfer between two data-capture projects.
//!
//! The binary wires configuration, logging and the remote connectors
//! together; the work itself lives in `ferry_transfer` and `ferry_rules`.

pub mod cli;
pub mod config;
