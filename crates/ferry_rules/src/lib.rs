//! Rule-based record validation.
//!
//! # Pipeline
//!
//! 1. **Load**: one rule document per form is read from a [`RuleStore`] and
//!    compiled into a flat [`RuleSchema`] (field name -> [`FieldRules`]).
//!    Later forms overwrite earlier ones on field-name collisions.
//! 2. **Cast**: every raw string value of a record is cast to its declared
//!    type, producing an explicit [`Cast`]: `Absent`, `Parsed` or `Unparsable`.
//! 3. **Evaluate**: every rule of every field runs against the typed copy;
//!    all violations are collected, none short-circuit.
//!
//! Structural problems in rule documents are [`SchemaError`]s raised at load
//! time, never while evaluating a record.
//!
//! # Modules
//!
//! - [`types`]: declared types, typed values and casting
//! - [`rule`]: the fixed rule vocabulary and its evaluation
//! - [`schema`]: compiling rule documents into field rule sets
//! - [`loader`]: rule stores and the per-form schema loader
//! - [`engine`]: the validation engine and its outcome
//! - [`datastore`]: previous-instance lookup capability

pub mod datastore;
pub mod engine;
pub mod loader;
pub mod rule;
pub mod schema;
pub mod types;

pub use datastore::Datastore;
pub use engine::{EngineError, EngineOptions, ValidationEngine, ValidationOutcome};
pub use loader::{load_schema, DirectoryRuleStore, LoadedSchema, MemoryRuleStore, RuleStore};
pub use rule::{Conditional, Dependency, Rule};
pub use schema::{FieldRules, RuleSchema, SchemaError};
pub use types::{Cast, DeclaredType, TypedRecord, Value};
