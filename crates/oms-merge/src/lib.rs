//! 3-way semantic merge engine (C6).
//!
//! Diffs an ontology snapshot on a source branch against its target,
//! classifies every divergence into a typed [`conflict::ConflictKind`],
//! auto-resolves what §4.6 allows, and runs pluggable semantic
//! validators before a merge is considered clean.

pub mod conflict;
pub mod diff;
pub mod engine;
pub mod error;
pub mod lcs;
pub mod model;
pub mod validators;

pub use conflict::{ConflictKind, MergeConflict};
pub use engine::{MergeEngine, MergeOutcome};
pub use error::{MergeError, Result};
pub use model::{ObjectTypeDoc, Property, Snapshot};
pub use validators::{SemanticValidator, ValidationError, ValidatorRegistry};
