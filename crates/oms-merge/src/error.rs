use thiserror::Error;

pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Debug, Error)]
pub enum MergeError {
    /// §7 `MergeConflicts(list)`.
    #[error("merge produced {0} unresolved conflict(s)")]
    Conflicts(usize),

    /// §7 `SemanticViolation(errors)`.
    #[error("semantic validation failed: {0} error(s)")]
    SemanticViolation(usize),
}

impl From<MergeError> for oms_types::OmsError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::Conflicts(n) => oms_types::OmsError::MergeConflicts(n),
            MergeError::SemanticViolation(n) => oms_types::OmsError::SemanticViolation(n),
        }
    }
}
