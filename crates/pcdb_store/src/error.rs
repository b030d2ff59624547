use thiserror::Error;

use crate::data::{EntityKind, Id};

/// Outcome of a failed gateway call, already tied to the kind it was made for.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(EntityKind),

    #[error("{0} already exists")]
    AlreadyExists(EntityKind),

    #[error("{0} references a missing component")]
    MissingReference(EntityKind),

    #[error("{kind} {id} is used by {} pc(s)", .pcs.len())]
    InUse {
        kind: EntityKind,
        id: Id,
        pcs: Vec<Id>,
    },

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// How a backend classifies a failed statement. Only the constraint class is
/// known here; the gateway adds the entity kind.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("foreign key constraint violated")]
    ForeignKeyViolation,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[test]
fn test_store_error_messages() {
    assert_eq!(
        StoreError::AlreadyExists(EntityKind::Cpu).to_string(),
        "cpu already exists"
    );
    assert_eq!(StoreError::NotFound(EntityKind::Pc).to_string(), "pc not found");
    let in_use = StoreError::InUse {
        kind: EntityKind::Gpu,
        id: 3,
        pcs: vec![1, 2],
    };
    assert_eq!(in_use.to_string(), "gpu 3 is used by 2 pc(s)");
}
