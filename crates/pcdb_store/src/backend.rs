//! The seam between the gateway and whatever actually holds the rows.
//!
//! A backend only has to store rows and say *which* constraint a failed write ran
//! into. Turning that into a per-kind outcome is left to [`crate::database::Store`],
//! so the mapping is the same for SQLite and for [`crate::in_mem::InMemBackend`].

use crate::{
    data::{EntityKind, Id, NewRecord, Record},
    error::BackendError,
};

pub trait Backend {
    /// Inserts a row and returns the id assigned to it.
    fn insert(&mut self, record: &NewRecord) -> Result<Id, BackendError>;

    fn fetch(&mut self, kind: EntityKind, id: Id) -> Result<Option<Record>, BackendError>;

    /// Removes the row if present and returns how many rows went away.
    fn delete(&mut self, kind: EntityKind, id: Id) -> Result<usize, BackendError>;

    /// Ids of the PCs built from the component `kind`/`id`.
    fn dependents(&mut self, kind: EntityKind, id: Id) -> Result<Vec<Id>, BackendError>;

    /// Removes the component together with every PC built from it, all or nothing.
    fn delete_with_dependents(&mut self, kind: EntityKind, id: Id)
        -> Result<usize, BackendError>;
}
