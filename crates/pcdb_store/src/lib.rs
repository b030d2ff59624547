//! Storage core of the pc database manager: component and PC records, the
//! gateway that saves, reads and deletes them, and the checks run on save requests.

pub mod backend;
pub mod data;
pub mod database;
pub mod error;
pub mod in_mem;
pub mod sqlite;
pub mod validate;

pub use crate::{
    backend::Backend,
    data::{EntityKind, Id},
    database::{DeletePolicy, Store},
    error::{BackendError, StoreError},
    in_mem::InMemBackend,
    sqlite::SqliteBackend,
    validate::{Validate, Violations},
};
