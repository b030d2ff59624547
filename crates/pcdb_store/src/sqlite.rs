use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use rusqlite::{
    ffi,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, ErrorCode, OptionalExtension,
};
use tracing::debug;

use crate::{
    backend::Backend,
    data::{
        Cpu, EntityKind, Gpu, Id, Memory, MemoryType, NewCpu, NewGpu, NewMemory, NewPc, NewRam,
        NewRecord, Pc, Ram, Record, StorageType,
    },
    error::BackendError,
};

refinery::embed_migrations!("migration");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn run_migrations(conn: &mut Connection) -> Result<()> {
    migrations::runner()
        .run(conn)
        .with_context(|| "failed to create tables")?;
    Ok(())
}

#[test]
fn test_in_mem_migration() {
    let mut conn = Connection::open_in_memory().unwrap();
    run_migrations(&mut conn).unwrap();
}

/// Sorts a failed statement into the classes the gateway tells apart.
pub(crate) fn classify(err: rusqlite::Error) -> BackendError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE => return BackendError::UniqueViolation,
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return BackendError::ForeignKeyViolation,
                _ => {}
            }
        }
    }
    BackendError::Other(err.into())
}

impl ToSql for MemoryType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for MemoryType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl ToSql for StorageType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for StorageType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

pub(crate) fn insert_ram(conn: &Connection, ram: &NewRam) -> rusqlite::Result<Id> {
    conn.query_row(
        "INSERT INTO ram (name, memory_type, capacity) VALUES (?, ?, ?) RETURNING id",
        (&ram.name, ram.memory_type, ram.capacity),
        |row| row.get(0),
    )
}

pub(crate) fn insert_cpu(conn: &Connection, cpu: &NewCpu) -> rusqlite::Result<Id> {
    conn.query_row(
        "INSERT INTO cpu (name, cores, threads, frequency) VALUES (?, ?, ?, ?) RETURNING id",
        (&cpu.name, cpu.cores, cpu.threads, cpu.frequency),
        |row| row.get(0),
    )
}

pub(crate) fn insert_gpu(conn: &Connection, gpu: &NewGpu) -> rusqlite::Result<Id> {
    conn.query_row(
        "INSERT INTO gpu (name, manufacturer, memory, frequency) VALUES (?, ?, ?, ?) RETURNING id",
        (&gpu.name, &gpu.manufacturer, gpu.memory, gpu.frequency),
        |row| row.get(0),
    )
}

pub(crate) fn insert_memory(conn: &Connection, memory: &NewMemory) -> rusqlite::Result<Id> {
    conn.query_row(
        "INSERT INTO memory (name, capacity, storage_type) VALUES (?, ?, ?) RETURNING id",
        (&memory.name, memory.capacity, memory.storage_type),
        |row| row.get(0),
    )
}

pub(crate) fn insert_pc(conn: &Connection, pc: &NewPc) -> rusqlite::Result<Id> {
    conn.query_row(
        "INSERT INTO pc (name, ram_id, cpu_id, gpu_id, memory_id) VALUES (?, ?, ?, ?, ?) RETURNING id",
        (&pc.name, pc.ram_id, pc.cpu_id, pc.gpu_id, pc.memory_id),
        |row| row.get(0),
    )
}

pub(crate) fn query_ram_by_id(conn: &Connection, id: Id) -> rusqlite::Result<Option<Ram>> {
    conn.query_row(
        "SELECT id, name, memory_type, capacity FROM ram WHERE id = ?",
        [id],
        |row| {
            Ok(Ram {
                id: row.get(0)?,
                name: row.get(1)?,
                memory_type: row.get(2)?,
                capacity: row.get(3)?,
            })
        },
    )
    .optional()
}

pub(crate) fn query_cpu_by_id(conn: &Connection, id: Id) -> rusqlite::Result<Option<Cpu>> {
    conn.query_row(
        "SELECT id, name, cores, threads, frequency FROM cpu WHERE id = ?",
        [id],
        |row| {
            Ok(Cpu {
                id: row.get(0)?,
                name: row.get(1)?,
                cores: row.get(2)?,
                threads: row.get(3)?,
                frequency: row.get(4)?,
            })
        },
    )
    .optional()
}

pub(crate) fn query_gpu_by_id(conn: &Connection, id: Id) -> rusqlite::Result<Option<Gpu>> {
    conn.query_row(
        "SELECT id, name, manufacturer, memory, frequency FROM gpu WHERE id = ?",
        [id],
        |row| {
            Ok(Gpu {
                id: row.get(0)?,
                name: row.get(1)?,
                manufacturer: row.get(2)?,
                memory: row.get(3)?,
                frequency: row.get(4)?,
            })
        },
    )
    .optional()
}

pub(crate) fn query_memory_by_id(conn: &Connection, id: Id) -> rusqlite::Result<Option<Memory>> {
    conn.query_row(
        "SELECT id, name, capacity, storage_type FROM memory WHERE id = ?",
        [id],
        |row| {
            Ok(Memory {
                id: row.get(0)?,
                name: row.get(1)?,
                capacity: row.get(2)?,
                storage_type: row.get(3)?,
            })
        },
    )
    .optional()
}

pub(crate) fn query_pc_by_id(conn: &Connection, id: Id) -> rusqlite::Result<Option<Pc>> {
    conn.query_row(
        "SELECT id, name, ram_id, cpu_id, gpu_id, memory_id FROM pc WHERE id = ?",
        [id],
        |row| {
            Ok(Pc {
                id: row.get(0)?,
                name: row.get(1)?,
                ram_id: row.get(2)?,
                cpu_id: row.get(3)?,
                gpu_id: row.get(4)?,
                memory_id: row.get(5)?,
            })
        },
    )
    .optional()
}

pub(crate) fn delete_by_id(conn: &Connection, kind: EntityKind, id: Id) -> rusqlite::Result<usize> {
    conn.execute(&format!("DELETE FROM {} WHERE id = ?", kind.table()), [id])
}

pub(crate) fn query_pc_ids_by_component(
    conn: &Connection,
    kind: EntityKind,
    id: Id,
) -> rusqlite::Result<Vec<Id>> {
    let Some(column) = kind.pc_column() else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(&format!("SELECT id FROM pc WHERE {column} = ? ORDER BY id"))?;
    let ids = stmt.query_map([id], |row| row.get::<_, Id>(0))?;
    ids.collect()
}

pub(crate) fn delete_pcs_by_component(
    conn: &Connection,
    kind: EntityKind,
    id: Id,
) -> rusqlite::Result<usize> {
    match kind.pc_column() {
        Some(column) => conn.execute(&format!("DELETE FROM pc WHERE {column} = ?"), [id]),
        None => Ok(0),
    }
}

/// [`Backend`] over a single SQLite connection.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path` and makes sure every table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().with_context(|| "failed to open database")?;
        Self::prepare(conn)
    }

    fn prepare(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)
            .with_context(|| "failed to enable foreign keys")?;
        run_migrations(&mut conn)?;
        debug!("sqlite schema is up to date");
        Ok(Self { conn })
    }
}

impl Backend for SqliteBackend {
    fn insert(&mut self, record: &NewRecord) -> Result<Id, BackendError> {
        match record {
            NewRecord::Ram(ram) => insert_ram(&self.conn, ram),
            NewRecord::Cpu(cpu) => insert_cpu(&self.conn, cpu),
            NewRecord::Gpu(gpu) => insert_gpu(&self.conn, gpu),
            NewRecord::Memory(memory) => insert_memory(&self.conn, memory),
            NewRecord::Pc(pc) => insert_pc(&self.conn, pc),
        }
        .map_err(classify)
    }

    fn fetch(&mut self, kind: EntityKind, id: Id) -> Result<Option<Record>, BackendError> {
        let conn = &self.conn;
        let record = match kind {
            EntityKind::Ram => query_ram_by_id(conn, id).map(|r| r.map(Record::Ram)),
            EntityKind::Cpu => query_cpu_by_id(conn, id).map(|r| r.map(Record::Cpu)),
            EntityKind::Gpu => query_gpu_by_id(conn, id).map(|r| r.map(Record::Gpu)),
            EntityKind::Memory => query_memory_by_id(conn, id).map(|r| r.map(Record::Memory)),
            EntityKind::Pc => query_pc_by_id(conn, id).map(|r| r.map(Record::Pc)),
        };
        record.map_err(classify)
    }

    fn delete(&mut self, kind: EntityKind, id: Id) -> Result<usize, BackendError> {
        delete_by_id(&self.conn, kind, id).map_err(classify)
    }

    fn dependents(&mut self, kind: EntityKind, id: Id) -> Result<Vec<Id>, BackendError> {
        query_pc_ids_by_component(&self.conn, kind, id).map_err(classify)
    }

    fn delete_with_dependents(
        &mut self,
        kind: EntityKind,
        id: Id,
    ) -> Result<usize, BackendError> {
        let tx = self.conn.transaction().map_err(classify)?;
        let pcs = delete_pcs_by_component(&tx, kind, id).map_err(classify)?;
        let removed = delete_by_id(&tx, kind, id).map_err(classify)?;
        tx.commit().map_err(classify)?;
        debug!(%kind, id, pcs, "deleted component with dependents");
        Ok(removed + pcs)
    }
}

#[cfg(test)]
fn sample_components(backend: &mut SqliteBackend) -> NewPc {
    let ram_id = backend
        .insert(&NewRecord::Ram(NewRam {
            name: "Kingston FURY Beast".to_string(),
            memory_type: MemoryType::Ddr4,
            capacity: 16,
        }))
        .unwrap();
    let cpu_id = backend
        .insert(&NewRecord::Cpu(NewCpu {
            name: "Intel Core i7-9700K".to_string(),
            cores: 8,
            threads: 8,
            frequency: 3600,
        }))
        .unwrap();
    let gpu_id = backend
        .insert(&NewRecord::Gpu(NewGpu {
            name: "GeForce RTX 3070".to_string(),
            manufacturer: "NVIDIA".to_string(),
            memory: 8,
            frequency: 1500,
        }))
        .unwrap();
    let memory_id = backend
        .insert(&NewRecord::Memory(NewMemory {
            name: "Samsung 970 EVO".to_string(),
            capacity: 500,
            storage_type: StorageType::Ssd,
        }))
        .unwrap();
    NewPc {
        name: Some("Some PC".to_string()),
        ram_id,
        cpu_id,
        gpu_id,
        memory_id,
    }
}

#[test]
fn test_migration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.db");
    let mut backend = SqliteBackend::open(&path).unwrap();
    let pc = sample_components(&mut backend);
    drop(backend);

    let mut reopened = SqliteBackend::open(&path).unwrap();
    let ram = reopened.fetch(EntityKind::Ram, pc.ram_id).unwrap();
    assert!(matches!(ram, Some(Record::Ram(ram)) if ram.name == "Kingston FURY Beast"));
}

#[test]
fn test_duplicate_name_is_unique_violation() {
    let mut backend = SqliteBackend::open_in_memory().unwrap();
    let cpu = NewRecord::Cpu(NewCpu {
        name: "Ryzen 5 5600X".to_string(),
        cores: 6,
        threads: 12,
        frequency: 3700,
    });
    backend.insert(&cpu).unwrap();
    let err = backend.insert(&cpu).unwrap_err();
    assert!(matches!(err, BackendError::UniqueViolation));
    let count: i64 = backend
        .conn
        .query_row(
            "SELECT COUNT(*) FROM cpu WHERE name = ?",
            ["Ryzen 5 5600X"],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_unnamed_pcs_do_not_collide() {
    let mut backend = SqliteBackend::open_in_memory().unwrap();
    let pc = NewPc {
        name: None,
        ..sample_components(&mut backend)
    };
    let first = backend.insert(&NewRecord::Pc(pc.clone())).unwrap();
    let second = backend.insert(&NewRecord::Pc(pc)).unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_missing_component_is_foreign_key_violation() {
    let mut backend = SqliteBackend::open_in_memory().unwrap();
    let pc = NewPc {
        gpu_id: 42,
        ..sample_components(&mut backend)
    };
    let err = backend.insert(&NewRecord::Pc(pc)).unwrap_err();
    assert!(matches!(err, BackendError::ForeignKeyViolation));
    let count: i64 = backend
        .conn
        .query_row("SELECT COUNT(*) FROM pc", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_ids_are_not_reused() {
    let mut backend = SqliteBackend::open_in_memory().unwrap();
    let ram = |name: &str| {
        NewRecord::Ram(NewRam {
            name: name.to_string(),
            memory_type: MemoryType::Ddr5,
            capacity: 32,
        })
    };
    let first = backend.insert(&ram("a")).unwrap();
    assert_eq!(backend.delete(EntityKind::Ram, first).unwrap(), 1);
    let second = backend.insert(&ram("b")).unwrap();
    assert!(second > first);
}

#[test]
fn test_delete_with_dependents() {
    let mut backend = SqliteBackend::open_in_memory().unwrap();
    let pc = sample_components(&mut backend);
    let pc_id = backend.insert(&NewRecord::Pc(pc.clone())).unwrap();

    assert_eq!(backend.dependents(EntityKind::Cpu, pc.cpu_id).unwrap(), vec![pc_id]);
    let err = backend.delete(EntityKind::Cpu, pc.cpu_id).unwrap_err();
    assert!(matches!(err, BackendError::ForeignKeyViolation));

    assert_eq!(backend.delete_with_dependents(EntityKind::Cpu, pc.cpu_id).unwrap(), 2);
    assert!(backend.fetch(EntityKind::Pc, pc_id).unwrap().is_none());
    assert!(backend.fetch(EntityKind::Ram, pc.ram_id).unwrap().is_some());
}
