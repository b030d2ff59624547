use std::collections::{BTreeMap, HashMap};

use crate::{
    backend::Backend,
    data::{EntityKind, Id, NewRecord, Record},
    error::BackendError,
};

#[derive(Debug, Default)]
struct Table {
    last_id: Id,
    rows: BTreeMap<Id, Record>,
}

/// Backend kept entirely in process memory. Enforces the same name uniqueness,
/// referential integrity and id allocation as the SQLite tables.
#[derive(Debug, Default)]
pub struct InMemBackend {
    tables: HashMap<EntityKind, Table>,
}

impl InMemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&mut self, kind: EntityKind) -> &mut Table {
        self.tables.entry(kind).or_default()
    }

    fn exists(&mut self, kind: EntityKind, id: Id) -> bool {
        self.table(kind).rows.contains_key(&id)
    }

    fn name_taken(&mut self, kind: EntityKind, name: &str) -> bool {
        self.table(kind)
            .rows
            .values()
            .any(|row| record_name(row) == Some(name))
    }
}

fn record_name(record: &Record) -> Option<&str> {
    match record {
        Record::Ram(ram) => Some(&ram.name),
        Record::Cpu(cpu) => Some(&cpu.name),
        Record::Gpu(gpu) => Some(&gpu.name),
        Record::Memory(memory) => Some(&memory.name),
        Record::Pc(pc) => pc.name.as_deref(),
    }
}

impl Backend for InMemBackend {
    fn insert(&mut self, record: &NewRecord) -> Result<Id, BackendError> {
        let kind = record.kind();
        if let Some(name) = record.name() {
            if self.name_taken(kind, name) {
                return Err(BackendError::UniqueViolation);
            }
        }
        if let NewRecord::Pc(pc) = record {
            for (component, id) in pc.references() {
                if !self.exists(component, id) {
                    return Err(BackendError::ForeignKeyViolation);
                }
            }
        }
        let table = self.table(kind);
        table.last_id += 1;
        let id = table.last_id;
        table.rows.insert(id, record.clone().with_id(id));
        Ok(id)
    }

    fn fetch(&mut self, kind: EntityKind, id: Id) -> Result<Option<Record>, BackendError> {
        Ok(self.table(kind).rows.get(&id).cloned())
    }

    fn delete(&mut self, kind: EntityKind, id: Id) -> Result<usize, BackendError> {
        if !self.dependents(kind, id)?.is_empty() {
            return Err(BackendError::ForeignKeyViolation);
        }
        Ok(self.table(kind).rows.remove(&id).map_or(0, |_| 1))
    }

    fn dependents(&mut self, kind: EntityKind, id: Id) -> Result<Vec<Id>, BackendError> {
        let pcs = self
            .table(EntityKind::Pc)
            .rows
            .values()
            .filter_map(|row| match row {
                Record::Pc(pc) if pc.reference(kind) == Some(id) => Some(pc.id),
                _ => None,
            })
            .collect();
        Ok(pcs)
    }

    fn delete_with_dependents(
        &mut self,
        kind: EntityKind,
        id: Id,
    ) -> Result<usize, BackendError> {
        let pcs = self.dependents(kind, id)?;
        let pc_table = self.table(EntityKind::Pc);
        for pc in &pcs {
            pc_table.rows.remove(pc);
        }
        let removed = self.table(kind).rows.remove(&id).map_or(0, |_| 1);
        Ok(removed + pcs.len())
    }
}

#[cfg(test)]
use crate::data::{MemoryType, NewPc, NewRam};

#[test]
fn test_in_mem_enforces_constraints() {
    let mut backend = InMemBackend::new();
    let ram = NewRecord::Ram(NewRam {
        name: "Corsair Vengeance".to_string(),
        memory_type: MemoryType::Ddr4,
        capacity: 16,
    });
    assert_eq!(backend.insert(&ram).unwrap(), 1);
    assert!(matches!(
        backend.insert(&ram),
        Err(BackendError::UniqueViolation)
    ));
    let other = NewRecord::Ram(NewRam {
        name: "Corsair Dominator".to_string(),
        memory_type: MemoryType::Ddr5,
        capacity: 32,
    });
    assert_eq!(backend.insert(&other).unwrap(), 2);
    assert_eq!(backend.table(EntityKind::Ram).rows.len(), 2);

    let pc = NewRecord::Pc(NewPc {
        name: None,
        ram_id: 1,
        cpu_id: 1,
        gpu_id: 1,
        memory_id: 1,
    });
    assert!(matches!(
        backend.insert(&pc),
        Err(BackendError::ForeignKeyViolation)
    ));
}

#[test]
fn test_in_mem_ids_are_not_reused() {
    let mut backend = InMemBackend::new();
    let ram = |name: &str| {
        NewRecord::Ram(NewRam {
            name: name.to_string(),
            memory_type: MemoryType::Ddr3,
            capacity: 4,
        })
    };
    let first = backend.insert(&ram("a")).unwrap();
    backend.delete(EntityKind::Ram, first).unwrap();
    assert_eq!(backend.insert(&ram("a")).unwrap(), first + 1);
}
