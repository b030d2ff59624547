//! The persistence gateway: one save, one get and one delete per entity kind,
//! with backend failures turned into [`StoreError`]s for the kind being touched.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    backend::Backend,
    data::{
        Cpu, Entity, EntityKind, Gpu, Id, Memory, NewCpu, NewGpu, NewMemory, NewPc, NewRam,
        NewRecord, Pc, Ram,
    },
    error::{BackendError, StoreError},
    sqlite::SqliteBackend,
};

/// What deleting a component that PCs are still built from does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse with [`StoreError::InUse`] and leave everything in place.
    #[default]
    Restrict,
    /// Remove the dependent PCs together with the component.
    Cascade,
}

pub struct Store {
    backend: Mutex<Box<dyn Backend + Send>>,
    delete_policy: DeletePolicy,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("delete_policy", &self.delete_policy)
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(backend: Box<dyn Backend + Send>, delete_policy: DeletePolicy) -> Self {
        Self {
            backend: Mutex::new(backend),
            delete_policy,
        }
    }

    /// SQLite-backed store at `path`. Fails if the tables cannot be created.
    pub fn open(path: impl AsRef<Path>, delete_policy: DeletePolicy) -> Result<Self> {
        let backend = SqliteBackend::open(path)?;
        Ok(Self::new(Box::new(backend), delete_policy))
    }

    pub fn in_memory(delete_policy: DeletePolicy) -> Result<Self> {
        let backend = SqliteBackend::open_in_memory()?;
        Ok(Self::new(Box::new(backend), delete_policy))
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    fn backend(&self) -> Result<MutexGuard<'_, Box<dyn Backend + Send>>, StoreError> {
        self.backend
            .lock()
            .map_err(|_| StoreError::Storage(anyhow!("store lock poisoned")))
    }

    fn save(&self, record: NewRecord) -> Result<Id, StoreError> {
        let kind = record.kind();
        let id = self.backend()?.insert(&record).map_err(|err| match err {
            BackendError::UniqueViolation => StoreError::AlreadyExists(kind),
            BackendError::ForeignKeyViolation => StoreError::MissingReference(kind),
            BackendError::Other(err) => {
                StoreError::Storage(err.context(format!("failed to save {kind}")))
            }
        })?;
        debug!(%kind, id, "saved");
        Ok(id)
    }

    fn get<E: Entity>(&self, id: Id) -> Result<E, StoreError> {
        let kind = E::KIND;
        let record = self
            .backend()?
            .fetch(kind, id)
            .map_err(|err| storage(err, format!("failed to get {kind}")))?
            .ok_or(StoreError::NotFound(kind))?;
        let found = record.kind();
        E::from_record(record).ok_or_else(|| {
            StoreError::Storage(anyhow!("asked for {kind} {id}, backend returned a {found}"))
        })
    }

    fn delete(&self, kind: EntityKind, id: Id) -> Result<(), StoreError> {
        let mut backend = self.backend()?;
        let context = || format!("failed to delete {kind}");
        let removed = match (kind, self.delete_policy) {
            (EntityKind::Pc, _) => backend.delete(kind, id),
            (_, DeletePolicy::Cascade) => backend.delete_with_dependents(kind, id),
            (_, DeletePolicy::Restrict) => {
                let pcs = backend
                    .dependents(kind, id)
                    .map_err(|err| storage(err, context()))?;
                if !pcs.is_empty() {
                    return Err(StoreError::InUse { kind, id, pcs });
                }
                backend.delete(kind, id)
            }
        };
        match removed {
            Ok(removed) => {
                debug!(%kind, id, removed, "deleted");
                Ok(())
            }
            // a PC was saved against the component between the check and the delete
            Err(BackendError::ForeignKeyViolation) => {
                let pcs = backend
                    .dependents(kind, id)
                    .map_err(|err| storage(err, context()))?;
                warn!(%kind, id, "delete blocked by referencing pcs");
                Err(StoreError::InUse { kind, id, pcs })
            }
            Err(err) => Err(storage(err, context())),
        }
    }

    pub fn save_ram(&self, ram: NewRam) -> Result<Id, StoreError> {
        self.save(NewRecord::Ram(ram))
    }

    pub fn get_ram(&self, id: Id) -> Result<Ram, StoreError> {
        self.get(id)
    }

    pub fn delete_ram(&self, id: Id) -> Result<(), StoreError> {
        self.delete(EntityKind::Ram, id)
    }

    pub fn save_cpu(&self, cpu: NewCpu) -> Result<Id, StoreError> {
        self.save(NewRecord::Cpu(cpu))
    }

    pub fn get_cpu(&self, id: Id) -> Result<Cpu, StoreError> {
        self.get(id)
    }

    pub fn delete_cpu(&self, id: Id) -> Result<(), StoreError> {
        self.delete(EntityKind::Cpu, id)
    }

    pub fn save_gpu(&self, gpu: NewGpu) -> Result<Id, StoreError> {
        self.save(NewRecord::Gpu(gpu))
    }

    pub fn get_gpu(&self, id: Id) -> Result<Gpu, StoreError> {
        self.get(id)
    }

    pub fn delete_gpu(&self, id: Id) -> Result<(), StoreError> {
        self.delete(EntityKind::Gpu, id)
    }

    pub fn save_memory(&self, memory: NewMemory) -> Result<Id, StoreError> {
        self.save(NewRecord::Memory(memory))
    }

    pub fn get_memory(&self, id: Id) -> Result<Memory, StoreError> {
        self.get(id)
    }

    pub fn delete_memory(&self, id: Id) -> Result<(), StoreError> {
        self.delete(EntityKind::Memory, id)
    }

    pub fn save_pc(&self, pc: NewPc) -> Result<Id, StoreError> {
        self.save(NewRecord::Pc(pc))
    }

    pub fn get_pc(&self, id: Id) -> Result<Pc, StoreError> {
        self.get(id)
    }

    pub fn delete_pc(&self, id: Id) -> Result<(), StoreError> {
        self.delete(EntityKind::Pc, id)
    }
}

/// Anything left after the constraint cases is an opaque storage failure.
fn storage(err: BackendError, context: String) -> StoreError {
    match err {
        BackendError::Other(err) => StoreError::Storage(err.context(context)),
        constraint => StoreError::Storage(anyhow::Error::new(constraint).context(context)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{MemoryType, Record, StorageType},
        in_mem::InMemBackend,
    };

    fn i7() -> NewCpu {
        NewCpu {
            name: "Intel Core i7-9700K".to_string(),
            cores: 8,
            threads: 8,
            frequency: 3600,
        }
    }

    fn stores(policy: DeletePolicy) -> Vec<Store> {
        vec![
            Store::in_memory(policy).unwrap(),
            Store::new(Box::new(InMemBackend::new()), policy),
        ]
    }

    fn save_components(store: &Store) -> NewPc {
        NewPc {
            name: Some("Some PC".to_string()),
            ram_id: store
                .save_ram(NewRam {
                    name: "Kingston FURY Beast".to_string(),
                    memory_type: MemoryType::Ddr4,
                    capacity: 16,
                })
                .unwrap(),
            cpu_id: store.save_cpu(i7()).unwrap(),
            gpu_id: store
                .save_gpu(NewGpu {
                    name: "GeForce RTX 3070".to_string(),
                    manufacturer: "NVIDIA".to_string(),
                    memory: 8,
                    frequency: 1500,
                })
                .unwrap(),
            memory_id: store
                .save_memory(NewMemory {
                    name: "Samsung 970 EVO".to_string(),
                    capacity: 500,
                    storage_type: StorageType::Ssd,
                })
                .unwrap(),
        }
    }

    #[test]
    fn test_cpu_lifecycle() {
        for store in stores(DeletePolicy::Restrict) {
            let id = store.save_cpu(i7()).unwrap();
            assert_eq!(id, 1);

            let err = store.save_cpu(i7()).unwrap_err();
            assert!(matches!(err, StoreError::AlreadyExists(EntityKind::Cpu)));
            assert!(err.is_already_exists());

            assert_eq!(store.get_cpu(id).unwrap(), i7().with_id(id));

            store.delete_cpu(id).unwrap();
            let err = store.get_cpu(id).unwrap_err();
            assert!(matches!(err, StoreError::NotFound(EntityKind::Cpu)));
        }
    }

    #[test]
    fn test_duplicate_names_per_kind() {
        for store in stores(DeletePolicy::Restrict) {
            let pc = save_components(&store);
            let ram = store.get_ram(pc.ram_id).unwrap();
            let gpu = store.get_gpu(pc.gpu_id).unwrap();
            let memory = store.get_memory(pc.memory_id).unwrap();

            let err = store
                .save_ram(NewRam {
                    name: ram.name,
                    memory_type: MemoryType::Ddr5,
                    capacity: 64,
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::AlreadyExists(EntityKind::Ram)));

            let err = store
                .save_gpu(NewGpu {
                    name: gpu.name,
                    manufacturer: "AMD".to_string(),
                    memory: 16,
                    frequency: 2000,
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::AlreadyExists(EntityKind::Gpu)));

            let err = store
                .save_memory(NewMemory {
                    name: memory.name,
                    capacity: 1000,
                    storage_type: StorageType::Hdd,
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::AlreadyExists(EntityKind::Memory)));

            store.save_pc(pc.clone()).unwrap();
            let err = store.save_pc(pc).unwrap_err();
            assert!(matches!(err, StoreError::AlreadyExists(EntityKind::Pc)));
        }
    }

    #[test]
    fn test_pc_links_components() {
        for store in stores(DeletePolicy::Restrict) {
            let pc = save_components(&store);
            assert_eq!(
                (pc.ram_id, pc.cpu_id, pc.gpu_id, pc.memory_id),
                (1, 1, 1, 1)
            );
            let id = store.save_pc(pc.clone()).unwrap();
            assert_eq!(store.get_pc(id).unwrap(), pc.with_id(id));
        }
    }

    #[test]
    fn test_pc_with_missing_component_is_not_saved() {
        for store in stores(DeletePolicy::Restrict) {
            let pc = NewPc {
                gpu_id: 99,
                ..save_components(&store)
            };
            let err = store.save_pc(pc).unwrap_err();
            assert!(matches!(err, StoreError::MissingReference(EntityKind::Pc)));
            assert!(store.get_pc(1).unwrap_err().is_not_found());
        }
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        for store in stores(DeletePolicy::Restrict) {
            assert!(matches!(
                store.get_ram(7),
                Err(StoreError::NotFound(EntityKind::Ram))
            ));
            assert!(matches!(
                store.get_gpu(7),
                Err(StoreError::NotFound(EntityKind::Gpu))
            ));
            assert!(matches!(
                store.get_memory(7),
                Err(StoreError::NotFound(EntityKind::Memory))
            ));
            assert!(matches!(
                store.get_pc(7),
                Err(StoreError::NotFound(EntityKind::Pc))
            ));
        }
    }

    #[test]
    fn test_delete_is_idempotent() {
        for store in stores(DeletePolicy::Restrict) {
            let id = store.save_cpu(i7()).unwrap();
            store.delete_cpu(id).unwrap();
            store.delete_cpu(id).unwrap();
            store.delete_pc(12).unwrap();
        }
    }

    #[test]
    fn test_restrict_keeps_referenced_component() {
        for store in stores(DeletePolicy::Restrict) {
            let pc = save_components(&store);
            let pc_id = store.save_pc(pc.clone()).unwrap();

            let err = store.delete_gpu(pc.gpu_id).unwrap_err();
            match err {
                StoreError::InUse { kind, id, pcs } => {
                    assert_eq!(kind, EntityKind::Gpu);
                    assert_eq!(id, pc.gpu_id);
                    assert_eq!(pcs, vec![pc_id]);
                }
                other => panic!("unexpected error {other}"),
            }
            assert!(store.get_gpu(pc.gpu_id).is_ok());

            store.delete_pc(pc_id).unwrap();
            store.delete_gpu(pc.gpu_id).unwrap();
        }
    }

    #[test]
    fn test_cascade_removes_dependent_pcs() {
        for store in stores(DeletePolicy::Cascade) {
            assert_eq!(store.delete_policy(), DeletePolicy::Cascade);
            let pc = save_components(&store);
            let pc_id = store.save_pc(pc.clone()).unwrap();

            store.delete_memory(pc.memory_id).unwrap();
            assert!(store.get_memory(pc.memory_id).unwrap_err().is_not_found());
            assert!(store.get_pc(pc_id).unwrap_err().is_not_found());
            assert!(store.get_cpu(pc.cpu_id).is_ok());
        }
    }

    struct BrokenBackend;

    impl Backend for BrokenBackend {
        fn insert(&mut self, _record: &NewRecord) -> Result<Id, BackendError> {
            Err(anyhow!("disk I/O error").into())
        }

        fn fetch(&mut self, _kind: EntityKind, _id: Id) -> Result<Option<Record>, BackendError> {
            Ok(Some(Record::Ram(
                NewRam {
                    name: "wrong".to_string(),
                    memory_type: MemoryType::Ddr3,
                    capacity: 1,
                }
                .with_id(1),
            )))
        }

        fn delete(&mut self, _kind: EntityKind, _id: Id) -> Result<usize, BackendError> {
            Err(anyhow!("database is locked").into())
        }

        fn dependents(&mut self, _kind: EntityKind, _id: Id) -> Result<Vec<Id>, BackendError> {
            Ok(vec![])
        }

        fn delete_with_dependents(
            &mut self,
            _kind: EntityKind,
            _id: Id,
        ) -> Result<usize, BackendError> {
            Err(anyhow!("database is locked").into())
        }
    }

    #[test]
    fn test_other_failures_are_opaque() {
        let store = Store::new(Box::new(BrokenBackend), DeletePolicy::Restrict);

        let err = store.save_cpu(i7()).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert!(err.to_string().contains("failed to save cpu"));

        assert!(matches!(store.get_cpu(1), Err(StoreError::Storage(_))));
        assert!(matches!(store.delete_cpu(1), Err(StoreError::Storage(_))));
    }
}
