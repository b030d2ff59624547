//! Records kept by the store: four component kinds and the PC built from them.
//!
//! Every kind comes in two shapes. `NewX` is what a caller hands to a save, `X` is
//! what comes back from a lookup, with the id the backend assigned.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Id = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Ram,
    Cpu,
    Gpu,
    Memory,
    Pc,
}

impl EntityKind {
    /// Kinds a PC is built from, in `pc` column order.
    pub const COMPONENTS: [EntityKind; 4] = [
        EntityKind::Ram,
        EntityKind::Cpu,
        EntityKind::Gpu,
        EntityKind::Memory,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Ram => "ram",
            EntityKind::Cpu => "cpu",
            EntityKind::Gpu => "gpu",
            EntityKind::Memory => "memory",
            EntityKind::Pc => "pc",
        }
    }

    /// Column of the `pc` table pointing at this kind, `None` for the PC itself.
    pub fn pc_column(self) -> Option<&'static str> {
        match self {
            EntityKind::Ram => Some("ram_id"),
            EntityKind::Cpu => Some("cpu_id"),
            EntityKind::Gpu => Some("gpu_id"),
            EntityKind::Memory => Some("memory_id"),
            EntityKind::Pc => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryType {
    Ddr3,
    Ddr4,
    Ddr5,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Ddr3 => "DDR3",
            MemoryType::Ddr4 => "DDR4",
            MemoryType::Ddr5 => "DDR5",
        }
    }
}

impl FromStr for MemoryType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DDR3" => Ok(MemoryType::Ddr3),
            "DDR4" => Ok(MemoryType::Ddr4),
            "DDR5" => Ok(MemoryType::Ddr5),
            other => Err(UnknownVariant {
                kind: "memory type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageType {
    Ssd,
    Hdd,
}

impl StorageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Ssd => "SSD",
            StorageType::Hdd => "HDD",
        }
    }
}

impl FromStr for StorageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SSD" => Ok(StorageType::Ssd),
            "HDD" => Ok(StorageType::Hdd),
            other => Err(UnknownVariant {
                kind: "storage type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRam {
    pub name: String,
    pub memory_type: MemoryType,
    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ram {
    pub id: Id,
    pub name: String,
    pub memory_type: MemoryType,
    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCpu {
    pub name: String,
    pub cores: i64,
    pub threads: i64,
    /// MHz
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    pub id: Id,
    pub name: String,
    pub cores: i64,
    pub threads: i64,
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGpu {
    pub name: String,
    pub manufacturer: String,
    /// GB
    pub memory: i64,
    /// MHz
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gpu {
    pub id: Id,
    pub name: String,
    pub manufacturer: String,
    pub memory: i64,
    pub frequency: i64,
}

/// Storage device (SSD/HDD). Kept under the `memory` name the routes and tables use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMemory {
    pub name: String,
    pub capacity: i64,
    pub storage_type: StorageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Id,
    pub name: String,
    pub capacity: i64,
    pub storage_type: StorageType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPc {
    pub name: Option<String>,
    pub ram_id: Id,
    pub cpu_id: Id,
    pub gpu_id: Id,
    pub memory_id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pc {
    pub id: Id,
    pub name: Option<String>,
    pub ram_id: Id,
    pub cpu_id: Id,
    pub gpu_id: Id,
    pub memory_id: Id,
}

impl NewPc {
    /// Component references in `EntityKind::COMPONENTS` order.
    pub fn references(&self) -> [(EntityKind, Id); 4] {
        [
            (EntityKind::Ram, self.ram_id),
            (EntityKind::Cpu, self.cpu_id),
            (EntityKind::Gpu, self.gpu_id),
            (EntityKind::Memory, self.memory_id),
        ]
    }
}

impl Pc {
    /// Id of the component of `kind` this PC is built from.
    pub fn reference(&self, kind: EntityKind) -> Option<Id> {
        match kind {
            EntityKind::Ram => Some(self.ram_id),
            EntityKind::Cpu => Some(self.cpu_id),
            EntityKind::Gpu => Some(self.gpu_id),
            EntityKind::Memory => Some(self.memory_id),
            EntityKind::Pc => None,
        }
    }
}

impl NewRam {
    pub fn with_id(self, id: Id) -> Ram {
        Ram {
            id,
            name: self.name,
            memory_type: self.memory_type,
            capacity: self.capacity,
        }
    }
}

impl NewCpu {
    pub fn with_id(self, id: Id) -> Cpu {
        Cpu {
            id,
            name: self.name,
            cores: self.cores,
            threads: self.threads,
            frequency: self.frequency,
        }
    }
}

impl NewGpu {
    pub fn with_id(self, id: Id) -> Gpu {
        Gpu {
            id,
            name: self.name,
            manufacturer: self.manufacturer,
            memory: self.memory,
            frequency: self.frequency,
        }
    }
}

impl NewMemory {
    pub fn with_id(self, id: Id) -> Memory {
        Memory {
            id,
            name: self.name,
            capacity: self.capacity,
            storage_type: self.storage_type,
        }
    }
}

impl NewPc {
    pub fn with_id(self, id: Id) -> Pc {
        Pc {
            id,
            name: self.name,
            ram_id: self.ram_id,
            cpu_id: self.cpu_id,
            gpu_id: self.gpu_id,
            memory_id: self.memory_id,
        }
    }
}

/// A row on its way into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewRecord {
    Ram(NewRam),
    Cpu(NewCpu),
    Gpu(NewGpu),
    Memory(NewMemory),
    Pc(NewPc),
}

impl NewRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            NewRecord::Ram(_) => EntityKind::Ram,
            NewRecord::Cpu(_) => EntityKind::Cpu,
            NewRecord::Gpu(_) => EntityKind::Gpu,
            NewRecord::Memory(_) => EntityKind::Memory,
            NewRecord::Pc(_) => EntityKind::Pc,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            NewRecord::Ram(ram) => Some(&ram.name),
            NewRecord::Cpu(cpu) => Some(&cpu.name),
            NewRecord::Gpu(gpu) => Some(&gpu.name),
            NewRecord::Memory(memory) => Some(&memory.name),
            NewRecord::Pc(pc) => pc.name.as_deref(),
        }
    }

    pub fn with_id(self, id: Id) -> Record {
        match self {
            NewRecord::Ram(ram) => Record::Ram(ram.with_id(id)),
            NewRecord::Cpu(cpu) => Record::Cpu(cpu.with_id(id)),
            NewRecord::Gpu(gpu) => Record::Gpu(gpu.with_id(id)),
            NewRecord::Memory(memory) => Record::Memory(memory.with_id(id)),
            NewRecord::Pc(pc) => Record::Pc(pc.with_id(id)),
        }
    }
}

/// A row read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Ram(Ram),
    Cpu(Cpu),
    Gpu(Gpu),
    Memory(Memory),
    Pc(Pc),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Ram(_) => EntityKind::Ram,
            Record::Cpu(_) => EntityKind::Cpu,
            Record::Gpu(_) => EntityKind::Gpu,
            Record::Memory(_) => EntityKind::Memory,
            Record::Pc(_) => EntityKind::Pc,
        }
    }
}

/// Stored kinds that can be pulled back out of a [`Record`].
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn from_record(record: Record) -> Option<Self>;
}

macro_rules! impl_entity {
    ($ty: ident, $kind: ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$kind(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(Ram, Ram);
impl_entity!(Cpu, Cpu);
impl_entity!(Gpu, Gpu);
impl_entity!(Memory, Memory);
impl_entity!(Pc, Pc);

#[test]
fn test_enum_round_trip_through_text() {
    for ty in [MemoryType::Ddr3, MemoryType::Ddr4, MemoryType::Ddr5] {
        assert_eq!(ty.as_str().parse::<MemoryType>().unwrap(), ty);
    }
    assert_eq!("HDD".parse::<StorageType>().unwrap(), StorageType::Hdd);
    let err = "ddr4".parse::<MemoryType>().unwrap_err();
    assert_eq!(err.to_string(), "unknown memory type \"ddr4\"");
}

#[test]
fn test_enum_serde_names() {
    assert_eq!(serde_json::to_string(&MemoryType::Ddr5).unwrap(), "\"DDR5\"");
    assert_eq!(serde_json::to_string(&StorageType::Ssd).unwrap(), "\"SSD\"");
    assert_eq!(serde_json::to_string(&EntityKind::Memory).unwrap(), "\"memory\"");
}

#[test]
fn test_entity_from_record_checks_kind() {
    let record = NewRecord::Cpu(NewCpu {
        name: "Intel Core i7-9700K".to_string(),
        cores: 8,
        threads: 8,
        frequency: 3600,
    })
    .with_id(1);
    assert_eq!(record.kind(), EntityKind::Cpu);
    assert!(Gpu::from_record(record.clone()).is_none());
    assert_eq!(Cpu::from_record(record).unwrap().id, 1);
}
