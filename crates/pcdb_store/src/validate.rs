//! Required-field checks for save requests, run before anything reaches the store.
//!
//! A request that passes comes back as the matching `New*` value, so the gateway
//! never sees an empty name or an unparsed enum. Every violation in a request is
//! reported, in field order, not just the first one.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::data::{Id, MemoryType, NewCpu, NewGpu, NewMemory, NewPc, NewRam, StorageType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Required,
    /// Present but not acceptable; carries what the value should have been.
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub reason: Reason,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Reason::Required => write!(f, "field {} is a required field", self.field),
            Reason::Invalid(what) => write!(f, "field {} is not a valid {}", self.field, what),
        }
    }
}

/// Non-empty list of violations found in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn as_slice(&self) -> &[Violation] {
        &self.0
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|v| v.field).collect()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

pub trait Validate {
    type Output;

    fn validate(&self) -> Result<Self::Output, Violations>;
}

/// Collects violations while pulling typed values out of a request.
#[derive(Default)]
struct Checker(Vec<Violation>);

impl Checker {
    fn push(&mut self, field: &'static str, reason: Reason) {
        self.0.push(Violation { field, reason });
    }

    fn text(&mut self, field: &'static str, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            self.push(field, Reason::Required);
            return None;
        }
        Some(value.to_string())
    }

    fn number(&mut self, field: &'static str, value: i64) -> Option<i64> {
        match value {
            0 => {
                self.push(field, Reason::Required);
                None
            }
            v if v < 0 => {
                self.push(field, Reason::Invalid("positive number"));
                None
            }
            v => Some(v),
        }
    }

    fn id(&mut self, field: &'static str, value: Id, what: &'static str) -> Option<Id> {
        match value {
            0 => {
                self.push(field, Reason::Required);
                None
            }
            v if v < 0 => {
                self.push(field, Reason::Invalid(what));
                None
            }
            v => Some(v),
        }
    }

    fn choice<T: FromStr>(&mut self, field: &'static str, value: &str, what: &'static str) -> Option<T> {
        let value = value.trim();
        if value.is_empty() {
            self.push(field, Reason::Required);
            return None;
        }
        match value.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                self.push(field, Reason::Invalid(what));
                None
            }
        }
    }

    /// `value` is only `Some` when every field passed, so it is returned untouched then.
    fn finish<T>(self, value: Option<T>) -> Result<T, Violations> {
        match value {
            Some(value) if self.0.is_empty() => Ok(value),
            _ => Err(Violations(self.0)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveRamRequest {
    pub name: String,
    pub memory_type: String,
    pub capacity: i64,
}

impl Validate for SaveRamRequest {
    type Output = NewRam;

    fn validate(&self) -> Result<NewRam, Violations> {
        let mut check = Checker::default();
        let name = check.text("name", &self.name);
        let memory_type = check.choice::<MemoryType>("memory_type", &self.memory_type, "memory type");
        let capacity = check.number("capacity", self.capacity);
        let ram = match (name, memory_type, capacity) {
            (Some(name), Some(memory_type), Some(capacity)) => Some(NewRam {
                name,
                memory_type,
                capacity,
            }),
            _ => None,
        };
        check.finish(ram)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveCpuRequest {
    pub name: String,
    pub cores: i64,
    pub threads: i64,
    pub frequency: i64,
}

impl Validate for SaveCpuRequest {
    type Output = NewCpu;

    fn validate(&self) -> Result<NewCpu, Violations> {
        let mut check = Checker::default();
        let name = check.text("name", &self.name);
        let cores = check.number("cores", self.cores);
        let threads = check.number("threads", self.threads);
        let frequency = check.number("frequency", self.frequency);
        let cpu = match (name, cores, threads, frequency) {
            (Some(name), Some(cores), Some(threads), Some(frequency)) => Some(NewCpu {
                name,
                cores,
                threads,
                frequency,
            }),
            _ => None,
        };
        check.finish(cpu)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveGpuRequest {
    pub name: String,
    pub manufacturer: String,
    pub memory: i64,
    pub frequency: i64,
}

impl Validate for SaveGpuRequest {
    type Output = NewGpu;

    fn validate(&self) -> Result<NewGpu, Violations> {
        let mut check = Checker::default();
        let name = check.text("name", &self.name);
        let manufacturer = check.text("manufacturer", &self.manufacturer);
        let memory = check.number("memory", self.memory);
        let frequency = check.number("frequency", self.frequency);
        let gpu = match (name, manufacturer, memory, frequency) {
            (Some(name), Some(manufacturer), Some(memory), Some(frequency)) => Some(NewGpu {
                name,
                manufacturer,
                memory,
                frequency,
            }),
            _ => None,
        };
        check.finish(gpu)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveMemoryRequest {
    pub name: String,
    pub capacity: i64,
    pub storage_type: String,
}

impl Validate for SaveMemoryRequest {
    type Output = NewMemory;

    fn validate(&self) -> Result<NewMemory, Violations> {
        let mut check = Checker::default();
        let name = check.text("name", &self.name);
        let capacity = check.number("capacity", self.capacity);
        let storage_type =
            check.choice::<StorageType>("storage_type", &self.storage_type, "storage type");
        let memory = match (name, capacity, storage_type) {
            (Some(name), Some(capacity), Some(storage_type)) => Some(NewMemory {
                name,
                capacity,
                storage_type,
            }),
            _ => None,
        };
        check.finish(memory)
    }
}

/// PC names are optional; the four component ids are not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavePcRequest {
    pub name: Option<String>,
    pub ram_id: Id,
    pub cpu_id: Id,
    pub gpu_id: Id,
    #[serde(alias = "storage_id")]
    pub memory_id: Id,
}

impl Validate for SavePcRequest {
    type Output = NewPc;

    fn validate(&self) -> Result<NewPc, Violations> {
        let mut check = Checker::default();
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let ram_id = check.id("ram_id", self.ram_id, "ram id");
        let cpu_id = check.id("cpu_id", self.cpu_id, "cpu id");
        let gpu_id = check.id("gpu_id", self.gpu_id, "gpu id");
        let memory_id = check.id("memory_id", self.memory_id, "memory id");
        let pc = match (ram_id, cpu_id, gpu_id, memory_id) {
            (Some(ram_id), Some(cpu_id), Some(gpu_id), Some(memory_id)) => Some(NewPc {
                name,
                ram_id,
                cpu_id,
                gpu_id,
                memory_id,
            }),
            _ => None,
        };
        check.finish(pc)
    }
}

#[test]
fn test_all_missing_fields_are_reported() {
    let req: SaveCpuRequest = serde_json::from_str(r#"{"cores": 8}"#).unwrap();
    let violations = req.validate().unwrap_err();
    assert_eq!(violations.fields(), vec!["name", "threads", "frequency"]);
    assert_eq!(
        violations.to_string(),
        "field name is a required field, field threads is a required field, field frequency is a required field"
    );
}

#[test]
fn test_valid_ram_request() {
    let req = SaveRamRequest {
        name: " Kingston FURY Beast ".to_string(),
        memory_type: "DDR4".to_string(),
        capacity: 16,
    };
    assert_eq!(
        req.validate().unwrap(),
        NewRam {
            name: "Kingston FURY Beast".to_string(),
            memory_type: MemoryType::Ddr4,
            capacity: 16,
        }
    );
}

#[test]
fn test_unknown_enum_values_are_rejected() {
    let ram = SaveRamRequest {
        name: "x".to_string(),
        memory_type: "DDR9".to_string(),
        capacity: 8,
    };
    assert_eq!(
        ram.validate().unwrap_err().to_string(),
        "field memory_type is not a valid memory type"
    );

    let memory = SaveMemoryRequest {
        name: "y".to_string(),
        capacity: -1,
        storage_type: "NVMe".to_string(),
    };
    let violations = memory.validate().unwrap_err();
    assert_eq!(
        violations.as_slice(),
        &[
            Violation {
                field: "capacity",
                reason: Reason::Invalid("positive number"),
            },
            Violation {
                field: "storage_type",
                reason: Reason::Invalid("storage type"),
            },
        ]
    );
}

#[test]
fn test_gpu_blank_strings_are_missing() {
    let gpu = SaveGpuRequest {
        name: "   ".to_string(),
        manufacturer: String::new(),
        memory: 8,
        frequency: 1500,
    };
    assert_eq!(
        gpu.validate().unwrap_err().fields(),
        vec!["name", "manufacturer"]
    );
}

#[test]
fn test_pc_name_is_optional() {
    let req: SavePcRequest =
        serde_json::from_str(r#"{"ram_id": 1, "cpu_id": 1, "gpu_id": 1, "storage_id": 1}"#)
            .unwrap();
    let pc = req.validate().unwrap();
    assert_eq!(pc.name, None);
    assert_eq!(pc.memory_id, 1);

    let req: SavePcRequest = serde_json::from_str(r#"{"name": "Some PC", "cpu_id": 1}"#).unwrap();
    assert_eq!(
        req.validate().unwrap_err().fields(),
        vec!["ram_id", "gpu_id", "memory_id"]
    );
}
