//! Hardware module normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reconcile::as_f64;
use crate::units::{bytes_from_value, bytes_to_gb, round2};

mod fields {
    use crate::reconcile::Field;

    pub const MANUFACTURER: Field = Field::new(
        "manufacturer",
        &["manufacturer", "Manufacturer", "vendor", "make", "system.manufacturer", "systemManufacturer"],
    );
    pub const MODEL: Field = Field::new(
        "model",
        &["model", "Model", "modelName", "model_name", "machineName", "productName", "system.model"],
    );
    pub const MODEL_IDENTIFIER: Field = Field::new(
        "modelIdentifier",
        &["modelIdentifier", "model_identifier", "machineModel", "machine_model", "SystemSKUNumber"],
    );
    pub const PROCESSOR: Field = Field::new(
        "processor",
        &[
            "processor.name",
            "processor.Name",
            "processor",
            "cpu.name",
            "cpu",
            "cpuBrand",
            "cpu_brand",
            "chipType",
            "chip_type",
        ],
    );
    pub const CORES: Field = Field::new(
        "processorCores",
        &[
            "processor.cores",
            "processor.numberOfCores",
            "processor.NumberOfCores",
            "cpu.cores",
            "cores",
            "cpuCores",
            "cpu_cores",
            "numberOfCores",
            "NumberOfCores",
            "numberOfProcessors",
        ],
    );
    pub const LOGICAL_PROCESSORS: Field = Field::new(
        "logicalProcessors",
        &[
            "processor.logicalProcessors",
            "processor.NumberOfLogicalProcessors",
            "cpu.threads",
            "logicalProcessors",
            "NumberOfLogicalProcessors",
            "threads",
        ],
    );
    pub const MEMORY: Field = Field::new(
        "memoryBytes",
        &[
            "memory.totalBytes",
            "memory.total_bytes",
            "memory.totalPhysical",
            "memory.total",
            "memoryBytes",
            "memory_bytes",
            "totalMemory",
            "total_memory",
            "TotalPhysicalMemory",
            "physicalMemory",
            "physical_memory",
            "memorySize",
            "memory",
            "ram",
        ],
    );
    pub const STORAGE: Field = Field::new(
        "storage",
        &["storage.volumes", "storage", "volumes", "disks", "drives", "logicalDisks", "LogicalDisks"],
    );

    pub const VOLUME_NAME: Field = Field::new(
        "name",
        &["name", "Name", "DeviceID", "deviceId", "mountPoint", "mount_point", "volumeName", "label", "driveLetter"],
    );
    pub const VOLUME_FS: Field = Field::new(
        "fileSystem",
        &["fileSystem", "file_system", "FileSystem", "format", "fsType"],
    );
    pub const VOLUME_CAPACITY: Field = Field::new(
        "capacity",
        &["capacity", "Capacity", "size", "Size", "totalBytes", "total_bytes", "totalSize", "total"],
    );
    pub const VOLUME_FREE: Field = Field::new(
        "freeSpace",
        &["freeSpace", "free_space", "FreeSpace", "freeBytes", "free_bytes", "free", "available", "availableBytes"],
    );

    pub const BATTERY: Field = Field::new("battery", &["battery", "Battery", "power.battery"]);
    pub const BATTERY_HEALTH: Field = Field::new(
        "health",
        &["health", "condition", "Condition", "healthStatus", "health_status", "status"],
    );
    pub const BATTERY_CYCLES: Field = Field::new(
        "cycleCount",
        &["cycleCount", "cycle_count", "CycleCount", "cycles"],
    );
    pub const BATTERY_CHARGE: Field = Field::new(
        "chargePercent",
        &["chargePercent", "charge_percent", "charge", "currentCapacity", "EstimatedChargeRemaining"],
    );
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageVolume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_cores: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_processors: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    #[serde(default)]
    pub storage: Vec<StorageVolume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryInfo>,
}

pub fn normalize_hardware(module: Option<&Value>) -> HardwareInfo {
    let Some(hw) = module else {
        return HardwareInfo::default();
    };

    let memory_bytes = fields::MEMORY.find_map(hw, bytes_from_value).filter(|b| *b > 0);

    HardwareInfo {
        manufacturer: fields::MANUFACTURER.string(hw),
        model: fields::MODEL.string(hw),
        model_identifier: fields::MODEL_IDENTIFIER.string(hw),
        processor: fields::PROCESSOR.string(hw),
        processor_cores: fields::CORES.u64(hw).filter(|c| *c > 0),
        logical_processors: fields::LOGICAL_PROCESSORS.u64(hw).filter(|c| *c > 0),
        memory_bytes,
        memory_gb: memory_bytes.map(bytes_to_gb),
        storage: storage_volumes(hw),
        battery: fields::BATTERY.object(hw).map(battery),
    }
}

fn storage_volumes(hw: &Value) -> Vec<StorageVolume> {
    let Some(items) = fields::STORAGE.find_map(hw, Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let name = fields::VOLUME_NAME.string(item)?;
            let capacity = fields::VOLUME_CAPACITY.find_map(item, bytes_from_value);
            let free = fields::VOLUME_FREE.find_map(item, bytes_from_value);
            let used_percent = match (capacity, free) {
                (Some(cap), Some(free)) if cap > 0 && free <= cap => {
                    Some(round2((cap - free) as f64 / cap as f64 * 100.0))
                }
                _ => None,
            };
            Some(StorageVolume {
                name,
                file_system: fields::VOLUME_FS.string(item),
                capacity_gb: capacity.map(bytes_to_gb),
                free_gb: free.map(bytes_to_gb),
                used_percent,
            })
        })
        .collect()
}

fn battery(record: &Value) -> BatteryInfo {
    BatteryInfo {
        health: fields::BATTERY_HEALTH.string(record),
        cycle_count: fields::BATTERY_CYCLES.u64(record),
        charge_percent: fields::BATTERY_CHARGE
            .find_map(record, as_f64)
            .filter(|p| (0.0..=100.0).contains(p)),
    }
}
