//! Topology descriptions
//!
//! A [`TopologySpec`] describes the devices a [`SimulatedRuntime`] exposes
//! and how each of them partitions. Topologies are plain JSON so a probe
//! run can be reproduced from a file:
//!
//! ```json
//! {
//!   "devices": [{
//!     "name": "Intel(R) Data Center GPU Max 1550",
//!     "backend": "level_zero",
//!     "partition_properties": ["partition_by_affinity_domain"],
//!     "affinity_domains": ["numa", "next_partitionable"],
//!     "sub_devices": [
//!       { "name": "Intel(R) Data Center GPU Max 1550", "backend": "level_zero",
//!         "partition_properties": ["ext_intel_partition_by_cslice"], "compute_slices": 4 }
//!     ]
//!   }]
//! }
//! ```
//!
//! [`SimulatedRuntime`]: super::SimulatedRuntime

use crate::error::{IoResultExt, Result};
use crate::runtime::device::{AffinityDomain, Backend, DeviceType, PartitionProperty};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_compute_units() -> u32 {
    1
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

/// Complete device topology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySpec {
    /// Make device enumeration fail with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumeration_error: Option<String>,
    /// Root devices, in enumeration order
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

impl TopologySpec {
    /// Create a topology from root devices
    pub fn new(devices: Vec<DeviceSpec>) -> Self {
        Self {
            enumeration_error: None,
            devices,
        }
    }

    /// Make enumeration fail
    pub fn failing_enumeration(mut self, message: impl Into<String>) -> Self {
        self.enumeration_error = Some(message.into());
        self
    }

    /// Parse a topology from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a topology from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_path(path)?;
        Self::from_json(&json)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?).with_path(path)
    }
}

/// One device and its partitioning behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Device name
    pub name: String,
    /// Backend the device belongs to
    pub backend: Backend,
    /// Device kind
    #[serde(default)]
    pub device_type: DeviceType,
    /// Supported partition schemes, in reported order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_properties: Vec<PartitionProperty>,
    /// Affinity domains accepted by `partition_by_affinity_domain`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affinity_domains: Vec<AffinityDomain>,
    /// Compute units (used by equal and by-counts splits)
    #[serde(default = "default_compute_units")]
    pub compute_units: u32,
    /// Reported maximum number of sub-devices (derived when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sub_devices: Option<u32>,
    /// Number of slices produced by `ext_intel_partition_by_cslice`
    #[serde(default, skip_serializing_if = "is_zero")]
    pub compute_slices: u32,
    /// Global memory in bytes
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub global_mem_size: u64,
    /// Host CPUs backing the device
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpus: Vec<usize>,
    /// Sub-devices produced by an affinity-domain split
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_devices: Vec<DeviceSpec>,
    /// Make every partition request on this device fail with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_error: Option<String>,
}

impl DeviceSpec {
    /// Create an unpartitionable device
    pub fn new(name: impl Into<String>, backend: Backend) -> Self {
        Self {
            name: name.into(),
            backend,
            device_type: DeviceType::default(),
            partition_properties: Vec::new(),
            affinity_domains: Vec::new(),
            compute_units: default_compute_units(),
            max_sub_devices: None,
            compute_slices: 0,
            global_mem_size: 0,
            cpus: Vec::new(),
            sub_devices: Vec::new(),
            partition_error: None,
        }
    }

    /// Set the device type
    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// Append a supported partition scheme
    pub fn with_property(mut self, property: PartitionProperty) -> Self {
        self.partition_properties.push(property);
        self
    }

    /// Support NUMA affinity partitioning into `sub_devices`
    pub fn with_numa(mut self, sub_devices: Vec<DeviceSpec>) -> Self {
        self.partition_properties.push(PartitionProperty::PartitionByAffinityDomain);
        self.affinity_domains = vec![AffinityDomain::Numa, AffinityDomain::NextPartitionable];
        self.sub_devices = sub_devices;
        self
    }

    /// Support compute-slice partitioning into `slices` slices
    pub fn with_cslices(mut self, slices: u32) -> Self {
        self.partition_properties.push(PartitionProperty::ExtIntelPartitionByCslice);
        self.compute_slices = slices;
        self
    }

    /// Set the compute-unit count
    pub fn with_compute_units(mut self, units: u32) -> Self {
        self.compute_units = units;
        self
    }

    /// Cap the sub-device count
    pub fn with_max_sub_devices(mut self, max: u32) -> Self {
        self.max_sub_devices = Some(max);
        self
    }

    /// Make partition requests on this device fail
    pub fn failing_partition(mut self, message: impl Into<String>) -> Self {
        self.partition_error = Some(message.into());
        self
    }

    /// Maximum number of sub-devices the device reports
    pub fn effective_max_sub_devices(&self) -> u32 {
        if let Some(max) = self.max_sub_devices {
            return max;
        }

        self.partition_properties
            .iter()
            .map(|property| match property {
                PartitionProperty::NoPartition => 0,
                PartitionProperty::PartitionEqually | PartitionProperty::PartitionByCounts => {
                    self.compute_units
                }
                PartitionProperty::PartitionByAffinityDomain => self.sub_devices.len() as u32,
                PartitionProperty::ExtIntelPartitionByCslice => self.compute_slices,
            })
            .max()
            .unwrap_or(0)
    }

    /// Check whether an affinity-domain split along `domain` is accepted
    pub fn accepts_affinity_domain(&self, domain: AffinityDomain) -> bool {
        match domain {
            AffinityDomain::NextPartitionable => !self.affinity_domains.is_empty(),
            _ => self.affinity_domains.contains(&domain),
        }
    }

    /// Create a leaf device derived from this one
    pub(crate) fn derive_leaf(&self, name: String, compute_units: u32, cpus: Vec<usize>, share: u64) -> Self {
        Self {
            compute_units,
            global_mem_size: share,
            cpus,
            device_type: self.device_type,
            ..Self::new(name, self.backend)
        }
    }
}
