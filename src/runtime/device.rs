//! Device handles and partition vocabulary
//!
//! A [`Device`] is the handle a [`DeviceRuntime`](super::DeviceRuntime)
//! hands out for root devices and for every sub-device it creates. The
//! handle carries the information the probes query (name, backend,
//! supported partition schemes), so reading it never fails.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hierarchical device identifier (`0`, `0.1`, `0.1.s3`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Identifier of the root device at `index`
    pub fn root(index: usize) -> Self {
        Self(index.to_string())
    }

    /// Identifier of a sub-device created by `partition`
    pub fn child(&self, partition: &Partition, index: usize) -> Self {
        Self(format!("{}.{}{}", self.0, partition.id_tag(), index))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution platform/driver a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// OpenCL
    Opencl,
    /// oneAPI Level Zero
    LevelZero,
    /// NVIDIA CUDA
    Cuda,
    /// AMD HIP
    Hip,
    /// Native CPU execution
    NativeCpu,
    /// Host fallback device
    Host,
}

impl Backend {
    /// Get the runtime's name for this backend
    /// Device name as reported by the runtime
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opencl => "opencl",
            Self::LevelZero => "ext_oneapi_level_zero",
            Self::Cuda => "ext_oneapi_cuda",
            Self::Hip => "ext_oneapi_hip",
            Self::NativeCpu => "ext_oneapi_native_cpu",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// CPU device
    Cpu,
    /// GPU device
    #[default]
    Gpu,
    /// Accelerator (FPGA and similar)
    Accelerator,
    /// Host fallback device
    Host,
}

/// Partition scheme a device may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionProperty {
    /// Device cannot be partitioned
    NoPartition,
    /// Equal split by compute units
    PartitionEqually,
    /// Split by explicit compute-unit counts
    PartitionByCounts,
    /// Split along an affinity domain (NUMA, caches)
    PartitionByAffinityDomain,
    /// Vendor extension: split into compute slices
    ExtIntelPartitionByCslice,
}

impl PartitionProperty {
    /// Get the runtime's name for this scheme
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoPartition => "no_partition",
            Self::PartitionEqually => "partition_equally",
            Self::PartitionByCounts => "partition_by_counts",
            Self::PartitionByAffinityDomain => "partition_by_affinity_domain",
            Self::ExtIntelPartitionByCslice => "ext_intel_partition_by_cslice",
        }
    }
}

impl fmt::Display for PartitionProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Affinity domain used with [`PartitionProperty::PartitionByAffinityDomain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffinityDomain {
    /// Not applicable
    #[serde(rename = "not_applicable")]
    NotApplicable,
    /// NUMA node
    #[serde(rename = "numa")]
    Numa,
    /// Level 4 cache
    #[serde(rename = "L4_cache")]
    L4Cache,
    /// Level 3 cache
    #[serde(rename = "L3_cache")]
    L3Cache,
    /// Level 2 cache
    #[serde(rename = "L2_cache")]
    L2Cache,
    /// Level 1 cache
    #[serde(rename = "L1_cache")]
    L1Cache,
    /// Whatever domain the device partitions along next
    #[serde(rename = "next_partitionable")]
    NextPartitionable,
}

impl AffinityDomain {
    /// Get the runtime's name for this domain
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::Numa => "numa",
            Self::L4Cache => "L4_cache",
            Self::L3Cache => "L3_cache",
            Self::L2Cache => "L2_cache",
            Self::L1Cache => "L1_cache",
            Self::NextPartitionable => "next_partitionable",
        }
    }
}

impl fmt::Display for AffinityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete partition request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
    /// Sub-devices with `n` compute units each
    Equally(u32),
    /// One sub-device per count
    ByCounts(Vec<u32>),
    /// Split along an affinity domain
    ByAffinityDomain(AffinityDomain),
    /// Split into compute slices
    ByCslice,
}

impl Partition {
    /// Scheme the device must support to honour this request
    pub fn property(&self) -> PartitionProperty {
        match self {
            Self::Equally(_) => PartitionProperty::PartitionEqually,
            Self::ByCounts(_) => PartitionProperty::PartitionByCounts,
            Self::ByAffinityDomain(_) => PartitionProperty::PartitionByAffinityDomain,
            Self::ByCslice => PartitionProperty::ExtIntelPartitionByCslice,
        }
    }

    fn id_tag(&self) -> &'static str {
        match self {
            Self::Equally(_) => "e",
            Self::ByCounts(_) => "c",
            Self::ByAffinityDomain(_) => "",
            Self::ByCslice => "s",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByAffinityDomain(domain) => write!(f, "{}({})", self.property(), domain),
            Self::Equally(n) => write!(f, "{}({})", self.property(), n),
            Self::ByCounts(counts) => write!(f, "{}({:?})", self.property(), counts),
            Self::ByCslice => write!(f, "{}", self.property()),
        }
    }
}

/// How a device was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionType {
    /// Root device
    #[default]
    NoPartition,
    /// Created by an equal split
    Equally,
    /// Created by a split by counts
    ByCounts,
    /// Created by an affinity-domain split
    ByAffinityDomain(AffinityDomain),
    /// Created by a compute-slice split
    ByCslice,
}

impl From<&Partition> for PartitionType {
    fn from(partition: &Partition) -> Self {
        match partition {
            Partition::Equally(_) => Self::Equally,
            Partition::ByCounts(_) => Self::ByCounts,
            Partition::ByAffinityDomain(domain) => Self::ByAffinityDomain(*domain),
            Partition::ByCslice => Self::ByCslice,
        }
    }
}

/// Device handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    id: DeviceId,
    name: String,
    backend: Backend,
    device_type: DeviceType,
    partition_properties: Vec<PartitionProperty>,
    affinity_domains: Vec<AffinityDomain>,
    partition_type: PartitionType,
    max_sub_devices: u32,
    compute_units: u32,
    global_mem_size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cpus: Vec<usize>,
}

impl Device {
    /// Create a root device handle with no partition support
    pub fn new(id: DeviceId, name: impl Into<String>, backend: Backend) -> Self {
        Self {
            id,
            name: name.into(),
            backend,
            device_type: DeviceType::default(),
            partition_properties: Vec::new(),
            affinity_domains: Vec::new(),
            partition_type: PartitionType::NoPartition,
            max_sub_devices: 0,
            compute_units: 1,
            global_mem_size: 0,
            cpus: Vec::new(),
        }
    }

    /// Set the device type
    pub fn with_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// Set the supported partition schemes, in reported order
    pub fn with_partition_properties(mut self, properties: Vec<PartitionProperty>) -> Self {
        self.partition_properties = properties;
        self
    }

    /// Set the supported affinity domains
    pub fn with_affinity_domains(mut self, domains: Vec<AffinityDomain>) -> Self {
        self.affinity_domains = domains;
        self
    }

    /// Record how the device was created
    pub fn with_partition_type(mut self, partition_type: PartitionType) -> Self {
        self.partition_type = partition_type;
        self
    }

    /// Set the maximum number of sub-devices
    pub fn with_max_sub_devices(mut self, max: u32) -> Self {
        self.max_sub_devices = max;
        self
    }

    /// Set the compute-unit count
    pub fn with_compute_units(mut self, units: u32) -> Self {
        self.compute_units = units;
        self
    }

    /// Set the global memory size in bytes
    pub fn with_global_mem_size(mut self, bytes: u64) -> Self {
        self.global_mem_size = bytes;
        self
    }

    /// Set the host CPUs backing the device
    pub fn with_cpus(mut self, cpus: Vec<usize>) -> Self {
        self.cpus = cpus;
        self
    }

    /// Runtime-unique identifier
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend the device belongs to
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Device type
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Supported partition schemes, in the order the runtime reports them
    pub fn partition_properties(&self) -> &[PartitionProperty] {
        &self.partition_properties
    }

    /// Affinity domains accepted by `partition_by_affinity_domain`
    pub fn affinity_domains(&self) -> &[AffinityDomain] {
        &self.affinity_domains
    }

    /// How this device was created from its parent
    pub fn partition_type(&self) -> PartitionType {
        self.partition_type
    }

    /// Maximum number of sub-devices
    pub fn max_sub_devices(&self) -> u32 {
        self.max_sub_devices
    }

    /// Number of compute units
    pub fn compute_units(&self) -> u32 {
        self.compute_units
    }

    /// Global memory size in bytes
    pub fn global_mem_size(&self) -> u64 {
        self.global_mem_size
    }

    /// Host CPUs backing this device (empty for non-host hardware)
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    /// Check whether the device is the host fallback device
    pub fn is_host(&self) -> bool {
        self.device_type == DeviceType::Host
    }

    /// Check whether the device reports the given partition scheme
    pub fn supports(&self, property: PartitionProperty) -> bool {
        self.partition_properties.contains(&property)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.name, self.backend)
    }
}
