//! Runtime backed by a topology description

use crate::error::{ProbeError, Result};
use crate::runtime::device::{Device, DeviceId, Partition, PartitionType};
use crate::runtime::topology::{DeviceSpec, TopologySpec};
use crate::runtime::DeviceRuntime;
use std::collections::HashMap;
use std::sync::Mutex;

/// [`DeviceRuntime`] that serves devices from a [`TopologySpec`]
///
/// Every handle given out is registered with the spec it was built from,
/// so later partition requests on that handle resolve against the same
/// description.
#[derive(Debug)]
pub struct SimulatedRuntime {
    name: String,
    topology: TopologySpec,
    registry: Mutex<HashMap<DeviceId, DeviceSpec>>,
}

impl SimulatedRuntime {
    /// Create a runtime serving `topology`
    pub fn new(topology: TopologySpec) -> Self {
        Self::named("simulated", topology)
    }

    /// Create a runtime with a custom diagnostic name
    pub fn named(name: impl Into<String>, topology: TopologySpec) -> Self {
        Self {
            name: name.into(),
            topology,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Topology being served
    pub fn topology(&self) -> &TopologySpec {
        &self.topology
    }

    fn register(&self, id: &DeviceId, spec: &DeviceSpec) -> Result<()> {
        self.registry
            .lock()
            .map_err(|_| ProbeError::runtime("device registry poisoned"))?
            .insert(id.clone(), spec.clone());
        Ok(())
    }

    fn lookup(&self, id: &DeviceId) -> Result<DeviceSpec> {
        self.registry
            .lock()
            .map_err(|_| ProbeError::runtime("device registry poisoned"))?
            .get(id)
            .cloned()
            .ok_or_else(|| ProbeError::InvalidDevice(format!("device {} was not created by this runtime", id)))
    }

    fn materialize(id: DeviceId, spec: &DeviceSpec, partition_type: PartitionType) -> Device {
        Device::new(id, spec.name.clone(), spec.backend)
            .with_type(spec.device_type)
            .with_partition_properties(spec.partition_properties.clone())
            .with_affinity_domains(spec.affinity_domains.clone())
            .with_partition_type(partition_type)
            .with_max_sub_devices(spec.effective_max_sub_devices())
            .with_compute_units(spec.compute_units)
            .with_global_mem_size(spec.global_mem_size)
            .with_cpus(spec.cpus.clone())
    }

    /// Specs of the sub-devices `partition` produces on `spec`
    fn split(device: &Device, spec: &DeviceSpec, partition: &Partition) -> Result<Vec<DeviceSpec>> {
        match partition {
            Partition::ByAffinityDomain(domain) => {
                if !spec.accepts_affinity_domain(*domain) {
                    return Err(ProbeError::not_supported(
                        device.id().as_str(),
                        format!("affinity domain {}", domain),
                    ));
                }
                Ok(spec.sub_devices.clone())
            }
            Partition::ByCslice => {
                let slices = spec.compute_slices;
                let units = (spec.compute_units / slices.max(1)).max(1);
                let share = spec.global_mem_size / u64::from(slices.max(1));
                Ok((0..slices)
                    .map(|i| {
                        let cpus = chunk(&spec.cpus, slices as usize, i as usize);
                        spec.derive_leaf(format!("{} (cslice {})", spec.name, i), units, cpus, share)
                    })
                    .collect())
            }
            Partition::Equally(per_device) => {
                if *per_device == 0 {
                    return Err(ProbeError::runtime("partition_equally requires a non-zero compute-unit count"));
                }
                let count = spec.compute_units / per_device;
                if count == 0 {
                    return Err(ProbeError::runtime(format!(
                        "cannot split {} compute units into groups of {}",
                        spec.compute_units, per_device
                    )));
                }
                Ok(Self::split_by_counts(spec, &vec![*per_device; count as usize]))
            }
            Partition::ByCounts(counts) => {
                if counts.is_empty() || counts.contains(&0) {
                    return Err(ProbeError::runtime("partition_by_counts requires non-zero counts"));
                }
                let requested: u32 = counts.iter().sum();
                if requested > spec.compute_units {
                    return Err(ProbeError::runtime(format!(
                        "requested {} compute units, device has {}",
                        requested, spec.compute_units
                    )));
                }
                Ok(Self::split_by_counts(spec, counts))
            }
        }
    }

    fn split_by_counts(spec: &DeviceSpec, counts: &[u32]) -> Vec<DeviceSpec> {
        let total = u64::from(spec.compute_units.max(1));
        let mut offset = 0usize;
        counts
            .iter()
            .enumerate()
            .map(|(i, &units)| {
                let cpus = spec.cpus.iter().skip(offset).take(units as usize).copied().collect();
                offset += units as usize;
                let share = spec.global_mem_size * u64::from(units) / total;
                spec.derive_leaf(format!("{} (part {})", spec.name, i), units, cpus, share)
            })
            .collect()
    }
}

/// The `index`-th of `parts` contiguous chunks of `items`
fn chunk(items: &[usize], parts: usize, index: usize) -> Vec<usize> {
    if items.is_empty() || parts == 0 {
        return Vec::new();
    }
    let size = (items.len() + parts - 1) / parts;
    items.iter().skip(index * size).take(size).copied().collect()
}

impl DeviceRuntime for SimulatedRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_devices(&self) -> Result<Vec<Device>> {
        if let Some(ref message) = self.topology.enumeration_error {
            return Err(ProbeError::runtime(message.clone()));
        }

        let mut devices = Vec::with_capacity(self.topology.devices.len());
        for (index, spec) in self.topology.devices.iter().enumerate() {
            let id = DeviceId::root(index);
            self.register(&id, spec)?;
            devices.push(Self::materialize(id, spec, PartitionType::NoPartition));
        }

        tracing::debug!(runtime = %self.name, count = devices.len(), "Enumerated root devices");
        Ok(devices)
    }

    fn create_sub_devices(&self, device: &Device, partition: &Partition) -> Result<Vec<Device>> {
        let spec = self.lookup(device.id())?;

        if let Some(message) = spec.partition_error.as_ref() {
            return Err(ProbeError::runtime(message.clone()));
        }

        if !spec.partition_properties.contains(&partition.property()) {
            return Err(ProbeError::not_supported(device.id().as_str(), partition.property().name()));
        }

        let children = Self::split(device, &spec, partition)?;
        let partition_type = PartitionType::from(partition);

        let mut sub_devices = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            let id = device.id().child(partition, index);
            self.register(&id, child)?;
            sub_devices.push(Self::materialize(id, child, partition_type));
        }

        tracing::debug!(
            device = %device.id(),
            %partition,
            count = sub_devices.len(),
            "Created sub-devices"
        );
        Ok(sub_devices)
    }
}
