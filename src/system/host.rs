//! Host topology
//!
//! Describes the machine the probe runs on as a [`TopologySpec`]: one CPU
//! root device that splits equally, by counts, and (on multi-node
//! machines) by NUMA affinity domain into one sub-device per node.

use crate::runtime::{Backend, DeviceSpec, DeviceType, PartitionProperty, TopologySpec};
use crate::system::numa::NumaTopology;
use sysinfo::System;

/// Host CPU facts used to name and size the host device
#[derive(Debug, Clone)]
pub struct HostCpu {
    /// CPU brand string
    pub brand: String,
    /// Total memory in bytes
    pub memory_total: u64,
}

impl HostCpu {
    /// Collect CPU information
    pub fn collect() -> Self {
        let sys = System::new_all();

        let brand = sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Host CPU".to_string());

        Self {
            brand,
            memory_total: sys.total_memory(),
        }
    }
}

/// Build the topology of the running host
pub fn host_topology() -> TopologySpec {
    build_host_topology(&HostCpu::collect(), &NumaTopology::detect())
}

/// Build a host topology from collected facts
pub fn build_host_topology(cpu: &HostCpu, numa: &NumaTopology) -> TopologySpec {
    let all_cpus: Vec<usize> = numa.nodes.iter().flat_map(|n| n.cpus.iter().copied()).collect();
    let memory = if numa.memory_total() > 0 {
        numa.memory_total()
    } else {
        cpu.memory_total
    };

    let mut root = DeviceSpec::new(cpu.brand.clone(), Backend::NativeCpu)
        .with_type(DeviceType::Cpu)
        .with_compute_units(all_cpus.len().max(1) as u32);
    root.global_mem_size = memory;
    root.cpus = all_cpus;

    if numa.is_numa_system {
        let nodes = numa
            .nodes
            .iter()
            .map(|node| {
                let mut spec = DeviceSpec::new(format!("{} (NUMA node {})", cpu.brand, node.id), Backend::NativeCpu)
                    .with_type(DeviceType::Cpu)
                    .with_property(PartitionProperty::PartitionEqually)
                    .with_property(PartitionProperty::PartitionByCounts)
                    .with_compute_units(node.cpus.len().max(1) as u32);
                spec.global_mem_size = node.memory_total;
                spec.cpus = node.cpus.clone();
                spec
            })
            .collect();
        root = root.with_numa(nodes);
    }

    root = root
        .with_property(PartitionProperty::PartitionEqually)
        .with_property(PartitionProperty::PartitionByCounts);

    TopologySpec::new(vec![root])
}
