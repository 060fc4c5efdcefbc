//! NUMA topology detection and thread pinning
//!
//! The host runtime exposes one sub-device per NUMA node, so the layout
//! read here decides how the host CPU device partitions by affinity
//! domain. Queue workers for host devices are pinned to the CPUs of the
//! node they run on.

/// NUMA node information
#[derive(Debug, Clone, PartialEq)]
pub struct NumaNode {
    /// Node ID
    pub id: usize,
    /// CPUs belonging to this node
    pub cpus: Vec<usize>,
    /// Total memory in bytes
    pub memory_total: u64,
}

/// NUMA topology information
#[derive(Debug, Clone)]
pub struct NumaTopology {
    /// NUMA nodes, sorted by ID
    pub nodes: Vec<NumaNode>,
    /// Total CPUs across all nodes
    pub total_cpus: usize,
    /// Is NUMA actually available/meaningful
    pub is_numa_system: bool,
}

impl Default for NumaTopology {
    fn default() -> Self {
        Self::detect()
    }
}

impl NumaTopology {
    /// Detect NUMA topology from the system
    #[cfg(target_os = "linux")]
    pub fn detect() -> Self {
        Self::from_sysfs(std::path::Path::new("/sys/devices/system/node"))
    }

    /// Single-node topology on platforms without sysfs
    #[cfg(not(target_os = "linux"))]
    pub fn detect() -> Self {
        Self::from_nodes(Vec::new())
    }

    /// Read the topology from a sysfs-style node directory
    pub fn from_sysfs(root: &std::path::Path) -> Self {
        let mut nodes = Vec::new();

        if let Ok(entries) = std::fs::read_dir(root) {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();

                if let Some(id) = name_str.strip_prefix("node").and_then(|n| n.parse::<usize>().ok()) {
                    let node_path = entry.path();
                    nodes.push(NumaNode {
                        id,
                        cpus: Self::read_node_cpus(&node_path),
                        memory_total: Self::read_node_memory(&node_path),
                    });
                }
            }
        }

        Self::from_nodes(nodes)
    }

    /// Build a topology from explicit nodes
    ///
    /// An empty node list falls back to a single node holding every CPU.
    pub fn from_nodes(mut nodes: Vec<NumaNode>) -> Self {
        nodes.sort_by_key(|n| n.id);
        let is_numa_system = nodes.len() > 1;

        if nodes.is_empty() {
            nodes.push(NumaNode {
                id: 0,
                cpus: (0..num_cpus::get()).collect(),
                memory_total: 0,
            });
        }

        let total_cpus = nodes.iter().map(|n| n.cpus.len()).sum();

        Self {
            nodes,
            total_cpus,
            is_numa_system,
        }
    }

    /// Number of NUMA nodes
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Total memory across all nodes
    pub fn memory_total(&self) -> u64 {
        self.nodes.iter().map(|n| n.memory_total).sum()
    }

    fn read_node_cpus(node_path: &std::path::Path) -> Vec<usize> {
        std::fs::read_to_string(node_path.join("cpulist"))
            .map(|content| Self::parse_cpu_list(content.trim()))
            .unwrap_or_default()
    }

    fn read_node_memory(node_path: &std::path::Path) -> u64 {
        let content = match std::fs::read_to_string(node_path.join("meminfo")) {
            Ok(content) => content,
            Err(_) => return 0,
        };

        content
            .lines()
            .find(|line| line.contains("MemTotal:"))
            .and_then(Self::parse_meminfo_value)
            .map(|kb| kb * 1024)
            .unwrap_or(0)
    }

    fn parse_meminfo_value(line: &str) -> Option<u64> {
        line.split_whitespace()
            .nth(3) // Format: "Node X MemTotal: 12345 kB"
            .and_then(|s| s.parse().ok())
    }

    /// Parse CPU list format (e.g., "0-3,8-11" -> [0,1,2,3,8,9,10,11])
    pub fn parse_cpu_list(s: &str) -> Vec<usize> {
        let mut cpus = Vec::new();

        for part in s.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                    cpus.extend(start..=end);
                }
            } else if let Ok(cpu) = part.parse::<usize>() {
                cpus.push(cpu);
            }
        }

        cpus
    }
}

/// Thread affinity helper
pub struct ThreadAffinity;

impl ThreadAffinity {
    /// Pin current thread to a set of CPUs (no-op for an empty set)
    ///
    /// CPU ids that do not fit in a `cpu_set_t` are rejected with
    /// `InvalidInput` and the thread is left unpinned.
    #[cfg(target_os = "linux")]
    pub fn pin_to_cpus(cpus: &[usize]) -> std::io::Result<()> {
        use std::mem::MaybeUninit;

        if cpus.is_empty() {
            return Ok(());
        }

        let limit = libc::CPU_SETSIZE as usize;
        if let Some(&cpu) = cpus.iter().find(|&&cpu| cpu >= limit) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("CPU {} exceeds the affinity mask size of {}", cpu, limit),
            ));
        }

        unsafe {
            let mut set = MaybeUninit::<libc::cpu_set_t>::zeroed().assume_init();
            libc::CPU_ZERO(&mut set);

            for &cpu in cpus {
                libc::CPU_SET(cpu, &mut set);
            }

            let result = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);

            if result == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        }
    }

    /// Pinning is a no-op on this platform
    #[cfg(not(target_os = "linux"))]
    pub fn pin_to_cpus(_cpus: &[usize]) -> std::io::Result<()> {
        Ok(())
    }
}
