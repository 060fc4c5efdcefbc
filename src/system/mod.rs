//! Host system detection
//!
//! Provides the NUMA layout and CPU facts the host runtime is built from.

mod host;
pub mod numa;

pub use host::{build_host_topology, host_topology, HostCpu};
pub use numa::{NumaNode, NumaTopology, ThreadAffinity};
