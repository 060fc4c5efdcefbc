//! # xpuprobe - Device Partitioning Probe
//!
//! xpuprobe exercises the device-partitioning and queue-submission surface
//! of a heterogeneous compute runtime. It enumerates devices, partitions
//! them into sub-devices (by NUMA affinity domain or compute slice), and
//! optionally runs a trivial task on a queue bound to a sub-sub-device.
//!
//! ## Features
//!
//! - **Device Selection**: name filter, single-backend constraint,
//!   NUMA and compute-slice partitioning
//! - **Queue Bring-up**: two-level NUMA split followed by a single task
//! - **Simulated Runtime**: JSON topology descriptions with failure injection
//! - **Host Runtime**: topology derived from the machine's NUMA layout
//!
//! ## Quick Start
//!
//! ```no_run
//! use xpuprobe::config::SelectionConfig;
//! use xpuprobe::report::Reporter;
//! use xpuprobe::runtime::SimulatedRuntime;
//! use xpuprobe::select::identify_devices;
//! use xpuprobe::system::host_topology;
//!
//! let runtime = SimulatedRuntime::named("host", host_topology());
//! let config = SelectionConfig::from_env();
//! let mut out = Reporter::stdout(config.verbose);
//!
//! let selected = identify_devices(&runtime, &config, &mut out).unwrap();
//! println!("Selected {} devices", selected.len());
//! ```
//!
//! ## Synthetic Topologies
//!
//! ```
//! use xpuprobe::bringup::run_queue_bringup;
//! use xpuprobe::report::Reporter;
//! use xpuprobe::runtime::{AsyncHandler, Backend, DeviceSpec, SimulatedRuntime, TopologySpec};
//!
//! let core = DeviceSpec::new("GPU", Backend::LevelZero);
//! let tile = DeviceSpec::new("GPU", Backend::LevelZero).with_numa(vec![core.clone(), core]);
//! let gpu = DeviceSpec::new("GPU", Backend::LevelZero).with_numa(vec![tile]);
//!
//! let runtime = SimulatedRuntime::new(TopologySpec::new(vec![gpu]));
//! let mut out = Reporter::capture(false);
//! let outcome = run_queue_bringup(&runtime, AsyncHandler::ignore(), &mut out).unwrap();
//! assert_eq!(outcome.value, Some(2.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bringup;
pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod runtime;
pub mod select;
pub mod system;

// Re-export commonly used types
pub use config::SelectionConfig;
pub use error::{ProbeError, Result};
pub use runtime::{Device, DeviceRuntime, SimulatedRuntime, TopologySpec};
pub use select::{identify_devices, SelectedDevices};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use xpuprobe::prelude::*;
    //! ```

    pub use crate::bringup::{numa_sub_sub_devices, run_queue_bringup, BringupOutcome};
    pub use crate::config::SelectionConfig;
    pub use crate::error::{ProbeError, Result};
    pub use crate::report::Reporter;
    pub use crate::runtime::{
        AffinityDomain, AsyncHandler, Backend, Device, DeviceRuntime, DeviceSpec, Partition,
        PartitionProperty, SimulatedRuntime, TopologySpec,
    };
    pub use crate::select::{identify_devices, SelectedDevices};
    pub use crate::system::host_topology;
}
