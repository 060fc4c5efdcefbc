//! Sub-sub-device queue bring-up
//!
//! Splits every partitionable root device by NUMA domain, splits its first
//! sub-device by NUMA domain again, and runs a single task on a queue bound
//! to the first resulting sub-sub-device.

use crate::error::{ProbeError, Result};
use crate::report::Reporter;
use crate::runtime::{AffinityDomain, AsyncHandler, Buffer, Device, DeviceRuntime, Partition, PartitionType};
use serde::Serialize;
use std::io::Write;

/// Value the bring-up task stores in its buffer
pub const TASK_SCALAR: f32 = 2.0;

/// Initial buffer contents
pub const INITIAL_VALUE: f32 = 1.0;

const NUMA: Partition = Partition::ByAffinityDomain(AffinityDomain::Numa);

/// Result of a bring-up run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BringupOutcome {
    /// Sub-sub-devices found by the NUMA walk
    pub leaves: Vec<Device>,
    /// Whether a task was submitted
    pub submitted: bool,
    /// Buffer value after the task completed
    pub value: Option<f32>,
}

impl BringupOutcome {
    fn skipped(leaves: Vec<Device>) -> Self {
        Self {
            leaves,
            submitted: false,
            value: None,
        }
    }
}

/// Split root devices by NUMA domain twice
///
/// Only sub-device 0 of each root is split again, and the list from the
/// last root that succeeds replaces earlier ones. Host devices and devices
/// reporting no sub-devices are skipped; an unsupported partition skips
/// the device, any other runtime error is returned.
pub fn numa_sub_sub_devices<R, W>(runtime: &R, out: &mut Reporter<W>) -> Result<Vec<Device>>
where
    R: DeviceRuntime + ?Sized,
    W: Write,
{
    let devices = runtime.get_devices()?;
    let mut sub_sub_devices = Vec::new();

    for device in &devices {
        if device.is_host() {
            continue;
        }

        if device.partition_type() != PartitionType::NoPartition {
            return Err(ProbeError::runtime(format!(
                "root device {} reports partition type {:?}",
                device.id(),
                device.partition_type()
            )));
        }

        if device.max_sub_devices() == 0 {
            continue;
        }

        match split_twice(runtime, device, out) {
            Ok(Some(found)) => sub_sub_devices = found,
            Ok(None) => {}
            Err(e) if e.is_feature_not_supported() => {
                tracing::debug!(device = %device.id(), "Skipping device: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(sub_sub_devices)
}

fn split_twice<R, W>(runtime: &R, device: &Device, out: &mut Reporter<W>) -> Result<Option<Vec<Device>>>
where
    R: DeviceRuntime + ?Sized,
    W: Write,
{
    let subdevices = runtime.create_sub_devices(device, &NUMA)?;
    out.line(format_args!(
        "Created {} subdevices using partition by numa affinity domain scheme.",
        subdevices.len()
    ))?;

    let first = match subdevices.first() {
        Some(first) => first,
        None => return Ok(None),
    };

    let sub_sub_devices = runtime.create_sub_devices(first, &NUMA)?;
    out.line(format_args!(
        "Created {} sub-subdevices from subdevice 0 using partition by numa affinity domain scheme.",
        sub_sub_devices.len()
    ))?;

    Ok(Some(sub_sub_devices))
}

/// Run the NUMA walk and, if it found devices, one task on the first
///
/// An empty walk is not an error: the outcome reports that nothing was
/// submitted.
pub fn run_queue_bringup<R, W>(runtime: &R, handler: AsyncHandler, out: &mut Reporter<W>) -> Result<BringupOutcome>
where
    R: DeviceRuntime + ?Sized,
    W: Write,
{
    let leaves = numa_sub_sub_devices(runtime, out)?;
    let first = match leaves.first() {
        Some(first) => first.clone(),
        None => {
            tracing::info!("No sub-sub-devices found, skipping task submission");
            return Ok(BringupOutcome::skipped(leaves));
        }
    };

    let context = runtime.create_context(&leaves, handler)?;
    let queue = runtime.create_queue(&context, &first)?;
    out.line(format_args!("Created sub-sub-device queue"))?;

    let buffer = Buffer::from_slice(&[INITIAL_VALUE]);
    let acc = buffer.read_write();
    let event = queue.submit(move || acc.set(0, TASK_SCALAR))?;
    event.wait()?;

    let value = buffer.to_vec()?.first().copied();
    tracing::info!(device = %first.id(), ?value, "Task completed");

    Ok(BringupOutcome {
        leaves,
        submitted: true,
        value,
    })
}
