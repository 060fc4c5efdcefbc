//! Device runtime model
//!
//! The probes talk to the compute runtime only through [`DeviceRuntime`]:
//! enumerate root devices, partition a device, build a context and a
//! queue. [`SimulatedRuntime`] implements it over a [`TopologySpec`],
//! either loaded from a file or derived from the host.

mod device;
mod queue;
mod simulated;
mod topology;

pub use device::*;
pub use queue::*;
pub use simulated::SimulatedRuntime;
pub use topology::{DeviceSpec, TopologySpec};

use crate::error::Result;

/// Capability interface of a device/queue runtime
pub trait DeviceRuntime {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Enumerate root devices
    fn get_devices(&self) -> Result<Vec<Device>>;

    /// Partition `device`, returning the created sub-devices
    ///
    /// Requests for a scheme the device does not report fail with
    /// [`ProbeError::FeatureNotSupported`](crate::error::ProbeError::FeatureNotSupported).
    fn create_sub_devices(&self, device: &Device, partition: &Partition) -> Result<Vec<Device>>;

    /// Build an execution context spanning `devices`
    fn create_context(&self, devices: &[Device], handler: AsyncHandler) -> Result<Context> {
        Context::new(devices.to_vec(), handler)
    }

    /// Create a queue bound to `device` within `context`
    fn create_queue(&self, context: &Context, device: &Device) -> Result<Queue> {
        Queue::new(context, device)
    }
}

impl<R: DeviceRuntime + ?Sized> DeviceRuntime for &R {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get_devices(&self) -> Result<Vec<Device>> {
        (**self).get_devices()
    }

    fn create_sub_devices(&self, device: &Device, partition: &Partition) -> Result<Vec<Device>> {
        (**self).create_sub_devices(device, partition)
    }

    fn create_context(&self, devices: &[Device], handler: AsyncHandler) -> Result<Context> {
        (**self).create_context(devices, handler)
    }

    fn create_queue(&self, context: &Context, device: &Device) -> Result<Queue> {
        (**self).create_queue(context, device)
    }
}
