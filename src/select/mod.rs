//! Device selection
//!
//! Walks the runtime's root devices and collects the leaf devices a
//! workload would be spread over: whole devices, NUMA sub-devices, or
//! compute slices of those sub-devices, depending on the
//! [`SelectionConfig`].
//!
//! The scheme scan is first-match: schemes are visited in the order the
//! device reports them, every scheme seen before
//! `partition_by_affinity_domain` accepts the root device itself, and the
//! scan stops once the affinity split has been handled.

use crate::config::SelectionConfig;
use crate::error::Result;
use crate::report::Reporter;
use crate::runtime::{AffinityDomain, Backend, Device, DeviceRuntime, Partition, PartitionProperty};
use serde::Serialize;
use std::io::Write;

/// Ordered, append-only list of selected leaf devices
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectedDevices {
    devices: Vec<Device>,
}

impl SelectedDevices {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend fixed by the first accepted device
    pub fn backend(&self) -> Option<Backend> {
        self.devices.first().map(|d| d.backend())
    }

    /// Check whether `device` may join the list under the backend constraint
    pub fn admits(&self, device: &Device) -> bool {
        self.backend().map_or(true, |backend| backend == device.backend())
    }

    /// Append a device
    pub fn push(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Number of selected devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check whether nothing was selected
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate in selection order
    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }

    /// Selected devices as a slice
    pub fn as_slice(&self) -> &[Device] {
        &self.devices
    }

    /// Consume into the device list
    pub fn into_vec(self) -> Vec<Device> {
        self.devices
    }
}

impl<'a> IntoIterator for &'a SelectedDevices {
    type Item = &'a Device;
    type IntoIter = std::slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

/// Select leaf devices down to compute-slice granularity
///
/// Runtime errors abort the walk and are returned as-is; no partial list
/// is produced.
pub fn identify_devices<R, W>(
    runtime: &R,
    config: &SelectionConfig,
    out: &mut Reporter<W>,
) -> Result<SelectedDevices>
where
    R: DeviceRuntime + ?Sized,
    W: Write,
{
    let all_devices = runtime.get_devices()?;
    let mut selected = SelectedDevices::new();

    out.detail(format_args!("XPU_DEVICE_NAME={}", config.device_name))?;
    out.detail(format_args!("Devices found:"))?;
    out.line(format_args!("Number of root devices = {}", all_devices.len()))?;

    for device in &all_devices {
        out.detail(format_args!(
            "* Device: {}, Backend: {}",
            device.name(),
            device.backend()
        ))?;

        if !device.name().contains(config.device_name.as_str()) {
            continue;
        }

        // Select devices with the same backend only
        if !selected.admits(device) {
            tracing::debug!(
                device = %device.id(),
                backend = %device.backend(),
                "Skipping device with foreign backend"
            );
            continue;
        }

        let properties = device.partition_properties();
        if !config.use_subdevices || properties.is_empty() {
            selected.push(device.clone());
            continue;
        }

        for property in properties {
            if *property != PartitionProperty::PartitionByAffinityDomain {
                selected.push(device.clone());
                continue;
            }

            let subdevices =
                runtime.create_sub_devices(device, &Partition::ByAffinityDomain(AffinityDomain::Numa))?;
            out.line(format_args!("Number of subdevices = {}", subdevices.len()))?;

            for subdevice in subdevices {
                select_slices(runtime, subdevice, config, &mut selected, out)?;
            }
            break;
        }
    }

    tracing::info!(selected = selected.len(), "Device selection complete");
    Ok(selected)
}

/// Accept a sub-device, or its compute slices when it can be split
fn select_slices<R, W>(
    runtime: &R,
    subdevice: Device,
    config: &SelectionConfig,
    selected: &mut SelectedDevices,
    out: &mut Reporter<W>,
) -> Result<()>
where
    R: DeviceRuntime + ?Sized,
    W: Write,
{
    if !config.split_streams || subdevice.partition_properties().is_empty() {
        selected.push(subdevice);
        return Ok(());
    }

    if subdevice.supports(PartitionProperty::ExtIntelPartitionByCslice) {
        let slices = runtime.create_sub_devices(&subdevice, &Partition::ByCslice)?;
        out.line(format_args!("Number of compute slices = {}", slices.len()))?;
        for slice in slices {
            selected.push(slice);
        }
    } else {
        tracing::debug!(device = %subdevice.id(), "Sub-device cannot be split into compute slices");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::runtime::{DeviceSpec, SimulatedRuntime, TopologySpec};
    use proptest::prelude::*;

    fn config() -> SelectionConfig {
        SelectionConfig::default()
    }

    fn run(topology: TopologySpec, config: &SelectionConfig) -> (Result<SelectedDevices>, String) {
        let runtime = SimulatedRuntime::new(topology);
        let mut out = Reporter::capture(config.verbose);
        let result = identify_devices(&runtime, config, &mut out);
        (result, out.output())
    }

    fn ids(selected: &SelectedDevices) -> Vec<&str> {
        selected.iter().map(|d| d.id().as_str()).collect()
    }

    fn gpu(name: &str) -> DeviceSpec {
        DeviceSpec::new(name, Backend::LevelZero)
    }

    fn tile() -> DeviceSpec {
        gpu("Intel(R) Graphics tile")
    }

    #[test]
    fn test_unpartitionable_device_is_selected_once() {
        let (result, output) = run(TopologySpec::new(vec![gpu("Intel(R) Graphics")]), &config());
        let selected = result.unwrap();
        assert_eq!(ids(&selected), vec!["0"]);
        assert!(output.contains("Number of root devices = 1"));
        assert!(output.contains("* Device: Intel(R) Graphics, Backend: ext_oneapi_level_zero"));
    }

    #[test]
    fn test_numa_split_selects_subdevices_not_root() {
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics").with_numa(vec![tile(), tile()])]);
        let (result, output) = run(topology, &config());
        assert_eq!(ids(&result.unwrap()), vec!["0.0", "0.1"]);
        assert!(output.contains("Number of subdevices = 2"));
    }

    #[test]
    fn test_cslice_split_selects_slices() {
        let topology = TopologySpec::new(vec![
            gpu("Intel(R) Graphics").with_numa(vec![tile().with_cslices(2), tile().with_cslices(3)])
        ]);
        let (result, output) = run(topology, &config());
        assert_eq!(
            ids(&result.unwrap()),
            vec!["0.0.s0", "0.0.s1", "0.1.s0", "0.1.s1", "0.1.s2"]
        );
        assert!(output.contains("Number of compute slices = 2"));
        assert!(output.contains("Number of compute slices = 3"));
    }

    #[test]
    fn test_split_streams_disabled_keeps_subdevices() {
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics").with_numa(vec![tile().with_cslices(4)])]);
        let config = SelectionConfig {
            split_streams: false,
            ..config()
        };
        let (result, output) = run(topology, &config);
        assert_eq!(ids(&result.unwrap()), vec!["0.0"]);
        assert!(!output.contains("compute slices"));
    }

    #[test]
    fn test_subdevice_without_cslice_scheme_contributes_nothing() {
        let odd_tile = tile().with_property(PartitionProperty::PartitionEqually);
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics").with_numa(vec![odd_tile, tile()])]);
        let (result, _) = run(topology, &config());
        assert_eq!(ids(&result.unwrap()), vec!["0.1"]);
    }

    #[test]
    fn test_subdevices_disabled_selects_roots() {
        let topology = TopologySpec::new(vec![
            gpu("Intel(R) Graphics A").with_numa(vec![tile(), tile()]),
            gpu("Intel(R) Graphics B").with_numa(vec![tile()]),
        ]);
        let config = SelectionConfig {
            use_subdevices: false,
            ..config()
        };
        let (result, output) = run(topology, &config);
        assert_eq!(ids(&result.unwrap()), vec!["0", "1"]);
        assert!(!output.contains("subdevices"));
    }

    #[test]
    fn test_scheme_before_affinity_accepts_root_first() {
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics")
            .with_property(PartitionProperty::PartitionEqually)
            .with_numa(vec![tile()])]);
        let (result, _) = run(topology, &config());
        assert_eq!(ids(&result.unwrap()), vec!["0", "0.0"]);
    }

    #[test]
    fn test_scheme_without_affinity_accepts_root_per_scheme() {
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics")
            .with_property(PartitionProperty::PartitionEqually)
            .with_property(PartitionProperty::PartitionByCounts)]);
        let (result, _) = run(topology, &config());
        assert_eq!(ids(&result.unwrap()), vec!["0", "0"]);
    }

    #[test]
    fn test_name_filter_and_backend_constraint() {
        let topology = TopologySpec::new(vec![
            DeviceSpec::new("Intel(R) Xeon(R) Gold", Backend::Opencl),
            gpu("Intel(R) Graphics A"),
            DeviceSpec::new("Intel(R) Graphics A", Backend::Opencl),
            gpu("Intel(R) Graphics B"),
        ]);
        let (result, output) = run(topology, &config());
        let selected = result.unwrap();
        assert_eq!(ids(&selected), vec!["1", "3"]);
        assert_eq!(selected.backend(), Some(Backend::LevelZero));
        // Every root is listed in verbose mode, selected or not
        assert_eq!(output.matches("* Device:").count(), 4);
    }

    #[test]
    fn test_quiet_mode_prints_counts_only() {
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics").with_numa(vec![tile()])]);
        let config = SelectionConfig {
            verbose: false,
            ..config()
        };
        let (_, output) = run(topology, &config);
        assert_eq!(output, "Number of root devices = 1\nNumber of subdevices = 1\n");
    }

    #[test]
    fn test_enumeration_failure_returns_error() {
        let topology = TopologySpec::new(vec![gpu("Intel(R) Graphics")]).failing_enumeration("no platforms");
        let (result, output) = run(topology, &config());
        assert!(matches!(result, Err(ProbeError::Runtime(_))));
        assert!(output.is_empty());
    }

    #[test]
    fn test_partition_failure_aborts_walk() {
        let topology = TopologySpec::new(vec![
            gpu("Intel(R) Graphics")
                .with_numa(vec![tile()])
                .failing_partition("device lost"),
            gpu("Intel(R) Graphics"),
        ]);
        let (result, _) = run(topology, &config());
        assert!(result.is_err());
    }

    #[test]
    fn test_bundled_max1550_topology() {
        let topology = TopologySpec::from_json(include_str!("../../topologies/max1550.json")).unwrap();
        let (result, output) = run(topology, &config());
        let selected = result.unwrap();

        assert_eq!(selected.len(), 8);
        assert_eq!(selected.backend(), Some(Backend::LevelZero));
        assert_eq!(selected.as_slice()[7].id().as_str(), "0.1.s3");
        assert_eq!(selected.as_slice()[0].compute_units(), 128);
        assert!(output.contains("Number of root devices = 3"));
        assert_eq!(output.matches("Number of compute slices = 4").count(), 2);
    }

    fn arb_backend() -> impl Strategy<Value = Backend> {
        prop_oneof![
            Just(Backend::LevelZero),
            Just(Backend::Opencl),
            Just(Backend::Cuda),
        ]
    }

    fn arb_device() -> impl Strategy<Value = DeviceSpec> {
        (
            prop_oneof![Just("Graphics"), Just("Xeon"), Just("Data Center GPU")],
            arb_backend(),
            0usize..3,
            0u32..3,
        )
            .prop_map(|(name, backend, tiles, slices)| {
                let mut spec = DeviceSpec::new(name, backend);
                if tiles > 0 {
                    let tile = DeviceSpec::new(name, backend);
                    let tile = if slices > 0 { tile.with_cslices(slices) } else { tile };
                    spec = spec.with_numa(vec![tile; tiles]);
                }
                spec
            })
    }

    proptest! {
        #[test]
        fn prop_selected_devices_share_one_backend(
            devices in prop::collection::vec(arb_device(), 0..6),
            use_subdevices in any::<bool>(),
        ) {
            let config = SelectionConfig { use_subdevices, verbose: false, ..SelectionConfig::default() };
            let (result, _) = run(TopologySpec::new(devices), &config);
            let selected = result.unwrap();
            if let Some(backend) = selected.backend() {
                prop_assert!(selected.iter().all(|d| d.backend() == backend));
            }
        }

        #[test]
        fn prop_disabled_partitioning_counts_matching_roots(
            devices in prop::collection::vec(arb_device(), 0..6),
        ) {
            let config = SelectionConfig { use_subdevices: false, verbose: false, ..SelectionConfig::default() };
            let first = devices.iter().find(|d| d.name.contains("Graphics")).map(|d| d.backend);
            let expected = devices
                .iter()
                .filter(|d| d.name.contains("Graphics") && Some(d.backend) == first)
                .count();

            let (result, _) = run(TopologySpec::new(devices), &config);
            prop_assert_eq!(result.unwrap().len(), expected);
        }

        #[test]
        fn prop_no_name_match_selects_nothing(
            devices in prop::collection::vec(arb_device(), 0..6),
        ) {
            let config = SelectionConfig {
                device_name: "Radeon".to_string(),
                verbose: false,
                ..SelectionConfig::default()
            };
            let (result, _) = run(TopologySpec::new(devices), &config);
            let selected = result.unwrap();
            prop_assert!(selected.is_empty());
            prop_assert!(selected.backend().is_none());
        }

        #[test]
        fn prop_unpartitionable_devices_appear_once(
            backends in prop::collection::vec(Just(Backend::LevelZero), 0..6),
        ) {
            let devices: Vec<DeviceSpec> = backends
                .iter()
                .map(|b| DeviceSpec::new("Graphics", *b))
                .collect();
            let count = devices.len();
            let (result, _) = run(TopologySpec::new(devices), &SelectionConfig { verbose: false, ..SelectionConfig::default() });
            let selected = result.unwrap();
            let mut seen: Vec<&str> = selected.iter().map(|d| d.id().as_str()).collect();
            seen.dedup();
            prop_assert_eq!(seen.len(), count);
            prop_assert_eq!(selected.len(), count);
        }
    }
}
