//! Command dispatch for the xpuprobe binary
//!
//! [`run`] executes a parsed command line against the selected runtime and
//! [`exit_code`] turns its result into the process exit status, printing
//! the diagnostic the failing command is expected to report.

use crate::bringup::run_queue_bringup;
use crate::config::{CliArgs, Commands, SelectionConfig};
use crate::error::Result;
use crate::report::Reporter;
use crate::runtime::{AsyncHandler, DeviceRuntime, SimulatedRuntime, TopologySpec};
use crate::select::identify_devices;
use crate::system::host_topology;
use std::io::Write;

/// Exit status of a successful run
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status when the runtime reported an error
pub const EXIT_FAILURE: i32 = 1;

/// Execute the command in `args`, writing its output to `out`
pub fn run<W: Write>(args: &CliArgs, out: &mut W) -> Result<()> {
    let runtime = load_runtime(args)?;

    match &args.command {
        Commands::Cslice { selection, json } => {
            cmd_cslice(&runtime, &SelectionConfig::from_cli(selection), *json, out)
        }
        Commands::Queue => cmd_queue(&runtime, out),
        Commands::List => cmd_list(&runtime, out),
        Commands::Topology => cmd_topology(&runtime, out),
    }
}

/// Map the result of [`run`] to an exit status
///
/// Failures print `Sync runtime exception in identify_devices(): ...` for
/// `cslice` and `Runtime exception caught: ...` for every other command.
pub fn exit_code<W: Write>(command: &Commands, result: &Result<()>, out: &mut W) -> i32 {
    let code = match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            let written = match command {
                Commands::Cslice { .. } => writeln!(out, "Sync runtime exception in identify_devices(): {}", e),
                _ => writeln!(out, "Runtime exception caught: {}", e),
            };
            if let Err(io_err) = written {
                tracing::warn!("Could not print diagnostic: {}", io_err);
            }
            EXIT_FAILURE
        }
    };

    if let Err(e) = out.flush() {
        tracing::warn!("Could not flush output: {}", e);
    }
    code
}

/// Runtime serving `--topology`, or the host machine when none is given
pub fn load_runtime(args: &CliArgs) -> Result<SimulatedRuntime> {
    match &args.topology {
        Some(path) => {
            tracing::info!("Loading topology from {:?}", path);
            let topology = TopologySpec::load(path)?;
            Ok(SimulatedRuntime::named(path.display().to_string(), topology))
        }
        None => Ok(SimulatedRuntime::named("host", host_topology())),
    }
}

fn cmd_cslice<W: Write>(runtime: &SimulatedRuntime, config: &SelectionConfig, json: bool, out: &mut W) -> Result<()> {
    let selected = {
        let mut reporter = Reporter::new(&mut *out, config.verbose);
        identify_devices(runtime, config, &mut reporter)?
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&selected)?)?;
    } else if config.verbose {
        writeln!(out, "Selected devices = {}", selected.len())?;
        for device in &selected {
            writeln!(out, "  {}", device)?;
        }
    }

    Ok(())
}

fn cmd_queue<W: Write>(runtime: &SimulatedRuntime, out: &mut W) -> Result<()> {
    let outcome = {
        let mut reporter = Reporter::new(&mut *out, true);
        run_queue_bringup(runtime, AsyncHandler::logging(), &mut reporter)?
    };

    if let (Some(value), Some(device)) = (outcome.value, outcome.leaves.first()) {
        writeln!(out, "Task wrote {} on {}", value, device)?;
    }

    Ok(())
}

fn cmd_list<W: Write>(runtime: &SimulatedRuntime, out: &mut W) -> Result<()> {
    let devices = runtime.get_devices()?;
    writeln!(out, "Runtime: {}", runtime.name())?;
    writeln!(out, "Number of root devices = {}", devices.len())?;

    for device in &devices {
        writeln!(out)?;
        writeln!(out, "{}", device)?;
        writeln!(out, "  Type:            {:?}", device.device_type())?;
        writeln!(out, "  Compute units:   {}", device.compute_units())?;
        if device.global_mem_size() > 0 {
            writeln!(
                out,
                "  Global memory:   {}",
                humansize::format_size(device.global_mem_size(), humansize::BINARY)
            )?;
        }
        writeln!(out, "  Max sub-devices: {}", device.max_sub_devices())?;

        let properties: Vec<&str> = device.partition_properties().iter().map(|p| p.name()).collect();
        writeln!(
            out,
            "  Partitioning:    {}",
            if properties.is_empty() { "none".to_string() } else { properties.join(", ") }
        )?;

        if !device.affinity_domains().is_empty() {
            let domains: Vec<&str> = device.affinity_domains().iter().map(|d| d.name()).collect();
            writeln!(out, "  Affinity:        {}", domains.join(", "))?;
        }
    }

    Ok(())
}

fn cmd_topology<W: Write>(runtime: &SimulatedRuntime, out: &mut W) -> Result<()> {
    writeln!(out, "{}", runtime.topology().to_json_pretty()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Backend, DeviceSpec};
    use clap::Parser;
    use tempfile::TempDir;

    fn write_topology(dir: &TempDir, topology: &TopologySpec) -> String {
        let path = dir.path().join("topology.json");
        topology.save(&path).unwrap();
        path.display().to_string()
    }

    fn execute(argv: &[&str]) -> (i32, String) {
        let args = CliArgs::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        let result = run(&args, &mut out);
        let code = exit_code(&args.command, &result, &mut out);
        (code, String::from_utf8_lossy(&out).into_owned())
    }

    const MAX1550: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/topologies/max1550.json");

    fn two_level_gpu() -> DeviceSpec {
        let core = DeviceSpec::new("GPU", Backend::LevelZero);
        let tile = DeviceSpec::new("GPU", Backend::LevelZero).with_numa(vec![core.clone(), core]);
        DeviceSpec::new("GPU", Backend::LevelZero).with_numa(vec![tile])
    }

    #[test]
    fn test_cslice_success_exits_zero() {
        let (code, output) = execute(&[
            "xpuprobe",
            "--topology",
            MAX1550,
            "cslice",
            "--verbose",
            "0",
            "--json",
        ]);
        assert_eq!(code, EXIT_SUCCESS);
        assert!(output.contains("Number of compute slices = 4"));
        assert!(output.contains("\"0.1.s3\""));
    }

    #[test]
    fn test_empty_walk_exits_zero() {
        let dir = TempDir::new().unwrap();
        let path = write_topology(&dir, &TopologySpec::new(vec![DeviceSpec::new("GPU", Backend::LevelZero)]));

        let (code, output) = execute(&["xpuprobe", "--topology", &path, "queue"]);
        assert_eq!(code, EXIT_SUCCESS);
        assert!(output.is_empty());

        let (code, output) = execute(&[
            "xpuprobe",
            "--topology",
            &path,
            "cslice",
            "--verbose",
            "1",
            "--device-name",
            "Nothing",
        ]);
        assert_eq!(code, EXIT_SUCCESS);
        assert!(output.contains("Number of root devices = 1"));
        assert!(output.contains("Selected devices = 0"));
    }

    #[test]
    fn test_enumeration_failure_exits_one_with_cslice_diagnostic() {
        let dir = TempDir::new().unwrap();
        let path = write_topology(&dir, &TopologySpec::new(vec![two_level_gpu()]).failing_enumeration("no driver"));

        let (code, output) = execute(&["xpuprobe", "--topology", &path, "cslice"]);
        assert_eq!(code, EXIT_FAILURE);
        assert!(output.contains("Sync runtime exception in identify_devices(): Runtime error: no driver"));
    }

    #[test]
    fn test_partition_failure_exits_one_with_queue_diagnostic() {
        let dir = TempDir::new().unwrap();
        let path = write_topology(&dir, &TopologySpec::new(vec![two_level_gpu().failing_partition("device lost")]));

        let (code, output) = execute(&["xpuprobe", "--topology", &path, "queue"]);
        assert_eq!(code, EXIT_FAILURE);
        assert!(output.contains("Runtime exception caught: Runtime error: device lost"));
    }

    #[test]
    fn test_queue_success_reports_task() {
        let dir = TempDir::new().unwrap();
        let path = write_topology(&dir, &TopologySpec::new(vec![two_level_gpu()]));

        let (code, output) = execute(&["xpuprobe", "--topology", &path, "queue"]);
        assert_eq!(code, EXIT_SUCCESS);
        assert!(output.contains("Created sub-sub-device queue"));
        assert!(output.contains("Task wrote 2 on [0.0.0] GPU"));
    }

    #[test]
    fn test_missing_topology_file_exits_one() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json").display().to_string();

        let (code, output) = execute(&["xpuprobe", "--topology", &missing, "list"]);
        assert_eq!(code, EXIT_FAILURE);
        assert!(output.starts_with("Runtime exception caught: "));
    }

    #[test]
    fn test_list_and_topology_commands() {
        let (code, output) = execute(&["xpuprobe", "--topology", MAX1550, "list"]);
        assert_eq!(code, EXIT_SUCCESS);
        assert!(output.contains("Partitioning:    partition_by_affinity_domain"));
        assert!(output.contains("Global memory:"));

        let (code, output) = execute(&["xpuprobe", "--topology", MAX1550, "topology"]);
        assert_eq!(code, EXIT_SUCCESS);
        assert!(TopologySpec::from_json(&output).is_ok());
    }
}
