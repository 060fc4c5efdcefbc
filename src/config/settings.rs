//! Configuration settings for xpuprobe
//!
//! Defines the CLI arguments, the selection knobs and their environment
//! variable defaults.

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable enabling the sub-device partition step
pub const ENV_USE_SUBDEVICES: &str = "XPU_USE_SUBDEVICES";
/// Environment variable enabling the compute-slice split step
pub const ENV_SPLIT_STREAMS: &str = "XPU_SPLIT_STREAMS";
/// Environment variable enabling diagnostic printing
pub const ENV_VERBOSE: &str = "XPU_VERBOSE";
/// Environment variable holding the device name filter
pub const ENV_DEVICE_NAME: &str = "XPU_DEVICE_NAME";
/// Environment variable pointing at a topology file
pub const ENV_TOPOLOGY: &str = "XPU_TOPOLOGY";

/// Default device name filter
pub const DEFAULT_DEVICE_NAME: &str = "Graphics";

/// xpuprobe - Device partitioning and queue bring-up probe
#[derive(Parser, Debug, Clone)]
#[command(name = "xpuprobe")]
#[command(author = "xpuprobe Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Probe device partitioning and queue submission of a compute runtime")]
#[command(long_about = r#"
xpuprobe enumerates compute devices, partitions them into sub-devices
(by NUMA affinity domain or by compute slice) and optionally submits a
trivial task to a queue bound to the resulting sub-sub-devices.

Without --topology the host machine is probed; with --topology a JSON
topology description is served by the simulated runtime.

Examples:
  xpuprobe cslice                                 # Compute-slice walk
  XPU_DEVICE_NAME=Max xpuprobe cslice --json      # Filter and print JSON
  xpuprobe --topology pvc.json queue              # NUMA walk + queue
  xpuprobe topology > host.json                   # Dump host topology
"#)]
pub struct CliArgs {
    /// JSON topology description to serve instead of the host
    #[arg(long, global = true, env = ENV_TOPOLOGY, value_name = "FILE")]
    pub topology: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Select leaf devices down to compute slices
    #[command(name = "cslice")]
    Cslice {
        /// Selection knobs
        #[command(flatten)]
        selection: SelectionArgs,

        /// Print the selected devices as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split twice by NUMA domain and run a task on the result
    #[command(name = "queue")]
    Queue,

    /// List root devices and their partition capabilities
    #[command(name = "list")]
    List,

    /// Print the active topology as JSON
    #[command(name = "topology")]
    Topology,
}

/// Selection knobs, each backed by an environment variable
///
/// Integer knobs follow C `atoi` rules: `"0"` and unparsable text disable,
/// any other leading integer enables.
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Partition devices into sub-devices
    #[arg(long, env = ENV_USE_SUBDEVICES, default_value = "1", value_name = "N",
          value_parser = parse_c_int, action = clap::ArgAction::Set)]
    pub use_subdevices: i64,

    /// Split sub-devices into compute slices (ignored without sub-devices)
    #[arg(long, env = ENV_SPLIT_STREAMS, default_value = "1", value_name = "N",
          value_parser = parse_c_int, action = clap::ArgAction::Set)]
    pub split_streams: i64,

    /// Print diagnostic device listings
    #[arg(long, env = ENV_VERBOSE, default_value = "1", value_name = "N",
          value_parser = parse_c_int, action = clap::ArgAction::Set)]
    pub verbose: i64,

    /// Only consider devices whose name contains this text
    #[arg(long, env = ENV_DEVICE_NAME, default_value = DEFAULT_DEVICE_NAME, value_name = "TEXT")]
    pub device_name: String,
}

/// Device selection policy knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Partition matching root devices into sub-devices
    pub use_subdevices: bool,
    /// Split sub-devices into compute slices
    pub split_streams: bool,
    /// Print diagnostic listings
    pub verbose: bool,
    /// Device name substring filter
    pub device_name: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            use_subdevices: true,
            split_streams: true,
            verbose: true,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
        }
    }
}

impl SelectionConfig {
    /// Read the knobs from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the knobs through an arbitrary variable lookup
    ///
    /// `XPU_SPLIT_STREAMS` is only consulted when sub-devices are enabled.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).map(|v| atoi(&v) != 0).unwrap_or(true);

        let use_subdevices = flag(ENV_USE_SUBDEVICES);
        let split_streams = use_subdevices && flag(ENV_SPLIT_STREAMS);

        Self {
            use_subdevices,
            split_streams,
            verbose: flag(ENV_VERBOSE),
            device_name: lookup(ENV_DEVICE_NAME).unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
        }
    }

    /// Create config from parsed CLI arguments
    pub fn from_cli(args: &SelectionArgs) -> Self {
        let use_subdevices = args.use_subdevices != 0;
        Self {
            use_subdevices,
            split_streams: use_subdevices && args.split_streams != 0,
            verbose: args.verbose != 0,
            device_name: args.device_name.clone(),
        }
    }
}

/// Parse an integer the way C `atoi` does
///
/// Leading whitespace and an optional sign are accepted, parsing stops at
/// the first non-digit, and text without leading digits yields 0.
pub fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let value = digits
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .fold(0i64, |acc, b| acc.saturating_mul(10).saturating_add(i64::from(b - b'0')));

    if negative {
        -value
    } else {
        value
    }
}

fn parse_c_int(s: &str) -> Result<i64, String> {
    Ok(atoi(s))
}
