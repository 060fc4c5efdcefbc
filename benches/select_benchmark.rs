//! Performance benchmarks for xpuprobe
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xpuprobe::config::SelectionConfig;
use xpuprobe::report::Reporter;
use xpuprobe::runtime::{Backend, DeviceSpec, SimulatedRuntime, TopologySpec};
use xpuprobe::select::identify_devices;

/// Node with `gpus` GPUs of `tiles` tiles, each tile split into `slices` slices
fn build_topology(gpus: usize, tiles: usize, slices: u32) -> TopologySpec {
    let tile = DeviceSpec::new("Intel(R) Data Center GPU Max", Backend::LevelZero).with_cslices(slices);
    let gpu = DeviceSpec::new("Intel(R) Data Center GPU Max", Backend::LevelZero)
        .with_numa(vec![tile; tiles]);
    TopologySpec::new(vec![gpu; gpus])
}

fn bench_identify_devices(c: &mut Criterion) {
    let mut group = c.benchmark_group("identify_devices");
    let config = SelectionConfig {
        verbose: false,
        device_name: "GPU".to_string(),
        ..Default::default()
    };

    for gpus in [1usize, 8, 64] {
        let topology = build_topology(gpus, 2, 4);
        group.bench_with_input(BenchmarkId::from_parameter(gpus), &topology, |b, topology| {
            b.iter(|| {
                let runtime = SimulatedRuntime::new(topology.clone());
                let mut out = Reporter::new(std::io::sink(), false);
                let selected = identify_devices(&runtime, &config, &mut out).unwrap();
                black_box(selected.len())
            });
        });
    }

    group.finish();
}

fn bench_topology_parse(c: &mut Criterion) {
    let json = build_topology(64, 2, 4).to_json_pretty().unwrap();

    c.bench_function("parse_topology_64_gpus", |b| {
        b.iter(|| TopologySpec::from_json(black_box(&json)).unwrap());
    });
}

criterion_group!(benches, bench_identify_devices, bench_topology_parse);
criterion_main!(benches);
