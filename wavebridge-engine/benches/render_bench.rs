use basedrop::Owned;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use wavebridge_engine::gc::gc_handle;
use wavebridge_engine::loader::LoadedModule;
use wavebridge_engine::{control_channel, Oscillator, QuantumAdapter, RenderBridge, RenderCommand, RenderStats, WorkletProcessor, QUANTUM};

fn ready_bridge() -> (wavebridge_engine::ControlSender, RenderBridge) {
    let (tx, rx) = control_channel(64);
    let mut bridge = RenderBridge::new(48_000.0, rx, Arc::new(RenderStats::new()));
    let module: LoadedModule = Box::new(Oscillator::sine(48_000.0));
    tx.send(RenderCommand::Install { generation: 1, module: Owned::new(&gc_handle(), module) }).unwrap();
    bridge.drain_commands();
    (tx, bridge)
}

fn bench_quantum(c: &mut Criterion) {
    let (_tx, mut bridge) = ready_bridge();
    let mut out = [0.0f32; QUANTUM];
    c.bench_function("render_quantum_sine", |b| {
        b.iter(|| {
            bridge.render(black_box(&mut out));
            black_box(&out);
        })
    });
}

fn bench_silence(c: &mut Criterion) {
    let (_tx, rx) = control_channel(64);
    let mut bridge = RenderBridge::new(48_000.0, rx, Arc::new(RenderStats::new()));
    let mut out = [0.0f32; QUANTUM];
    c.bench_function("render_quantum_not_ready", |b| {
        b.iter(|| {
            bridge.render(black_box(&mut out));
            black_box(&out);
        })
    });
}

fn bench_device_buffer(c: &mut Criterion) {
    let (_tx, bridge) = ready_bridge();
    let mut adapter = QuantumAdapter::new(WorkletProcessor::new(bridge));
    // typical device period that is not a multiple of the quantum
    let mut data = vec![0.0f32; 441 * 2];
    c.bench_function("adapter_interleaved_441x2", |b| {
        b.iter(|| {
            adapter.fill_interleaved(black_box(&mut data), 2);
            black_box(&data);
        })
    });
}

fn bench_with_parameter_traffic(c: &mut Criterion) {
    let (tx, mut bridge) = ready_bridge();
    let mut out = [0.0f32; QUANTUM];
    let mut hz = 220.0f32;
    c.bench_function("render_quantum_with_set_frequency", |b| {
        b.iter(|| {
            hz = if hz > 880.0 { 220.0 } else { hz + 1.0 };
            let _ = tx.send(RenderCommand::SetParameter { param: wavebridge_engine::Parameter::Frequency, value: hz });
            bridge.drain_commands();
            bridge.render(black_box(&mut out));
            black_box(&out);
        })
    });
}

criterion_group!(benches, bench_quantum, bench_silence, bench_device_buffer, bench_with_parameter_traffic);
criterion_main!(benches);
