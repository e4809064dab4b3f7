use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;
use vent_config::PositionSourceKind;
use vent_core::sim::SimRig;
use vent_core::{BreathPhase, VentCfg, WaveformDerived, WaveformTarget};

// Rig that has finished startup and is mid-breath
fn breathing_rig(source: PositionSourceKind) -> SimRig {
    let mut rig = SimRig::new(&VentCfg::default(), source).expect("rig");
    rig.run_for(Duration::from_millis(2_100));
    rig.vent_mut().change_phase(BreathPhase::Inspiration);
    rig.run_for(Duration::from_millis(500));
    rig
}

fn bench_tick(c: &mut Criterion) {
    for (name, source) in [
        ("tick_steps", PositionSourceKind::Steps),
        ("tick_encoder", PositionSourceKind::Encoder),
    ] {
        c.bench_function(name, |b| {
            b.iter_batched_ref(
                || breathing_rig(source),
                |rig| {
                    for _ in 0..50 {
                        black_box(rig.step());
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn bench_waveform(c: &mut Criterion) {
    let target = WaveformTarget::default();
    c.bench_function("waveform_compute", |b| {
        b.iter(|| WaveformDerived::compute(black_box(&target)))
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut rig = breathing_rig(PositionSourceKind::Steps);
    c.bench_function("snapshot", |b| b.iter(|| black_box(rig.vent_mut().snapshot())));
}

criterion_group!(benches, bench_tick, bench_waveform, bench_snapshot);
criterion_main!(benches);
