use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use hpng::build_diagram;
use hpng::net::{FiringLaw, Model, Place, Transition};
use hpng::sweep::{GridSpec, sweep_surface};

/// 一串首尾相接的储罐，每个阀门按固定延迟依次关闭。
fn cascade(stages: usize) -> Model {
    let mut model = Model::empty();
    let mut upstream = None;
    for stage in 0..stages {
        let tank = model.add_place(Place::fluid(format!("tank{stage}"), 10.0).with_capacity(50.0));
        let valve = model.add_place(Place::discrete(format!("valve{stage}"), 1));
        let flow = model.add_transition(Transition::fluid(format!("flow{stage}"), 1.0));
        model.add_input_arc(tank, flow, 1);
        model.add_input_arc(valve, flow, 1);
        if let Some(prev) = upstream {
            model.add_output_arc(prev, flow, 1);
        }
        let close = model.add_transition(Transition::deterministic(
            format!("close{stage}"),
            2.0 + stage as f64,
        ));
        model.add_input_arc(valve, close, 1);
        upstream = Some(tank);
    }
    model.add_transition(Transition::stochastic(
        "failure",
        FiringLaw::Gamma {
            shape: 2.0,
            rate: 0.5,
        },
    ));
    model
}

fn bench_generate(c: &mut Criterion) {
    let model = cascade(8);
    c.bench_function("generate_cascade_8", |b| {
        b.iter(|| build_diagram(black_box(&model), model.initial_marking(), 40.0).unwrap())
    });
}

fn bench_sweep(c: &mut Criterion) {
    let model = cascade(4);
    let diagram = build_diagram(&model, model.initial_marking(), 40.0).unwrap();
    let times = GridSpec::new(0.0, 40.0, 0.5).values().unwrap();
    let constants = GridSpec::new(0.0, 20.0, 0.5).values().unwrap();
    c.bench_function("sweep_surface_81x41", |b| {
        b.iter(|| sweep_surface(black_box(&diagram), "tank0", &times, &constants).unwrap())
    });
}

criterion_group!(benches, bench_generate, bench_sweep);
criterion_main!(benches);
