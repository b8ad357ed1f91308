use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stampede_crowd::{AgentParams, Crowd};
use stampede_nav::PlanarSurface;

/// Seeds `count` agents in a grid, all converging on the surface center.
fn make_crowd(count: usize) -> Crowd<PlanarSurface> {
    let mut crowd = Crowd::new(PlanarSurface::new(100, 100, 1.0), count);
    let params = AgentParams {
        collision_query_range: 6.0,
        ..AgentParams::default()
    };

    let side = (count as f32).sqrt().ceil() as usize;
    for i in 0..count {
        let x = (i % side) as f32 * 2.0 + 1.5;
        let z = (i / side) as f32 * 2.0 + 1.5;
        let idx = crowd
            .add_agent([x, 0.0, z], params)
            .expect("pool sized to count");
        crowd.request_move_position(idx, [50.5, 0.0, 50.5]);
    }
    crowd
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("crowd/update");

    for &n in &[16usize, 64, 256] {
        let mut crowd = make_crowd(n);
        // Settle move requests so the steady-state tick is measured.
        crowd.update(0.05);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &_n| {
            b.iter(|| {
                crowd.update(0.05);
                black_box(crowd.active_agent_count());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update);
criterion_main!(benches);
