use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pmrqmc::config::SimulationParams;
use pmrqmc::pmr::pauli::PauliHamiltonian;
use pmrqmc::pmr::updates::{UpdateEngine, UpdateSettings};
use pmrqmc::rng::QmcRng;

/// Transverse field Ising ring with XX couplings, so cycles exist.
fn one_d_periodic(l: usize) -> PauliHamiltonian {
    let mut terms: Vec<(f64, String)> = (0..l)
        .map(|i| (-1.0, format!("Z{} Z{}", i, (i + 1) % l)))
        .collect();
    terms.extend((0..l).map(|i| (-0.5, format!("X{} X{}", i, (i + 1) % l))));
    terms.extend((0..l).map(|i| (-1.0, format!("X{}", i))));
    let terms: Vec<(f64, &str)> = terms.iter().map(|(c, s)| (*c, s.as_str())).collect();
    PauliHamiltonian::parse(l, &terms).unwrap()
}

fn bench_composite_update(c: &mut Criterion) {
    for l in [8usize, 16] {
        let ham = one_d_periodic(l);
        let params = SimulationParams {
            beta: 1.0,
            ..Default::default()
        };
        let mut engine = UpdateEngine::new(UpdateSettings::from_params(&params), &ham).unwrap();
        let mut rng = QmcRng::from_seed(1234, 0);
        let mut chain = engine.initial_chain(&ham, &mut rng);
        for _ in 0..1000 {
            engine
                .composite_update(&mut chain, &ham, &mut rng, None)
                .unwrap();
        }
        c.bench_function(&format!("composite_update ring {}", l), |b| {
            b.iter(|| {
                engine
                    .composite_update(black_box(&mut chain), &ham, &mut rng, None)
                    .unwrap()
            })
        });
    }
}

criterion_group!(benches, bench_composite_update);
criterion_main!(benches);
