//! A single spin in a tilted field, `H = -h_x X - h_z Z`, compared against the
//! exact thermal energy `-|h| tanh(beta |h|)`.

use pmrqmc::config::SimulationParams;
use pmrqmc::errors::QmcResult;
use pmrqmc::estimator::Observable;
use pmrqmc::pmr::pauli::PauliHamiltonian;
use pmrqmc::simulation::Simulation;

fn main() -> QmcResult<()> {
    let (hx, hz) = (1.0f64, 0.5f64);
    let ham = PauliHamiltonian::parse(1, &[(-hx, "X0"), (-hz, "Z0")])?;
    let field = hx.hypot(hz);

    for beta in [0.5, 1.0, 2.0, 4.0] {
        let params = SimulationParams {
            beta,
            tau: beta / 4.0,
            steps: 100_000,
            nbins: 50,
            ..Default::default()
        };
        let mut sim = Simulation::new(params, &ham, 0)?;
        sim.run(None)?;
        let summary = sim.summary();
        let exact = -field * (beta * field).tanh();
        if let Some(h) = summary.get(Observable::H) {
            println!(
                "beta = {:4.1}: <H> = {:9.6} +- {:.6}   exact {:9.6}   <q> = {:.2}",
                beta, h.estimate.mean, h.estimate.error, exact, summary.mean_length
            );
        }
    }
    Ok(())
}
