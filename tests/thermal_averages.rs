mod common;

use common::{assert_agrees, Thermal};
use num_complex::Complex64;
use pmrqmc::config::{CycleSearch, ObservableFlags, SimulationParams};
use pmrqmc::errors::QmcResult;
use pmrqmc::estimator::Observable;
use pmrqmc::pmr::configuration::WeightMode;
use pmrqmc::pmr::pauli::{PauliHamiltonian, PauliString};
use pmrqmc::simulation::{Progress, Simulation};

fn energy_params(beta: f64, seed: u64) -> SimulationParams {
    let mut observables = ObservableFlags::none();
    observables.h = true;
    observables.h2 = true;
    observables.hdiag = true;
    observables.z_magnetization = true;
    SimulationParams {
        equilibration_steps: 2000,
        steps: 200_000,
        steps_per_measurement: 10,
        nbins: 50,
        beta,
        tau: beta / 2.0,
        exactly_reproducible: true,
        seed,
        observables,
        ..Default::default()
    }
}

fn sample(ham: &PauliHamiltonian, params: SimulationParams) -> QmcResult<pmrqmc::binning::Summary> {
    let mut sim = Simulation::new(params, ham, 0)?;
    assert_eq!(sim.run(None)?, Progress::Completed);
    Ok(sim.summary())
}

#[test]
fn test_single_spin_in_tilted_field() -> QmcResult<()> {
    let ham = PauliHamiltonian::parse(1, &[(-1.0, "X0"), (-0.5, "Z0")])?;
    let beta = 1.0;
    let summary = sample(&ham, energy_params(beta, 1))?;
    let exact = Thermal::new(&ham, beta, 0);

    let field = 1.25f64.sqrt();
    assert!((exact.energy() + field * (beta * field).tanh()).abs() < 1e-10);
    assert!((summary.sign.mean - 1.0).abs() < 1e-12);
    assert_agrees(&summary, Observable::H, exact.energy());
    assert_agrees(&summary, Observable::H2, exact.energy_squared());
    assert_agrees(&summary, Observable::Hdiag, exact.diagonal_energy());
    assert_agrees(&summary, Observable::ZMagnetization, exact.z_magnetization());
    Ok(())
}

fn dimer() -> PauliHamiltonian {
    PauliHamiltonian::parse(
        2,
        &[
            (-1.0, "Z0 Z1"),
            (-0.7, "X0"),
            (-0.7, "X1"),
            (-0.4, "X0 X1"),
        ],
    )
    .unwrap()
}

#[test]
fn test_dimer_exhaustive_cycles() -> QmcResult<()> {
    let ham = dimer();
    let beta = 1.0;
    let summary = sample(&ham, energy_params(beta, 2))?;
    let exact = Thermal::new(&ham, beta, 0);
    assert_agrees(&summary, Observable::H, exact.energy());
    assert_agrees(&summary, Observable::H2, exact.energy_squared());
    assert_agrees(&summary, Observable::Hdiag, exact.diagonal_energy());
    Ok(())
}

#[test]
fn test_dimer_restrictive_cycles() -> QmcResult<()> {
    let ham = dimer();
    let beta = 1.0;
    let params = SimulationParams {
        cycle_search: CycleSearch::Restrictive,
        max_cycle_candidates: 1,
        ..energy_params(beta, 3)
    };
    let summary = sample(&ham, params)?;
    let exact = Thermal::new(&ham, beta, 0);
    assert_agrees(&summary, Observable::H, exact.energy());
    assert_agrees(&summary, Observable::Hdiag, exact.diagonal_energy());
    Ok(())
}

fn complex_field() -> PauliHamiltonian {
    let c = |re: f64, im: f64| Complex64::new(re, im);
    let s = |text: &str| text.parse::<PauliString>().unwrap();
    PauliHamiltonian::from_terms(
        2,
        &[
            (c(-1.0, 0.0), s("X0")),
            (c(-0.6, 0.0), s("Y0")),
            (c(-0.8, 0.0), s("X1")),
            (c(-0.5, 0.0), s("Z0 Z1")),
            (c(0.3, 0.0), s("X0 Y1")),
        ],
    )
    .unwrap()
}

#[test]
fn test_complex_coefficients_real_part_weights() -> QmcResult<()> {
    let ham = complex_field();
    let beta = 1.0;
    let params = SimulationParams {
        weight_mode: WeightMode::RealPart,
        ..energy_params(beta, 4)
    };
    let summary = sample(&ham, params)?;
    let exact = Thermal::new(&ham, beta, 0);
    assert_agrees(&summary, Observable::H, exact.energy());
    assert_agrees(&summary, Observable::Hdiag, exact.diagonal_energy());
    Ok(())
}

#[test]
fn test_complex_coefficients_absolute_weights() -> QmcResult<()> {
    let ham = complex_field();
    let beta = 1.0;
    let params = SimulationParams {
        weight_mode: WeightMode::Absolute,
        ..energy_params(beta, 5)
    };
    let summary = sample(&ham, params)?;
    let exact = Thermal::new(&ham, beta, 0);
    assert!(summary.sign.mean > 0.0);
    assert_agrees(&summary, Observable::H, exact.energy());
    assert_agrees(&summary, Observable::Hdiag, exact.diagonal_energy());
    Ok(())
}

#[test]
fn test_even_parity_sector() -> QmcResult<()> {
    let ham = PauliHamiltonian::parse(2, &[(-1.0, "Z0 Z1"), (-0.7, "X0"), (-0.7, "X1")])?;
    let beta = 1.0;
    let params = SimulationParams {
        parity: 1,
        consistency_checks: true,
        ..energy_params(beta, 6)
    };
    let summary = sample(&ham, params)?;
    let exact = Thermal::new(&ham, beta, 1);
    let unprojected = Thermal::new(&ham, beta, 0);
    // The projection visibly changes the answer here.
    assert!((exact.energy() - unprojected.energy()).abs() > 0.05);
    assert_agrees(&summary, Observable::H, exact.energy());
    assert_agrees(&summary, Observable::H2, exact.energy_squared());
    Ok(())
}

#[test]
fn test_imaginary_time_correlations() -> QmcResult<()> {
    let ham = dimer();
    let (beta, tau) = (1.2, 0.4);
    let mut observables = ObservableFlags::none();
    observables.hdiag_corr = true;
    observables.hoffdiag_corr = true;
    observables.hdiag_eint = true;
    observables.hdiag_fint = true;
    observables.hoffdiag_eint = true;
    observables.hoffdiag_fint = true;
    let params = SimulationParams {
        steps: 300_000,
        tau,
        observables,
        ..energy_params(beta, 7)
    };
    let summary = sample(&ham, params)?;
    let exact = Thermal::new(&ham, beta, 0);
    let d = exact.diagonal_part();
    let od = exact.offdiagonal_part();

    assert_agrees(&summary, Observable::HdiagCorr, exact.correlation(&d, tau));
    assert_agrees(&summary, Observable::HoffdiagCorr, exact.correlation(&od, tau));
    assert_agrees(&summary, Observable::HdiagEint, exact.correlation_integral(&d, 0));
    assert_agrees(&summary, Observable::HdiagFint, exact.correlation_integral(&d, 1));
    assert_agrees(&summary, Observable::HoffdiagEint, exact.correlation_integral(&od, 0));
    assert_agrees(&summary, Observable::HoffdiagFint, exact.correlation_integral(&od, 1));
    Ok(())
}
