//! Instantaneous estimators evaluated on a configuration.
//!
//! With `f(x) = e^{-βx}` and the path energies `E_j`, every estimator is a
//! ratio of divided differences of `f` over the energies to the one entering
//! the weight. The enabled observables are resolved once into a table of
//! function pointers.

use crate::config::{ObservableFlags, SimulationParams};
use crate::pmr::basis::BasisState;
use crate::pmr::configuration::{ChainState, Sector, WeightMode};
use crate::pmr::divdiff::ExpDivDiff;
use crate::pmr::hamiltonian::HamiltonianModel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observables the estimator can measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Observable {
    /// Total energy.
    H,
    /// Square of the total energy.
    H2,
    /// Diagonal energy.
    Hdiag,
    /// Square of the diagonal energy.
    Hdiag2,
    /// Off-diagonal energy.
    Hoffdiag,
    /// Square of the off-diagonal energy.
    Hoffdiag2,
    /// Mean Z magnetization per spin.
    ZMagnetization,
    /// `<H_d(tau) H_d>`.
    HdiagCorr,
    /// `∫_0^{β/2} <H_d(t) H_d> dt`.
    HdiagEint,
    /// `∫_0^{β/2} t <H_d(t) H_d> dt`.
    HdiagFint,
    /// `<H_od(tau) H_od>`.
    HoffdiagCorr,
    /// `∫_0^{β/2} <H_od(t) H_od> dt`.
    HoffdiagEint,
    /// `∫_0^{β/2} t <H_od(t) H_od> dt`.
    HoffdiagFint,
}

impl Observable {
    /// Every observable, in report order.
    pub const ALL: [Observable; 13] = [
        Observable::H,
        Observable::H2,
        Observable::Hdiag,
        Observable::Hdiag2,
        Observable::Hoffdiag,
        Observable::Hoffdiag2,
        Observable::ZMagnetization,
        Observable::HdiagCorr,
        Observable::HdiagEint,
        Observable::HdiagFint,
        Observable::HoffdiagCorr,
        Observable::HoffdiagEint,
        Observable::HoffdiagFint,
    ];

    /// Name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Observable::H => "H",
            Observable::H2 => "H^2",
            Observable::Hdiag => "H_diag",
            Observable::Hdiag2 => "H_diag^2",
            Observable::Hoffdiag => "H_offdiag",
            Observable::Hoffdiag2 => "H_offdiag^2",
            Observable::ZMagnetization => "Z_magnetization",
            Observable::HdiagCorr => "H_diag_corr",
            Observable::HdiagEint => "H_diag_eint",
            Observable::HdiagFint => "H_diag_fint",
            Observable::HoffdiagCorr => "H_offdiag_corr",
            Observable::HoffdiagEint => "H_offdiag_eint",
            Observable::HoffdiagFint => "H_offdiag_fint",
        }
    }

    /// Whether the flags enable this observable.
    pub fn is_enabled(self, flags: &ObservableFlags) -> bool {
        match self {
            Observable::H => flags.h,
            Observable::H2 => flags.h2,
            Observable::Hdiag => flags.hdiag,
            Observable::Hdiag2 => flags.hdiag2,
            Observable::Hoffdiag => flags.hoffdiag,
            Observable::Hoffdiag2 => flags.hoffdiag2,
            Observable::ZMagnetization => flags.z_magnetization,
            Observable::HdiagCorr => flags.hdiag_corr,
            Observable::HdiagEint => flags.hdiag_eint,
            Observable::HdiagFint => flags.hdiag_fint,
            Observable::HoffdiagCorr => flags.hoffdiag_corr,
            Observable::HoffdiagEint => flags.hoffdiag_eint,
            Observable::HoffdiagFint => flags.hoffdiag_fint,
        }
    }

    /// Enabled observables in report order.
    pub fn enabled(flags: &ObservableFlags) -> Vec<Observable> {
        Observable::ALL
            .iter()
            .copied()
            .filter(|o| o.is_enabled(flags))
            .collect()
    }

    /// For the integrals, the observable whose mean enters the susceptibility.
    pub fn integrand(self) -> Option<Observable> {
        match self {
            Observable::HdiagEint | Observable::HdiagFint => Some(Observable::Hdiag),
            Observable::HoffdiagEint | Observable::HoffdiagFint => Some(Observable::Hoffdiag),
            _ => None,
        }
    }

    fn evaluator(self) -> Evaluator {
        match self {
            Observable::H => total_energy,
            Observable::H2 => total_energy_squared,
            Observable::Hdiag => diagonal_energy,
            Observable::Hdiag2 => diagonal_energy_squared,
            Observable::Hoffdiag => offdiagonal_energy,
            Observable::Hoffdiag2 => offdiagonal_energy_squared,
            Observable::ZMagnetization => z_magnetization,
            Observable::HdiagCorr => diagonal_correlation_at_tau,
            Observable::HdiagEint => diagonal_eint,
            Observable::HdiagFint => diagonal_fint,
            Observable::HoffdiagCorr => offdiagonal_correlation_at_tau,
            Observable::HoffdiagEint => offdiagonal_eint,
            Observable::HoffdiagFint => offdiagonal_fint,
        }
    }
}

type Evaluator = fn(&mut Snapshot<'_>) -> f64;

fn total_energy(s: &mut Snapshot<'_>) -> f64 {
    s.energy_last() + s.r1()
}

fn total_energy_squared(s: &mut Snapshot<'_>) -> f64 {
    let e = s.energy_last();
    e * e + (e + s.energy_before_last()) * s.r1() + s.r2()
}

fn diagonal_energy(s: &mut Snapshot<'_>) -> f64 {
    s.energy_last()
}

fn diagonal_energy_squared(s: &mut Snapshot<'_>) -> f64 {
    s.energy_last().powi(2)
}

fn offdiagonal_energy(s: &mut Snapshot<'_>) -> f64 {
    s.r1()
}

fn offdiagonal_energy_squared(s: &mut Snapshot<'_>) -> f64 {
    s.r2()
}

fn z_magnetization(s: &mut Snapshot<'_>) -> f64 {
    s.z_magnetization()
}

fn diagonal_correlation_at_tau(s: &mut Snapshot<'_>) -> f64 {
    let tau = s.tau;
    s.diagonal_correlation(tau)
}

fn offdiagonal_correlation_at_tau(s: &mut Snapshot<'_>) -> f64 {
    let tau = s.tau;
    s.offdiagonal_correlation(tau)
}

fn diagonal_eint(s: &mut Snapshot<'_>) -> f64 {
    s.integrate(Snapshot::diagonal_correlation, false)
}

fn diagonal_fint(s: &mut Snapshot<'_>) -> f64 {
    s.integrate(Snapshot::diagonal_correlation, true)
}

fn offdiagonal_eint(s: &mut Snapshot<'_>) -> f64 {
    s.integrate(Snapshot::offdiagonal_correlation, false)
}

fn offdiagonal_fint(s: &mut Snapshot<'_>) -> f64 {
    s.integrate(Snapshot::offdiagonal_correlation, true)
}

/// One measurement of the enabled observables.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Sign of the configuration's weight.
    pub sign: f64,
    /// Operator string length.
    pub length: usize,
    /// Values in the order of [`Estimator::observables`], not yet multiplied by the sign.
    pub values: Vec<f64>,
}

/// Measures the enabled observables.
#[derive(Clone)]
pub struct Estimator {
    beta: f64,
    tau: f64,
    intervals: usize,
    weight_mode: WeightMode,
    table: Vec<(Observable, Evaluator)>,
    divdiff: ExpDivDiff,
}

impl Estimator {
    /// Build the dispatch table for the enabled observables.
    pub fn new(params: &SimulationParams) -> Self {
        let table = Observable::enabled(&params.observables)
            .into_iter()
            .map(|o| (o, o.evaluator()))
            .collect();
        Self {
            beta: params.beta,
            tau: params.tau,
            intervals: params.integration_intervals,
            weight_mode: params.weight_mode,
            table,
            divdiff: ExpDivDiff::new(),
        }
    }

    /// Measured observables, in order.
    pub fn observables(&self) -> Vec<Observable> {
        self.table.iter().map(|(o, _)| *o).collect()
    }

    /// Measure every enabled observable on the chain's configuration.
    pub fn measure<H: HamiltonianModel>(&mut self, chain: &ChainState, ham: &H) -> Sample {
        let path = chain.configuration.path(ham);
        let mut snapshot = Snapshot::new(
            self.beta,
            self.tau,
            self.intervals,
            &path.energies,
            chain.configuration.state(),
            path.sector,
            &mut self.divdiff,
        );
        let values = self.table.iter().map(|(_, f)| f(&mut snapshot)).collect();
        Sample {
            sign: chain.weight.sign(self.weight_mode),
            length: chain.configuration.len(),
            values,
        }
    }
}

impl fmt::Debug for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Estimator")
            .field("beta", &self.beta)
            .field("tau", &self.tau)
            .field("intervals", &self.intervals)
            .field("weight_mode", &self.weight_mode)
            .field("observables", &self.observables())
            .finish()
    }
}

/// What the evaluators see of a configuration.
struct Snapshot<'a> {
    beta: f64,
    tau: f64,
    intervals: usize,
    energies: &'a [f64],
    state: &'a BasisState,
    sector: Option<Sector>,
    divdiff: &'a mut ExpDivDiff,
    /// `ln e^{[-βE_0..-βE_j]}` for each `j`.
    prefixes: Vec<f64>,
    prefix_tau: Vec<f64>,
    suffix_rest: Vec<f64>,
}

fn ln_pow(x: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        n as f64 * x.ln()
    }
}

impl<'a> Snapshot<'a> {
    fn new(
        beta: f64,
        tau: f64,
        intervals: usize,
        energies: &'a [f64],
        state: &'a BasisState,
        sector: Option<Sector>,
        divdiff: &'a mut ExpDivDiff,
    ) -> Self {
        let mut prefixes = Vec::with_capacity(energies.len());
        let points: Vec<f64> = energies.iter().map(|e| -beta * e).collect();
        divdiff.ln_prefixes(&points, &mut prefixes);
        Self {
            beta,
            tau,
            intervals,
            energies,
            state,
            sector,
            divdiff,
            prefixes,
            prefix_tau: vec![],
            suffix_rest: vec![],
        }
    }

    fn q(&self) -> usize {
        self.energies.len() - 1
    }

    fn energy_last(&self) -> f64 {
        self.energies[self.q()]
    }

    fn energy_before_last(&self) -> f64 {
        match self.q() {
            0 => 0.0,
            q => self.energies[q - 1],
        }
    }

    fn ln_ratio(&self, drop: usize) -> f64 {
        let q = self.q();
        self.prefixes[q - drop] - self.prefixes[q]
    }

    fn r1(&self) -> f64 {
        if self.q() < 1 {
            0.0
        } else {
            -self.ln_ratio(1).exp() / self.beta
        }
    }

    fn r2(&self) -> f64 {
        if self.q() < 2 {
            0.0
        } else {
            self.ln_ratio(2).exp() / (self.beta * self.beta)
        }
    }

    fn z_magnetization(&self) -> f64 {
        let n = self.state.nbits();
        let up = n - self.state.count_ones();
        let m = (up as f64 - self.state.count_ones() as f64) / n as f64;
        match self.sector {
            Some(Sector::Flipped) => -m,
            _ => m,
        }
    }

    /// Fill `prefix_tau` with prefixes over `-τE` and `suffix_rest` with suffixes
    /// over `-(β-τ)E` restricted to `energies[..end]`.
    fn split_divdiffs(&mut self, tau: f64, end: usize) {
        let head: Vec<f64> = self.energies.iter().map(|e| -tau * e).collect();
        self.divdiff.ln_prefixes(&head, &mut self.prefix_tau);
        let tail: Vec<f64> = self.energies[..end]
            .iter()
            .map(|e| -(self.beta - tau) * e)
            .collect();
        self.divdiff.ln_suffixes(&tail, &mut self.suffix_rest);
    }

    fn diagonal_correlation(&mut self, tau: f64) -> f64 {
        let q = self.q();
        let n = q + 1;
        self.split_divdiffs(tau, n);
        let ln_f = self.prefixes[q];
        let ln_beta = ln_pow(self.beta, q);
        let rest = self.beta - tau;
        let sum: f64 = (0..=q)
            .map(|j| {
                let ln = ln_pow(tau, j) + ln_pow(rest, q - j) - ln_beta
                    + self.prefix_tau[j]
                    + self.suffix_rest[j]
                    - ln_f;
                self.energies[j] * ln.exp()
            })
            .sum();
        self.energies[0] * sum
    }

    fn offdiagonal_correlation(&mut self, tau: f64) -> f64 {
        let q = self.q();
        if q < 2 {
            return 0.0;
        }
        self.split_divdiffs(tau, q);
        let ln_f = self.prefixes[q];
        let ln_beta = ln_pow(self.beta, q);
        let rest = self.beta - tau;
        (1..q)
            .map(|j| {
                let ln = ln_pow(tau, j - 1) + ln_pow(rest, q - 1 - j) - ln_beta
                    + self.prefix_tau[j - 1]
                    + self.suffix_rest[j]
                    - ln_f;
                ln.exp()
            })
            .sum()
    }

    /// Composite Simpson rule over `[0, β/2]`, optionally weighted by `t`.
    fn integrate(&mut self, correlation: fn(&mut Self, f64) -> f64, moment: bool) -> f64 {
        let n = self.intervals;
        let h = 0.5 * self.beta / n as f64;
        let mut acc = 0.0;
        for k in 0..=n {
            let t = k as f64 * h;
            let w = if k == 0 || k == n {
                1.0
            } else if k % 2 == 1 {
                4.0
            } else {
                2.0
            };
            let c = correlation(self, t);
            acc += w * if moment { t * c } else { c };
        }
        acc * h / 3.0
    }
}

#[cfg(test)]
mod estimator_tests {
    use super::*;
    use crate::errors::QmcResult;
    use crate::pmr::configuration::Configuration;
    use crate::pmr::pauli::PauliHamiltonian;
    use crate::pmr::updates::{UpdateEngine, UpdateSettings};

    fn params(beta: f64, tau: f64) -> SimulationParams {
        SimulationParams {
            beta,
            tau,
            ..Default::default()
        }
    }

    fn chain(ham: &PauliHamiltonian, p: &SimulationParams, seq: Vec<usize>) -> QmcResult<ChainState> {
        let mut engine = UpdateEngine::new(UpdateSettings::from_params(p), ham)?;
        let configuration = Configuration::with_sequence(BasisState::zeros(ham.nspins()), seq, p.qmax)?;
        let weight = engine.evaluate(&configuration, ham);
        Ok(ChainState {
            configuration,
            weight,
        })
    }

    fn value(est: &Estimator, sample: &Sample, o: Observable) -> f64 {
        let i = est.observables().iter().position(|x| *x == o).unwrap();
        sample.values[i]
    }

    #[test]
    fn test_classical_configuration() -> QmcResult<()> {
        // Diagonal only: every estimator reduces to the classical energy.
        let ham = PauliHamiltonian::parse(2, &[(-1.0, "Z0 Z1"), (0.5, "Z0"), (-1.0, "X0")])?;
        let p = params(1.3, 0.4);
        let mut est = Estimator::new(&p);
        let c = chain(&ham, &p, vec![])?;
        let s = est.measure(&c, &ham);
        let e = -1.0 + 0.5;
        assert_eq!(s.sign, 1.0);
        assert_eq!(s.length, 0);
        assert!((value(&est, &s, Observable::H) - e).abs() < 1e-12);
        assert!((value(&est, &s, Observable::H2) - e * e).abs() < 1e-12);
        assert_eq!(value(&est, &s, Observable::Hoffdiag), 0.0);
        assert!((value(&est, &s, Observable::HdiagCorr) - e * e).abs() < 1e-12);
        assert!((value(&est, &s, Observable::HdiagEint) - e * e * 0.65).abs() < 1e-10);
        let fint = e * e * 0.65 * 0.65 / 2.0;
        assert!((value(&est, &s, Observable::HdiagFint) - fint).abs() < 1e-10);
        assert_eq!(value(&est, &s, Observable::HoffdiagCorr), 0.0);
        assert_eq!(value(&est, &s, Observable::ZMagnetization), 1.0);
        Ok(())
    }

    #[test]
    fn test_offdiagonal_correlation_limits() -> QmcResult<()> {
        // At tau = 0 only the operator pair (1, 2) contributes.
        let ham = PauliHamiltonian::parse(1, &[(-1.0, "X0"), (-0.3, "Z0")])?;
        let p = params(2.0, 0.0);
        let mut est = Estimator::new(&p);
        let c = chain(&ham, &p, vec![0, 0])?;
        let s = est.measure(&c, &ham);
        let corr = value(&est, &s, Observable::HoffdiagCorr);
        let h2 = value(&est, &s, Observable::Hoffdiag2);
        // Energies along the path are [a, b, a] with b - a = 0.6; the two
        // estimators differ by the Boltzmann factor of the middle segment.
        let expected = h2 * (-2.0 * 0.6f64).exp();
        assert!((corr - expected).abs() < 1e-10 * expected.abs(), "{} vs {}", corr, expected);
        Ok(())
    }

    #[test]
    fn test_dispatch_follows_flags() {
        let mut p = params(1.0, 0.5);
        p.observables = ObservableFlags::none();
        p.observables.h = true;
        p.observables.z_magnetization = true;
        let est = Estimator::new(&p);
        assert_eq!(
            est.observables(),
            vec![Observable::H, Observable::ZMagnetization]
        );
    }
}
