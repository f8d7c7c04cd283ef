//! Exact thermal averages of small Hamiltonians for comparison with sampling.
#![allow(dead_code)]

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use num_complex::Complex64;
use pmrqmc::binning::Summary;
use pmrqmc::estimator::Observable;
use pmrqmc::pmr::basis::BasisState;
use pmrqmc::pmr::hamiltonian::HamiltonianModel;

fn basis_state(nspins: usize, index: usize) -> BasisState {
    let bits: Vec<bool> = (0..nspins).map(|i| (index >> i) & 1 == 1).collect();
    BasisState::from_bools(&bits)
}

/// Dense `<row|H|col>` in the computational basis.
pub fn dense_hamiltonian<H: HamiltonianModel>(ham: &H) -> DMatrix<Complex64> {
    let n = ham.nspins();
    let dim = 1usize << n;
    let mut h = DMatrix::<Complex64>::zeros(dim, dim);
    for col in 0..dim {
        let state = basis_state(n, col);
        h[(col, col)] += Complex64::from(ham.diagonal_energy(&state));
        for el in ham.offdiagonal_elements(&state) {
            h[(el.target.as_index(), col)] += el.coefficient;
        }
    }
    h
}

/// Exact thermal state of a small Hamiltonian, optionally projected onto a
/// parity sector of the global spin flip.
pub struct Thermal {
    nspins: usize,
    beta: f64,
    h: DMatrix<Complex64>,
    energies: DVector<f64>,
    vectors: DMatrix<Complex64>,
    /// `1 + p P`, `P` the global flip.
    projector: DMatrix<Complex64>,
    rho: DMatrix<Complex64>,
    norm: f64,
}

impl Thermal {
    pub fn new<H: HamiltonianModel>(ham: &H, beta: f64, parity: i8) -> Self {
        let h = dense_hamiltonian(ham);
        let dim = h.nrows();
        let eigen = SymmetricEigen::new(h.clone());
        let all = dim - 1;
        let p = Complex64::from(f64::from(parity));
        let projector = DMatrix::from_fn(dim, dim, |r, c| {
            let mut v = Complex64::from(0.0);
            if r == c {
                v += 1.0;
            }
            if r == c ^ all {
                v += p;
            }
            v
        });
        let mut thermal = Self {
            nspins: ham.nspins(),
            beta,
            h,
            energies: eigen.eigenvalues,
            vectors: eigen.eigenvectors,
            projector,
            rho: DMatrix::zeros(dim, dim),
            norm: 1.0,
        };
        thermal.rho = &thermal.projector * thermal.propagator(beta);
        thermal.norm = thermal.rho.trace().re;
        thermal
    }

    /// `e^{-t H}`.
    pub fn propagator(&self, t: f64) -> DMatrix<Complex64> {
        let weights = self.energies.map(|e| Complex64::from((-t * e).exp()));
        &self.vectors * DMatrix::from_diagonal(&weights) * self.vectors.adjoint()
    }

    /// `Tr[A ρ] / Tr[ρ]`.
    pub fn average(&self, a: &DMatrix<Complex64>) -> f64 {
        (a * &self.rho).trace().re / self.norm
    }

    pub fn energy(&self) -> f64 {
        self.average(&self.h)
    }

    pub fn energy_squared(&self) -> f64 {
        self.average(&(&self.h * &self.h))
    }

    pub fn diagonal_part(&self) -> DMatrix<Complex64> {
        DMatrix::from_diagonal(&self.h.diagonal())
    }

    pub fn offdiagonal_part(&self) -> DMatrix<Complex64> {
        &self.h - self.diagonal_part()
    }

    pub fn diagonal_energy(&self) -> f64 {
        self.average(&self.diagonal_part())
    }

    pub fn z_magnetization(&self) -> f64 {
        let n = self.nspins;
        let m = DVector::from_fn(self.h.nrows(), |i, _| {
            let ones = (0..n).filter(|b| (i >> b) & 1 == 1).count() as f64;
            Complex64::from((n as f64 - 2.0 * ones) / n as f64)
        });
        self.average(&DMatrix::from_diagonal(&m))
    }

    /// `Tr[(1 + pP) e^{-(β-τ)H} A e^{-τH} A] / Z`.
    pub fn correlation(&self, a: &DMatrix<Complex64>, tau: f64) -> f64 {
        let m = &self.projector * self.propagator(self.beta - tau) * a * self.propagator(tau) * a;
        m.trace().re / self.norm
    }

    /// `∫_0^{β/2} t^moment C(t) dt` by Simpson's rule on a fine grid.
    pub fn correlation_integral(&self, a: &DMatrix<Complex64>, moment: i32) -> f64 {
        let intervals = 200;
        let h = self.beta / 2.0 / intervals as f64;
        let sum: f64 = (0..=intervals)
            .map(|k| {
                let t = k as f64 * h;
                let w = if k == 0 || k == intervals {
                    1.0
                } else if k % 2 == 1 {
                    4.0
                } else {
                    2.0
                };
                w * t.powi(moment) * self.correlation(a, t)
            })
            .sum();
        sum * h / 3.0
    }
}

/// Assert the sampled mean of `o` agrees with `exact` within five error bars
/// plus a small absolute slack.
pub fn assert_agrees(summary: &Summary, o: Observable, exact: f64) {
    let est = summary.get(o).unwrap().estimate;
    assert!(
        est.error.is_finite(),
        "{}: no error estimate ({:?})",
        o.name(),
        est
    );
    let tol = 5.0 * est.error + 0.02;
    assert!(
        (est.mean - exact).abs() < tol,
        "{}: sampled {} +- {}, exact {}",
        o.name(),
        est.mean,
        est.error,
        exact
    );
}
