#![deny(
    missing_docs,
    missing_debug_implementations,
    trivial_casts,
    unsafe_code,
    unused_import_braces
)]

//! `pmrqmc` is a library for simulating arbitrary spin-1/2 Hamiltonians at finite
//! temperature using the permutation matrix representation quantum Monte Carlo
//! method (PMR-QMC).
//!
//! The Hamiltonian is written as `H = D_0 + Σ_i D_i P_i` with diagonal `D_i` and
//! spin-flip permutations `P_i`. The partition function expands into a sum over
//! basis states and operator strings whose weights are divided differences of the
//! exponential; a Markov chain samples that sum and estimators read thermal
//! averages off the sampled configurations.
//!
//! It also offers a feature gated module:
//! - independent replicas run in parallel with the `parallel-replicas` feature.
//!
//! # Transverse Field Example
//! ```
//! use pmrqmc::config::SimulationParams;
//! use pmrqmc::estimator::Observable;
//! use pmrqmc::pmr::pauli::PauliHamiltonian;
//! use pmrqmc::simulation::Simulation;
//!
//! // H = -Z0 Z1 - 0.7 (X0 + X1)
//! let ham = PauliHamiltonian::parse(
//!     2,
//!     &[(-1.0, "Z0 Z1"), (-0.7, "X0"), (-0.7, "X1")],
//! ).unwrap();
//! let params = SimulationParams {
//!     beta: 1.0,
//!     steps: 2000,
//!     nbins: 20,
//!     ..Default::default()
//! };
//!
//! let mut sim = Simulation::new(params, &ham, 0).unwrap();
//! sim.run(None).unwrap();
//!
//! let summary = sim.summary();
//! let energy = summary.get(Observable::H).unwrap().estimate;
//! println!("<H> = {} +- {}", energy.mean, energy.error);
//! ```

/// Accumulation of measurements into bins and final statistics.
pub mod binning;
/// Persisting and resuming simulations.
pub mod checkpoint;
/// Simulation parameters.
pub mod config;
/// Error types.
pub mod errors;
/// Observables measured on configurations.
pub mod estimator;
pub mod pmr;
/// Parallel replicas of one simulation.
#[cfg(feature = "parallel-replicas")]
pub mod replicas;
/// Seeded random streams.
pub mod rng;
pub mod simulation;
mod util;
