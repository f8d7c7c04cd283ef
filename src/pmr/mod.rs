//! Permutation matrix representation of spin Hamiltonians and the Markov
//! chain over its configurations.

/// Computational basis states as bit strings.
pub mod basis;
mod cycle_completion;
/// Operator strings, their paths and weights.
pub mod configuration;
/// Cycles of permutation operators.
pub mod cycles;
pub mod divdiff;
/// The Hamiltonian interface the engine samples.
pub mod hamiltonian;
/// Hamiltonians given as sums of Pauli strings.
pub mod pauli;
/// Elementary moves and the composite update.
pub mod updates;
