use crate::pmr::basis::BasisState;
use num_complex::Complex64;

/// One off-diagonal matrix element `<target| D_i P_i |source>`.
#[derive(Debug, Clone, PartialEq)]
pub struct OffDiagonalElement {
    /// Index of the permutation term.
    pub term: usize,
    /// The matrix element.
    pub coefficient: Complex64,
    /// State reached by the term.
    pub target: BasisState,
}

/// A spin-1/2 Hamiltonian written as `H = D_0 + sum_i D_i P_i` where each `P_i`
/// flips the spins of a fixed mask and each `D_i` is diagonal.
///
/// Implementations must be deterministic and side-effect free; the sampler
/// calls them from the hot loop.
pub trait HamiltonianModel {
    /// Number of spins.
    fn nspins(&self) -> usize;

    /// Number of off-diagonal permutation terms.
    fn num_terms(&self) -> usize;

    /// X-flip mask of permutation term `term`. Masks are non-zero and distinct.
    fn flip_mask(&self, term: usize) -> &BasisState;

    /// Diagonal energy `<z|D_0|z>`.
    fn diagonal_energy(&self, state: &BasisState) -> f64;

    /// Diagonal factor `d_term(target)`, the matrix element from
    /// `target ^ mask` to `target`.
    fn coefficient(&self, term: usize, target: &BasisState) -> Complex64;

    /// All non-vanishing off-diagonal elements leaving `state`.
    fn offdiagonal_elements(&self, state: &BasisState) -> Vec<OffDiagonalElement> {
        (0..self.num_terms())
            .filter_map(|term| {
                let mut target = state.clone();
                target.xor_assign(self.flip_mask(term));
                let coefficient = self.coefficient(term, &target);
                if coefficient.norm() > 0.0 {
                    Some(OffDiagonalElement {
                        term,
                        coefficient,
                        target,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}
