use crate::pmr::basis::BasisState;
use crate::pmr::hamiltonian::HamiltonianModel;
use crate::util::vec_help::symmetric_difference;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A set of permutation terms whose flip masks multiply to the identity, or
/// to the global spin flip when `flips_parity` is set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cycle {
    terms: Vec<usize>,
    flips_parity: bool,
}

impl Cycle {
    /// Make a cycle from sorted, distinct term indices.
    pub fn new(terms: Vec<usize>, flips_parity: bool) -> Self {
        debug_assert!(terms.windows(2).all(|w| w[0] < w[1]));
        Self {
            terms,
            flips_parity,
        }
    }

    /// Sorted term indices.
    pub fn terms(&self) -> &[usize] {
        &self.terms
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True for the trivial cycle.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether the product of masks is the global flip instead of the identity.
    pub fn flips_parity(&self) -> bool {
        self.flips_parity
    }

    /// GF(2) sum of two cycles.
    pub fn combine(&self, other: &Cycle) -> Cycle {
        Cycle {
            terms: symmetric_difference(&self.terms, &other.terms),
            flips_parity: self.flips_parity ^ other.flips_parity,
        }
    }
}

/// Fundamental cycles of the permutation terms, from the null space of their
/// flip masks over GF(2).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleBasis {
    fundamental: Vec<Cycle>,
    extended: Vec<Cycle>,
}

struct PivotRow {
    pivot: usize,
    row: BasisState,
    combination: Vec<usize>,
}

impl CycleBasis {
    /// Find a basis of cycles. With `include_parity` the global flip is added
    /// as a virtual column so cycles may change the parity sector.
    pub fn new<H: HamiltonianModel>(ham: &H, include_parity: bool) -> Self {
        let nterms = ham.num_terms();
        let ncols = nterms + usize::from(include_parity);
        let full = BasisState::ones(ham.nspins());

        let mut pivots: Vec<PivotRow> = vec![];
        let mut fundamental = vec![];
        for col in 0..ncols {
            let mut row = if col < nterms {
                ham.flip_mask(col).clone()
            } else {
                full.clone()
            };
            let mut combination = vec![col];
            loop {
                match row.lowest_set_bit() {
                    None => {
                        fundamental.push(Self::cycle_from_columns(&combination, nterms));
                        break;
                    }
                    Some(bit) => match pivots.iter().find(|p| p.pivot == bit) {
                        Some(p) => {
                            row.xor_assign(&p.row);
                            combination = symmetric_difference(&combination, &p.combination);
                        }
                        None => {
                            pivots.push(PivotRow {
                                pivot: bit,
                                row,
                                combination,
                            });
                            break;
                        }
                    },
                }
            }
        }
        Self::minimize(&mut fundamental);

        let extended = fundamental
            .iter()
            .tuple_combinations()
            .map(|(a, b)| a.combine(b))
            .chain(fundamental.iter().cloned())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            fundamental,
            extended,
        }
    }

    fn cycle_from_columns(columns: &[usize], nterms: usize) -> Cycle {
        let terms: Vec<usize> = columns.iter().copied().filter(|c| *c < nterms).collect();
        let flips_parity = columns.last().map(|c| *c >= nterms).unwrap_or(false);
        Cycle::new(terms, flips_parity)
    }

    /// Shorten cycles by replacing one with its sum with another while that
    /// reduces its length. The span is unchanged.
    fn minimize(cycles: &mut [Cycle]) {
        let mut changed = true;
        while changed {
            changed = false;
            for a in 0..cycles.len() {
                for b in 0..cycles.len() {
                    if a == b {
                        continue;
                    }
                    let c = cycles[a].combine(&cycles[b]);
                    if !c.is_empty() && c.len() < cycles[a].len() {
                        cycles[a] = c;
                        changed = true;
                    }
                }
            }
        }
        cycles.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    }

    /// Minimized fundamental cycles.
    pub fn fundamental(&self) -> &[Cycle] {
        &self.fundamental
    }

    /// Fundamental cycles and all pairwise sums, deduplicated.
    pub fn extended(&self) -> &[Cycle] {
        &self.extended
    }

    /// Number of fundamental cycles.
    pub fn len(&self) -> usize {
        self.fundamental.len()
    }

    /// True if the terms admit no cycles.
    pub fn is_empty(&self) -> bool {
        self.fundamental.is_empty()
    }
}

#[cfg(test)]
mod cycles_tests {
    use super::*;
    use crate::errors::QmcResult;
    use crate::pmr::pauli::PauliHamiltonian;

    fn product(c: &Cycle, ham: &PauliHamiltonian) -> BasisState {
        let mut acc = BasisState::zeros(ham.nspins());
        c.terms().iter().for_each(|t| acc.xor_assign(ham.flip_mask(*t)));
        acc
    }

    fn check_closed(ham: &PauliHamiltonian, cycles: &[Cycle]) {
        let n = ham.nspins();
        for c in cycles {
            let p = product(c, ham);
            if c.flips_parity() {
                assert_eq!(p, BasisState::ones(n), "{:?}", c);
            } else {
                assert!(p.is_zero(), "{:?}", c);
            }
        }
    }

    #[test]
    fn test_triangle_cycle() -> QmcResult<()> {
        let ham = PauliHamiltonian::parse(2, &[(-1.0, "X0"), (-1.0, "X1"), (-0.5, "X0 X1")])?;
        let basis = CycleBasis::new(&ham, false);
        assert_eq!(basis.len(), 1);
        assert_eq!(basis.fundamental()[0].terms(), &[0, 1, 2]);
        check_closed(&ham, basis.fundamental());
        Ok(())
    }

    #[test]
    fn test_no_cycles() -> QmcResult<()> {
        let ham = PauliHamiltonian::parse(2, &[(-1.0, "X0"), (-1.0, "X1"), (1.0, "Z0 Z1")])?;
        let basis = CycleBasis::new(&ham, false);
        assert!(basis.is_empty());
        assert!(basis.extended().is_empty());
        Ok(())
    }

    #[test]
    fn test_parity_cycles() -> QmcResult<()> {
        let ham = PauliHamiltonian::parse(2, &[(-1.0, "X0"), (-1.0, "X1")])?;
        let basis = CycleBasis::new(&ham, true);
        assert_eq!(basis.len(), 1);
        assert!(basis.fundamental()[0].flips_parity());
        check_closed(&ham, basis.fundamental());
        Ok(())
    }

    #[test]
    fn test_ring_cycles_minimized() -> QmcResult<()> {
        // XX couplings around a ring of six and single X flips on every site.
        let mut terms: Vec<(f64, String)> = (0..6)
            .map(|i| (-1.0, format!("X{} X{}", i, (i + 1) % 6)))
            .collect();
        terms.extend((0..6).map(|i| (-0.5, format!("X{}", i))));
        let terms: Vec<(f64, &str)> = terms.iter().map(|(c, s)| (*c, s.as_str())).collect();
        let ham = PauliHamiltonian::parse(6, &terms)?;
        let basis = CycleBasis::new(&ham, false);
        assert_eq!(basis.len(), 12 - 6);
        check_closed(&ham, basis.fundamental());
        check_closed(&ham, basis.extended());
        // Bonds close triangles with their two single-site flips.
        let triangles = basis.fundamental().iter().filter(|c| c.len() == 3).count();
        assert!(triangles >= 5);
        assert!(basis.fundamental().iter().all(|c| c.len() <= 6));
        Ok(())
    }
}
