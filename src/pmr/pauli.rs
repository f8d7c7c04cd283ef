use crate::errors::{QmcError, QmcResult};
use crate::pmr::basis::BasisState;
use crate::pmr::hamiltonian::HamiltonianModel;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const HERMITIAN_TOLERANCE: f64 = 1e-12;

/// Single-site Pauli operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pauli {
    /// sigma^x
    X,
    /// sigma^y
    Y,
    /// sigma^z
    Z,
}

/// A product of Pauli operators on distinct sites, such as `X0 Y2 Z3`.
/// The empty string is the identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PauliString {
    factors: Vec<(usize, Pauli)>,
}

impl PauliString {
    /// Make a string from `(site, pauli)` factors.
    pub fn new(factors: Vec<(usize, Pauli)>) -> QmcResult<Self> {
        let mut sites: Vec<usize> = factors.iter().map(|(s, _)| *s).collect();
        sites.sort_unstable();
        if sites.windows(2).any(|w| w[0] == w[1]) {
            return Err(QmcError::InvalidHamiltonian(format!(
                "pauli string acts twice on a site: {:?}",
                factors
            )));
        }
        Ok(Self { factors })
    }

    /// Factors of the string.
    pub fn factors(&self) -> &[(usize, Pauli)] {
        &self.factors
    }

    /// Largest site index the string touches.
    pub fn max_site(&self) -> Option<usize> {
        self.factors.iter().map(|(s, _)| *s).max()
    }
}

impl FromStr for PauliString {
    type Err = QmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let factors = s
            .split_whitespace()
            .filter(|tok| *tok != "I")
            .map(|tok| {
                let mut chars = tok.chars();
                let pauli = match chars.next() {
                    Some('X') | Some('x') => Pauli::X,
                    Some('Y') | Some('y') => Pauli::Y,
                    Some('Z') | Some('z') => Pauli::Z,
                    _ => {
                        return Err(QmcError::InvalidHamiltonian(format!(
                            "cannot parse pauli factor `{}`",
                            tok
                        )))
                    }
                };
                let site = chars.as_str().parse::<usize>().map_err(|_| {
                    QmcError::InvalidHamiltonian(format!("missing site index in `{}`", tok))
                })?;
                Ok((site, pauli))
            })
            .collect::<QmcResult<Vec<_>>>()?;
        PauliString::new(factors)
    }
}

/// `c * Z^{zmask}`, a term of some diagonal operator.
#[derive(Clone, Debug, PartialEq)]
struct ZTerm {
    zmask: BasisState,
    coefficient: Complex64,
}

/// `D_i P_i` with `D_i` a sum of Z strings.
#[derive(Clone, Debug, PartialEq)]
struct PermutationTerm {
    flip: BasisState,
    diagonal: Vec<ZTerm>,
}

fn evaluate_zterms(terms: &[ZTerm], state: &BasisState) -> Complex64 {
    terms
        .iter()
        .map(|t| {
            if state.overlap_parity(&t.zmask) {
                -t.coefficient
            } else {
                t.coefficient
            }
        })
        .sum()
}

fn merge_zterm(terms: &mut Vec<ZTerm>, zmask: BasisState, coefficient: Complex64) {
    match terms.iter_mut().find(|t| t.zmask == zmask) {
        Some(t) => t.coefficient += coefficient,
        None => terms.push(ZTerm { zmask, coefficient }),
    }
}

/// Hamiltonian given as a weighted sum of Pauli strings, decomposed into
/// permutation matrix form by grouping strings with equal X support.
#[derive(Clone, Debug, PartialEq)]
pub struct PauliHamiltonian {
    nspins: usize,
    diagonal: Vec<ZTerm>,
    terms: Vec<PermutationTerm>,
}

impl PauliHamiltonian {
    /// Build from `(coefficient, string)` pairs and check hermiticity.
    pub fn from_terms(nspins: usize, terms: &[(Complex64, PauliString)]) -> QmcResult<Self> {
        if nspins == 0 {
            return Err(QmcError::InvalidHamiltonian(
                "hamiltonian needs at least one spin".to_string(),
            ));
        }
        let mut ham = Self {
            nspins,
            diagonal: vec![],
            terms: vec![],
        };
        terms
            .iter()
            .try_for_each(|(c, s)| ham.add_term(*c, s))?;
        ham.prune();
        ham.check_hermitian()?;
        Ok(ham)
    }

    /// Build from real coefficients and string representations, e.g.
    /// `[(-1.0, "Z0 Z1"), (-0.5, "X0")]`.
    pub fn parse(nspins: usize, terms: &[(f64, &str)]) -> QmcResult<Self> {
        let terms = terms
            .iter()
            .map(|(c, s)| Ok((Complex64::new(*c, 0.0), s.parse::<PauliString>()?)))
            .collect::<QmcResult<Vec<_>>>()?;
        Self::from_terms(nspins, &terms)
    }

    fn add_term(&mut self, coefficient: Complex64, string: &PauliString) -> QmcResult<()> {
        if let Some(site) = string.max_site() {
            if site >= self.nspins {
                return Err(QmcError::InvalidHamiltonian(format!(
                    "site {} out of range for {} spins",
                    site, self.nspins
                )));
            }
        }
        let mut xmask = BasisState::zeros(self.nspins);
        let mut zmask = BasisState::zeros(self.nspins);
        let mut ny = 0;
        for (site, pauli) in string.factors() {
            match pauli {
                Pauli::X => xmask.set(*site, true),
                Pauli::Z => zmask.set(*site, true),
                Pauli::Y => {
                    xmask.set(*site, true);
                    zmask.set(*site, true);
                    ny += 1;
                }
            }
        }
        // Y = i X Z, and X^x Z^z = (-1)^{|x & z|} Z^z X^x.
        let mut c = coefficient * Complex64::i().powi(ny);
        if xmask.overlap_parity(&zmask) {
            c = -c;
        }
        if xmask.is_zero() {
            merge_zterm(&mut self.diagonal, zmask, c);
        } else {
            match self.terms.iter_mut().find(|t| t.flip == xmask) {
                Some(t) => merge_zterm(&mut t.diagonal, zmask, c),
                None => self.terms.push(PermutationTerm {
                    flip: xmask,
                    diagonal: vec![ZTerm {
                        zmask,
                        coefficient: c,
                    }],
                }),
            }
        }
        Ok(())
    }

    fn prune(&mut self) {
        self.diagonal.retain(|t| t.coefficient.norm() > 0.0);
        self.terms
            .iter_mut()
            .for_each(|t| t.diagonal.retain(|z| z.coefficient.norm() > 0.0));
        self.terms.retain(|t| !t.diagonal.is_empty());
    }

    /// `D_i P_i` is hermitian iff every Z-string coefficient is real when the
    /// string commutes with the flip and imaginary when it anticommutes.
    fn check_hermitian(&self) -> QmcResult<()> {
        if let Some(t) = self
            .diagonal
            .iter()
            .find(|t| t.coefficient.im.abs() > HERMITIAN_TOLERANCE * t.coefficient.norm().max(1.0))
        {
            return Err(QmcError::InvalidHamiltonian(format!(
                "diagonal term on {:?} has complex coefficient {}",
                t.zmask, t.coefficient
            )));
        }
        for term in &self.terms {
            for z in &term.diagonal {
                let tol = HERMITIAN_TOLERANCE * z.coefficient.norm().max(1.0);
                let bad = if z.zmask.overlap_parity(&term.flip) {
                    z.coefficient.re.abs() > tol
                } else {
                    z.coefficient.im.abs() > tol
                };
                if bad {
                    return Err(QmcError::InvalidHamiltonian(format!(
                        "term flipping {:?} is not hermitian",
                        term.flip
                    )));
                }
            }
        }
        Ok(())
    }
}

impl HamiltonianModel for PauliHamiltonian {
    fn nspins(&self) -> usize {
        self.nspins
    }

    fn num_terms(&self) -> usize {
        self.terms.len()
    }

    fn flip_mask(&self, term: usize) -> &BasisState {
        &self.terms[term].flip
    }

    fn diagonal_energy(&self, state: &BasisState) -> f64 {
        evaluate_zterms(&self.diagonal, state).re
    }

    fn coefficient(&self, term: usize, target: &BasisState) -> Complex64 {
        evaluate_zterms(&self.terms[term].diagonal, target)
    }
}
