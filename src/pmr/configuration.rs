use crate::errors::{QmcError, QmcResult};
use crate::pmr::basis::BasisState;
use crate::pmr::divdiff::ExpDivDiff;
use crate::pmr::hamiltonian::HamiltonianModel;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Which quantity is used as the Monte Carlo weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightMode {
    /// `|Re W|`, with `sign(Re W)` reweighted.
    RealPart,
    /// `|W|`, with the phase reweighted.
    Absolute,
}

impl Default for WeightMode {
    fn default() -> Self {
        WeightMode::RealPart
    }
}

/// Where the path ends relative to its starting state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sector {
    /// `z_q = z_0`.
    Closed,
    /// `z_q` is the global spin flip of `z_0`.
    Flipped,
}

/// Weight of a configuration, stored as `ln|W|` and a unit phase.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    ln_abs: f64,
    phase: Complex64,
    sector: Option<Sector>,
}

impl Weight {
    /// A configuration which does not contribute.
    pub fn zero() -> Self {
        Self {
            ln_abs: f64::NEG_INFINITY,
            phase: Complex64::new(0.0, 0.0),
            sector: None,
        }
    }

    /// `ln|W|`.
    pub fn ln_abs(&self) -> f64 {
        self.ln_abs
    }

    /// `W / |W|`, zero for a vanishing weight.
    pub fn phase(&self) -> Complex64 {
        self.phase
    }

    /// Sector of the path, `None` for a vanishing weight.
    pub fn sector(&self) -> Option<Sector> {
        self.sector
    }

    /// True if the configuration has zero weight.
    pub fn is_zero(&self) -> bool {
        self.sector.is_none() || self.ln_abs == f64::NEG_INFINITY
    }

    /// Logarithm of the weight used for Metropolis acceptance.
    pub fn ln_monte_carlo(&self, mode: WeightMode) -> f64 {
        if self.is_zero() {
            return f64::NEG_INFINITY;
        }
        match mode {
            WeightMode::Absolute => self.ln_abs,
            WeightMode::RealPart => {
                let c = self.phase.re.abs();
                if c > 0.0 {
                    self.ln_abs + c.ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    /// Sign carried into reweighted averages.
    pub fn sign(&self, mode: WeightMode) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        match mode {
            WeightMode::Absolute => self.phase.re,
            WeightMode::RealPart => {
                if self.phase.re > 0.0 {
                    1.0
                } else if self.phase.re < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// The diagonal energies along a path and the product of its off-diagonal
/// matrix elements.
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    /// `E(z_0), ..., E(z_q)`.
    pub energies: Vec<f64>,
    /// `sum_j ln|d_{i_j}(z_j)|`.
    pub ln_elements: f64,
    /// `prod_j d_{i_j}(z_j) / |d_{i_j}(z_j)|`.
    pub phase: Complex64,
    /// Sector, or `None` for an open path or a vanishing matrix element.
    pub sector: Option<Sector>,
}

impl Path {
    /// `W = prod_j d_{i_j}(z_j) (-beta)^q e^{[-beta E_0, ..., -beta E_q]}`,
    /// times `parity` in the flipped sector.
    pub fn weight(&self, beta: f64, parity: i8, divdiff: &mut ExpDivDiff) -> Weight {
        let sector = match self.sector {
            Some(Sector::Flipped) if parity == 0 => return Weight::zero(),
            Some(s) => s,
            None => return Weight::zero(),
        };
        let q = self.energies.len() - 1;
        let points: Vec<f64> = self.energies.iter().map(|e| -beta * e).collect();
        let ln_abs = self.ln_elements + q as f64 * beta.ln() + divdiff.ln_divdiff(&points);
        let mut phase = self.phase;
        if q % 2 == 1 {
            phase = -phase;
        }
        if sector == Sector::Flipped && parity < 0 {
            phase = -phase;
        }
        Weight {
            ln_abs,
            phase,
            sector: Some(sector),
        }
    }
}

/// A term of the permutation matrix expansion: a basis state `z_0` and an
/// ordered string of permutation terms applied to it from left to right.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    state: BasisState,
    sequence: Vec<usize>,
    qmax: usize,
}

impl Configuration {
    /// Empty operator string on `state`.
    pub fn new(state: BasisState, qmax: usize) -> Self {
        Self {
            state,
            sequence: Vec::new(),
            qmax,
        }
    }

    /// Build from an explicit sequence.
    pub fn with_sequence(state: BasisState, sequence: Vec<usize>, qmax: usize) -> QmcResult<Self> {
        if sequence.len() > qmax {
            return Err(QmcError::SequenceOverflow {
                length: sequence.len(),
                qmax,
            });
        }
        Ok(Self {
            state,
            sequence,
            qmax,
        })
    }

    /// The state `z_0`.
    pub fn state(&self) -> &BasisState {
        &self.state
    }

    /// The operator string.
    pub fn sequence(&self) -> &[usize] {
        &self.sequence
    }

    /// Number of operators `q`.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// True if `q = 0`.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Bound on `q`.
    pub fn qmax(&self) -> usize {
        self.qmax
    }

    /// Insert `term` twice before position `position`.
    pub fn insert_pair(&mut self, position: usize, term: usize) -> QmcResult<()> {
        let length = self.sequence.len() + 2;
        if length > self.qmax {
            return Err(QmcError::SequenceOverflow {
                length,
                qmax: self.qmax,
            });
        }
        self.sequence.splice(position..position, [term, term]);
        Ok(())
    }

    /// Remove the two operators at `position` and `position + 1`.
    pub fn remove_pair(&mut self, position: usize) {
        self.sequence.drain(position..position + 2);
    }

    /// Exchange the operators at `position` and `position + 1`.
    pub fn swap_adjacent(&mut self, position: usize) {
        self.sequence.swap(position, position + 1);
    }

    /// Flip spin `spin` of `z_0`, and so of every state along the path.
    pub fn flip_spin(&mut self, spin: usize) {
        self.state.flip(spin);
    }

    /// Rotate the string left by `shift`, moving the start of the path to `z_shift`.
    pub fn rotate<H: HamiltonianModel>(&mut self, shift: usize, ham: &H) {
        self.sequence[..shift]
            .iter()
            .for_each(|t| self.state.xor_assign(ham.flip_mask(*t)));
        self.sequence.rotate_left(shift);
    }

    /// Replace `sequence[start..end]` with `replacement`.
    pub fn splice(&mut self, start: usize, end: usize, replacement: &[usize]) -> QmcResult<()> {
        let length = self.sequence.len() - (end - start) + replacement.len();
        if length > self.qmax {
            return Err(QmcError::SequenceOverflow {
                length,
                qmax: self.qmax,
            });
        }
        self.sequence.splice(start..end, replacement.iter().copied());
        Ok(())
    }

    /// The state after the first `steps` operators.
    pub fn state_after<H: HamiltonianModel>(&self, steps: usize, ham: &H) -> BasisState {
        let mut s = self.state.clone();
        self.sequence[..steps]
            .iter()
            .for_each(|t| s.xor_assign(ham.flip_mask(*t)));
        s
    }

    /// Walk the path, collecting diagonal energies and matrix elements.
    pub fn path<H: HamiltonianModel>(&self, ham: &H) -> Path {
        let mut state = self.state.clone();
        let mut energies = Vec::with_capacity(self.sequence.len() + 1);
        energies.push(ham.diagonal_energy(&state));
        let mut ln_elements = 0.0;
        let mut phase = Complex64::new(1.0, 0.0);
        let mut vanishing = false;
        for term in &self.sequence {
            state.xor_assign(ham.flip_mask(*term));
            let d = ham.coefficient(*term, &state);
            let norm = d.norm();
            if norm > 0.0 {
                ln_elements += norm.ln();
                phase *= d / norm;
            } else {
                vanishing = true;
            }
            energies.push(ham.diagonal_energy(&state));
        }
        let sector = if vanishing {
            None
        } else {
            state.xor_assign(&self.state);
            if state.is_zero() {
                Some(Sector::Closed)
            } else if state.is_all_ones() {
                Some(Sector::Flipped)
            } else {
                None
            }
        };
        Path {
            energies,
            ln_elements,
            phase,
            sector,
        }
    }

    /// Weight of the configuration.
    pub fn weight<H: HamiltonianModel>(
        &self,
        ham: &H,
        beta: f64,
        parity: i8,
        divdiff: &mut ExpDivDiff,
    ) -> Weight {
        self.path(ham).weight(beta, parity, divdiff)
    }
}

/// The state of a Markov chain: its configuration and that configuration's weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    /// Current configuration.
    pub configuration: Configuration,
    /// Weight of `configuration`.
    pub weight: Weight,
}
