use crate::config::{CycleSearch, MoveMix, SimulationParams};
use crate::errors::{QmcError, QmcResult};
use crate::pmr::basis::BasisState;
use crate::pmr::configuration::{ChainState, Configuration, Sector, Weight, WeightMode};
use crate::pmr::cycles::CycleBasis;
use crate::pmr::divdiff::ExpDivDiff;
use crate::pmr::hamiltonian::HamiltonianModel;
use crate::simulation::CancellationToken;
use rand::Rng;
use rand_distr::Geometric;
use serde::{Deserialize, Serialize};

/// Elementary Monte Carlo moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// Flip one spin of `z_0`.
    ClassicalFlip,
    /// Swap two neighbouring operators.
    LocalSwap,
    /// Rotate the operator string.
    BlockSwap,
    /// Insert two equal operators next to each other.
    PairInsertion,
    /// Delete two equal neighbouring operators.
    PairDeletion,
    /// Replace a window of operators using a cycle.
    CycleCompletion,
}

impl MoveKind {
    /// Every move, in a fixed order.
    pub const ALL: [MoveKind; 6] = [
        MoveKind::ClassicalFlip,
        MoveKind::LocalSwap,
        MoveKind::BlockSwap,
        MoveKind::PairInsertion,
        MoveKind::PairDeletion,
        MoveKind::CycleCompletion,
    ];

    fn index(self) -> usize {
        match self {
            MoveKind::ClassicalFlip => 0,
            MoveKind::LocalSwap => 1,
            MoveKind::BlockSwap => 2,
            MoveKind::PairInsertion => 3,
            MoveKind::PairDeletion => 4,
            MoveKind::CycleCompletion => 5,
        }
    }

    /// Short name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            MoveKind::ClassicalFlip => "classical flip",
            MoveKind::LocalSwap => "local swap",
            MoveKind::BlockSwap => "block swap",
            MoveKind::PairInsertion => "pair insertion",
            MoveKind::PairDeletion => "pair deletion",
            MoveKind::CycleCompletion => "cycle completion",
        }
    }
}

/// Result of an elementary move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The chain moved to the proposed configuration.
    Accepted,
    /// The chain stayed where it was.
    Rejected,
}

/// Result of a composite update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositeOutcome {
    /// Elementary moves performed.
    pub substeps: usize,
    /// Elementary moves accepted.
    pub accepted: usize,
    /// The update stopped early because of a cancellation.
    pub interrupted: bool,
}

/// Proposal and acceptance counts per move.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStatistics {
    proposed: [u64; 6],
    accepted: [u64; 6],
    composite_updates: u64,
    substeps: u64,
}

impl MoveStatistics {
    fn record(&mut self, kind: MoveKind, outcome: MoveOutcome) {
        self.proposed[kind.index()] += 1;
        if outcome == MoveOutcome::Accepted {
            self.accepted[kind.index()] += 1;
        }
    }

    /// Times `kind` was proposed.
    pub fn proposed(&self, kind: MoveKind) -> u64 {
        self.proposed[kind.index()]
    }

    /// Times `kind` was accepted.
    pub fn accepted(&self, kind: MoveKind) -> u64 {
        self.accepted[kind.index()]
    }

    /// Fraction of accepted proposals of `kind`.
    pub fn acceptance_rate(&self, kind: MoveKind) -> Option<f64> {
        match self.proposed(kind) {
            0 => None,
            n => Some(self.accepted(kind) as f64 / n as f64),
        }
    }

    /// Number of composite updates performed.
    pub fn composite_updates(&self) -> u64 {
        self.composite_updates
    }

    /// Mean number of elementary moves per composite update.
    pub fn mean_substeps(&self) -> f64 {
        self.substeps as f64 / self.composite_updates.max(1) as f64
    }
}

/// The parameters the update engine reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateSettings {
    /// Inverse temperature.
    pub beta: f64,
    /// Parity sector selection, `0` for none.
    pub parity: i8,
    /// Bound on the operator string.
    pub qmax: usize,
    /// Monte Carlo weight.
    pub weight_mode: WeightMode,
    /// Probability of stopping after each elementary move.
    pub break_probability: f64,
    /// Success probability of the cycle completion window length.
    pub gaps_geometric_parameter: f64,
    /// Cycle candidate selection.
    pub cycle_search: CycleSearch,
    /// Candidate cap in restrictive mode.
    pub max_cycle_candidates: usize,
    /// Move frequencies.
    pub moves: MoveMix,
}

impl UpdateSettings {
    /// Pick the update settings out of the simulation parameters.
    pub fn from_params(params: &SimulationParams) -> Self {
        Self {
            beta: params.beta,
            parity: params.parity,
            qmax: params.qmax,
            weight_mode: params.weight_mode,
            break_probability: params.composite_update_break_probability,
            gaps_geometric_parameter: params.gaps_geometric_parameter,
            cycle_search: params.cycle_search,
            max_cycle_candidates: params.max_cycle_candidates,
            moves: params.moves,
        }
    }
}

/// Performs composite updates on a [`ChainState`].
#[derive(Clone, Debug)]
pub struct UpdateEngine {
    pub(crate) settings: UpdateSettings,
    pub(crate) cycles: CycleBasis,
    pub(crate) window_length: Geometric,
    move_cdf: [f64; 5],
    pub(crate) divdiff: ExpDivDiff,
    statistics: MoveStatistics,
}

impl UpdateEngine {
    /// Build an engine for `ham`, finding its cycles.
    pub fn new<H: HamiltonianModel>(settings: UpdateSettings, ham: &H) -> QmcResult<Self> {
        check_hamiltonian(ham)?;
        let window_length = Geometric::new(settings.gaps_geometric_parameter).map_err(|e| {
            QmcError::invalid("gaps_geometric_parameter", format!("{}", e))
        })?;
        let mut move_cdf = [0.0; 5];
        let mut acc = 0.0;
        for (c, w) in move_cdf.iter_mut().zip(settings.moves.weights().iter()) {
            acc += w;
            *c = acc;
        }
        if acc <= 0.0 {
            return Err(QmcError::invalid("moves", "at least one move needs weight"));
        }
        Ok(Self {
            cycles: CycleBasis::new(ham, settings.parity != 0),
            settings,
            window_length,
            move_cdf,
            divdiff: ExpDivDiff::new(),
            statistics: MoveStatistics::default(),
        })
    }

    /// Settings in use.
    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// Cycles used by cycle completion.
    pub fn cycles(&self) -> &CycleBasis {
        &self.cycles
    }

    /// Counters of proposed and accepted moves.
    pub fn statistics(&self) -> &MoveStatistics {
        &self.statistics
    }

    /// Replace the counters, as when resuming.
    pub fn restore_statistics(&mut self, statistics: MoveStatistics) {
        self.statistics = statistics;
    }

    /// Weight of `configuration` under the engine's settings.
    pub fn evaluate<H: HamiltonianModel>(&mut self, configuration: &Configuration, ham: &H) -> Weight {
        configuration.weight(
            ham,
            self.settings.beta,
            self.settings.parity,
            &mut self.divdiff,
        )
    }

    /// A chain starting from a random basis state and no operators.
    pub fn initial_chain<H: HamiltonianModel, R: Rng>(&mut self, ham: &H, rng: &mut R) -> ChainState {
        let bits: Vec<bool> = (0..ham.nspins()).map(|_| rng.gen_bool(0.5)).collect();
        let configuration = Configuration::new(BasisState::from_bools(&bits), self.settings.qmax);
        let weight = self.evaluate(&configuration, ham);
        ChainState {
            configuration,
            weight,
        }
    }

    /// Perform elementary moves until one of the independent break draws
    /// succeeds, or until `interrupt` is cancelled.
    pub fn composite_update<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
        interrupt: Option<&CancellationToken>,
    ) -> QmcResult<CompositeOutcome> {
        let mut outcome = CompositeOutcome::default();
        loop {
            let (_, result) = self.elementary_move(chain, ham, rng)?;
            outcome.substeps += 1;
            if result == MoveOutcome::Accepted {
                outcome.accepted += 1;
            }
            if interrupt.map(|t| t.is_cancelled()).unwrap_or(false) {
                outcome.interrupted = true;
                break;
            }
            if rng.gen::<f64>() < self.settings.break_probability {
                break;
            }
        }
        self.statistics.composite_updates += 1;
        self.statistics.substeps += outcome.substeps as u64;
        Ok(outcome)
    }

    /// Draw a move kind and perform it.
    pub fn elementary_move<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> QmcResult<(MoveKind, MoveOutcome)> {
        let kind = self.draw_move(rng);
        let outcome = self.propose(kind, chain, ham, rng)?;
        self.statistics.record(kind, outcome);
        Ok((kind, outcome))
    }

    fn draw_move<R: Rng>(&self, rng: &mut R) -> MoveKind {
        let total = self.move_cdf[4];
        let u = rng.gen::<f64>() * total;
        let slot = self
            .move_cdf
            .iter()
            .position(|c| u < *c)
            .unwrap_or_else(|| self.move_cdf.iter().rposition(|c| *c > 0.0).unwrap_or(0));
        match slot {
            0 => MoveKind::ClassicalFlip,
            1 => MoveKind::LocalSwap,
            2 => MoveKind::BlockSwap,
            3 => {
                if rng.gen_bool(0.5) {
                    MoveKind::PairInsertion
                } else {
                    MoveKind::PairDeletion
                }
            }
            _ => MoveKind::CycleCompletion,
        }
    }

    /// Propose a move of the given kind and accept or reject it.
    pub fn propose<H: HamiltonianModel, R: Rng>(
        &mut self,
        kind: MoveKind,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> QmcResult<MoveOutcome> {
        match kind {
            MoveKind::ClassicalFlip => Ok(self.classical_flip(chain, ham, rng)),
            MoveKind::LocalSwap => Ok(self.local_swap(chain, ham, rng)),
            MoveKind::BlockSwap => Ok(self.block_swap(chain, ham, rng)),
            MoveKind::PairInsertion => self.pair_insertion(chain, ham, rng),
            MoveKind::PairDeletion => Ok(self.pair_deletion(chain, ham, rng)),
            MoveKind::CycleCompletion => self.cycle_completion(chain, ham, rng),
        }
    }

    fn classical_flip<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> MoveOutcome {
        let spin = rng.gen_range(0..ham.nspins());
        let mut candidate = chain.configuration.clone();
        candidate.flip_spin(spin);
        self.metropolis(chain, candidate, ham, 0.0, rng)
    }

    fn local_swap<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> MoveOutcome {
        let q = chain.configuration.len();
        if q < 2 {
            return MoveOutcome::Rejected;
        }
        let m = rng.gen_range(0..q - 1);
        let seq = chain.configuration.sequence();
        if seq[m] == seq[m + 1] {
            return MoveOutcome::Rejected;
        }
        let mut candidate = chain.configuration.clone();
        candidate.swap_adjacent(m);
        self.metropolis(chain, candidate, ham, 0.0, rng)
    }

    fn block_swap<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> MoveOutcome {
        let q = chain.configuration.len();
        if q < 2 || chain.weight.sector() != Some(Sector::Closed) {
            return MoveOutcome::Rejected;
        }
        let shift = rng.gen_range(1..q);
        let mut candidate = chain.configuration.clone();
        candidate.rotate(shift, ham);
        self.metropolis(chain, candidate, ham, 0.0, rng)
    }

    fn pair_insertion<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> QmcResult<MoveOutcome> {
        let nterms = ham.num_terms();
        let q = chain.configuration.len();
        if nterms == 0 || q + 2 > self.settings.qmax {
            return Ok(MoveOutcome::Rejected);
        }
        let position = rng.gen_range(0..=q);
        let term = rng.gen_range(0..nterms);
        let mut candidate = chain.configuration.clone();
        candidate.insert_pair(position, term)?;
        // Forward 1/((q+1) nterms), reverse 1/(q+1).
        let ln_proposal = (nterms as f64).ln();
        Ok(self.metropolis(chain, candidate, ham, ln_proposal, rng))
    }

    fn pair_deletion<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> MoveOutcome {
        let q = chain.configuration.len();
        if q < 2 {
            return MoveOutcome::Rejected;
        }
        let m = rng.gen_range(0..q - 1);
        let seq = chain.configuration.sequence();
        if seq[m] != seq[m + 1] {
            return MoveOutcome::Rejected;
        }
        let mut candidate = chain.configuration.clone();
        candidate.remove_pair(m);
        let ln_proposal = -(ham.num_terms() as f64).ln();
        self.metropolis(chain, candidate, ham, ln_proposal, rng)
    }

    /// Accept `candidate` with probability `min(1, W'/W * exp(ln_proposal))`.
    pub(crate) fn metropolis<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        candidate: Configuration,
        ham: &H,
        ln_proposal: f64,
        rng: &mut R,
    ) -> MoveOutcome {
        let weight = self.evaluate(&candidate, ham);
        let mode = self.settings.weight_mode;
        let ln_ratio =
            weight.ln_monte_carlo(mode) - chain.weight.ln_monte_carlo(mode) + ln_proposal;
        if accept(ln_ratio, rng) {
            chain.configuration = candidate;
            chain.weight = weight;
            MoveOutcome::Accepted
        } else {
            MoveOutcome::Rejected
        }
    }

    /// Recompute the chain's weight and check it against the tracked one.
    pub fn verify<H: HamiltonianModel>(&mut self, chain: &ChainState, ham: &H) -> QmcResult<()> {
        let c = &chain.configuration;
        if c.len() > self.settings.qmax {
            return Err(QmcError::InvariantViolation(format!(
                "operator string of length {} exceeds qmax = {}",
                c.len(),
                self.settings.qmax
            )));
        }
        let recomputed = self.evaluate(c, ham);
        if recomputed.is_zero() {
            return Err(QmcError::InvariantViolation(format!(
                "chain sits on a zero-weight configuration {:?} {:?}",
                c.state(),
                c.sequence()
            )));
        }
        let tracked = chain.weight;
        let tol = 1e-9 * recomputed.ln_abs().abs().max(1.0);
        if recomputed.sector() != tracked.sector()
            || (recomputed.ln_abs() - tracked.ln_abs()).abs() > tol
            || (recomputed.phase() - tracked.phase()).norm() > 1e-9
        {
            return Err(QmcError::InvariantViolation(format!(
                "tracked weight {:?} disagrees with recomputed {:?}",
                tracked, recomputed
            )));
        }
        Ok(())
    }
}

fn accept<R: Rng>(ln_ratio: f64, rng: &mut R) -> bool {
    if ln_ratio.is_nan() {
        false
    } else if ln_ratio >= 0.0 {
        true
    } else {
        rng.gen::<f64>() < ln_ratio.exp()
    }
}

fn check_hamiltonian<H: HamiltonianModel>(ham: &H) -> QmcResult<()> {
    let n = ham.nspins();
    if n == 0 {
        return Err(QmcError::InvalidHamiltonian("no spins".to_string()));
    }
    let mut masks: Vec<&BasisState> = (0..ham.num_terms()).map(|t| ham.flip_mask(t)).collect();
    if let Some(m) = masks.iter().find(|m| m.nbits() != n || m.is_zero()) {
        return Err(QmcError::InvalidHamiltonian(format!(
            "flip mask {:?} is empty or has the wrong size",
            m
        )));
    }
    masks.sort();
    if masks.windows(2).any(|w| w[0] == w[1]) {
        return Err(QmcError::InvalidHamiltonian(
            "two permutation terms share a flip mask".to_string(),
        ));
    }
    Ok(())
}
