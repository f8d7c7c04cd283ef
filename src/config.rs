use crate::errors::{QmcError, QmcResult};
use crate::pmr::configuration::WeightMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters of one simulation. Every field has a default so a YAML file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Composite updates discarded before measuring.
    #[serde(default = "default_equilibration_steps")]
    pub equilibration_steps: u64,
    /// Composite updates in the measurement phase.
    #[serde(default = "default_steps")]
    pub steps: u64,
    /// Composite updates between measurements.
    #[serde(default = "default_steps_per_measurement")]
    pub steps_per_measurement: u64,
    /// Inverse temperature.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Imaginary time at which correlation functions are evaluated.
    #[serde(default = "default_tau")]
    pub tau: f64,
    /// `0` samples `Tr e^{-beta H}`; `+1` or `-1` restricts to that eigenvalue
    /// of the global spin flip.
    #[serde(default)]
    pub parity: i8,
    /// Bound on the length of the operator string.
    #[serde(default = "default_qmax")]
    pub qmax: usize,
    /// Number of bins used for error estimates.
    #[serde(default = "default_nbins")]
    pub nbins: usize,
    /// How cycle completion picks its candidates.
    #[serde(default)]
    pub cycle_search: CycleSearch,
    /// Cap on the candidates examined by a restrictive cycle search.
    #[serde(default = "default_max_cycle_candidates")]
    pub max_cycle_candidates: usize,
    /// Success probability of the geometric window length in cycle completion.
    #[serde(default = "default_gaps_geometric_parameter")]
    pub gaps_geometric_parameter: f64,
    /// Probability of ending a composite update after each elementary move.
    #[serde(default = "default_composite_update_break_probability")]
    pub composite_update_break_probability: f64,
    /// Monte Carlo weight.
    #[serde(default)]
    pub weight_mode: WeightMode,
    /// Use `seed` instead of a fresh seed.
    #[serde(default)]
    pub exactly_reproducible: bool,
    /// Seed used when `exactly_reproducible` is set.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Which observables to measure.
    #[serde(default)]
    pub observables: ObservableFlags,
    /// Relative frequency of the elementary moves.
    #[serde(default)]
    pub moves: MoveMix,
    /// Simpson sub-intervals used for the correlation integrals. Must be even.
    #[serde(default = "default_integration_intervals")]
    pub integration_intervals: usize,
    /// Recompute the weight after every composite update and compare.
    #[serde(default)]
    pub consistency_checks: bool,
    /// Saving and resuming.
    #[serde(default)]
    pub checkpoint: CheckpointSettings,
}

fn default_equilibration_steps() -> u64 {
    1
}

fn default_steps() -> u64 {
    2500
}

fn default_steps_per_measurement() -> u64 {
    10
}

fn default_beta() -> f64 {
    0.1
}

fn default_tau() -> f64 {
    0.05
}

fn default_qmax() -> usize {
    1000
}

fn default_nbins() -> usize {
    250
}

fn default_gaps_geometric_parameter() -> f64 {
    0.8
}

fn default_composite_update_break_probability() -> f64 {
    0.9
}

fn default_seed() -> u64 {
    1234
}

fn default_integration_intervals() -> usize {
    16
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            equilibration_steps: default_equilibration_steps(),
            steps: default_steps(),
            steps_per_measurement: default_steps_per_measurement(),
            beta: default_beta(),
            tau: default_tau(),
            parity: 0,
            qmax: default_qmax(),
            nbins: default_nbins(),
            cycle_search: CycleSearch::default(),
            max_cycle_candidates: default_max_cycle_candidates(),
            gaps_geometric_parameter: default_gaps_geometric_parameter(),
            composite_update_break_probability: default_composite_update_break_probability(),
            weight_mode: WeightMode::default(),
            exactly_reproducible: false,
            seed: default_seed(),
            observables: ObservableFlags::default(),
            moves: MoveMix::default(),
            integration_intervals: default_integration_intervals(),
            consistency_checks: false,
            checkpoint: CheckpointSettings::default(),
        }
    }
}

impl SimulationParams {
    /// Number of measurements a complete run takes.
    pub fn total_measurements(&self) -> u64 {
        self.steps / self.steps_per_measurement.max(1)
    }

    /// Reject parameters which cannot produce a meaningful run.
    pub fn validate(&self) -> QmcResult<()> {
        if self.steps_per_measurement == 0 {
            return Err(QmcError::invalid(
                "steps_per_measurement",
                "must be positive",
            ));
        }
        if self.nbins == 0 {
            return Err(QmcError::invalid("nbins", "must be positive"));
        }
        if self.qmax == 0 {
            return Err(QmcError::invalid("qmax", "must be positive"));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(QmcError::invalid(
                "beta",
                format!("must be positive and finite, got {}", self.beta),
            ));
        }
        if !(self.tau >= 0.0 && self.tau <= self.beta) {
            return Err(QmcError::invalid(
                "tau",
                format!("must lie in [0, beta = {}], got {}", self.beta, self.tau),
            ));
        }
        if !matches!(self.parity, -1..=1) {
            return Err(QmcError::invalid(
                "parity",
                format!("must be -1, 0 or 1, got {}", self.parity),
            ));
        }
        check_probability(
            "gaps_geometric_parameter",
            self.gaps_geometric_parameter,
        )?;
        check_probability(
            "composite_update_break_probability",
            self.composite_update_break_probability,
        )?;
        if self.total_measurements() < self.nbins as u64 {
            return Err(QmcError::invalid(
                "nbins",
                format!(
                    "{} measurements cannot fill {} bins",
                    self.total_measurements(),
                    self.nbins
                ),
            ));
        }
        if self.integration_intervals < 2 || self.integration_intervals % 2 != 0 {
            return Err(QmcError::invalid(
                "integration_intervals",
                "must be even and at least 2",
            ));
        }
        if self.cycle_search == CycleSearch::Restrictive && self.max_cycle_candidates == 0 {
            return Err(QmcError::invalid(
                "max_cycle_candidates",
                "must be positive for a restrictive search",
            ));
        }
        self.moves.validate()?;
        if self.checkpoint.hurry_on_signal && !self.checkpoint.save_unfinished {
            return Err(QmcError::invalid(
                "checkpoint.hurry_on_signal",
                "only meaningful together with save_unfinished",
            ));
        }
        Ok(())
    }
}

fn check_probability(name: &'static str, p: f64) -> QmcResult<()> {
    if p > 0.0 && p <= 1.0 {
        Ok(())
    } else {
        Err(QmcError::invalid(name, format!("must lie in (0, 1], got {}", p)))
    }
}

/// Candidate selection for cycle completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleSearch {
    /// Fundamental cycles and all their pairwise sums.
    Exhaustive,
    /// Fundamental cycles only, at most `max_cycle_candidates` per proposal.
    Restrictive,
}

fn default_max_cycle_candidates() -> usize {
    4
}

impl Default for CycleSearch {
    fn default() -> Self {
        CycleSearch::Exhaustive
    }
}

/// Per-observable switches. All are on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservableFlags {
    /// `<H>`
    #[serde(default = "enabled")]
    pub h: bool,
    /// `<H^2>`
    #[serde(default = "enabled")]
    pub h2: bool,
    /// `<H_diag>`
    #[serde(default = "enabled")]
    pub hdiag: bool,
    /// `<H_diag^2>`
    #[serde(default = "enabled")]
    pub hdiag2: bool,
    /// `<H_offdiag>`
    #[serde(default = "enabled")]
    pub hoffdiag: bool,
    /// `<H_offdiag^2>`
    #[serde(default = "enabled")]
    pub hoffdiag2: bool,
    /// Z magnetization per spin.
    #[serde(default = "enabled")]
    pub z_magnetization: bool,
    /// `<H_diag(tau) H_diag>`
    #[serde(default = "enabled")]
    pub hdiag_corr: bool,
    /// `int_0^{beta/2} <H_diag(tau) H_diag> dtau`
    #[serde(default = "enabled")]
    pub hdiag_eint: bool,
    /// `int_0^{beta/2} tau <H_diag(tau) H_diag> dtau`
    #[serde(default = "enabled")]
    pub hdiag_fint: bool,
    /// `<H_offdiag(tau) H_offdiag>`
    #[serde(default = "enabled")]
    pub hoffdiag_corr: bool,
    /// `int_0^{beta/2} <H_offdiag(tau) H_offdiag> dtau`
    #[serde(default = "enabled")]
    pub hoffdiag_eint: bool,
    /// `int_0^{beta/2} tau <H_offdiag(tau) H_offdiag> dtau`
    #[serde(default = "enabled")]
    pub hoffdiag_fint: bool,
}

fn enabled() -> bool {
    true
}

impl ObservableFlags {
    /// Everything switched on.
    pub fn all() -> Self {
        Self::with_all(true)
    }

    /// Everything switched off.
    pub fn none() -> Self {
        Self::with_all(false)
    }

    fn with_all(v: bool) -> Self {
        Self {
            h: v,
            h2: v,
            hdiag: v,
            hdiag2: v,
            hoffdiag: v,
            hoffdiag2: v,
            z_magnetization: v,
            hdiag_corr: v,
            hdiag_eint: v,
            hdiag_fint: v,
            hoffdiag_corr: v,
            hoffdiag_eint: v,
            hoffdiag_fint: v,
        }
    }
}

impl Default for ObservableFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Relative frequency of each elementary move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveMix {
    /// Flip a spin of the starting state.
    #[serde(default = "default_classical_flip")]
    pub classical_flip: f64,
    /// Swap two adjacent operators.
    #[serde(default = "default_local_swap")]
    pub local_swap: f64,
    /// Rotate the operator string.
    #[serde(default = "default_block_swap")]
    pub block_swap: f64,
    /// Insert or delete a pair of equal operators.
    #[serde(default = "default_pair")]
    pub pair: f64,
    /// Replace a window of operators using a cycle.
    #[serde(default = "default_cycle_completion")]
    pub cycle_completion: f64,
}

fn default_classical_flip() -> f64 {
    0.15
}

fn default_local_swap() -> f64 {
    0.15
}

fn default_block_swap() -> f64 {
    0.1
}

fn default_pair() -> f64 {
    0.3
}

fn default_cycle_completion() -> f64 {
    0.3
}

impl Default for MoveMix {
    fn default() -> Self {
        Self {
            classical_flip: default_classical_flip(),
            local_swap: default_local_swap(),
            block_swap: default_block_swap(),
            pair: default_pair(),
            cycle_completion: default_cycle_completion(),
        }
    }
}

impl MoveMix {
    /// The weights in a fixed order: flip, swap, block, pair, cycle.
    pub fn weights(&self) -> [f64; 5] {
        [
            self.classical_flip,
            self.local_swap,
            self.block_swap,
            self.pair,
            self.cycle_completion,
        ]
    }

    fn validate(&self) -> QmcResult<()> {
        let w = self.weights();
        if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(QmcError::invalid(
                "moves",
                "weights must be finite and non-negative",
            ));
        }
        if w.iter().sum::<f64>() <= 0.0 {
            return Err(QmcError::invalid("moves", "at least one move needs weight"));
        }
        Ok(())
    }
}

/// Checkpoint behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Save when the run completes.
    #[serde(default)]
    pub save_completed: bool,
    /// Save when the run is cancelled before completing.
    #[serde(default)]
    pub save_unfinished: bool,
    /// Resume from a saved checkpoint if one exists.
    #[serde(default)]
    pub resume: bool,
    /// Honour a cancellation between elementary moves instead of waiting for
    /// the composite update to finish.
    #[serde(default)]
    pub hurry_on_signal: bool,
    /// Directory holding the checkpoint files.
    #[serde(default = "default_checkpoint_directory")]
    pub directory: PathBuf,
}

fn default_checkpoint_directory() -> PathBuf {
    PathBuf::from(".")
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            save_completed: false,
            save_unfinished: false,
            resume: false,
            hurry_on_signal: false,
            directory: default_checkpoint_directory(),
        }
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.total_measurements(), 250);
    }

    #[test]
    fn test_yaml_overrides() -> Result<(), serde_yaml::Error> {
        let yaml = "beta: 2.0\nnbins: 10\ncycle_search: restrictive\nmax_cycle_candidates: 2\nobservables:\n  h2: false\n";
        let params: SimulationParams = serde_yaml::from_str(yaml)?;
        assert_eq!(params.beta, 2.0);
        assert_eq!(params.nbins, 10);
        assert_eq!(params.qmax, 1000);
        assert_eq!(params.cycle_search, CycleSearch::Restrictive);
        assert_eq!(params.max_cycle_candidates, 2);
        assert!(!params.observables.h2);
        assert!(params.observables.h);
        Ok(())
    }

    #[test]
    fn test_rejects_misconfiguration() {
        let bad = [
            SimulationParams {
                nbins: 0,
                ..Default::default()
            },
            SimulationParams {
                qmax: 0,
                ..Default::default()
            },
            SimulationParams {
                tau: 1.0,
                ..Default::default()
            },
            SimulationParams {
                parity: 2,
                ..Default::default()
            },
            SimulationParams {
                composite_update_break_probability: 0.0,
                ..Default::default()
            },
            SimulationParams {
                steps: 100,
                ..Default::default()
            },
            SimulationParams {
                integration_intervals: 3,
                ..Default::default()
            },
            SimulationParams {
                checkpoint: CheckpointSettings {
                    hurry_on_signal: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for params in bad.iter() {
            assert!(
                matches!(params.validate(), Err(QmcError::InvalidParameter { .. })),
                "{:?}",
                params
            );
        }
    }
}
