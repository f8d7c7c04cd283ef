//! Driver: equilibration, the measurement loop and checkpoint triggers.

use crate::binning::{BinningAccumulator, Summary};
use crate::checkpoint::{CheckpointManager, CheckpointRecord, Fingerprint};
use crate::config::SimulationParams;
use crate::errors::QmcResult;
use crate::estimator::Estimator;
use crate::pmr::configuration::ChainState;
use crate::pmr::hamiltonian::HamiltonianModel;
use crate::pmr::updates::{MoveStatistics, UpdateEngine, UpdateSettings};
use crate::rng::QmcRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative "stop soon" flag. Setting it never touches simulation state;
/// the driver polls it between composite updates.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token which is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst)
    }

    /// Whether a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag, for signal handlers which can only set a boolean.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

/// Progress of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Equilibration updates done.
    pub equilibration_updates: u64,
    /// Production updates done.
    pub updates: u64,
    /// Measurements taken.
    pub measurements: u64,
}

/// Why [`Simulation::advance`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// All equilibration and production updates are done.
    Completed,
    /// The update budget ran out first.
    Paused,
    /// The cancellation token was set.
    Interrupted,
}

/// State of one replica: the chain, its random stream and accumulated data.
#[derive(Debug)]
pub struct Simulation<'a, H> {
    params: SimulationParams,
    ham: &'a H,
    engine: UpdateEngine,
    estimator: Estimator,
    accumulator: BinningAccumulator,
    chain: ChainState,
    rng: QmcRng,
    counters: Counters,
    elapsed: Duration,
}

impl<'a, H: HamiltonianModel> Simulation<'a, H> {
    /// Fresh simulation of replica `replica`. Reproducible runs seed from
    /// `params.seed`; otherwise the seed is drawn and kept in [`Simulation::rng`].
    pub fn new(params: SimulationParams, ham: &'a H, replica: usize) -> QmcResult<Self> {
        params.validate()?;
        let mut engine = UpdateEngine::new(UpdateSettings::from_params(&params), ham)?;
        let mut rng = if params.exactly_reproducible {
            QmcRng::from_seed(params.seed, replica as u64)
        } else {
            QmcRng::from_entropy(replica as u64)
        };
        let chain = engine.initial_chain(ham, &mut rng);
        let estimator = Estimator::new(&params);
        let accumulator = BinningAccumulator::new(
            estimator.observables(),
            params.nbins,
            params.total_measurements(),
            params.beta,
        );
        Ok(Self {
            params,
            ham,
            engine,
            estimator,
            accumulator,
            chain,
            rng,
            counters: Counters::default(),
            elapsed: Duration::default(),
        })
    }

    /// What a checkpoint must match to be resumed by this simulation.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.params, self.ham, self.estimator.observables())
    }

    /// Continue from a checkpoint. The record's chain is checked against
    /// the Hamiltonian before it is adopted.
    pub fn restore(&mut self, record: CheckpointRecord) -> QmcResult<()> {
        self.engine.verify(&record.chain, self.ham)?;
        self.chain = record.chain;
        self.rng = record.rng;
        self.accumulator = record.accumulator;
        self.accumulator
            .extend_expected(self.params.total_measurements());
        self.counters = record.counters;
        self.engine.restore_statistics(record.statistics);
        self.elapsed = Duration::from_secs_f64(record.elapsed_secs.max(0.0));
        Ok(())
    }

    /// Snapshot of the full state.
    pub fn to_record(&self) -> CheckpointRecord {
        CheckpointRecord {
            fingerprint: self.fingerprint(),
            chain: self.chain.clone(),
            rng: self.rng.clone(),
            accumulator: self.accumulator.clone(),
            counters: self.counters,
            statistics: self.engine.statistics().clone(),
            elapsed_secs: self.elapsed.as_secs_f64(),
        }
    }

    /// Parameters in use.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Current chain.
    pub fn chain(&self) -> &ChainState {
        &self.chain
    }

    /// Random stream.
    pub fn rng(&self) -> &QmcRng {
        &self.rng
    }

    /// Progress counters.
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Move acceptance counts.
    pub fn statistics(&self) -> &MoveStatistics {
        self.engine.statistics()
    }

    /// Bins filled so far.
    pub fn accumulator(&self) -> &BinningAccumulator {
        &self.accumulator
    }

    /// Wall time spent updating, including previous sessions.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// True once every equilibration and production update is done.
    pub fn is_complete(&self) -> bool {
        self.counters.equilibration_updates >= self.params.equilibration_steps
            && self.counters.updates >= self.params.steps
    }

    /// Results over the measurements taken so far.
    pub fn summary(&self) -> Summary {
        self.accumulator.finalize()
    }

    /// Perform at most `budget` composite updates, measuring every
    /// `steps_per_measurement` production updates. `cancel` is polled between
    /// updates, and between elementary moves with `hurry_on_signal`.
    pub fn advance(&mut self, budget: u64, cancel: Option<&CancellationToken>) -> QmcResult<Progress> {
        let start = Instant::now();
        let progress = self.advance_inner(budget, cancel);
        self.elapsed += start.elapsed();
        progress
    }

    fn advance_inner(&mut self, budget: u64, cancel: Option<&CancellationToken>) -> QmcResult<Progress> {
        let hurry = if self.params.checkpoint.hurry_on_signal {
            cancel
        } else {
            None
        };
        let cancelled = || cancel.map(|t| t.is_cancelled()).unwrap_or(false);
        let mut done = 0u64;
        while !self.is_complete() {
            if cancelled() {
                return Ok(Progress::Interrupted);
            }
            if done >= budget {
                return Ok(Progress::Paused);
            }
            let equilibrating = self.counters.equilibration_updates < self.params.equilibration_steps;
            self.engine
                .composite_update(&mut self.chain, self.ham, &mut self.rng, hurry)?;
            done += 1;
            if self.params.consistency_checks {
                self.engine.verify(&self.chain, self.ham)?;
            }
            if equilibrating {
                self.counters.equilibration_updates += 1;
                continue;
            }
            self.counters.updates += 1;
            if self.counters.updates % self.params.steps_per_measurement == 0 {
                let sample = self.estimator.measure(&self.chain, self.ham);
                self.accumulator.push(&sample);
                self.counters.measurements += 1;
            }
        }
        Ok(Progress::Completed)
    }

    /// Run to completion or cancellation.
    pub fn run(&mut self, cancel: Option<&CancellationToken>) -> QmcResult<Progress> {
        self.advance(u64::MAX, cancel)
    }
}

/// Outcome of [`run_simulation`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Replica index.
    pub replica: usize,
    /// Seed of the random stream.
    pub seed: u64,
    /// Whether the run finished all its updates.
    pub completed: bool,
    /// Whether the run picked up from a checkpoint.
    pub resumed: bool,
    /// Progress counters.
    pub counters: Counters,
    /// Move acceptance counts.
    pub statistics: MoveStatistics,
    /// Means and errors.
    pub summary: Summary,
    /// Wall time spent updating, over all sessions.
    pub elapsed: Duration,
    /// Checkpoint written at the end, if any.
    pub checkpoint: Option<PathBuf>,
}

/// Run replica `replica` of `ham`: resume from its checkpoint if asked and
/// one exists, update until done or cancelled, and save according to the
/// checkpoint settings.
pub fn run_simulation<H: HamiltonianModel>(
    params: &SimulationParams,
    ham: &H,
    replica: usize,
    cancel: &CancellationToken,
) -> QmcResult<RunReport> {
    let mut sim = Simulation::new(params.clone(), ham, replica)?;
    let manager = CheckpointManager::new(&params.checkpoint.directory, replica);
    let mut resumed = false;
    if params.checkpoint.resume {
        if let Some(record) = manager.load(&sim.fingerprint())? {
            sim.restore(record)?;
            resumed = true;
        }
    }

    let completed = sim.run(Some(cancel))? == Progress::Completed;
    let save = if completed {
        params.checkpoint.save_completed
    } else {
        params.checkpoint.save_unfinished
    };
    let checkpoint = if save {
        manager.save(&sim.to_record())?;
        Some(manager.path().to_path_buf())
    } else {
        None
    };

    Ok(RunReport {
        replica,
        seed: sim.rng().seed(),
        completed,
        resumed,
        counters: sim.counters(),
        statistics: sim.statistics().clone(),
        summary: sim.summary(),
        elapsed: sim.elapsed(),
        checkpoint,
    })
}

#[cfg(test)]
mod simulation_tests {
    use super::*;
    use crate::pmr::pauli::PauliHamiltonian;

    fn params() -> SimulationParams {
        SimulationParams {
            equilibration_steps: 10,
            steps: 200,
            steps_per_measurement: 4,
            nbins: 5,
            beta: 1.0,
            tau: 0.5,
            exactly_reproducible: true,
            consistency_checks: true,
            ..Default::default()
        }
    }

    fn ham() -> PauliHamiltonian {
        PauliHamiltonian::parse(2, &[(-1.0, "X0"), (-1.0, "X1"), (-0.5, "Z0 Z1")]).unwrap()
    }

    #[test]
    fn test_counters_after_run() -> QmcResult<()> {
        let ham = ham();
        let mut sim = Simulation::new(params(), &ham, 0)?;
        assert_eq!(sim.run(None)?, Progress::Completed);
        let c = sim.counters();
        assert_eq!(c.equilibration_updates, 10);
        assert_eq!(c.updates, 200);
        assert_eq!(c.measurements, 50);
        assert_eq!(sim.accumulator().samples(), 50);
        assert!(sim.accumulator().bins().iter().all(|b| b.count() == 10));
        Ok(())
    }

    #[test]
    fn test_budget_pauses() -> QmcResult<()> {
        let ham = ham();
        let mut sim = Simulation::new(params(), &ham, 0)?;
        assert_eq!(sim.advance(15, None)?, Progress::Paused);
        assert_eq!(sim.counters().equilibration_updates, 10);
        assert_eq!(sim.counters().updates, 5);
        assert_eq!(sim.counters().measurements, 1);
        Ok(())
    }

    #[test]
    fn test_cancel_before_start() -> QmcResult<()> {
        let ham = ham();
        let mut sim = Simulation::new(params(), &ham, 0)?;
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(sim.run(Some(&token))?, Progress::Interrupted);
        assert_eq!(sim.counters(), Counters::default());
        Ok(())
    }

    #[test]
    fn test_reproducible_replicas() -> QmcResult<()> {
        let ham = ham();
        let mut a = Simulation::new(params(), &ham, 0)?;
        let mut b = Simulation::new(params(), &ham, 0)?;
        let mut c = Simulation::new(params(), &ham, 1)?;
        a.run(None)?;
        b.run(None)?;
        c.run(None)?;
        assert_eq!(a.accumulator(), b.accumulator());
        assert_eq!(a.chain(), b.chain());
        assert_ne!(a.rng(), c.rng());
        Ok(())
    }

    #[test]
    fn test_invalid_params_rejected() {
        let ham = ham();
        let bad = SimulationParams {
            nbins: 0,
            ..params()
        };
        assert!(Simulation::new(bad, &ham, 0).is_err());
    }
}
