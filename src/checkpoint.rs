//! Saving and restoring the full state of a replica.
//!
//! A checkpoint file is a magic header and format version followed by the
//! `bincode` encoding of a [`CheckpointRecord`]. Files are written to a
//! temporary sibling and renamed into place.

use crate::binning::BinningAccumulator;
use crate::config::SimulationParams;
use crate::errors::{QmcError, QmcResult};
use crate::estimator::Observable;
use crate::pmr::configuration::ChainState;
use crate::pmr::hamiltonian::HamiltonianModel;
use crate::pmr::updates::MoveStatistics;
use crate::rng::QmcRng;
use crate::simulation::Counters;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"PMRQMC\0\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;

/// Everything a record must agree on with the simulation resuming from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    nspins: usize,
    num_terms: usize,
    qmax: usize,
    nbins: usize,
    parity: i8,
    beta_bits: u64,
    tau_bits: u64,
    observables: Vec<Observable>,
}

impl Fingerprint {
    /// Fingerprint of a simulation of `ham` with `params`.
    pub fn new<H: HamiltonianModel>(params: &SimulationParams, ham: &H, observables: Vec<Observable>) -> Self {
        Self {
            nspins: ham.nspins(),
            num_terms: ham.num_terms(),
            qmax: params.qmax,
            nbins: params.nbins,
            parity: params.parity,
            beta_bits: params.beta.to_bits(),
            tau_bits: params.tau.to_bits(),
            observables,
        }
    }

    fn mismatch(&self, other: &Fingerprint) -> Option<String> {
        let differs = |name: &str, a: &dyn std::fmt::Debug, b: &dyn std::fmt::Debug| {
            Some(format!("{} is {:?} in the file but {:?} here", name, a, b))
        };
        if self.nspins != other.nspins {
            differs("nspins", &other.nspins, &self.nspins)
        } else if self.num_terms != other.num_terms {
            differs("number of terms", &other.num_terms, &self.num_terms)
        } else if self.qmax != other.qmax {
            differs("qmax", &other.qmax, &self.qmax)
        } else if self.nbins != other.nbins {
            differs("nbins", &other.nbins, &self.nbins)
        } else if self.parity != other.parity {
            differs("parity", &other.parity, &self.parity)
        } else if self.beta_bits != other.beta_bits {
            differs(
                "beta",
                &f64::from_bits(other.beta_bits),
                &f64::from_bits(self.beta_bits),
            )
        } else if self.tau_bits != other.tau_bits {
            differs(
                "tau",
                &f64::from_bits(other.tau_bits),
                &f64::from_bits(self.tau_bits),
            )
        } else if self.observables != other.observables {
            differs("observables", &other.observables, &self.observables)
        } else {
            None
        }
    }
}

/// Persisted state of one replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Which simulation this belongs to.
    pub fingerprint: Fingerprint,
    /// Markov chain.
    pub chain: ChainState,
    /// Random stream, including its position.
    pub rng: QmcRng,
    /// Bins filled so far.
    pub accumulator: BinningAccumulator,
    /// Progress counters.
    pub counters: Counters,
    /// Move acceptance counts.
    pub statistics: MoveStatistics,
    /// Wall time spent in previous sessions, in seconds.
    pub elapsed_secs: f64,
}

/// Reads and writes the checkpoint file of one replica.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    /// Manager for `directory/qmc_data_<replica>.dat`.
    pub fn new<P: AsRef<Path>>(directory: P, replica: usize) -> Self {
        Self {
            path: directory
                .as_ref()
                .join(format!("qmc_data_{}.dat", replica)),
        }
    }

    /// The checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> QmcError {
        QmcError::CheckpointIo {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> QmcError {
        QmcError::CheckpointCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Write `record`, replacing any previous checkpoint.
    pub fn save(&self, record: &CheckpointRecord) -> QmcResult<()> {
        let payload = bincode::serialize(record)
            .map_err(|e| self.io_error(io::Error::new(io::ErrorKind::Other, e)))?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("dat.tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(MAGIC)?;
            file.write_all(&FORMAT_VERSION.to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| self.io_error(e))
    }

    /// Read the checkpoint. `Ok(None)` if there is none; an error if it is
    /// unreadable or was written for a different simulation.
    pub fn load(&self, expected: &Fingerprint) -> QmcResult<Option<CheckpointRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(self.corrupt("missing checkpoint header"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "format version {} is not {}",
                version, FORMAT_VERSION
            )));
        }
        let record: CheckpointRecord =
            bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|e| self.corrupt(e.to_string()))?;
        if let Some(reason) = expected.mismatch(&record.fingerprint) {
            return Err(QmcError::CheckpointMismatch {
                path: self.path.clone(),
                reason,
            });
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod checkpoint_tests {
    use super::*;
    use crate::estimator::Sample;
    use crate::pmr::basis::BasisState;
    use crate::pmr::configuration::Configuration;
    use crate::pmr::pauli::PauliHamiltonian;
    use crate::pmr::updates::{UpdateEngine, UpdateSettings};

    fn record(params: &SimulationParams) -> QmcResult<CheckpointRecord> {
        let ham = PauliHamiltonian::parse(2, &[(-1.0, "X0"), (-1.0, "X1"), (0.5, "Z0 Z1")])?;
        let observables = vec![Observable::H, Observable::H2];
        let mut engine = UpdateEngine::new(UpdateSettings::from_params(params), &ham)?;
        let configuration = Configuration::with_sequence(BasisState::zeros(2), vec![1, 0, 0, 1], params.qmax)?;
        let weight = engine.evaluate(&configuration, &ham);
        let mut accumulator = BinningAccumulator::new(observables.clone(), 2, 4, params.beta);
        accumulator.push(&Sample {
            sign: 1.0,
            length: 4,
            values: vec![-0.5, 0.75],
        });
        Ok(CheckpointRecord {
            fingerprint: Fingerprint::new(params, &ham, observables),
            chain: ChainState {
                configuration,
                weight,
            },
            rng: QmcRng::from_seed(9, 1),
            accumulator,
            counters: Counters {
                equilibration_updates: 1,
                updates: 10,
                measurements: 1,
            },
            statistics: engine.statistics().clone(),
            elapsed_secs: 0.25,
        })
    }

    #[test]
    fn test_round_trip() -> QmcResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let params = SimulationParams::default();
        let rec = record(&params)?;
        let manager = CheckpointManager::new(dir.path(), 3);
        assert!(manager.path().ends_with("qmc_data_3.dat"));
        assert_eq!(manager.load(&rec.fingerprint)?, None);
        manager.save(&rec)?;
        assert_eq!(manager.load(&rec.fingerprint)?, Some(rec.clone()));
        // A second save replaces the first.
        let mut later = rec.clone();
        later.counters.updates = 20;
        manager.save(&later)?;
        assert_eq!(manager.load(&rec.fingerprint)?, Some(later));
        Ok(())
    }

    #[test]
    fn test_corrupt_file() -> QmcResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let params = SimulationParams::default();
        let rec = record(&params)?;
        let manager = CheckpointManager::new(dir.path(), 0);
        fs::write(manager.path(), b"not a checkpoint").unwrap();
        assert!(matches!(
            manager.load(&rec.fingerprint),
            Err(QmcError::CheckpointCorrupt { .. })
        ));

        manager.save(&rec)?;
        let mut bytes = fs::read(manager.path()).unwrap();
        bytes.truncate(bytes.len() / 2);
        fs::write(manager.path(), &bytes).unwrap();
        assert!(matches!(
            manager.load(&rec.fingerprint),
            Err(QmcError::CheckpointCorrupt { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_mismatched_parameters() -> QmcResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let params = SimulationParams::default();
        let rec = record(&params)?;
        let manager = CheckpointManager::new(dir.path(), 0);
        manager.save(&rec)?;
        let other = SimulationParams {
            beta: 2.0,
            ..params
        };
        let ham = PauliHamiltonian::parse(2, &[(-1.0, "X0"), (-1.0, "X1"), (0.5, "Z0 Z1")])?;
        let expected = Fingerprint::new(&other, &ham, vec![Observable::H, Observable::H2]);
        match manager.load(&expected) {
            Err(QmcError::CheckpointMismatch { reason, .. }) => assert!(reason.contains("beta")),
            other => panic!("expected a mismatch, got {:?}", other),
        }
        Ok(())
    }
}
