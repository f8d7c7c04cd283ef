use std::path::PathBuf;
use thiserror::Error;

/// Errors which abort a simulation. Rejected Monte Carlo proposals are never errors.
#[derive(Debug, Error)]
pub enum QmcError {
    /// A simulation parameter is out of range or conflicts with another one.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The Hamiltonian cannot be used by the sampler.
    #[error("invalid hamiltonian: {0}")]
    InvalidHamiltonian(String),
    /// An operator sequence grew beyond its bound.
    #[error("operator sequence of length {length} exceeds qmax = {qmax}")]
    SequenceOverflow {
        /// Length the sequence would have had.
        length: usize,
        /// Configured bound.
        qmax: usize,
    },
    /// A consistency check on the Markov chain failed.
    #[error("configuration invariant violated: {0}")]
    InvariantViolation(String),
    /// Reading or writing a checkpoint failed at the filesystem level.
    #[error("checkpoint i/o error on {}: {source}", path.display())]
    CheckpointIo {
        /// Checkpoint file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A checkpoint exists but cannot be decoded.
    #[error("checkpoint {} is corrupt: {reason}", path.display())]
    CheckpointCorrupt {
        /// Checkpoint file.
        path: PathBuf,
        /// Decoder diagnostic.
        reason: String,
    },
    /// A checkpoint was written for a different simulation.
    #[error("checkpoint {} does not match this simulation: {reason}", path.display())]
    CheckpointMismatch {
        /// Checkpoint file.
        path: PathBuf,
        /// Which field disagrees.
        reason: String,
    },
}

impl QmcError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        QmcError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type QmcResult<T> = Result<T, QmcError>;
