use crate::binning::{combine_summaries, Summary};
use crate::config::SimulationParams;
use crate::errors::QmcResult;
use crate::pmr::hamiltonian::HamiltonianModel;
use crate::simulation::{run_simulation, CancellationToken, RunReport};
use rayon::prelude::*;

/// Run `nreplicas` independent replicas in parallel. Replica `i` uses stream
/// `i` of the seed and its own checkpoint file.
pub fn run_replicas<H: HamiltonianModel + Sync>(
    params: &SimulationParams,
    ham: &H,
    nreplicas: usize,
    cancel: &CancellationToken,
) -> QmcResult<Vec<RunReport>> {
    (0..nreplicas)
        .into_par_iter()
        .map(|replica| run_simulation(params, ham, replica, cancel))
        .collect()
}

/// Combined summary over the replicas' reports.
pub fn combined_summary(reports: &[RunReport]) -> Option<Summary> {
    let summaries: Vec<Summary> = reports.iter().map(|r| r.summary.clone()).collect();
    combine_summaries(&summaries)
}
