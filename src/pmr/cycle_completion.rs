//! Cycle completion: a window of distinct operators `R` is replaced by the
//! rest `C \ R` of a cycle `C` which overlaps it. Since the product of the
//! flip masks over `C` is the identity (or the global flip), the new string
//! stays closed in the same or the opposite parity sector.

use crate::config::CycleSearch;
use crate::errors::QmcResult;
use crate::pmr::configuration::ChainState;
use crate::pmr::cycles::Cycle;
use crate::pmr::hamiltonian::HamiltonianModel;
use crate::pmr::updates::{MoveOutcome, UpdateEngine};
use crate::util::vec_help::{has_repeats, intersection_count, symmetric_difference};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::Distribution;

/// Indices into `cycles` of those which share some but not all of their
/// terms with the sorted `window`, at most `cap` of them.
pub(crate) fn candidate_cycles(cycles: &[Cycle], window: &[usize], cap: Option<usize>) -> Vec<usize> {
    let found = cycles.iter().enumerate().filter_map(|(i, c)| {
        let shared = intersection_count(c.terms(), window);
        if shared > 0 && shared < c.len() {
            Some(i)
        } else {
            None
        }
    });
    match cap {
        Some(n) => found.take(n).collect(),
        None => found.collect(),
    }
}

fn ln_factorial(n: usize) -> f64 {
    (2..=n).map(|k| (k as f64).ln()).sum()
}

impl UpdateEngine {
    fn candidate_pool(&self) -> (&[Cycle], Option<usize>) {
        match self.settings.cycle_search {
            CycleSearch::Exhaustive => (self.cycles.extended(), None),
            CycleSearch::Restrictive => (
                self.cycles.fundamental(),
                Some(self.settings.max_cycle_candidates),
            ),
        }
    }

    pub(crate) fn cycle_completion<H: HamiltonianModel, R: Rng>(
        &mut self,
        chain: &mut ChainState,
        ham: &H,
        rng: &mut R,
    ) -> QmcResult<MoveOutcome> {
        let q = chain.configuration.len();
        if q == 0 || self.cycles.is_empty() {
            return Ok(MoveOutcome::Rejected);
        }
        let start = rng.gen_range(0..q);
        let r = 1 + self.window_length.sample(rng) as usize;
        if r > q - start {
            return Ok(MoveOutcome::Rejected);
        }
        let mut removed = chain.configuration.sequence()[start..start + r].to_vec();
        removed.sort_unstable();
        if has_repeats(&removed) {
            return Ok(MoveOutcome::Rejected);
        }

        let qmax = self.settings.qmax;
        let p = self.settings.gaps_geometric_parameter;
        let (pool, cap) = self.candidate_pool();
        let forward = candidate_cycles(pool, &removed, cap);
        if forward.is_empty() {
            return Ok(MoveOutcome::Rejected);
        }
        let chosen = forward[rng.gen_range(0..forward.len())];
        let mut added = symmetric_difference(&removed, pool[chosen].terms());
        let r_new = added.len();
        let q_new = q - r + r_new;
        if q_new > qmax {
            return Ok(MoveOutcome::Rejected);
        }
        let reverse = candidate_cycles(pool, &added, cap);
        if !reverse.contains(&chosen) {
            return Ok(MoveOutcome::Rejected);
        }

        // Window start, window length, candidate choice and ordering of the
        // inserted operators, forward against reverse.
        let gap = if r_new == r {
            0.0
        } else {
            (r_new as f64 - r as f64) * (1.0 - p).ln()
        };
        let ln_proposal = (q as f64).ln() - (q_new as f64).ln()
            + gap
            + (forward.len() as f64).ln()
            - (reverse.len() as f64).ln()
            + ln_factorial(r_new)
            - ln_factorial(r);

        added.shuffle(rng);
        let mut candidate = chain.configuration.clone();
        candidate.splice(start, start + r, &added)?;
        Ok(self.metropolis(chain, candidate, ham, ln_proposal, rng))
    }
}
