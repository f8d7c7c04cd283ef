//! Sign-reweighted binning of measurements.

use crate::estimator::{Observable, Sample};
use serde::{Deserialize, Serialize};

/// Sums over the measurements falling into one bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    count: u64,
    sign_sum: f64,
    length_sum: f64,
    value_sums: Vec<f64>,
    square_sums: Vec<f64>,
}

impl Bin {
    fn new(nobs: usize) -> Self {
        Self {
            count: 0,
            sign_sum: 0.0,
            length_sum: 0.0,
            value_sums: vec![0.0; nobs],
            square_sums: vec![0.0; nobs],
        }
    }

    /// Measurements in this bin.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// `Σ s`.
    pub fn sign_sum(&self) -> f64 {
        self.sign_sum
    }

    /// `Σ O s` for the observable at `index`.
    pub fn value_sum(&self, index: usize) -> f64 {
        self.value_sums[index]
    }

    fn absorb(&mut self, other: &Bin) {
        self.count += other.count;
        self.sign_sum += other.sign_sum;
        self.length_sum += other.length_sum;
        self.value_sums
            .iter_mut()
            .zip(other.value_sums.iter())
            .for_each(|(s, v)| *s += v);
        self.square_sums
            .iter_mut()
            .zip(other.square_sums.iter())
            .for_each(|(s, v)| *s += v);
    }

    fn ratio(&self, index: usize) -> Option<f64> {
        if self.count > 0 && self.sign_sum != 0.0 {
            Some(self.value_sums[index] / self.sign_sum)
        } else {
            None
        }
    }
}

/// Mean and standard error.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Mean.
    pub mean: f64,
    /// Standard error of the mean, `NaN` if it cannot be estimated.
    pub error: f64,
}

/// Final estimate of one observable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservableSummary {
    /// Which observable.
    pub observable: Observable,
    /// Sign-reweighted mean with its error.
    pub estimate: Estimate,
    /// Integrated autocorrelation time in measurements, from binned against
    /// naive variance. `0.5` for uncorrelated data.
    pub autocorrelation_time: f64,
}

/// Kind of susceptibility derived from a correlation integral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SusceptibilityKind {
    /// `EINT - (β/2) <A>^2`.
    Energy,
    /// `FINT - (β²/8) <A>^2`.
    Fidelity,
}

/// A susceptibility with its jackknife error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Susceptibility {
    /// The integral it is derived from.
    pub integral: Observable,
    /// Which susceptibility.
    pub kind: SusceptibilityKind,
    /// Value and error.
    pub estimate: Estimate,
}

/// Results of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of measurements.
    pub measurements: u64,
    /// Average sign.
    pub sign: Estimate,
    /// Mean operator string length.
    pub mean_length: f64,
    /// Longest operator string measured.
    pub max_length: usize,
    /// Estimates of the measured observables.
    pub observables: Vec<ObservableSummary>,
    /// Susceptibilities whose observable and integral were both measured.
    pub susceptibilities: Vec<Susceptibility>,
}

impl Summary {
    /// Summary of `observable`, if measured.
    pub fn get(&self, observable: Observable) -> Option<&ObservableSummary> {
        self.observables.iter().find(|o| o.observable == observable)
    }
}

/// Aggregates samples into `nbins` consecutive bins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinningAccumulator {
    beta: f64,
    observables: Vec<Observable>,
    expected_samples: u64,
    samples: u64,
    max_length: usize,
    bins: Vec<Bin>,
}

impl BinningAccumulator {
    /// Accumulator for `expected_samples` measurements split over `nbins` bins.
    pub fn new(observables: Vec<Observable>, nbins: usize, expected_samples: u64, beta: f64) -> Self {
        let nobs = observables.len();
        Self {
            beta,
            observables,
            expected_samples,
            samples: 0,
            max_length: 0,
            bins: (0..nbins).map(|_| Bin::new(nobs)).collect(),
        }
    }

    /// Observables in sample order.
    pub fn observables(&self) -> &[Observable] {
        &self.observables
    }

    /// Number of bins.
    pub fn nbins(&self) -> usize {
        self.bins.len()
    }

    /// The bins.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Samples pushed so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Longest operator string seen.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Raise the expected number of samples, as when extending a finished run.
    ///
    /// The existing bins are merged into the bins their first measurement
    /// would have landed in under the new layout, so the remaining
    /// measurements fill the upper bins to roughly the same count. The merge
    /// is exact when the new expectation is a multiple of the old one.
    pub fn extend_expected(&mut self, expected_samples: u64) {
        if expected_samples <= self.expected_samples {
            return;
        }
        let nbins = self.bins.len() as u128;
        let old = u128::from(self.expected_samples.max(1));
        let new = u128::from(expected_samples);
        let mut merged: Vec<Bin> = (0..self.bins.len())
            .map(|_| Bin::new(self.observables.len()))
            .collect();
        for (b, bin) in self.bins.iter().enumerate() {
            // First measurement k with k * nbins / old == b.
            let first = (b as u128 * old + nbins - 1) / nbins;
            let target = (first * nbins / new).min(nbins - 1) as usize;
            merged[target].absorb(bin);
        }
        self.bins = merged;
        self.expected_samples = expected_samples;
    }

    fn bin_index(&self) -> usize {
        let nbins = self.bins.len() as u128;
        let m = u128::from(self.expected_samples.max(1));
        let k = u128::from(self.samples) * nbins / m;
        k.min(nbins - 1) as usize
    }

    /// Add one measurement.
    pub fn push(&mut self, sample: &Sample) {
        debug_assert_eq!(sample.values.len(), self.observables.len());
        let index = self.bin_index();
        let bin = &mut self.bins[index];
        bin.count += 1;
        bin.sign_sum += sample.sign;
        bin.length_sum += sample.length as f64;
        for ((sum, square), value) in bin
            .value_sums
            .iter_mut()
            .zip(bin.square_sums.iter_mut())
            .zip(sample.values.iter())
        {
            let weighted = value * sample.sign;
            *sum += weighted;
            *square += weighted * weighted;
        }
        self.samples += 1;
        self.max_length = self.max_length.max(sample.length);
    }

    /// Means and errors of everything accumulated so far.
    pub fn finalize(&self) -> Summary {
        let filled: Vec<&Bin> = self.bins.iter().filter(|b| b.count > 0).collect();
        let total_count: u64 = filled.iter().map(|b| b.count).sum();
        let total_sign: f64 = filled.iter().map(|b| b.sign_sum).sum();
        let total_length: f64 = filled.iter().map(|b| b.length_sum).sum();

        let sign_means: Vec<f64> = filled
            .iter()
            .map(|b| b.sign_sum / b.count as f64)
            .collect();
        let sign = Estimate {
            mean: total_sign / total_count as f64,
            error: standard_error(&sign_means),
        };

        let observables = (0..self.observables.len())
            .map(|i| ObservableSummary {
                observable: self.observables[i],
                estimate: self.estimate(&filled, i, total_sign),
                autocorrelation_time: autocorrelation_time(&filled, i, total_count),
            })
            .collect();

        Summary {
            measurements: total_count,
            sign,
            mean_length: total_length / total_count as f64,
            max_length: self.max_length,
            observables,
            susceptibilities: self.susceptibilities(&filled),
        }
    }

    fn estimate(&self, filled: &[&Bin], index: usize, total_sign: f64) -> Estimate {
        let total: f64 = filled.iter().map(|b| b.value_sums[index]).sum();
        let ratios: Vec<f64> = filled.iter().filter_map(|b| b.ratio(index)).collect();
        Estimate {
            mean: total / total_sign,
            error: standard_error(&ratios),
        }
    }

    fn susceptibilities(&self, filled: &[&Bin]) -> Vec<Susceptibility> {
        let position = |o: Observable| self.observables.iter().position(|x| *x == o);
        self.observables
            .iter()
            .filter_map(|integral| {
                let a = position(integral.integrand()?)?;
                let i = position(*integral)?;
                let (kind, factor) = match integral {
                    Observable::HdiagEint | Observable::HoffdiagEint => {
                        (SusceptibilityKind::Energy, self.beta / 2.0)
                    }
                    _ => (SusceptibilityKind::Fidelity, self.beta * self.beta / 8.0),
                };
                Some(Susceptibility {
                    integral: *integral,
                    kind,
                    estimate: jackknife(filled, self.observables.len(), |sums| {
                        let mean_a = sums.values[a] / sums.sign;
                        sums.values[i] / sums.sign - factor * mean_a * mean_a
                    }),
                })
            })
            .collect()
    }
}

struct Sums {
    sign: f64,
    values: Vec<f64>,
}

impl Sums {
    fn of(bins: &[&Bin], nobs: usize) -> Self {
        let mut sums = Sums {
            sign: 0.0,
            values: vec![0.0; nobs],
        };
        for b in bins {
            sums.sign += b.sign_sum;
            sums.values
                .iter_mut()
                .zip(b.value_sums.iter())
                .for_each(|(s, v)| *s += v);
        }
        sums
    }

    fn without(&self, bin: &Bin) -> Self {
        Sums {
            sign: self.sign - bin.sign_sum,
            values: self
                .values
                .iter()
                .zip(bin.value_sums.iter())
                .map(|(s, v)| s - v)
                .collect(),
        }
    }
}

/// Estimate of `f` over all bins with its leave-one-bin-out jackknife error.
fn jackknife<F: Fn(&Sums) -> f64>(bins: &[&Bin], nobs: usize, f: F) -> Estimate {
    let all = Sums::of(bins, nobs);
    let mean = f(&all);
    let n = bins.len();
    if n < 2 {
        return Estimate {
            mean,
            error: f64::NAN,
        };
    }
    let partial: Vec<f64> = bins.iter().map(|b| f(&all.without(b))).collect();
    let avg = partial.iter().sum::<f64>() / n as f64;
    let var = partial.iter().map(|p| (p - avg).powi(2)).sum::<f64>();
    Estimate {
        mean,
        error: (var * (n - 1) as f64 / n as f64).sqrt(),
    }
}

/// Standard error of the mean of independent block means.
fn standard_error(means: &[f64]) -> f64 {
    let n = means.len();
    if n < 2 {
        return f64::NAN;
    }
    let avg = means.iter().sum::<f64>() / n as f64;
    let var = means.iter().map(|m| (m - avg).powi(2)).sum::<f64>();
    (var / (n * (n - 1)) as f64).sqrt()
}

fn autocorrelation_time(filled: &[&Bin], index: usize, total_count: u64) -> f64 {
    let n = filled.len();
    if n < 2 || total_count == 0 {
        return f64::NAN;
    }
    let count = total_count as f64;
    let sum: f64 = filled.iter().map(|b| b.value_sums[index]).sum();
    let squares: f64 = filled.iter().map(|b| b.square_sums[index]).sum();
    let mean = sum / count;
    let naive = squares / count - mean * mean;
    let block_means: Vec<f64> = filled
        .iter()
        .map(|b| b.value_sums[index] / b.count as f64)
        .collect();
    let block_var = block_means.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let block_size = count / n as f64;
    if naive > 0.0 {
        block_size * block_var / (2.0 * naive)
    } else {
        f64::NAN
    }
}

/// Combine summaries of independent replicas run with the same parameters:
/// means are averaged and errors added in quadrature over `n²`.
pub fn combine_summaries(summaries: &[Summary]) -> Option<Summary> {
    let first = summaries.first()?;
    let n = summaries.len() as f64;
    let combine = |f: &dyn Fn(&Summary) -> Estimate| {
        let mean = summaries.iter().map(|s| f(s).mean).sum::<f64>() / n;
        let error = summaries.iter().map(|s| f(s).error.powi(2)).sum::<f64>().sqrt() / n;
        Estimate { mean, error }
    };
    let observables = first
        .observables
        .iter()
        .enumerate()
        .map(|(i, o)| ObservableSummary {
            observable: o.observable,
            estimate: combine(&|s: &Summary| s.observables[i].estimate),
            autocorrelation_time: summaries
                .iter()
                .map(|s| s.observables[i].autocorrelation_time)
                .sum::<f64>()
                / n,
        })
        .collect();
    let susceptibilities = first
        .susceptibilities
        .iter()
        .enumerate()
        .map(|(i, x)| Susceptibility {
            integral: x.integral,
            kind: x.kind,
            estimate: combine(&|s: &Summary| s.susceptibilities[i].estimate),
        })
        .collect();
    Some(Summary {
        measurements: summaries.iter().map(|s| s.measurements).sum(),
        sign: combine(&|s: &Summary| s.sign),
        mean_length: summaries.iter().map(|s| s.mean_length).sum::<f64>() / n,
        max_length: summaries.iter().map(|s| s.max_length).max().unwrap_or(0),
        observables,
        susceptibilities,
    })
}
