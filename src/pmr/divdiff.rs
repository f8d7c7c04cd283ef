//! Divided differences of the exponential, `e^{[x_0,...,x_q]}`.
//!
//! With the points shifted by their minimum, `y_j = x_j - min x >= 0`,
//! ```text
//! e^{[x_0..x_j]} = e^{min x} / j! * sum_k a_k^{(j)}
//! a_k^{(j)} = (j a_k^{(j-1)} + y_j a_{k-1}^{(j)}) / (k + j),   a_k^{(0)} = y_0^k / k!
//! ```
//! Every term is non-negative so the sum has no cancellation, and one pass
//! over the points yields the divided difference of every prefix.

/// Coefficients are rescaled when they pass this size.
const RESCALE_THRESHOLD: f64 = 1e250;
/// Truncate the series once the bound on the next term drops below `e^-40`.
const LN_TRUNCATION: f64 = -40.0;
const MAX_ORDER: usize = 1 << 16;

/// Reusable workspace for divided differences of `exp`. All results are
/// natural logarithms, since the divided differences over- and underflow
/// long before the sampler is done with them.
#[derive(Clone, Debug, Default)]
pub struct ExpDivDiff {
    coefficients: Vec<f64>,
}

impl ExpDivDiff {
    /// New, empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// `ln e^{[x_0..x_q]}`. Returns negative infinity for no points.
    pub fn ln_divdiff(&mut self, points: &[f64]) -> f64 {
        let mut ln = f64::NEG_INFINITY;
        self.run(points, |_, v| ln = v);
        ln
    }

    /// `ln e^{[x_0..x_j]}` for every `j`, written into `out`.
    pub fn ln_prefixes(&mut self, points: &[f64], out: &mut Vec<f64>) {
        out.clear();
        out.reserve(points.len());
        self.run(points, |_, v| out.push(v));
    }

    /// `ln e^{[x_j..x_q]}` for every `j`, written into `out` (indexed by `j`).
    pub fn ln_suffixes(&mut self, points: &[f64], out: &mut Vec<f64>) {
        let n = points.len();
        out.clear();
        out.resize(n, f64::NEG_INFINITY);
        let reversed: Vec<f64> = points.iter().rev().copied().collect();
        self.run(&reversed, |j, v| out[n - 1 - j] = v);
    }

    fn run<F: FnMut(usize, f64)>(&mut self, points: &[f64], mut emit: F) {
        if points.is_empty() {
            return;
        }
        let (lo, hi) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(*x), hi.max(*x))
            });
        let order = truncation_order(hi - lo);
        let a = &mut self.coefficients;
        a.clear();
        a.resize(order + 1, 0.0);

        // a holds the true coefficients times exp(-ln_scale).
        let mut ln_scale = 0.0;
        let y0 = points[0] - lo;
        a[0] = 1.0;
        for k in 1..=order {
            a[k] = a[k - 1] * y0 / k as f64;
            if a[k] > RESCALE_THRESHOLD {
                ln_scale += rescale(&mut a[..=k]);
            }
        }
        emit(0, lo + ln_scale + a.iter().sum::<f64>().ln());

        let mut ln_factorial = 0.0;
        for (j, x) in points.iter().enumerate().skip(1) {
            let y = x - lo;
            let jf = j as f64;
            ln_factorial += jf.ln();
            for k in 1..=order {
                a[k] = (jf * a[k] + y * a[k - 1]) / (k as f64 + jf);
                if a[k] > RESCALE_THRESHOLD {
                    ln_scale += rescale(a);
                }
            }
            emit(j, lo + ln_scale + a.iter().sum::<f64>().ln() - ln_factorial);
        }
    }
}

fn rescale(a: &mut [f64]) -> f64 {
    a.iter_mut().for_each(|v| *v /= RESCALE_THRESHOLD);
    RESCALE_THRESHOLD.ln()
}

/// Smallest `K >= 2 span` with `span^K / K! < e^-40`; the coefficients are
/// bounded by `span^k / k!`.
fn truncation_order(span: f64) -> usize {
    if span <= 0.0 {
        return 1;
    }
    let ln_span = span.ln();
    let mut ln_term = 0.0;
    let mut k = 0usize;
    while k < MAX_ORDER {
        k += 1;
        ln_term += ln_span - (k as f64).ln();
        if k as f64 >= 2.0 * span && ln_term < LN_TRUNCATION {
            break;
        }
    }
    k
}

#[cfg(test)]
mod divdiff_tests {
    use super::*;

    fn assert_rel(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol * b.abs().max(1e-300),
            "{} vs {} (rel {})",
            a,
            b,
            (a - b).abs() / b.abs()
        );
    }

    #[test]
    fn test_single_point() {
        let mut dd = ExpDivDiff::new();
        assert_rel(dd.ln_divdiff(&[1.7]), 1.7, 1e-14);
        assert_rel(dd.ln_divdiff(&[-3.2]), -3.2, 1e-14);
    }

    #[test]
    fn test_two_points() {
        let mut dd = ExpDivDiff::new();
        let (a, b) = (-0.3f64, 1.9f64);
        let exact = (b.exp() - a.exp()) / (b - a);
        assert_rel(dd.ln_divdiff(&[a, b]).exp(), exact, 1e-13);
        assert_rel(dd.ln_divdiff(&[b, a]).exp(), exact, 1e-13);
    }

    #[test]
    fn test_three_points() {
        let mut dd = ExpDivDiff::new();
        let (a, b, c) = (0.5f64, -1.0f64, 2.5f64);
        let ab = (b.exp() - a.exp()) / (b - a);
        let bc = (c.exp() - b.exp()) / (c - b);
        let exact = (bc - ab) / (c - a);
        assert_rel(dd.ln_divdiff(&[a, b, c]).exp(), exact, 1e-12);
    }

    #[test]
    fn test_repeated_points() {
        // e^{[x, ..., x]} with q + 1 points is e^x / q!.
        let mut dd = ExpDivDiff::new();
        let x = -2.0;
        let points = vec![x; 11];
        let ln_fact: f64 = (1..=10).map(|k| (k as f64).ln()).sum();
        assert_rel(dd.ln_divdiff(&points), x - ln_fact, 1e-12);
    }

    #[test]
    fn test_large_spread() {
        // Two points far apart: (e^b - e^a) / (b - a) ~ e^b / (b - a).
        let mut dd = ExpDivDiff::new();
        let (a, b) = (-900.0f64, 100.0f64);
        let ln_exact = b + (1.0 - (a - b).exp()).ln() - (b - a).ln();
        assert_rel(dd.ln_divdiff(&[a, b]), ln_exact, 1e-10);
    }

    #[test]
    fn test_prefixes_and_suffixes() {
        let mut dd = ExpDivDiff::new();
        let points = [0.3, -0.7, 1.1, 0.3, 2.0];
        let mut pre = vec![];
        let mut suf = vec![];
        dd.ln_prefixes(&points, &mut pre);
        dd.ln_suffixes(&points, &mut suf);
        assert_eq!(pre.len(), points.len());
        assert_eq!(suf.len(), points.len());
        for j in 0..points.len() {
            assert_rel(pre[j], dd.ln_divdiff(&points[..=j]), 1e-12);
            assert_rel(suf[j], dd.ln_divdiff(&points[j..]), 1e-12);
        }
    }

    #[test]
    fn test_leibniz_rule() {
        // (x e^x)[x_0..x_q] = x_q e^{[x_0..x_q]} + e^{[x_0..x_{q-1}]}, checked
        // through the derivative in the scale of the points.
        let mut dd = ExpDivDiff::new();
        let energies = [0.4, -1.2, 0.9, -0.1];
        let beta = 1.3;
        let h = 1e-5;
        let ln_f = |dd: &mut ExpDivDiff, b: f64| {
            let pts: Vec<f64> = energies.iter().map(|e| -b * e).collect();
            let q = (pts.len() - 1) as f64;
            dd.ln_divdiff(&pts) + q * b.ln()
        };
        let numeric = -(ln_f(&mut dd, beta + h) - ln_f(&mut dd, beta - h)) / (2.0 * h);
        let pts: Vec<f64> = energies.iter().map(|e| -beta * e).collect();
        let q = pts.len() - 1;
        let ratio = (dd.ln_divdiff(&pts[..q]) - dd.ln_divdiff(&pts)).exp();
        let estimator = energies[q] - ratio / beta;
        assert_rel(estimator, numeric, 1e-6);
    }
}
