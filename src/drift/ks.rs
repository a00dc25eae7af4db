//! Two-sample Kolmogorov-Smirnov test
//!
//! Statistic: D = sup |F_a(x) - F_b(x)| over the pooled sample, with tied
//! values stepping both empirical CDFs together.
//!
//! Two-sided p-value P(D >= d):
//! - exact lattice-path probability when `max(n, m) <= EXACT_LIMIT`, the
//!   same cut-over SciPy's `ks_2samp` uses for its default method
//! - otherwise the asymptotic Kolmogorov distribution with Stephens'
//!   small-sample correction

use std::cmp::Ordering;

use serde::Serialize;

/// Largest sample size for which the exact distribution is computed
pub const EXACT_LIMIT: usize = 10_000;

/// Minimum observations per sample
pub const MIN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KsOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComparisonError {
    #[error(
        "insufficient data: need at least {MIN_OBSERVATIONS} observations per sample, \
         got {left} and {right}"
    )]
    InsufficientData { left: usize, right: usize },

    #[error("sample contains a non-finite value")]
    NonFinite,
}

/// Compare two unordered samples
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Result<KsOutcome, ComparisonError> {
    if a.len() < MIN_OBSERVATIONS || b.len() < MIN_OBSERVATIONS {
        return Err(ComparisonError::InsufficientData {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.iter().chain(b).any(|v| !v.is_finite()) {
        return Err(ComparisonError::NonFinite);
    }

    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

    let (n, m) = (a.len(), b.len());
    let (i_max, j_max) = max_cdf_gap(&a, &b);
    let gap = (i_max * m).abs_diff(j_max * n);
    let statistic = gap as f64 / (n * m) as f64;

    let p_value = if uses_exact(n, m) {
        exact_p_value(n, m, gap)
    } else {
        asymptotic_p_value(n, m, statistic)
    };

    Ok(KsOutcome {
        statistic,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// Lattice point `(i, j)` where `|i/n - j/m|` peaks
fn max_cdf_gap(a: &[f64], b: &[f64]) -> (usize, usize) {
    let (n, m) = (a.len(), b.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut best = (0usize, 0usize);
    let mut best_gap = 0usize;

    while i < n && j < m {
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }

        // Compare on the integer scale to avoid rounding noise
        let gap = (i * m).abs_diff(j * n);
        if gap > best_gap {
            best_gap = gap;
            best = (i, j);
        }
    }

    best
}

fn uses_exact(n: usize, m: usize) -> bool {
    n.max(m) <= EXACT_LIMIT
}

/// P(D >= gap / (n m)) under H0, via the probability of a random monotone
/// path from (0,0) to (n,m) staying strictly inside the band.
///
/// One row of the lattice is kept at a time, so memory is O(m).
fn exact_p_value(n: usize, m: usize, gap: usize) -> f64 {
    if gap == 0 {
        return 1.0;
    }

    let inside = |i: usize, j: usize| (i * m).abs_diff(j * n) < gap;
    // row[j] holds P(path reaches (i, j) without leaving the band)
    let mut row = vec![0.0f64; m + 1];

    for i in 0..=n {
        for j in 0..=m {
            let mut p = if i == 0 && j == 0 { 1.0 } else { 0.0 };
            if i > 0 {
                // Step in `a` from (i-1, j)
                let rest_a = (n - i + 1) as f64;
                p += row[j] * rest_a / (rest_a + (m - j) as f64);
            }
            if j > 0 {
                // Step in `b` from (i, j-1)
                let rest_b = (m - j + 1) as f64;
                p += row[j - 1] * rest_b / ((n - i) as f64 + rest_b);
            }
            row[j] = if inside(i, j) { p } else { 0.0 };
        }
    }

    1.0 - row[m]
}

fn asymptotic_p_value(n: usize, m: usize, statistic: f64) -> f64 {
    let en = (n * m) as f64 / (n + m) as f64;
    let root = en.sqrt();
    kolmogorov_survival((root + 0.12 + 0.11 / root) * statistic)
}

/// Q_KS(λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)
pub fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if lambda < 1.18 {
        1.0 - kolmogorov_cdf_small(lambda)
    } else {
        let x = (-2.0 * lambda * lambda).exp();
        (2.0 * (x - x.powi(4) + x.powi(9))).clamp(0.0, 1.0)
    }
}

/// Jacobi-theta form of the Kolmogorov CDF, accurate for small λ
fn kolmogorov_cdf_small(lambda: f64) -> f64 {
    use std::f64::consts::PI;

    let y = (-PI * PI / (8.0 * lambda * lambda)).exp();
    let series = y + y.powi(9) + y.powi(25) + y.powi(49);
    ((2.0 * PI).sqrt() / lambda * series).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(start: f64, step: f64, count: usize) -> Vec<f64> {
        (0..count).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_identical_samples() {
        let a = linspace(-3.0, 0.1, 60);
        let outcome = ks_two_sample(&a, &a).unwrap();
        assert_eq!(outcome.statistic, 0.0);
        assert_eq!(outcome.p_value, 1.0);
    }

    #[test]
    fn test_identical_large_samples() {
        let a = linspace(0.0, 0.01, 500);
        let outcome = ks_two_sample(&a, &a).unwrap();
        assert_eq!(outcome.statistic, 0.0);
        assert_eq!(outcome.p_value, 1.0);
    }

    #[test]
    fn test_disjoint_small_samples_exact() {
        // Only the two extreme paths leave the band: p = 2 / C(10, 5)
        let outcome =
            ks_two_sample(&[1.0, 2.0, 3.0, 4.0, 5.0], &[6.0, 7.0, 8.0, 9.0, 10.0]).unwrap();
        assert_eq!(outcome.statistic, 1.0);
        assert!((outcome.p_value - 2.0 / 252.0).abs() < 1e-12);
    }

    #[test]
    fn test_shifted_distribution_large() {
        let a = linspace(0.0, 0.005, 400);
        let b: Vec<f64> = a.iter().map(|v| v + 10.0).collect();
        let outcome = ks_two_sample(&a, &b).unwrap();
        assert_eq!(outcome.statistic, 1.0);
        assert!(outcome.p_value < 1e-12);
    }

    #[test]
    fn test_exact_cut_over_follows_larger_sample() {
        assert!(uses_exact(100, 100));
        assert!(uses_exact(150, 150));
        assert!(uses_exact(2, EXACT_LIMIT));
        assert!(!uses_exact(2, EXACT_LIMIT + 1));
        assert!(!uses_exact(EXACT_LIMIT + 1, 5));
    }

    #[test]
    fn test_exact_used_beyond_ten_thousand_cells() {
        // 150 x 150 = 22500 lattice cells; for n = m the exact tail is
        // 2 * sum_k (-1)^(k+1) C(300, 150 - 21k) / C(300, 150)
        let a = linspace(0.0, 0.01, 150);
        let b: Vec<f64> = a.iter().map(|v| v + 0.2).collect();
        let outcome = ks_two_sample(&a, &b).unwrap();

        assert!((outcome.statistic - 0.14).abs() < 1e-12);
        assert!((outcome.p_value - 0.105_738_194_311_849).abs() < 1e-9);
        // The asymptotic form gives about 0.0965 here
        assert!((outcome.p_value - asymptotic_p_value(150, 150, outcome.statistic)).abs() > 5e-3);
    }

    #[test]
    fn test_asymptotic_for_large_sample() {
        let a = linspace(0.0, 1.0, 5);
        let b = linspace(0.5, 0.001, EXACT_LIMIT + 1);
        let outcome = ks_two_sample(&a, &b).unwrap();

        let expected = asymptotic_p_value(5, EXACT_LIMIT + 1, outcome.statistic);
        assert_eq!(outcome.p_value, expected.clamp(0.0, 1.0));
    }

    #[test]
    fn test_ties_step_together() {
        let outcome = ks_two_sample(&[1.0, 1.0, 2.0, 2.0], &[1.0, 2.0]).unwrap();
        assert_eq!(outcome.statistic, 0.0);
        assert_eq!(outcome.p_value, 1.0);
    }

    #[test]
    fn test_unequal_sizes_symmetric() {
        let a = [0.1, 0.4, 0.35, 0.8, 0.2];
        let b = [0.3, 0.5, 0.9, 0.7, 0.65, 0.55, 0.25];
        let ab = ks_two_sample(&a, &b).unwrap();
        let ba = ks_two_sample(&b, &a).unwrap();

        assert!(ab.statistic > 0.0 && ab.statistic <= 1.0);
        assert!((ab.statistic - ba.statistic).abs() < 1e-12);
        assert!((ab.p_value - ba.p_value).abs() < 1e-9);
        assert!(ab.p_value > 0.0 && ab.p_value < 1.0);
    }

    #[test]
    fn test_insufficient_data() {
        assert_eq!(
            ks_two_sample(&[1.0], &[1.0, 2.0]),
            Err(ComparisonError::InsufficientData { left: 1, right: 2 })
        );
        assert!(ks_two_sample(&[1.0, 2.0], &[]).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(
            ks_two_sample(&[1.0, f64::NAN], &[1.0, 2.0]),
            Err(ComparisonError::NonFinite)
        );
    }

    #[test]
    fn test_kolmogorov_survival_reference_points() {
        assert_eq!(kolmogorov_survival(0.0), 1.0);
        // Classic 5% critical value
        assert!((kolmogorov_survival(1.358) - 0.05).abs() < 1e-3);
        assert!(kolmogorov_survival(3.0) < 1e-6);
    }

    #[test]
    fn test_kolmogorov_branches_agree() {
        let small = 1.0 - kolmogorov_cdf_small(1.18);
        let x = (-2.0f64 * 1.18 * 1.18).exp();
        let large = 2.0 * (x - x.powi(4) + x.powi(9));
        assert!((small - large).abs() < 1e-6);
    }
}
