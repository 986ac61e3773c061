//! Numeric kernels for the Beta-Bernoulli trust model.
//!
//! The credible interval needs quantiles of the Beta distribution, which we
//! get by binary-search inversion of the regularized incomplete beta
//! function. The incomplete beta itself is evaluated with the standard
//! continued-fraction expansion on top of a Lanczos log-gamma.

/// Tolerance for quantile inversion.
const QUANTILE_TOLERANCE: f64 = 1e-6;

/// Iteration cap for quantile inversion.
const QUANTILE_MAX_ITERATIONS: u32 = 50;

/// Iteration cap for the continued-fraction evaluation.
const CF_MAX_ITERATIONS: u32 = 200;

/// Convergence epsilon for the continued fraction.
const CF_EPSILON: f64 = 1e-14;

/// Lanczos coefficients (g = 7, n = 9).
const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function, Lanczos approximation.
///
/// Accurate to roughly 1e-13 for positive arguments, which is far inside
/// the quantile tolerance.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula keeps the approximation in its sweet spot.
        let pi = std::f64::consts::PI;
        return pi.ln() - (pi * x).sin().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = LANCZOS_COEFFICIENTS[0];
    for (i, coefficient) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        acc += coefficient / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5f64.mul_add(
        (2.0 * std::f64::consts::PI).ln(),
        (x + 0.5) * t.ln() - t + acc.ln(),
    )
}

/// Continued-fraction evaluation for the incomplete beta (Lentz's method).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < f64::MIN_POSITIVE {
        d = f64::MIN_POSITIVE;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=CF_MAX_ITERATIONS {
        let m = f64::from(m);
        let m2 = 2.0 * m;

        // Even step.
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < f64::MIN_POSITIVE {
            d = f64::MIN_POSITIVE;
        }
        c = 1.0 + aa / c;
        if c.abs() < f64::MIN_POSITIVE {
            c = f64::MIN_POSITIVE;
        }
        d = 1.0 / d;
        h *= d * c;

        // Odd step.
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < f64::MIN_POSITIVE {
            d = f64::MIN_POSITIVE;
        }
        c = 1.0 + aa / c;
        if c.abs() < f64::MIN_POSITIVE {
            c = f64::MIN_POSITIVE;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < CF_EPSILON {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`.
///
/// Returns a value in [0, 1]. Arguments outside the supported domain are
/// clamped rather than panicking; the trust model validates its own inputs.
#[must_use]
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // Use the symmetry relation to keep the continued fraction convergent.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Quantile of the Beta(a, b) distribution by bisection.
///
/// Inverts `regularized_incomplete_beta` to tolerance `1e-6` within at most
/// 50 iterations.
#[must_use]
pub fn beta_quantile(a: f64, b: f64, p: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    let mut mid = 0.5f64;
    for _ in 0..QUANTILE_MAX_ITERATIONS {
        mid = 0.5 * (lo + hi);
        let cdf = regularized_incomplete_beta(a, b, mid);
        if (cdf - p).abs() < QUANTILE_TOLERANCE {
            return mid;
        }
        if cdf < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    mid
}

/// Wilson score lower bound at 95% confidence.
///
/// Retained for callers that predate the credible interval. `successes`
/// and `trials` are the observed counts, prior excluded.
#[must_use]
pub fn wilson_lower_bound(successes: f64, trials: f64) -> f64 {
    if trials <= 0.0 {
        return 0.0;
    }
    let z = 1.96f64;
    let n = trials;
    let p_hat = successes / n;
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let center = p_hat + z2 / (2.0 * n);
    let margin = z * (p_hat * (1.0 - p_hat) / n + z2 / (4.0 * n * n)).sqrt();
    ((center - margin) / denominator).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ln_gamma_known_values() {
        // Gamma(1) = Gamma(2) = 1, Gamma(5) = 24
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!(ln_gamma(2.0).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24.0f64.ln()).abs() < 1e-10);
        // Gamma(0.5) = sqrt(pi)
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn test_incomplete_beta_uniform() {
        // Beta(1,1) is uniform: I_x(1,1) = x
        for x in [0.1, 0.25, 0.5, 0.75, 0.9] {
            assert!((regularized_incomplete_beta(1.0, 1.0, x) - x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_incomplete_beta_symmetry() {
        // I_x(a,b) = 1 - I_{1-x}(b,a)
        let (a, b, x) = (2.5, 4.0, 0.3);
        let lhs = regularized_incomplete_beta(a, b, x);
        let rhs = 1.0 - regularized_incomplete_beta(b, a, 1.0 - x);
        assert!((lhs - rhs).abs() < 1e-9);
    }

    #[test]
    fn test_quantile_inverts_cdf() {
        for (a, b) in [(1.0, 1.0), (2.0, 1.0), (5.0, 3.0), (30.0, 12.0)] {
            for p in [0.025, 0.5, 0.975] {
                let q = beta_quantile(a, b, p);
                let cdf = regularized_incomplete_beta(a, b, q);
                assert!(
                    (cdf - p).abs() < 1e-5,
                    "a={a} b={b} p={p} q={q} cdf={cdf}"
                );
            }
        }
    }

    #[test]
    fn test_quantile_median_of_symmetric() {
        // Beta(5,5) is symmetric around 0.5.
        let median = beta_quantile(5.0, 5.0, 0.5);
        assert!((median - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_wilson_lower_bound_bounds() {
        assert_eq!(wilson_lower_bound(0.0, 0.0), 0.0);
        let w = wilson_lower_bound(8.0, 10.0);
        assert!(w > 0.0 && w < 0.8);
        // More trials at the same rate tighten the bound upward.
        assert!(wilson_lower_bound(80.0, 100.0) > w);
    }
}
