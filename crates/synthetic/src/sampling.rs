//! Deterministic sampling primitives on top of a seeded `rand` RNG.

use rand::Rng;

/// Uniform draw in the open interval (0, 1).
pub(crate) fn unit_open<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.gen_range(0.0..1.0);
        if u > 0.0 {
            return u;
        }
    }
}

/// Standard normal draw (Box–Muller, cosine branch).
pub(crate) fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = unit_open(rng);
    let u2 = unit_open(rng);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Standard logistic draw.
pub(crate) fn logistic<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u = unit_open(rng);
    (u / (1.0 - u)).ln()
}

/// Standard normal CDF (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
pub(crate) fn normal_cdf(z: f64) -> f64 {
    let x = z.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-x * x).exp();
    if z >= 0.0 { 0.5 * (1.0 + erf) } else { 0.5 * (1.0 - erf) }
}

/// Smallest `k` with `P(X <= k) >= u` for `X ~ Poisson(lambda)`.
pub(crate) fn poisson_quantile(lambda: f64, u: f64) -> f64 {
    let mut k = 0u32;
    let mut pmf = (-lambda).exp();
    let mut cdf = pmf;
    while cdf < u && k < 10_000 {
        k += 1;
        pmf *= lambda / f64::from(k);
        cdf += pmf;
    }
    f64::from(k)
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn round_to(x: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (x * scale).round() / scale
}

/// Mean and population standard deviation; `(0, 0)` for an empty slice.
pub fn mean_std(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
