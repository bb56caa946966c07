/*!
# Adaptive quadrature of Kirchhoff diffraction integrals

The integral of a complex integrand `f` over `[a,b]` is refined by doubling the
number of sub-intervals until the relative change between two consecutive
estimates of the intensity `|∫f|²` stays below [TOLERANCE] for `K` consecutive
refinements, or until [MAX_ITERATIONS] is reached.

Vectorial models integrate several coupled integrands at once, the intensity is
then the weighted sum of the squared magnitudes of each integral.

The Simpson rule reuses the sums of the samples already evaluated:
at each refinement the odd samples of the previous grid become even samples
and only the new odd samples are computed.
*/

use rustfft::num_complex::Complex64;

/// Relative change between consecutive estimates deemed stable
pub const TOLERANCE: f64 = 1e-1;
/// Maximum number of refinements
pub const MAX_ITERATIONS: usize = 10_000;
/// Denominator of the relative change when the previous estimate is zero
pub const ZERO_FLOOR: f64 = 1e-5;
// 2^24 sub-intervals: beyond that the step is below the integrand resolution
const MAX_SUBINTERVALS: usize = 1 << 24;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuadratureError {
    #[error("diffraction integral is not finite ({estimate}) after {iterations} refinements")]
    NonFinite { estimate: f64, iterations: usize },
}
type Result<T> = std::result::Result<T, QuadratureError>;

/// `N` coupled complex integrands sampled at the same abscissa
pub trait Integrand<const N: usize> {
    fn eval(&self, t: f64) -> [Complex64; N];
}
impl<const N: usize, F> Integrand<N> for F
where
    F: Fn(f64) -> [Complex64; N],
{
    fn eval(&self, t: f64) -> [Complex64; N] {
        self(t)
    }
}

/// Quadrature rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Composite Simpson
    Simpson,
    /// Left Riemann sum
    Riemann,
}

/// Adaptive quadrature over `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrature {
    pub lower: f64,
    pub upper: f64,
    /// Number of consecutive stable refinements `K`
    pub stable_refinements: usize,
    pub rule: Rule,
}

fn accumulate<const N: usize>(sum: &mut [Complex64; N], value: [Complex64; N]) {
    sum.iter_mut().zip(value).for_each(|(s, v)| *s += v);
}

fn intensity<const N: usize>(sums: &[Complex64; N], weights: &[f64; N], step: f64) -> f64 {
    sums.iter()
        .zip(weights)
        .map(|(s, w)| w * s.norm_sqr())
        .sum::<f64>()
        * step
        * step
}

/// Convergence bookkeeping shared by both rules
struct Stability {
    k: usize,
    previous: f64,
}
impl Stability {
    fn new(first: f64) -> Self {
        Self { k: 0, previous: first }
    }
    fn update(&mut self, current: f64) {
        let difference = if self.previous == 0. {
            ((self.previous - current) / ZERO_FLOOR).abs()
        } else {
            ((self.previous - current) / current).abs()
        };
        if difference <= TOLERANCE {
            self.k += 1;
        } else {
            self.k = 0;
        }
        self.previous = current;
    }
}

impl Quadrature {
    pub fn simpson(lower: f64, upper: f64, stable_refinements: usize) -> Self {
        Self {
            lower,
            upper,
            stable_refinements,
            rule: Rule::Simpson,
        }
    }
    pub fn riemann(lower: f64, upper: f64, stable_refinements: usize) -> Self {
        Self {
            lower,
            upper,
            stable_refinements,
            rule: Rule::Riemann,
        }
    }
    /// Returns `Σ w_i |Σf_i|²` scaled by the squared step of the last grid
    ///
    /// The Simpson sums are not divided by 3, the Simpson estimate is then
    /// `9 Σ w_i |∫f_i|²` and the Riemann estimate is `Σ w_i |∫f_i|²`.
    pub fn integrate<const N: usize, F>(&self, integrand: &F, weights: &[f64; N]) -> Result<f64>
    where
        F: Integrand<N> + ?Sized,
    {
        match self.rule {
            Rule::Simpson => self.simpson_rule(integrand, weights),
            Rule::Riemann => self.riemann_rule(integrand, weights),
        }
    }
    fn simpson_rule<const N: usize, F>(&self, integrand: &F, weights: &[f64; N]) -> Result<f64>
    where
        F: Integrand<N> + ?Sized,
    {
        let (a, b) = (self.lower, self.upper);
        let mut n = 2usize;
        let mut step = (b - a) / 2.;
        let mut iteration = 1;

        let fa = integrand.eval(a);
        let fb = integrand.eval(b);
        let mut odd = integrand.eval(a + step);
        let mut even = [Complex64::default(); N];

        let simpson = |even: &[Complex64; N], odd: &[Complex64; N]| {
            let mut sums = [Complex64::default(); N];
            for i in 0..N {
                sums[i] = fa[i] + 2. * even[i] + 4. * odd[i] + fb[i];
            }
            sums
        };

        let mut current = intensity(&simpson(&even, &odd), weights, step);
        check(current, iteration)?;
        let mut stability = Stability::new(current);

        while stability.k < self.stable_refinements
            && iteration < MAX_ITERATIONS
            && n < MAX_SUBINTERVALS
        {
            iteration += 1;
            n *= 2;
            step /= 2.;
            accumulate(&mut even, odd);
            odd = [Complex64::default(); N];
            for i in (1..n).step_by(2) {
                accumulate(&mut odd, integrand.eval(a + i as f64 * step));
            }
            current = intensity(&simpson(&even, &odd), weights, step);
            check(current, iteration)?;
            stability.update(current);
        }
        Ok(current)
    }
    fn riemann_rule<const N: usize, F>(&self, integrand: &F, weights: &[f64; N]) -> Result<f64>
    where
        F: Integrand<N> + ?Sized,
    {
        let (a, b) = (self.lower, self.upper);
        let mut n = 1usize;
        let mut iteration = 1;

        let mut sums = integrand.eval(a);
        let mut current = intensity(&sums, weights, 1.);
        check(current, iteration)?;
        let mut stability = Stability::new(current);

        while stability.k < self.stable_refinements
            && iteration < MAX_ITERATIONS
            && n < MAX_SUBINTERVALS
        {
            iteration += 1;
            n *= 2;
            let step = (b - a) / n as f64;
            for i in (1..n).step_by(2) {
                accumulate(&mut sums, integrand.eval(a + i as f64 * step));
            }
            current = intensity(&sums, weights, step);
            check(current, iteration)?;
            stability.update(current);
        }
        Ok(current)
    }
}

fn check(estimate: f64, iterations: usize) -> Result<()> {
    if estimate.is_finite() {
        Ok(())
    } else {
        Err(QuadratureError::NonFinite {
            estimate,
            iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn real(f: impl Fn(f64) -> f64) -> impl Fn(f64) -> [Complex64; 1] {
        move |t| [Complex64::new(f(t), 0.)]
    }

    #[test]
    fn simpson_polynomial() {
        // Simpson sums are 3x the integral: |3 ∫t²|² = 1 on [0,1]
        let q = Quadrature::simpson(0., 1., 5);
        let value = q.integrate(&real(|t| t * t), &[1.]).unwrap();
        assert_relative_eq!(value, 1., max_relative = 1e-12);
    }

    #[test]
    fn simpson_oscillating() {
        // ∫ cos(t) e^{it} dt over [0,π] = π/2
        let q = Quadrature::simpson(0., std::f64::consts::PI, 6);
        let f = |t: f64| [Complex64::new(t.cos() * t.cos(), t.cos() * t.sin())];
        let value = q.integrate(&f, &[1.]).unwrap();
        let expected = (3. * std::f64::consts::FRAC_PI_2).powi(2);
        assert_relative_eq!(value, expected, max_relative = 1e-6);
    }

    #[test]
    fn riemann_converges() {
        let q = Quadrature::riemann(0., 1., 7);
        let value = q.integrate(&real(|t| 2. * t), &[1.]).unwrap();
        assert_relative_eq!(value, 1., max_relative = 1e-2);
    }

    #[test]
    fn weighted_components() {
        let q = Quadrature::simpson(0., 1., 4);
        let f = |_t: f64| [Complex64::new(1. / 3., 0.), Complex64::new(0., 1. / 3.)];
        let value = q.integrate(&f, &[1., 2.]).unwrap();
        assert_relative_eq!(value, 3., max_relative = 1e-12);
    }

    #[test]
    fn stricter_accuracy_stays_close() {
        let f = |t: f64| {
            let w = 3. * t * t;
            [Complex64::new(w.cos() * t, -w.sin() * t)]
        };
        let coarse = Quadrature::simpson(0., 1., 3).integrate(&f, &[1.]).unwrap();
        let fine = Quadrature::simpson(0., 1., 9).integrate(&f, &[1.]).unwrap();
        assert_relative_eq!(coarse, fine, max_relative = 1e-1);
    }

    #[test]
    fn zero_integrand_terminates() {
        let q = Quadrature::simpson(0., 1., 5);
        let value = q.integrate(&real(|_| 0.), &[1.]).unwrap();
        assert_eq!(value, 0.);
    }

    #[test]
    fn non_finite_integrand() {
        let q = Quadrature::simpson(0., 1., 5);
        let err = q.integrate(&real(|t| (0.5 - t).sqrt()), &[1.]).unwrap_err();
        assert!(matches!(err, QuadratureError::NonFinite { .. }));
    }
}
