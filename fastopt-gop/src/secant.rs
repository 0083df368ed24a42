/// Secant upper bound of `exp` over an interval.
///
/// On `[lo, up]` the chord `a·u + b` lies above `exp(u)` because `exp` is
/// convex, and the two agree at both endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpSecant {
    pub a: f64,
    pub b: f64,
}

impl ExpSecant {
    pub fn new(lo: f64, up: f64) -> Self {
        let e_lo = lo.exp();
        let width = up - lo;
        // degenerate interval: the tangent, which touches exp at the one point
        let a = if width > 1e-12 {
            (up.exp() - e_lo) / width
        } else {
            e_lo
        };
        ExpSecant { a, b: e_lo - a * lo }
    }

    #[inline]
    pub fn eval(&self, u: f64) -> f64 {
        self.a * u + self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_matches_exp_at_endpoints_and_dominates_inside() {
        let s = ExpSecant::new(-1.0, 2.0);
        assert!((s.eval(-1.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!((s.eval(2.0) - 2.0f64.exp()).abs() < 1e-12);
        for k in 0..=30 {
            let u = -1.0 + 3.0 * k as f64 / 30.0;
            assert!(s.eval(u) >= u.exp() - 1e-12);
        }
    }

    #[test]
    fn degenerate_interval_is_exact_at_the_point() {
        let s = ExpSecant::new(0.5, 0.5);
        assert!((s.eval(0.5) - 0.5f64.exp()).abs() < 1e-15);
        assert!(s.a.is_finite() && s.b.is_finite());
    }
}
