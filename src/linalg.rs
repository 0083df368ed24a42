//! Length-parameterized vector kernels over contiguous slices.
//!
//! Callers own every output buffer; nothing here allocates. Matrix columns
//! are passed in as slices obtained from [`Matrix::col`](crate::Matrix::col).

use num_traits::Float;

/// `aᵀb`.
#[inline]
pub fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    let mut s = F::zero();
    for (&ai, &bi) in a.iter().zip(b) {
        s = s + ai * bi;
    }
    s
}

/// `‖a − b‖²`.
#[inline]
pub fn distance_sq<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    let mut s = F::zero();
    for (&ai, &bi) in a.iter().zip(b) {
        let d = ai - bi;
        s = s + d * d;
    }
    s
}

/// `y += alpha * x`.
#[inline]
pub fn axpy<F: Float>(alpha: F, x: &[F], y: &mut [F]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = *yi + alpha * xi;
    }
}

/// `x *= alpha`.
#[inline]
pub fn scale<F: Float>(alpha: F, x: &mut [F]) {
    for xi in x.iter_mut() {
        *xi = *xi * alpha;
    }
}

/// `z = a − b`.
#[inline]
pub fn sub_overwrite<F: Float>(a: &[F], b: &[F], z: &mut [F]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), z.len());
    for ((zi, &ai), &bi) in z.iter_mut().zip(a).zip(b) {
        *zi = ai - bi;
    }
}

#[inline]
pub fn fill<F: Float>(x: &mut [F], value: F) {
    for xi in x.iter_mut() {
        *xi = value;
    }
}

/// Euclidean norm.
#[inline]
pub fn norm<F: Float>(x: &[F]) -> F {
    dot(x, x).sqrt()
}

/// `true` when every element is finite.
pub fn all_finite<F: Float>(x: &[F]) -> bool {
    x.iter().all(|v| v.is_finite())
}
