//! Dense vector kernels for the training inner loop.
//!
//! Every buffer handed to these functions has a length that is a multiple of
//! [`LANES`], with the padding past the logical length kept at zero. One of
//! three implementations is compiled in, depending on the target features the
//! crate is built with (`-C target-cpu=native` picks AVX on most machines).

#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
mod avx;
#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
use avx as imp;

#[cfg(all(
    target_arch = "x86_64",
    target_feature = "sse",
    not(target_feature = "avx")
))]
mod sse;
#[cfg(all(
    target_arch = "x86_64",
    target_feature = "sse",
    not(target_feature = "avx")
))]
use sse as imp;

#[cfg(not(all(target_arch = "x86_64", target_feature = "sse")))]
mod simple;
#[cfg(not(all(target_arch = "x86_64", target_feature = "sse")))]
use simple as imp;

/// Number of `f32` values processed per vector instruction.
pub const LANES: usize = imp::LANES;

/// Round `len` up to a whole number of lanes.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(LANES) * LANES
}

/// `v[i] = value`
pub fn fill(v: &mut [f32], value: f32) {
    debug_assert_eq!(v.len() % LANES, 0);
    imp::fill(v, value);
}

pub fn zero(v: &mut [f32]) {
    fill(v, 0.0);
}

/// `v[i] *= factor`
pub fn scale(v: &mut [f32], factor: f32) {
    debug_assert_eq!(v.len() % LANES, 0);
    imp::scale(v, factor);
}

/// `v[i] += x[i]`
pub fn add(v: &mut [f32], x: &[f32]) {
    debug_assert_eq!(v.len(), x.len());
    debug_assert_eq!(v.len() % LANES, 0);
    imp::add(v, x);
}

/// `v[i] += a * x[i]` (axpy)
pub fn add_scaled(v: &mut [f32], x: &[f32], a: f32) {
    debug_assert_eq!(v.len(), x.len());
    debug_assert_eq!(v.len() % LANES, 0);
    imp::add_scaled(v, x, a);
}

/// Sum of `a[i] * b[i]`.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len() % LANES, 0);
    imp::dot(a, b)
}
