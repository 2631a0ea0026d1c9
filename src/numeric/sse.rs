//! SSE kernels, four lanes.

use std::arch::x86_64::*;

pub const LANES: usize = 4;

// SAFETY (all functions): this module is only compiled when the `sse` target
// feature is enabled, and every pointer comes from a `chunks_exact(LANES)`
// chunk, so each unaligned load/store touches exactly LANES valid floats.

pub fn fill(v: &mut [f32], value: f32) {
    unsafe {
        let wide = _mm_set1_ps(value);
        for chunk in v.chunks_exact_mut(LANES) {
            _mm_storeu_ps(chunk.as_mut_ptr(), wide);
        }
    }
}

pub fn scale(v: &mut [f32], factor: f32) {
    unsafe {
        let wide = _mm_set1_ps(factor);
        for chunk in v.chunks_exact_mut(LANES) {
            let p = chunk.as_mut_ptr();
            _mm_storeu_ps(p, _mm_mul_ps(_mm_loadu_ps(p), wide));
        }
    }
}

pub fn add(v: &mut [f32], x: &[f32]) {
    unsafe {
        for (chunk, x) in v.chunks_exact_mut(LANES).zip(x.chunks_exact(LANES)) {
            let p = chunk.as_mut_ptr();
            _mm_storeu_ps(p, _mm_add_ps(_mm_loadu_ps(p), _mm_loadu_ps(x.as_ptr())));
        }
    }
}

pub fn add_scaled(v: &mut [f32], x: &[f32], a: f32) {
    unsafe {
        let wide = _mm_set1_ps(a);
        for (chunk, x) in v.chunks_exact_mut(LANES).zip(x.chunks_exact(LANES)) {
            let p = chunk.as_mut_ptr();
            let scaled = _mm_mul_ps(wide, _mm_loadu_ps(x.as_ptr()));
            _mm_storeu_ps(p, _mm_add_ps(_mm_loadu_ps(p), scaled));
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    unsafe {
        let mut acc = _mm_setzero_ps();
        for (a, b) in a.chunks_exact(LANES).zip(b.chunks_exact(LANES)) {
            acc = _mm_add_ps(acc, _mm_mul_ps(_mm_loadu_ps(a.as_ptr()), _mm_loadu_ps(b.as_ptr())));
        }
        let mut lanes = [0.0f32; LANES];
        _mm_storeu_ps(lanes.as_mut_ptr(), acc);
        lanes.iter().sum()
    }
}
