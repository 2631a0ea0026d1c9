//! Portable kernels. Plain loops; LLVM vectorizes what it can.

pub const LANES: usize = 1;

pub fn fill(v: &mut [f32], value: f32) {
    for e in v {
        *e = value;
    }
}

pub fn scale(v: &mut [f32], factor: f32) {
    for e in v {
        *e *= factor;
    }
}

pub fn add(v: &mut [f32], x: &[f32]) {
    for (e, &x) in v.iter_mut().zip(x) {
        *e += x;
    }
}

pub fn add_scaled(v: &mut [f32], x: &[f32], a: f32) {
    for (e, &x) in v.iter_mut().zip(x) {
        *e += a * x;
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(&a, &b)| a * b).sum()
}
