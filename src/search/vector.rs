//! Dense vector arithmetic shared by every backend.
//!
//! Scoring is a plain dot product; callers are responsible for handing in
//! unit vectors so the result is cosine similarity in [-1, 1].

/// Cached SIMD enable flag (checked once at first use).
/// Set NGS_SIMD_DOT=0 to force the scalar path.
static SIMD_DOT_ENABLED: once_cell::sync::Lazy<bool> = once_cell::sync::Lazy::new(|| {
    dotenvy::var("NGS_SIMD_DOT")
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true)
});

/// Dot product of two equal-length slices.
///
/// Extra trailing components of the longer slice are ignored; callers check
/// dimensions at the boundary where vectors enter the system.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if *SIMD_DOT_ENABLED {
        dot_product_simd(a, b)
    } else {
        dot_product_scalar(a, b)
    }
}

#[inline]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// SIMD dot product using the wide crate, 8 lanes per step.
/// SIMD reorders FP additions (~1e-7 relative error vs scalar); the result
/// is still deterministic for a given pair of inputs.
#[inline]
fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    use wide::f32x8;

    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);
    let chunks_a = a.chunks_exact(8);
    let chunks_b = b.chunks_exact(8);
    let remainder_a = chunks_a.remainder();
    let remainder_b = chunks_b.remainder();

    let mut sum = f32x8::ZERO;
    for (ca, cb) in chunks_a.zip(chunks_b) {
        let mut arr_a = [0.0f32; 8];
        let mut arr_b = [0.0f32; 8];
        arr_a.copy_from_slice(ca);
        arr_b.copy_from_slice(cb);
        sum += f32x8::from(arr_a) * f32x8::from(arr_b);
    }

    let mut scalar_sum: f32 = sum.reduce_add();
    for (a, b) in remainder_a.iter().zip(remainder_b) {
        scalar_sum += a * b;
    }
    scalar_sum
}

/// Euclidean norm, accumulated in f64.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter()
        .map(|x| f64::from(*x).powi(2))
        .sum::<f64>()
        .sqrt() as f32
}

/// Scale `v` to unit length in place. The zero vector is left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// `acc += weight * other`, component-wise.
pub fn add_scaled(acc: &mut [f32], other: &[f32], weight: f32) {
    for (a, o) in acc.iter_mut().zip(other) {
        *a += weight * o;
    }
}

/// Round every component to `decimals` places for storage.
///
/// Must only be applied to already-normalized vectors.
pub fn round_components(v: &mut [f32], decimals: u32) {
    let scale = 10f64.powi(decimals as i32);
    for x in v.iter_mut() {
        *x = ((f64::from(*x) * scale).round() / scale) as f32;
    }
}

/// Whether every component is exactly zero.
pub fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}
