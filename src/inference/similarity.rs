use ndarray::ArrayView1;

/// Cosine similarity between two vectors.
///
/// Mismatched lengths or a zero-norm operand yield 0.0 rather than NaN, so a
/// degenerate vector can never satisfy a similarity threshold.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// L2-normalize in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
