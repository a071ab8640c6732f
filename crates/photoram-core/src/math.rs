//! Logit activations.

/// Numerically stable softmax over a row, in place.
pub fn softmax_in_place(v: &mut [f32]) {
    let max = v.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }
    let mut sum = 0.0f32;
    for x in v.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    if sum > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= sum;
        }
    }
}

/// Element-wise logistic sigmoid, in place.
pub fn sigmoid_in_place(v: &mut [f32]) {
    for x in v.iter_mut() {
        *x = 1.0 / (1.0 + (-*x).exp());
    }
}
