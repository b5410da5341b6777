//! Gradient utilities shared across the training loop.

use crate::matrix::Matrix;

/// Euclidean norm over every element of the matrix.
pub fn l2_norm(m: &Matrix) -> f64 {
    m.data().iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Scale the matrix down in place so its L2 norm does not exceed `max_norm`.
///
/// Returns the norm observed before clipping. A matrix already within the
/// limit is left untouched.
pub fn clip_l2_norm(m: &mut Matrix, max_norm: f64) -> f64 {
    assert!(max_norm > 0.0, "Clip norm must be positive, got {max_norm}");
    let norm = l2_norm(m);
    if norm > max_norm {
        m.scale_in_place(max_norm / norm);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_norm_known_value() {
        let m = Matrix::from_rows(&[&[3.0, 4.0]]);
        assert!((l2_norm(&m) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_scales_down_large_gradient() {
        let mut m = Matrix::from_rows(&[&[3.0, 4.0]]);
        let observed = clip_l2_norm(&mut m, 1.0);
        assert!((observed - 5.0).abs() < 1e-12);
        assert!((l2_norm(&m) - 1.0).abs() < 1e-12);
        // direction preserved
        assert!((m.get(0, 0) / m.get(0, 1) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_clip_leaves_small_gradient_alone() {
        let mut m = Matrix::from_rows(&[&[0.3, 0.4]]);
        clip_l2_norm(&mut m, 1.0);
        assert_eq!(m.data(), &[0.3, 0.4]);
    }
}
