//! Dense Matrix Operations
//!
//! This module provides the numeric foundation for the whole engine: a dense
//! 2D `f64` matrix stored as a flat row-major `Vec`, with the linear-algebra
//! and elementwise operations the layers and optimizers are built from.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f64>` in row-major order
//! - **Shape**: `rows × cols`, checked on construction and on every binary op
//! - **Copy vs in-place**: every operation returns a new matrix; operations
//!   that are useful as mutations have an explicitly named `*_in_place`
//!   variant. Nothing mutates through an innocently named method.
//!
//! ## Shape Discipline
//!
//! There is no implicit broadcasting. Binary elementwise operations require
//! identical shapes and panic with both operand shapes in the message when
//! they differ. The single sanctioned broadcast, adding a column vector of
//! biases across every sample column, has its own name,
//! [`Matrix::add_broadcast_col`], so a reader can always tell where shapes
//! are being bent.
//!
//! ## Example
//!
//! ```rust
//! use malvolio::Matrix;
//!
//! let a = Matrix::from_rows(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
//! let b = Matrix::from_rows(&[&[7.0, 8.0], &[9.0, 10.0], &[11.0, 12.0]]);
//! let c = a.dot(&b);
//! assert_eq!(c.get(0, 0), 58.0);
//! assert_eq!(c.get(1, 1), 154.0);
//! ```
//!
//! ## Performance
//!
//! Matrix multiplication parallelizes across output rows via Rayon once the
//! work size crosses a threshold; small products stay sequential to avoid
//! thread overhead. Elementwise operations are sequential: the matrices in
//! this engine are small enough that the memory traffic dominates.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

/// Work threshold (multiply-adds) above which `dot` goes parallel.
const PAR_DOT_THRESHOLD: usize = 8_192;

/// A dense 2D matrix of `f64` values.
///
/// All layers, optimizer states, gradients and activations in the engine are
/// expressed as `Matrix` values. The type is deliberately value-like: `Clone`
/// performs a deep copy, and components that must not observe later mutation
/// of a passed-in matrix simply keep a clone.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a matrix from a flat row-major buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "Data length ({}) doesn't match shape {}x{}",
            data.len(),
            rows,
            cols
        );
        Self { rows, cols, data }
    }

    /// Create a matrix from row slices. Convenient for literals in tests.
    ///
    /// # Panics
    ///
    /// Panics if the rows are empty or ragged.
    pub fn from_rows(rows: &[&[f64]]) -> Self {
        assert!(!rows.is_empty(), "Matrix needs at least one row");
        let cols = rows[0].len();
        assert!(cols > 0, "Matrix needs at least one column");
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(
                row.len(),
                cols,
                "Ragged rows: expected {} columns, got {}",
                cols,
                row.len()
            );
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), cols, data)
    }

    /// Create a column vector from a slice.
    pub fn column(values: &[f64]) -> Self {
        Self::new(values.len(), 1, values.to_vec())
    }

    /// Create a matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols, vec![0.0; rows * cols])
    }

    /// Create a matrix filled with ones.
    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols, vec![1.0; rows * cols])
    }

    /// Create a matrix of standard-normal samples from the given RNG.
    pub fn random<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let normal = Normal::new(0.0, 1.0).expect("valid normal parameters");
        let data = (0..rows * cols).map(|_| normal.sample(rng)).collect();
        Self::new(rows, cols, data)
    }

    /// Create a matrix of standard-normal samples from a fixed seed.
    pub fn random_seeded(rows: usize, cols: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::random(rows, cols, &mut rng)
    }

    /// Xavier/Glorot initialization: N(0, 2/(rows+cols)).
    ///
    /// Keeps activation variance roughly constant across layers, which
    /// matters when sigmoid layers are stacked.
    pub fn xavier<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (rows + cols) as f64).sqrt();
        let normal = Normal::new(0.0, scale).expect("valid normal parameters");
        let data = (0..rows * cols).map(|_| normal.sample(rng)).collect();
        Self::new(rows, cols, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow the flat row-major buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }

    fn check_same_shape(&self, other: &Matrix, operation: &str) {
        assert!(
            self.rows == other.rows && self.cols == other.cols,
            "Matrix dimensions must match for {}: {}x{} vs {}x{}",
            operation,
            self.rows,
            self.cols,
            other.rows,
            other.cols
        );
    }

    // --- Copy-returning operations ---

    /// Elementwise sum. Shapes must match exactly; there is no broadcasting.
    pub fn add(&self, other: &Matrix) -> Matrix {
        let mut out = self.clone();
        out.add_in_place(other);
        out
    }

    /// Elementwise difference. Shapes must match exactly.
    pub fn sub(&self, other: &Matrix) -> Matrix {
        let mut out = self.clone();
        out.sub_in_place(other);
        out
    }

    /// Elementwise (Hadamard) product. Shapes must match exactly.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        let mut out = self.clone();
        out.hadamard_in_place(other);
        out
    }

    /// Multiply every element by a scalar.
    pub fn scale(&self, scalar: f64) -> Matrix {
        let mut out = self.clone();
        out.scale_in_place(scalar);
        out
    }

    /// Add a scalar to every element.
    pub fn add_scalar(&self, scalar: f64) -> Matrix {
        self.map(|x| x + scalar)
    }

    /// Divide every element by a scalar.
    ///
    /// # Panics
    ///
    /// Panics on division by zero. A zero denominator here is always a bug
    /// upstream, never a value to propagate.
    pub fn div_scalar(&self, scalar: f64) -> Matrix {
        assert!(scalar != 0.0, "Division by zero is not allowed");
        self.map(|x| x / scalar)
    }

    /// Apply a function to every element, returning a new matrix.
    pub fn map<F: Fn(f64) -> f64 + Sync>(&self, f: F) -> Matrix {
        let mut out = self.clone();
        out.map_in_place(f);
        out
    }

    /// Raise every element to a power.
    pub fn powf(&self, exponent: f64) -> Matrix {
        self.map(|x| x.powf(exponent))
    }

    /// Elementwise square root.
    pub fn sqrt(&self) -> Matrix {
        self.map(f64::sqrt)
    }

    /// Elementwise reciprocal.
    pub fn recip(&self) -> Matrix {
        self.map(|x| 1.0 / x)
    }

    /// Elementwise square.
    pub fn square(&self) -> Matrix {
        self.hadamard(self)
    }

    /// Matrix product. Requires `self.cols == other.rows`.
    ///
    /// Goes parallel across output rows for large products; stays sequential
    /// below the work threshold.
    ///
    /// # Panics
    ///
    /// Panics with both shapes when the inner dimensions disagree.
    pub fn dot(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.rows,
            "Dot product dimension mismatch: {}x{} vs {}x{}",
            self.rows, self.cols, other.rows, other.cols
        );

        let m = self.rows;
        let k = self.cols;
        let n = other.cols;
        let mut result = vec![0.0; m * n];

        let row_product = |i: usize, out_row: &mut [f64]| {
            for l in 0..k {
                let a_val = self.data[i * k + l];
                if a_val == 0.0 {
                    continue;
                }
                let b_row = &other.data[l * n..l * n + n];
                for (r, &b_val) in out_row.iter_mut().zip(b_row) {
                    *r += a_val * b_val;
                }
            }
        };

        if m * n * k >= PAR_DOT_THRESHOLD {
            result
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(i, out_row)| row_product(i, out_row));
        } else {
            for (i, out_row) in result.chunks_mut(n).enumerate() {
                row_product(i, out_row);
            }
        }

        Matrix::new(m, n, result)
    }

    /// Matrix transpose.
    pub fn transpose(&self) -> Matrix {
        let mut result = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                result[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        Matrix::new(self.cols, self.rows, result)
    }

    /// Mean of each row as a column vector.
    pub fn mean_by_row(&self) -> Matrix {
        let mut means = Vec::with_capacity(self.rows);
        for row in self.data.chunks(self.cols) {
            means.push(row.iter().sum::<f64>() / self.cols as f64);
        }
        Matrix::new(self.rows, 1, means)
    }

    /// Sum of each row as a column vector.
    pub fn sum_by_row(&self) -> Matrix {
        let mut sums = Vec::with_capacity(self.rows);
        for row in self.data.chunks(self.cols) {
            sums.push(row.iter().sum::<f64>());
        }
        Matrix::new(self.rows, 1, sums)
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Mean of all elements.
    pub fn mean(&self) -> f64 {
        self.sum() / (self.rows * self.cols) as f64
    }

    /// Add a `(rows, 1)` column vector to every column of this matrix,
    /// returning a new matrix.
    ///
    /// This is the one deliberate broadcast in the engine. It exists so a
    /// layer can add its bias vector across all samples in a batch without
    /// `add` quietly accepting mismatched shapes.
    ///
    /// # Panics
    ///
    /// Panics if `column` is not shaped `(self.rows, 1)`.
    pub fn add_broadcast_col(&self, column: &Matrix) -> Matrix {
        assert!(
            column.rows == self.rows && column.cols == 1,
            "Column broadcast requires a {}x1 vector, got {}x{}",
            self.rows,
            column.rows,
            column.cols
        );
        let mut out = self.clone();
        for i in 0..self.rows {
            let b = column.data[i];
            for v in &mut out.data[i * self.cols..(i + 1) * self.cols] {
                *v += b;
            }
        }
        out
    }

    /// Row-wise softmax with max-subtraction for numerical stability.
    ///
    /// `-inf` entries (from additive attention masks) come out as exactly
    /// zero probability.
    pub fn softmax_rows(&self) -> Matrix {
        let mut out = self.clone();
        for row in out.data.chunks_mut(self.cols) {
            let max = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
        out
    }

    // --- In-place operations ---

    pub fn add_in_place(&mut self, other: &Matrix) -> &mut Matrix {
        self.check_same_shape(other, "addition");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        self
    }

    pub fn sub_in_place(&mut self, other: &Matrix) -> &mut Matrix {
        self.check_same_shape(other, "subtraction");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a -= b;
        }
        self
    }

    pub fn hadamard_in_place(&mut self, other: &Matrix) -> &mut Matrix {
        self.check_same_shape(other, "Hadamard product");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a *= b;
        }
        self
    }

    pub fn scale_in_place(&mut self, scalar: f64) -> &mut Matrix {
        for a in &mut self.data {
            *a *= scalar;
        }
        self
    }

    pub fn map_in_place<F: Fn(f64) -> f64 + Sync>(&mut self, f: F) -> &mut Matrix {
        if self.data.len() >= PAR_DOT_THRESHOLD {
            self.data.par_iter_mut().for_each(|a| *a = f(*a));
        } else {
            for a in &mut self.data {
                *a = f(*a);
            }
        }
        self
    }

    pub fn sqrt_in_place(&mut self) -> &mut Matrix {
        self.map_in_place(f64::sqrt)
    }

    pub fn recip_in_place(&mut self) -> &mut Matrix {
        self.map_in_place(|x| 1.0 / x)
    }

    pub fn square_in_place(&mut self) -> &mut Matrix {
        self.map_in_place(|x| x * x)
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Matrix({}x{})", self.rows, self.cols)?;
        for i in 0..self.rows.min(10) {
            write!(f, "[")?;
            for j in 0..self.cols.min(10) {
                write!(f, "{:8.4}", self.get(i, j))?;
                if j + 1 < self.cols.min(10) {
                    write!(f, ", ")?;
                }
            }
            if self.cols > 10 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.rows > 10 {
            writeln!(f, "...")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    #[test]
    fn test_dot_known_values() {
        let a = Matrix::from_rows(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let b = Matrix::from_rows(&[&[7.0, 8.0], &[9.0, 10.0], &[11.0, 12.0]]);
        let c = a.dot(&b);
        assert_eq!(c.rows(), 2);
        assert_eq!(c.cols(), 2);
        assert_eq!(c.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_dot_associativity() {
        let a = Matrix::random_seeded(3, 4, 1);
        let b = Matrix::random_seeded(4, 5, 2);
        let c = Matrix::random_seeded(5, 2, 3);

        let left = a.dot(&b).dot(&c);
        let right = a.dot(&b.dot(&c));

        for (l, r) in left.data().iter().zip(right.data()) {
            assert_close(*l, *r, 1e-9);
        }
    }

    #[test]
    fn test_transpose_involution() {
        let a = Matrix::random_seeded(4, 7, 42);
        assert_eq!(a.transpose().transpose(), a);
    }

    #[test]
    #[should_panic(expected = "Dot product dimension mismatch")]
    fn test_dot_shape_mismatch_panics() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        a.dot(&b);
    }

    #[test]
    #[should_panic(expected = "Matrix dimensions must match for addition")]
    fn test_add_shape_mismatch_panics() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(3, 2);
        a.add(&b);
    }

    #[test]
    #[should_panic(expected = "Division by zero")]
    fn test_div_scalar_zero_panics() {
        Matrix::ones(1, 1).div_scalar(0.0);
    }

    #[test]
    fn test_add_broadcast_col() {
        let z = Matrix::from_rows(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let bias = Matrix::column(&[10.0, 20.0]);
        let out = z.add_broadcast_col(&bias);
        assert_eq!(out.data(), &[11.0, 12.0, 13.0, 24.0, 25.0, 26.0]);
        // original untouched
        assert_eq!(z.get(0, 0), 1.0);
    }

    #[test]
    #[should_panic(expected = "Column broadcast requires")]
    fn test_add_broadcast_col_wrong_shape_panics() {
        let z = Matrix::zeros(2, 3);
        let bias = Matrix::column(&[1.0, 2.0, 3.0]);
        z.add_broadcast_col(&bias);
    }

    #[test]
    fn test_in_place_vs_copy_pairs() {
        let a = Matrix::from_rows(&[&[1.0, -2.0], &[3.0, -4.0]]);
        let b = Matrix::ones(2, 2);

        let copy = a.add(&b);
        assert_eq!(a.get(0, 0), 1.0); // a unchanged

        let mut mutated = a.clone();
        mutated.add_in_place(&b);
        assert_eq!(mutated, copy);
    }

    #[test]
    fn test_row_reductions() {
        let a = Matrix::from_rows(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        assert_eq!(a.mean_by_row().data(), &[2.0, 5.0]);
        assert_eq!(a.sum_by_row().data(), &[6.0, 15.0]);
        assert_close(a.mean(), 3.5, 1e-12);
        assert_close(a.sum(), 21.0, 1e-12);
    }

    #[test]
    fn test_softmax_rows_distribution() {
        let a = Matrix::random_seeded(5, 9, 7);
        let sm = a.softmax_rows();
        for i in 0..sm.rows() {
            let mut row_sum = 0.0;
            for j in 0..sm.cols() {
                assert!(sm.get(i, j) >= 0.0);
                row_sum += sm.get(i, j);
            }
            assert_close(row_sum, 1.0, 1e-9);
        }
    }

    #[test]
    fn test_softmax_rows_with_neg_infinity_mask() {
        let a = Matrix::from_rows(&[&[0.5, f64::NEG_INFINITY, f64::NEG_INFINITY]]);
        let sm = a.softmax_rows();
        assert_close(sm.get(0, 0), 1.0, 1e-12);
        assert_eq!(sm.get(0, 1), 0.0);
        assert_eq!(sm.get(0, 2), 0.0);
    }

    #[test]
    fn test_xavier_scale() {
        let m = 200;
        let w = {
            let mut rng = StdRng::seed_from_u64(99);
            Matrix::xavier(m, m, &mut rng)
        };
        // variance should be near 2/(rows+cols) = 1/m
        let var = w.data().iter().map(|x| x * x).sum::<f64>() / (m * m) as f64;
        assert!(var > 0.5 / m as f64 && var < 2.0 / m as f64);
    }
}
