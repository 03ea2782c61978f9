use std::time::{Duration, Instant};

use crate::matrix::Matrix;

/// Reference product: the straight i/j/k triple loop, accumulating each
/// output element over `k` in ascending order. The accelerated kernels use
/// the same accumulation order, so results are comparable elementwise.
pub fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    let n = a.n();
    assert_eq!(n, b.n(), "operand dimensions differ: {} vs {}", a.n(), b.n());
    let mut c = Matrix::zeros(n);
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0f32;
            for k in 0..n {
                sum += a[(i, k)] * b[(k, j)];
            }
            c[(i, j)] = sum;
        }
    }
    c
}

/// Same product with the loop alone inside the measurement window.
pub fn multiply_timed(a: &Matrix, b: &Matrix) -> (Matrix, Duration) {
    let start = Instant::now();
    let c = multiply(a, b);
    (c, start.elapsed())
}
