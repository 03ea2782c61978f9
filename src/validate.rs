/// Elementwise comparison between the device product and the serial
/// reference.
///
/// The tolerance comparison is the default acceptance policy: two floating
/// point pipelines only owe each other agreement up to rounding. Strict
/// equality remains available for integer-valued operands, whose partial
/// sums are exactly representable.

use crate::matrix::Matrix;

/// Relative tolerance used by the binary.
pub const DEFAULT_EPS: f32 = 1e-5;

/// Location and values of the first differing element, in row-major scan
/// order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub got: f32,
    pub want: f32,
}

fn within(got: f32, want: f32, eps: f32) -> bool {
    // Absolute near zero, relative elsewhere. NaN never compares equal.
    (got - want).abs() <= eps * want.abs().max(1.0)
}

/// First element where `got` strays outside `eps * max(1, |want|)` of the
/// reference, if any. Operands must have the same dimension.
pub fn first_mismatch(got: &Matrix, want: &Matrix, eps: f32) -> Option<Mismatch> {
    assert_eq!(got.n(), want.n(), "comparing {0}x{0} against {1}x{1}", got.n(), want.n());
    let n = got.n();
    for row in 0..n {
        for col in 0..n {
            let (g, w) = (got[(row, col)], want[(row, col)]);
            if !within(g, w, eps) {
                return Some(Mismatch { row, col, got: g, want: w });
            }
        }
    }
    None
}

/// Tolerance comparison over whole matrices. Differing dimensions compare
/// unequal rather than panicking.
pub fn compare(got: &Matrix, want: &Matrix, eps: f32) -> bool {
    got.n() == want.n() && first_mismatch(got, want, eps).is_none()
}

/// Strict elementwise equality, `eps = 0`.
pub fn compare_exact(got: &Matrix, want: &Matrix) -> bool {
    compare(got, want, 0.0)
}

/// Console verdict wording for a comparison outcome.
pub fn verdict(equal: bool) -> &'static str {
    if equal { "equal" } else { "not equal" }
}
