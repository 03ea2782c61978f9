use std::fmt;
use std::ops::{Index, IndexMut};

use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand_pcg::Pcg64;

/// Dense square matrix of `f32` in one contiguous row-major allocation.
/// Row `i` occupies `data[i * n .. (i + 1) * n]`, which is exactly the
/// layout device buffers use, so uploads and downloads are straight copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(n: usize) -> Matrix {
        Matrix { n, data: vec![0.0; n * n] }
    }

    /// Matrix of uniform random integers in `0..10`, stored as `f32`.
    /// Small integer operands keep every partial sum exactly representable,
    /// which is what makes strict elementwise comparison meaningful.
    pub fn random(n: usize, seed: u64) -> Matrix {
        let mut rng = Pcg64::seed_from_u64(seed);
        let uniform = Uniform::new(0, 10);
        let data = (0..n * n).map(|_| uniform.sample(&mut rng) as f32).collect();
        Matrix { n, data }
    }

    pub fn identity(n: usize) -> Matrix {
        let mut m = Matrix::zeros(n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Build from explicit rows. Every row must have length `rows.len()`.
    pub fn from_rows(rows: &[Vec<f32>]) -> Matrix {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            assert_eq!(row.len(), n, "row of length {} in a {n}x{n} matrix", row.len());
            data.extend_from_slice(row);
        }
        Matrix { n, data }
    }

    pub fn from_vec(n: usize, data: Vec<f32>) -> Matrix {
        assert_eq!(data.len(), n * n, "{} elements for a {n}x{n} matrix", data.len());
        Matrix { n, data }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;

    fn index(&self, (i, j): (usize, usize)) -> &f32 {
        &self.data[i * self.n + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f32 {
        &mut self.data[i * self.n + j]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.n {
            for j in 0..self.n {
                write!(f, "{:6.1}   ", self[(i, j)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
