//! Uniform façade over the dense kernels used by the coarse operator,
//! for real and complex scalars.
//!
//! Each concern is a trait implemented for `f32`, `f64`, `c32` and `c64`
//! through `macro_rules!`-generated wrappers around the corresponding
//! LAPACK subroutines. Matrices are column-major slices with explicit
//! leading dimensions; a nonzero `info` surfaces as
//! [`Error::Lapack`](crate::error::Error::Lapack) with the subroutine
//! name attached.

pub mod cholesky;
pub mod lu;
pub mod reduction;
pub mod triangular;
pub mod tridiagonal;

pub use self::cholesky::*;
pub use self::lu::*;
pub use self::reduction::*;
pub use self::triangular::*;
pub use self::tridiagonal::*;

use crate::types::*;
use ndarray::linalg::{general_mat_mul, general_mat_vec_mul};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, LinalgScalar};

/// Trait for scalars backed by the full kernel set
pub trait Lapack:
    Scalar + LinalgScalar + Send + Sync + Cholesky_ + Lu_ + Reduction_ + Triangular_ + Tridiagonal_
{
}

impl Lapack for f32 {}
impl Lapack for f64 {}
impl Lapack for c32 {}
impl Lapack for c64 {}

/// Upper/Lower specification for several usages
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum UPLO {
    Upper = b'U',
    Lower = b'L',
}

impl UPLO {
    pub fn t(self) -> Self {
        match self {
            UPLO::Upper => UPLO::Lower,
            UPLO::Lower => UPLO::Upper,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Transpose {
    No = b'N',
    Transpose = b'T',
    Hermite = b'C',
}

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Side {
    Left = b'L',
    Right = b'R',
}

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Diag {
    Unit = b'U',
    NonUnit = b'N',
}

/// Eigenvalue selection range for the bisection kernel
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Range {
    All = b'A',
    /// Eigenvalues in the half-open interval `(vl, vu]`
    Value = b'V',
    /// Eigenvalues with indices `il..=iu` in ascending order
    Index = b'I',
}

/// Eigenvalue ordering produced by the bisection kernel; inverse
/// iteration requires [`Order::Block`].
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Order {
    Block = b'B',
    Entire = b'E',
}

/// C = alpha * A * B + beta * C
pub fn gemm<A>(
    alpha: A,
    a: &ArrayView2<'_, A>,
    b: &ArrayView2<'_, A>,
    beta: A,
    c: &mut ArrayViewMut2<'_, A>,
) where
    A: LinalgScalar,
{
    general_mat_mul(alpha, a, b, beta, c);
}

/// y = alpha * A * x + beta * y
pub fn gemv<A>(
    alpha: A,
    a: &ArrayView2<'_, A>,
    x: &ArrayView1<'_, A>,
    beta: A,
    y: &mut ArrayViewMut1<'_, A>,
) where
    A: LinalgScalar,
{
    general_mat_vec_mul(alpha, a, x, beta, y);
}

/// y += alpha * x
pub fn axpy<A>(alpha: A, x: &ArrayView1<'_, A>, y: &mut ArrayViewMut1<'_, A>)
where
    A: LinalgScalar,
{
    y.scaled_add(alpha, x);
}
