//! Generator functions for matrices

use ndarray::*;
use rand::prelude::*;

use crate::types::*;

/// Hermite conjugate matrix
pub fn conjugate<A, S>(a: &ArrayBase<S, Ix2>) -> Array2<A>
where
    A: Scalar,
    S: Data<Elem = A>,
{
    let mut a = a.t().to_owned();
    for val in a.iter_mut() {
        *val = val.conj();
    }
    a
}

/// Generate random array with given shape
///
/// - This function uses [rand::thread_rng].
///   See [random_using] for using another RNG
pub fn random<A, Sh, D>(sh: Sh) -> Array<A, D>
where
    A: Scalar,
    D: Dimension,
    Sh: ShapeBuilder<Dim = D>,
{
    let mut rng = thread_rng();
    random_using(sh, &mut rng)
}

/// Generate random array with given RNG
///
/// - See [random] for using default RNG
pub fn random_using<A, Sh, D, R>(sh: Sh, rng: &mut R) -> Array<A, D>
where
    A: Scalar,
    D: Dimension,
    Sh: ShapeBuilder<Dim = D>,
    R: Rng,
{
    Array::from_shape_fn(sh, |_| A::rand(rng))
}

/// Random Hermite positive definite matrix
///
/// - Eigenvalue of matrix must be larger than 1 (thus non-singular)
/// - This function uses [rand::thread_rng].
///   See [random_hpd_using] for using another RNG.
pub fn random_hpd<A>(n: usize) -> Array2<A>
where
    A: Scalar,
{
    let mut rng = thread_rng();
    random_hpd_using(n, &mut rng)
}

/// Random Hermite positive definite matrix with given RNG
///
/// - See [random_hpd] for using default RNG.
pub fn random_hpd_using<A, R>(n: usize, rng: &mut R) -> Array2<A>
where
    A: Scalar,
    R: Rng,
{
    let a: Array2<A> = random_using((n, n), rng);
    let ah: Array2<A> = conjugate(&a);
    let mut hpd = ah.dot(&a);
    for i in 0..n {
        hpd[[i, i]] += A::from_real(A::real(n as f64));
    }
    hpd
}
