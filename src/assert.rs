//! Assertions for array

use ndarray::*;
use num_traits::Zero;

use crate::norm::*;
use crate::types::*;

/// check two values are close in terms of the absolute tolerance
pub fn aclose<A>(test: A, truth: A, atol: A::Real) -> Result<A::Real, A::Real>
where
    A: Scalar,
{
    let dev = (test - truth).abs();
    if dev < atol {
        Ok(dev)
    } else {
        Err(dev)
    }
}

/// check two arrays are close in maximum norm
pub fn close_max<A, S1, S2, D>(
    test: &ArrayBase<S1, D>,
    truth: &ArrayBase<S2, D>,
    atol: A::Real,
) -> Result<A::Real, A::Real>
where
    A: Scalar,
    S1: Data<Elem = A>,
    S2: Data<Elem = A>,
    D: Dimension,
{
    let tol = (test - truth).norm_max();
    if tol < atol {
        Ok(tol)
    } else {
        Err(tol)
    }
}

/// check two arrays are close in L2 norm
pub fn close_l2<A, S1, S2, D>(
    test: &ArrayBase<S1, D>,
    truth: &ArrayBase<S2, D>,
    rtol: A::Real,
) -> Result<A::Real, A::Real>
where
    A: Scalar,
    S1: Data<Elem = A>,
    S2: Data<Elem = A>,
    D: Dimension,
{
    let nrm = truth.norm_l2();
    let dev = (test - truth).norm_l2();
    let tol = if nrm > A::Real::zero() { dev / nrm } else { dev };
    if tol < rtol {
        Ok(tol)
    } else {
        Err(tol)
    }
}

#[macro_export]
macro_rules! assert_aclose {
    ($test:expr, $truth:expr, $atol:expr) => {
        if let Err(dev) = $crate::assert::aclose($test, $truth, $atol) {
            panic!(
                "assert_aclose: deviation = {:?}, tolerance = {:?}",
                dev, $atol
            );
        }
    };
}

#[macro_export]
macro_rules! assert_close_max {
    ($test:expr, $truth:expr, $atol:expr) => {
        if let Err(dev) = $crate::assert::close_max($test, $truth, $atol) {
            panic!(
                "assert_close_max: deviation = {:?}, tolerance = {:?}",
                dev, $atol
            );
        }
    };
}

#[macro_export]
macro_rules! assert_close_l2 {
    ($test:expr, $truth:expr, $rtol:expr) => {
        if let Err(dev) = $crate::assert::close_l2($test, $truth, $rtol) {
            panic!(
                "assert_close_l2: deviation = {:?}, tolerance = {:?}",
                dev, $rtol
            );
        }
    };
}
