//! Norm of vectors and matrices

use ndarray::*;
use num_traits::{Float, Zero};

use crate::types::*;

/// Define norm as the metric linear space, treating the whole array as
/// one vector
pub trait Norm {
    type Output;
    /// rename of `norm_l2`
    fn norm(&self) -> Self::Output {
        self.norm_l2()
    }
    /// L-1 norm
    fn norm_l1(&self) -> Self::Output;
    /// L-2 norm
    fn norm_l2(&self) -> Self::Output;
    /// maximum norm
    fn norm_max(&self) -> Self::Output;
}

impl<A, S, D> Norm for ArrayBase<S, D>
where
    A: Scalar,
    S: Data<Elem = A>,
    D: Dimension,
{
    type Output = A::Real;

    fn norm_l1(&self) -> Self::Output {
        self.iter()
            .fold(A::Real::zero(), |acc, x| acc + x.abs())
    }

    fn norm_l2(&self) -> Self::Output {
        Float::sqrt(
            self.iter()
                .fold(A::Real::zero(), |acc, x| acc + x.square()),
        )
    }

    fn norm_max(&self) -> Self::Output {
        self.iter().fold(A::Real::zero(), |f, &val| {
            let v = val.abs();
            if f > v {
                f
            } else {
                v
            }
        })
    }
}
