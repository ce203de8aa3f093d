//! Local generalized eigenproblem producing the coarse basis.
//!
//! On each subdomain the operator pair (A, B) is symmetric or Hermitian
//! definite; the pipeline factors B, reduces to a standard problem,
//! tridiagonalizes, selects eigenvalues by bisection (the ν smallest, or
//! all below a threshold), recovers eigenvectors by inverse iteration and
//! back-transforms them. Under threshold selection the retained count is
//! reconciled across the decomposition so every rank keeps the same ν.

use ndarray::{Array2, ShapeBuilder};
use num_traits::Zero;

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::lapack::{Diag, Lapack, Order, Range, Side, Transpose, UPLO};
use crate::types::Scalar;

pub struct Eigensolver<K: Lapack> {
    /// Order of the local problem.
    pub n: usize,
    /// Requested (index mode) or retained (after `solve`) basis size.
    pub nu: usize,
    /// Bisection tolerance.
    pub tol: K::Real,
    /// Eigenvalue threshold; values in (−2·tol, threshold] are kept when
    /// positive, the `nu` smallest otherwise.
    pub threshold: K::Real,
    /// Eigenvalues retained by the last call to [`Eigensolver::solve`].
    pub eigenvalues: Vec<K::Real>,
}

impl<K: Lapack> Eigensolver<K> {
    pub fn new(n: usize, nu: usize, tol: K::Real, threshold: K::Real) -> Self {
        Eigensolver {
            n,
            nu,
            tol,
            threshold,
            eigenvalues: Vec::new(),
        }
    }

    /// Factor B = L Lᴴ and reduce A ← L⁻¹ A L⁻ᴴ in place.
    pub fn reduce(&self, a: &mut [K], b: &mut [K]) -> Result<()> {
        let n = self.n as i32;
        K::potrf(UPLO::Lower, n, b, n)?;
        K::gst(1, UPLO::Lower, n, a, b)
    }

    /// Solve the standard problem left in `a` by [`Eigensolver::reduce`].
    ///
    /// Returns the selected eigenvectors of the reduced problem as the
    /// columns of an n × νₛ array; `self.nu` is updated to νₛ. With
    /// threshold selection and a communicator, νₛ is the minimum of the
    /// per-rank counts.
    pub fn solve(&mut self, a: &mut [K], comm: Option<&Communicator>) -> Result<Array2<K>> {
        let n = self.n;
        let ni = n as i32;
        let mut d = vec![K::Real::zero(); n];
        let mut e = vec![K::Real::zero(); n.saturating_sub(1)];
        let mut tau = vec![K::zero(); n];
        K::trd(UPLO::Lower, ni, a, ni, &mut d, &mut e, &mut tau)
            .map_err(|err| stage(err, "tridiagonalization"))?;

        let by_index = self.threshold <= K::Real::zero();
        if by_index && self.nu == 0 {
            self.eigenvalues.clear();
            return Ok(Array2::zeros((n, 0).f()));
        }
        let (range, vl, vu) = if by_index {
            (Range::Index, K::Real::zero(), K::Real::zero())
        } else {
            (Range::Value, -(self.tol + self.tol), self.threshold)
        };
        let iu = self.nu.min(n) as i32;
        let mut w = vec![K::Real::zero(); n];
        let mut iblock = vec![0i32; n];
        let mut isplit = vec![0i32; n];
        let (found, _nsplit) = K::stebz(
            range,
            Order::Block,
            ni,
            vl,
            vu,
            1,
            iu,
            self.tol,
            &d,
            &e,
            &mut w,
            &mut iblock,
            &mut isplit,
        )
        .map_err(|err| stage(err, "bisection"))?;

        let mut m = found as usize;
        let mut z = vec![K::zero(); n * m];
        if m > 0 {
            K::stein(ni, &d, &e, m as i32, &w[..m], &iblock, &isplit, &mut z, ni)
                .map_err(|err| stage(err, "inverse iteration"))?;
            K::mtr(
                Side::Left,
                UPLO::Lower,
                Transpose::No,
                ni,
                m as i32,
                a,
                ni,
                &tau,
                &mut z,
                ni,
            )
            .map_err(|err| stage(err, "back-transformation"))?;
        }
        if !by_index {
            if let Some(comm) = comm {
                m = comm.allreduce(m, |x, y| x.min(y));
                z.truncate(n * m);
            }
        }
        self.eigenvalues = w[..m].to_vec();
        self.nu = m;
        Ok(Array2::from_shape_vec((n, m).f(), z).expect("column-major eigenvectors"))
    }

    /// Undo the B factor: solve Lᴴ x = z for every eigenvector of the
    /// reduced problem, yielding eigenvectors of the generalized one.
    pub fn expand(&self, b: &[K], ev: &mut Array2<K>) -> Result<()> {
        let n = self.n as i32;
        let nu = ev.ncols() as i32;
        let slice = ev
            .as_slice_memory_order_mut()
            .expect("eigenvectors are contiguous");
        K::trtrs(
            UPLO::Lower,
            Transpose::Hermite,
            Diag::NonUnit,
            n,
            nu,
            b,
            n,
            slice,
            n,
        )
    }

    /// The whole pipeline: reduce, solve, expand.
    pub fn solve_generalized(
        &mut self,
        a: &mut [K],
        b: &mut [K],
        comm: Option<&Communicator>,
    ) -> Result<Array2<K>> {
        self.reduce(a, b)?;
        let mut ev = self.solve(a, comm)?;
        self.expand(b, &mut ev)?;
        Ok(ev)
    }
}

fn stage(err: Error, stage: &'static str) -> Error {
    match err {
        Error::Lapack { info, .. } => Error::Eigen { stage, info },
        other => other,
    }
}
