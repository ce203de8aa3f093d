//! Pluggable direct solver consuming the assembled coarse matrix.
//!
//! The coarse operator hands each master its slice of E as compressed
//! rows over a contiguous global row range, together with the global
//! numbering, and later drives [`DirectSolver::solve`] during every
//! application. A coordinate dump of the same slice exists only as a
//! diagnostic (see [`crate::assembly`]).

use crate::comm::Communicator;
use crate::error::Result;
use crate::lapack::Lapack;
use crate::numbering::GlobalNumbering;
use crate::operator::CoarseParams;
use crate::types::{IndexBase, Symmetry};

/// How right-hand sides and solutions flow through the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// RHS and solution assembled entirely on world rank 0.
    NonDistributed,
    /// RHS centralized on world rank 0, solution striped across masters.
    DistributedSol,
    /// RHS gathered per master group, solution produced master-local.
    DistributedSolAndRhs,
}

/// One master's slice of E: compressed rows over the contiguous global
/// range `loc2glob[0] ..= loc2glob[1]`, in the solver's index base.
#[derive(Clone)]
pub struct CsrSlice<K> {
    pub nrow: usize,
    /// Row pointers, length `nrow + 1`, already prefix-summed.
    pub row_ptr: Vec<i32>,
    pub col_idx: Vec<i32>,
    pub values: Vec<K>,
    pub loc2glob: [i32; 2],
    pub base: IndexBase,
    pub symmetry: Symmetry,
}

impl<K> CsrSlice<K> {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// Contract of a direct solver backend living on the masters subgroup.
pub trait DirectSolver<K: Lapack>: Sized + Send {
    /// Whether the backend can run with more than one master process.
    const MULTIPLE_MASTERS: bool = true;
    /// Whether [`DirectSolver::solve`] accepts several right-hand sides.
    const BATCHED_RHS: bool = false;

    /// Called on every master once the masters communicator exists.
    fn initialize(comm: Communicator, params: &CoarseParams) -> Result<Self>;

    fn distribution(&self) -> Distribution;

    fn numbering(&self) -> IndexBase;

    /// Numeric factorization of the assembled slice.
    fn numfact(&mut self, matrix: CsrSlice<K>, numbering: &GlobalNumbering) -> Result<()>;

    /// Solve for `nrhs` right-hand sides, in place.
    ///
    /// The layout of `rhs` depends on [`DirectSolver::distribution`]: the
    /// full world-ordered vector on world rank 0 for the centralized
    /// regimes, this master's storage-ordered slice otherwise. Columns are
    /// stored one after the other.
    fn solve(&mut self, rhs: &mut [K], nrhs: usize) -> Result<()>;
}
