//! Dense LAPACK-backed reference solver.
//!
//! Every master converts its slice back to triplets, all-gathers them
//! over the masters communicator and factors the full E redundantly:
//! Cholesky in symmetric storage, LU otherwise. Redundant factorization
//! makes all three distribution regimes straightforward to serve, which
//! is exactly what a reference backend is for; production backends
//! (multifrontal, supernodal) plug in through the same trait.

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::lapack::{Lapack, Pivot, Transpose, UPLO};
use crate::numbering::GlobalNumbering;
use crate::operator::CoarseParams;
use crate::solver::{CsrSlice, DirectSolver, Distribution};
use crate::types::{IndexBase, Scalar, Symmetry};

enum Factor<K> {
    Cholesky(Vec<K>),
    Lu(Vec<K>, Pivot),
}

pub struct DenseSolver<K: Lapack> {
    comm: Communicator,
    distribution: Distribution,
    n: usize,
    offset: usize,
    nrow: usize,
    row_counts: Vec<usize>,
    idistribution: Option<Vec<i32>>,
    factor: Option<Factor<K>>,
}

impl<K: Lapack> DenseSolver<K> {
    /// The factored matrix, for inspection in tests.
    pub fn matrix(&self) -> Option<&[K]> {
        match &self.factor {
            Some(Factor::Cholesky(a)) | Some(Factor::Lu(a, _)) => Some(a),
            None => None,
        }
    }

    fn factor(&self) -> Result<&Factor<K>> {
        self.factor
            .as_ref()
            .ok_or_else(|| Error::Solver("solve before numfact".into()))
    }

    /// Permute one world-ordered vector of `n * nrhs` entries into
    /// storage order, or back.
    fn permute(&self, rhs: &mut [K], nrhs: usize, to_storage: bool) {
        let idist = match &self.idistribution {
            Some(map) => map,
            None => return,
        };
        let mut scratch = rhs.to_vec();
        for c in 0..nrhs {
            let col = &mut scratch[c * self.n..(c + 1) * self.n];
            for (storage, &world) in idist.iter().enumerate() {
                if to_storage {
                    col[storage] = rhs[c * self.n + world as usize];
                } else {
                    col[world as usize] = rhs[c * self.n + storage];
                }
            }
        }
        rhs.copy_from_slice(&scratch);
    }

    fn solve_full(&self, rhs: &mut [K], nrhs: usize) -> Result<()> {
        let n = self.n as i32;
        match self.factor()? {
            Factor::Cholesky(a) => K::potrs(UPLO::Lower, n, nrhs as i32, a, n, rhs, n),
            Factor::Lu(a, ipiv) => K::getrs(Transpose::No, n, nrhs as i32, a, n, ipiv, rhs, n),
        }
    }
}

impl<K: Lapack> DirectSolver<K> for DenseSolver<K> {
    const BATCHED_RHS: bool = true;

    fn initialize(comm: Communicator, params: &CoarseParams) -> Result<Self> {
        Ok(DenseSolver {
            comm,
            distribution: params.distribution,
            n: 0,
            offset: 0,
            nrow: 0,
            row_counts: Vec::new(),
            idistribution: None,
            factor: None,
        })
    }

    fn distribution(&self) -> Distribution {
        self.distribution
    }

    fn numbering(&self) -> IndexBase {
        IndexBase::C
    }

    fn numfact(&mut self, matrix: CsrSlice<K>, numbering: &GlobalNumbering) -> Result<()> {
        self.n = numbering.n;
        self.offset = numbering.offset;
        self.nrow = numbering.nrow;
        self.row_counts = numbering.row_counts.clone();
        self.idistribution = numbering.idistribution.clone();

        let base = matrix.base.offset() as i32;
        let mut triplets: Vec<(i32, i32, K)> = Vec::with_capacity(matrix.nnz());
        for row in 0..matrix.nrow {
            let start = (matrix.row_ptr[row] - base) as usize;
            let end = (matrix.row_ptr[row + 1] - base) as usize;
            let i = matrix.loc2glob[0] - base + row as i32;
            for k in start..end {
                triplets.push((i, matrix.col_idx[k] - base, matrix.values[k]));
            }
        }

        let all = self.comm.allgather(triplets);
        let n = self.n;
        let mut dense = vec![K::zero(); n * n];
        for (i, j, v) in all.into_iter().flatten() {
            let (i, j) = (i as usize, j as usize);
            dense[i + j * n] = v;
            if matrix.symmetry == Symmetry::Symmetric && i != j {
                dense[j + i * n] = v.conj();
            }
        }

        self.factor = Some(match matrix.symmetry {
            Symmetry::Symmetric => {
                K::potrf(UPLO::Lower, n as i32, &mut dense, n as i32)?;
                Factor::Cholesky(dense)
            }
            Symmetry::General => {
                let ipiv = K::getrf(n as i32, &mut dense, n as i32)?;
                Factor::Lu(dense, ipiv)
            }
        });
        Ok(())
    }

    fn solve(&mut self, rhs: &mut [K], nrhs: usize) -> Result<()> {
        match self.distribution {
            Distribution::NonDistributed => {
                // centralized on world rank 0, which is always a master
                if self.comm.rank() == 0 {
                    self.permute(rhs, nrhs, true);
                    self.solve_full(rhs, nrhs)?;
                    self.permute(rhs, nrhs, false);
                }
                Ok(())
            }
            Distribution::DistributedSol => {
                // full RHS on rank 0, solution striped across masters
                let chunks = if self.comm.rank() == 0 {
                    self.permute(rhs, nrhs, true);
                    self.solve_full(rhs, nrhs)?;
                    let mut chunks = Vec::with_capacity(self.comm.size());
                    let mut start = 0;
                    for &count in &self.row_counts {
                        let mut chunk = Vec::with_capacity(count * nrhs);
                        for c in 0..nrhs {
                            chunk.extend_from_slice(
                                &rhs[c * self.n + start..c * self.n + start + count],
                            );
                        }
                        chunks.push(chunk);
                        start += count;
                    }
                    Some(chunks)
                } else {
                    None
                };
                let own = self.comm.scatter(chunks, 0);
                rhs[..own.len()].copy_from_slice(&own);
                Ok(())
            }
            Distribution::DistributedSolAndRhs => {
                // gather the storage-ordered slices, solve redundantly,
                // keep this master's slice
                let own: Vec<K> = rhs[..self.nrow * nrhs].to_vec();
                let parts = self.comm.allgather(own);
                let mut full = vec![K::zero(); self.n * nrhs];
                for c in 0..nrhs {
                    let mut start = 0;
                    for (part, &count) in parts.iter().zip(&self.row_counts) {
                        full[c * self.n + start..c * self.n + start + count]
                            .copy_from_slice(&part[c * count..(c + 1) * count]);
                        start += count;
                    }
                }
                self.solve_full(&mut full, nrhs)?;
                for c in 0..nrhs {
                    rhs[c * self.nrow..(c + 1) * self.nrow].copy_from_slice(
                        &full[c * self.n + self.offset..c * self.n + self.offset + self.nrow],
                    );
                }
                Ok(())
            }
        }
    }
}
