//! Shared fixtures: a chain of overlapping 1-D subdomains with a
//! diagonal fine operator, reproducible on every rank and serially.
#![allow(dead_code)]

use coarse_space::*;
use ndarray::prelude::*;
use ndarray::s;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

pub struct TestSubdomain {
    comm: Communicator,
    sparsity: Vec<usize>,
    overlaps: HashMap<usize, Vec<usize>>,
    a: Array2<f64>,
    z: Array2<f64>,
}

impl TestSubdomain {
    pub fn new(
        comm: Communicator,
        sparsity: Vec<usize>,
        overlaps: HashMap<usize, Vec<usize>>,
        a: Array2<f64>,
        z: Array2<f64>,
    ) -> Self {
        TestSubdomain {
            comm,
            sparsity,
            overlaps,
            a,
            z,
        }
    }
}

impl SubdomainOperator<f64> for TestSubdomain {
    fn communicator(&self) -> &Communicator {
        &self.comm
    }

    fn sparsity(&self) -> &[usize] {
        &self.sparsity
    }

    fn dof(&self) -> usize {
        self.a.nrows()
    }

    fn basis(&self) -> ArrayView2<'_, f64> {
        self.z.view()
    }

    fn overlap(&self, neighbor: usize) -> &[usize] {
        &self.overlaps[&neighbor]
    }

    fn apply(&self, z: &ArrayView2<'_, f64>) -> Array2<f64> {
        self.a.dot(z)
    }
}

/// A 1-D chain of subdomains: consecutive participants share `overlap`
/// fine degrees of freedom, the fine operator is diagonal and agrees on
/// shared dofs, and every basis is seeded per rank, so the distributed
/// fixture and the serial reference see identical data.
#[derive(Clone)]
pub struct Chain {
    pub size: usize,
    pub dof: usize,
    pub overlap: usize,
    pub nus: Vec<usize>,
    /// Ranks carrying a subdomain; the rest (excluded masters) carry none.
    pub participants: Vec<usize>,
}

impl Chain {
    pub fn uniform(size: usize, dof: usize, overlap: usize, nu: usize) -> Self {
        Chain {
            size,
            dof,
            overlap,
            nus: vec![nu; size],
            participants: (0..size).collect(),
        }
    }

    pub fn with_nus(size: usize, dof: usize, overlap: usize, nus: Vec<usize>) -> Self {
        assert_eq!(nus.len(), size);
        Chain {
            size,
            dof,
            overlap,
            nus,
            participants: (0..size).collect(),
        }
    }

    /// Remove `masters` from the chain (exclusion mode: coordinators own
    /// no subdomain and no coarse rows).
    pub fn excluding(mut self, masters: &[usize]) -> Self {
        self.participants.retain(|r| !masters.contains(r));
        for &m in masters {
            self.nus[m] = 0;
        }
        self
    }

    fn position(&self, rank: usize) -> Option<usize> {
        self.participants.iter().position(|&r| r == rank)
    }

    fn diag(&self, pos: usize) -> Array2<f64> {
        let stride = self.dof - self.overlap;
        Array2::from_diag(&Array1::from_iter(
            (0..self.dof).map(|k| 1.0 + 0.1 * (pos * stride + k + 1) as f64),
        ))
    }

    fn basis_of(&self, rank: usize) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(100 + rank as u64);
        random_using((self.dof, self.nus[rank]).f(), &mut rng)
    }

    pub fn subdomain(&self, comm: &Communicator) -> TestSubdomain {
        let rank = comm.rank();
        let pos = match self.position(rank) {
            Some(p) => p,
            None => {
                return TestSubdomain::new(
                    comm.clone(),
                    Vec::new(),
                    HashMap::new(),
                    Array2::zeros((0, 0)),
                    Array2::zeros((0, 0).f()),
                )
            }
        };
        let mut sparsity = Vec::new();
        let mut overlaps = HashMap::new();
        if pos > 0 {
            let left = self.participants[pos - 1];
            sparsity.push(left);
            overlaps.insert(left, (0..self.overlap).collect::<Vec<_>>());
        }
        if pos + 1 < self.participants.len() {
            let right = self.participants[pos + 1];
            sparsity.push(right);
            overlaps.insert(right, (self.dof - self.overlap..self.dof).collect::<Vec<_>>());
        }
        sparsity.sort_unstable();
        TestSubdomain::new(
            comm.clone(),
            sparsity,
            overlaps,
            self.diag(pos),
            self.basis_of(rank),
        )
    }

    pub fn n(&self) -> usize {
        self.participants.iter().map(|&r| self.nus[r]).sum()
    }

    /// First global coarse row of `rank`, world ordering.
    pub fn row_offset(&self, rank: usize) -> usize {
        self.participants
            .iter()
            .take_while(|&&r| r != rank)
            .map(|&r| self.nus[r])
            .sum()
    }

    /// The coarse matrix every rank's pipeline should produce, dense, in
    /// world ordering. Off-diagonal blocks are those the block's owner
    /// computes; in symmetric storage the lower part mirrors the upper.
    pub fn reference(&self) -> Array2<f64> {
        let n = self.n();
        let mut e = Array2::<f64>::zeros((n, n));
        for (pos, &rank) in self.participants.iter().enumerate() {
            let nu = self.nus[rank];
            if nu == 0 {
                continue;
            }
            let a = self.diag(pos);
            let z = self.basis_of(rank);
            let w = a.dot(&z);
            let off = self.row_offset(rank);
            let diag = z.t().dot(&w);
            for r in 0..nu {
                for c in 0..nu {
                    e[[off + r, off + c]] = diag[[r, c]];
                }
            }
            if pos + 1 < self.participants.len() {
                let right = self.participants[pos + 1];
                let nu_j = self.nus[right];
                let rows: Vec<usize> = (self.dof - self.overlap..self.dof).collect();
                let w_ov = w.select(Axis(0), &rows);
                let zj = self
                    .basis_of(right)
                    .select(Axis(0), &(0..self.overlap).collect::<Vec<_>>());
                let block = w_ov.t().dot(&zj);
                let coff = self.row_offset(right);
                for r in 0..nu {
                    for c in 0..nu_j {
                        e[[off + r, coff + c]] = block[[r, c]];
                    }
                }
                // what the right neighbor computes for the mirrored block
                let a_j = self.diag(pos + 1);
                let z_j = self.basis_of(right);
                let w_j = a_j.dot(&z_j);
                let rows_j: Vec<usize> = (0..self.overlap).collect();
                let wj_ov = w_j.select(Axis(0), &rows_j);
                let zi_ov = z.select(Axis(0), &rows);
                let mirror = wj_ov.t().dot(&zi_ov);
                for r in 0..nu_j {
                    for c in 0..nu {
                        e[[coff + r, off + c]] = mirror[[r, c]];
                    }
                }
            }
        }
        e
    }

    /// Symmetrized reference: keep the upper-block values, mirror them
    /// down (what a solver sees under symmetric storage).
    pub fn reference_symmetric(&self) -> Array2<f64> {
        let mut e = self.reference();
        let n = e.nrows();
        for i in 0..n {
            for j in 0..i {
                e[[i, j]] = e[[j, i]];
            }
        }
        e
    }

    /// The local slice of a world-ordered coarse vector.
    pub fn local_slice(&self, rank: usize, v: &Array1<f64>) -> Vec<f64> {
        let off = self.row_offset(rank);
        v.slice(s![off..off + self.nus[rank]]).to_vec()
    }
}

/// Expand one master's CSR slice to a dense world-numbered matrix.
pub fn csr_to_dense(
    csr: &CsrSlice<f64>,
    numbering: &GlobalNumbering,
    mirror_symmetric: bool,
) -> Array2<f64> {
    let n = numbering.n;
    let base = csr.base.offset() as i32;
    let to_world = |storage: usize| -> usize {
        match &numbering.idistribution {
            Some(map) => map[storage] as usize,
            None => storage,
        }
    };
    let mut e = Array2::<f64>::zeros((n, n));
    for row in 0..csr.nrow {
        let wrow = to_world(numbering.offset + row);
        let start = (csr.row_ptr[row] - base) as usize;
        let end = (csr.row_ptr[row + 1] - base) as usize;
        for k in start..end {
            let wcol = to_world((csr.col_idx[k] - base) as usize);
            e[[wrow, wcol]] = csr.values[k];
            if mirror_symmetric && wrow != wcol {
                e[[wcol, wrow]] = csr.values[k];
            }
        }
    }
    e
}

/// A solver that keeps the slice it was handed, for inspection.
pub struct CapturingSolver {
    inner: DenseSolver<f64>,
    pub csr: Option<CsrSlice<f64>>,
}

impl DirectSolver<f64> for CapturingSolver {
    const BATCHED_RHS: bool = true;

    fn initialize(comm: Communicator, params: &CoarseParams) -> Result<Self> {
        Ok(CapturingSolver {
            inner: DenseSolver::initialize(comm, params)?,
            csr: None,
        })
    }

    fn distribution(&self) -> Distribution {
        self.inner.distribution()
    }

    fn numbering(&self) -> IndexBase {
        self.inner.numbering()
    }

    fn numfact(&mut self, matrix: CsrSlice<f64>, numbering: &GlobalNumbering) -> Result<()> {
        self.csr = Some(matrix.clone());
        self.inner.numfact(matrix, numbering)
    }

    fn solve(&mut self, rhs: &mut [f64], nrhs: usize) -> Result<()> {
        self.inner.solve(rhs, nrhs)
    }
}
