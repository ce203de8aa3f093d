//! The coarse operator: construction, and E⁻¹ application during every
//! preconditioner iteration.
//!
//! Construction plans the topology, initializes the direct solver on the
//! masters, runs the assembly pipeline and hands the factored slice to
//! the solver. Application routes a distributed right-hand side through
//! gather → solve → scatter under the solver's distribution regime,
//! blocking ([`CoarseOperator::apply`]) or with the collectives split
//! around the solve ([`CoarseOperator::iapply`]); several right-hand
//! sides can ride one exchange ([`CoarseOperator::apply_batch`]).

use std::marker::PhantomData;
use tracing::warn;

use crate::assembly::{self, PendingSend, SubdomainOperator};
use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::lapack::Lapack;
use crate::numbering::GlobalNumbering;
use crate::solver::{DirectSolver, Distribution};
use crate::topology::{Exclusion, Topology, TopologyMode};
use crate::types::{Symmetry, Uniformity};
use num_traits::Zero;

/// Runtime configuration of one coarse operator instance.
#[derive(Debug, Clone)]
pub struct CoarseParams {
    /// Requested number of master processes, clamped to `[1, P/2]`.
    pub masters: usize,
    pub topology: TopologyMode,
    pub exclusion: Exclusion,
    /// Requested local coarse dimension; 0 together with
    /// [`Uniformity::UniformZero`] asks for auto-detection.
    pub nu: usize,
    pub uniformity: Uniformity,
    pub symmetry: Symmetry,
    /// Must match the distribution the solver reports.
    pub distribution: Distribution,
    /// Write one matrix-dump file per master after assembly.
    pub dump: bool,
}

impl Default for CoarseParams {
    fn default() -> Self {
        CoarseParams {
            masters: 1,
            topology: TopologyMode::Spread,
            exclusion: Exclusion::None,
            nu: 20,
            uniformity: Uniformity::NonUniform,
            symmetry: Symmetry::Symmetric,
            distribution: Distribution::NonDistributed,
            dump: false,
        }
    }
}

pub struct CoarseOperator<K: Lapack, S: DirectSolver<K>> {
    topology: Topology,
    distribution: Distribution,
    local: usize,
    numbering: Option<GlobalNumbering>,
    solver: Option<S>,
    gather_comm: Option<Communicator>,
    scatter_comm: Option<Communicator>,
    marker: PhantomData<fn() -> K>,
}

/// Pending pieces of a non-blocking application. The caller must call
/// [`ApplyRequests::wait_all`] before reading the solution.
#[must_use]
pub struct ApplyRequests<'a, K: Lapack> {
    deferred: Option<(Communicator, &'a mut [K])>,
}

impl<K: Lapack> ApplyRequests<'_, K> {
    pub fn wait_all(self) {
        if let Some((comm, rhs)) = self.deferred {
            let own: Vec<K> = comm.scatter(None, 0);
            rhs.copy_from_slice(&own);
        }
    }
}

impl<K: Lapack, S: DirectSolver<K>> CoarseOperator<K, S> {
    /// Build the coarse operator collectively over `comm`.
    ///
    /// Under an active exclusion mode the coefficient transfer of workers
    /// is returned still in flight; the caller decides when to wait on it.
    pub fn construction<V>(
        v: &V,
        comm: &Communicator,
        params: &CoarseParams,
    ) -> Result<(Self, Option<PendingSend>)>
    where
        V: SubdomainOperator<K>,
    {
        let mut p = params.masters;
        if !S::MULTIPLE_MASTERS && p != 1 {
            if comm.rank() == 0 {
                warn!("only one master process supported by this solver, forcing the master count to one");
            }
            p = 1;
        }
        let topology = Topology::new(comm, p, params.topology, params.exclusion)?;
        if params.uniformity == Uniformity::UniformZero {
            // auto-detection needs at least one nonzero basis; every rank
            // must reach the same verdict, so decide collectively here
            let coordinator =
                topology.exclusion == Exclusion::Coordinator && topology.is_master();
            let local = if coordinator { 0 } else { v.basis().ncols() };
            if comm.allreduce(local, |a, b| a.max(b)) == 0 {
                return Err(Error::Topology(
                    "every rank reported an empty coarse basis".into(),
                ));
            }
        }
        if !comm.congruent(v.communicator()) {
            warn!(
                "the communicators for the coarse operator do not match those of the domain \
                 decomposition"
            );
        }

        let mut solver = match &topology.solver {
            Some(c) => Some(S::initialize(c.clone(), params)?),
            None => None,
        };
        let distribution = params.distribution;
        if let Some(s) = &solver {
            if s.distribution() != distribution {
                return Err(Error::Solver(
                    "the solver disagrees with the configured distribution".into(),
                ));
            }
        }
        let base = solver
            .as_ref()
            .map(|s| s.numbering())
            .unwrap_or(crate::types::IndexBase::C);

        let assembled = assembly::construct_matrix(
            v,
            &topology,
            params.symmetry,
            params.uniformity,
            base,
            params.dump,
        )?;
        if let (Some(s), Some(csr), Some(numbering)) =
            (solver.as_mut(), assembled.csr, assembled.numbering.as_ref())
        {
            s.numfact(csr, numbering)?;
        }

        // the apply-side fabric: drop empty ranks in the uniform-zero
        // mode, then alias the two sides per the distribution regime
        let (gather_base, scatter_base) = if params.uniformity == Uniformity::UniformZero {
            let mut nu_world: Vec<u16> = if topology.rank == 0 {
                let numbering = assembled.numbering.as_ref().unwrap();
                (0..topology.size)
                    .map(|r| numbering.nu_of(r) as u16)
                    .collect()
            } else {
                Vec::new()
            };
            topology.world.bcast(&mut nu_world, 0);
            let was_gather_member = |r: usize| {
                topology.exclusion == Exclusion::None || r == 0 || !topology.is_master_rank(r)
            };
            let keep_gather: Vec<usize> = (0..topology.size)
                .filter(|&r| r == 0 || (was_gather_member(r) && nu_world[r] > 0))
                .collect();
            let gather = topology.world.create(Some(&keep_gather));
            let keep_group: Vec<usize> = topology
                .group
                .iter()
                .copied()
                .filter(|&r| r == topology.group[0] || nu_world[r] > 0)
                .collect();
            let scatter = topology.world.create(Some(&keep_group));
            (gather, scatter)
        } else {
            (topology.gather.clone(), topology.scatter.clone())
        };
        let (gather_comm, scatter_comm) = match distribution {
            Distribution::NonDistributed => (gather_base.clone(), gather_base),
            Distribution::DistributedSol => (gather_base, scatter_base),
            Distribution::DistributedSolAndRhs => (scatter_base.clone(), scatter_base),
        };

        Ok((
            CoarseOperator {
                topology,
                distribution,
                local: assembled.local,
                numbering: assembled.numbering,
                solver,
                gather_comm,
                scatter_comm,
                marker: PhantomData,
            },
            assembled.pending,
        ))
    }

    /// Apply E⁻¹ to the local block of a distributed right-hand side, in
    /// place.
    pub fn apply(&mut self, rhs: &mut [K]) -> Result<()> {
        self.call_solver(rhs, 1)
    }

    /// Fusion: route `nrhs` right-hand sides, stored one local block
    /// after the other, through a single gather/solve/scatter. The result
    /// equals `nrhs` separate applications.
    pub fn apply_batch(&mut self, rhs: &mut [K], nrhs: usize) -> Result<()> {
        if nrhs > 1 && !S::BATCHED_RHS {
            return Err(Error::Solver(
                "this solver does not support batched right-hand sides".into(),
            ));
        }
        self.call_solver(rhs, nrhs)
    }

    /// Non-blocking variant: on workers the gather is issued and the
    /// scatter left pending, so the caller can overlap the coarse solve
    /// with other work before waiting. Equivalent to
    /// [`CoarseOperator::apply`] once waited on.
    pub fn iapply<'a>(&mut self, rhs: &'a mut [K]) -> Result<ApplyRequests<'a, K>> {
        if self.topology.is_master() {
            self.call_solver(rhs, 1)?;
            return Ok(ApplyRequests { deferred: None });
        }
        let gather_side = self.gather_comm.clone();
        let scatter_side = self.scatter_comm.clone();
        if let Some(g) = &gather_side {
            let _ = g.gather(rhs.to_vec(), 0);
        }
        Ok(ApplyRequests {
            deferred: scatter_side.map(|s| (s, rhs)),
        })
    }

    fn call_solver(&mut self, rhs: &mut [K], nrhs: usize) -> Result<()> {
        debug_assert_eq!(rhs.len(), self.local * nrhs);
        match self.distribution {
            Distribution::NonDistributed => {
                if let Some(g) = self.gather_comm.clone() {
                    if g.rank() == 0 {
                        let parts = g.gather(rhs.to_vec(), 0).unwrap();
                        let (mut buf, lens) = flatten_parts(&parts, nrhs);
                        self.solver
                            .as_mut()
                            .ok_or_else(|| Error::Solver("no solver on the gather root".into()))?
                            .solve(&mut buf, nrhs)?;
                        let chunks = split_columns(&buf, &lens, nrhs);
                        let own = g.scatter(Some(chunks), 0);
                        rhs.copy_from_slice(&own);
                    } else {
                        let _ = g.gather(rhs.to_vec(), 0);
                        let own: Vec<K> = g.scatter(None, 0);
                        rhs.copy_from_slice(&own);
                    }
                } else if let Some(s) = self.solver.as_mut() {
                    s.solve(rhs, nrhs)?;
                }
                Ok(())
            }
            Distribution::DistributedSol => {
                let root_parts = match &self.gather_comm {
                    Some(g) => g.gather(rhs.to_vec(), 0),
                    None => None,
                };
                if self.solver.is_some() {
                    let numbering = self
                        .numbering
                        .as_ref()
                        .ok_or_else(|| Error::Solver("master without a numbering".into()))?;
                    let nrow = numbering.nrow;
                    let mut buf = match &root_parts {
                        Some(parts) => flatten_parts(parts, nrhs).0,
                        None => vec![K::zero(); nrow * nrhs],
                    };
                    self.solver.as_mut().unwrap().solve(&mut buf, nrhs)?;
                    // second fan-out, master slice to its workers
                    let s = self
                        .scatter_comm
                        .as_ref()
                        .ok_or_else(|| Error::Solver("master without a scatter group".into()))?;
                    let lens: Vec<usize> =
                        s.members().iter().map(|&w| numbering.nu_of(w)).collect();
                    let chunks = split_columns(&buf[..nrow * nrhs], &lens, nrhs);
                    let own = s.scatter(Some(chunks), 0);
                    rhs.copy_from_slice(&own);
                } else if let Some(s) = &self.scatter_comm {
                    let own: Vec<K> = s.scatter(None, 0);
                    rhs.copy_from_slice(&own);
                }
                Ok(())
            }
            Distribution::DistributedSolAndRhs => {
                if let Some(g) = self.gather_comm.clone() {
                    if g.rank() == 0 {
                        let parts = g.gather(rhs.to_vec(), 0).unwrap();
                        let (mut buf, lens) = flatten_parts(&parts, nrhs);
                        self.solver
                            .as_mut()
                            .ok_or_else(|| Error::Solver("no solver on the group root".into()))?
                            .solve(&mut buf, nrhs)?;
                        let chunks = split_columns(&buf, &lens, nrhs);
                        let own = g.scatter(Some(chunks), 0);
                        rhs.copy_from_slice(&own);
                    } else {
                        let _ = g.gather(rhs.to_vec(), 0);
                        let own: Vec<K> = g.scatter(None, 0);
                        rhs.copy_from_slice(&own);
                    }
                } else if let Some(s) = self.solver.as_mut() {
                    s.solve(rhs, nrhs)?;
                }
                Ok(())
            }
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Local coarse dimension of this rank.
    pub fn local(&self) -> usize {
        self.local
    }

    /// The global numbering, on masters.
    pub fn numbering(&self) -> Option<&GlobalNumbering> {
        self.numbering.as_ref()
    }

    pub fn solver(&self) -> Option<&S> {
        self.solver.as_ref()
    }
}

/// Concatenate the gathered per-rank blocks into one column-major buffer
/// of `nrhs` columns; returns the per-rank block lengths alongside.
fn flatten_parts<K: Lapack>(parts: &[Vec<K>], nrhs: usize) -> (Vec<K>, Vec<usize>) {
    let lens: Vec<usize> = parts.iter().map(|p| p.len() / nrhs).collect();
    let n: usize = lens.iter().sum();
    let mut buf = vec![K::zero(); n * nrhs];
    for c in 0..nrhs {
        let mut pos = 0;
        for (part, &len) in parts.iter().zip(&lens) {
            buf[c * n + pos..c * n + pos + len].copy_from_slice(&part[c * len..(c + 1) * len]);
            pos += len;
        }
    }
    (buf, lens)
}

/// Inverse of [`flatten_parts`].
fn split_columns<K: Lapack>(buf: &[K], lens: &[usize], nrhs: usize) -> Vec<Vec<K>> {
    let n: usize = lens.iter().sum();
    let mut chunks = Vec::with_capacity(lens.len());
    let mut pos = 0;
    for &len in lens {
        let mut chunk = Vec::with_capacity(len * nrhs);
        for c in 0..nrhs {
            chunk.extend_from_slice(&buf[c * n + pos..c * n + pos + len]);
        }
        chunks.push(chunk);
        pos += len;
    }
    chunks
}
