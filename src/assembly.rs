//! Distributed assembly of the coarse matrix E = Zᵀ A Z.
//!
//! Per subdomain the pipeline runs in phases: neighbor dimensions are
//! exchanged over tag 1 (skipped when uniform), restricted bases travel
//! over tag 2, each rank forms its row block of E from dense products,
//! slaves pack the block and ship it to their master over tag 3, and the
//! master lays everything out as compressed rows over its contiguous
//! global range. Row pointers are kept as per-row counts until the very
//! last step and turned into a prefix sum just before the handoff to the
//! direct solver.

use ndarray::{s, Array1, Array2, ArrayView2, Axis, ShapeBuilder};
use rayon::prelude::*;
use std::io::Write as _;
use tracing::warn;

use crate::comm::{Communicator, Request};
use crate::error::{Error, Result};
use crate::generate::conjugate;
use crate::lapack::{gemv, Lapack};
use crate::numbering::GlobalNumbering;
use crate::solver::CsrSlice;
use crate::topology::{Exclusion, Topology};
use crate::types::{IndexBase, Symmetry, Uniformity};
use num_traits::{One, Zero};

pub(crate) const TAG_DIMENSION: u16 = 1;
pub(crate) const TAG_BASIS: u16 = 2;
pub(crate) const TAG_COEFFICIENTS: u16 = 3;

/// The operator façade the assembly consumes: one subdomain of the
/// decomposition with its coarse basis and its couplings.
///
/// `sparsity` lists neighbor world ranks ascending; for each neighbor,
/// `overlap` gives the local rows shared with it, in an order both sides
/// of the pair agree on.
pub trait SubdomainOperator<K: Lapack> {
    /// The domain-decomposition communicator.
    fn communicator(&self) -> &Communicator;

    /// Neighbor world ranks, ascending.
    fn sparsity(&self) -> &[usize];

    /// Local fine degrees of freedom.
    fn dof(&self) -> usize;

    /// The local coarse basis Z, `dof() × ν`.
    fn basis(&self) -> ArrayView2<'_, K>;

    /// Local rows shared with `neighbor`.
    fn overlap(&self, neighbor: usize) -> &[usize];

    /// W = A · Z at subdomain scale.
    fn apply(&self, z: &ArrayView2<'_, K>) -> Array2<K>;
}

/// Coefficient transfer kept in flight when masters are excluded; the
/// caller decides when to complete it.
pub struct PendingSend {
    request: Request,
}

impl PendingSend {
    pub fn wait(self) {
        self.request.wait();
    }
}

/// Per-slave description gathered onto the master ahead of the
/// coefficients themselves.
#[derive(Clone)]
pub(crate) struct BlockHeader {
    pub nu: u16,
    pub coefficients: u32,
    /// World ranks of the neighbors whose blocks follow, ascending, only
    /// those with a nonzero basis; under symmetric storage only neighbors
    /// larger than the sender.
    pub columns: Vec<u16>,
}

pub(crate) struct Assembled<K> {
    pub csr: Option<CsrSlice<K>>,
    pub numbering: Option<GlobalNumbering>,
    pub pending: Option<PendingSend>,
    pub local: usize,
}

struct MemberLayout {
    world: usize,
    nu: usize,
    columns: Vec<usize>,
}

pub(crate) fn construct_matrix<K, V>(
    v: &V,
    topology: &Topology,
    symmetry: Symmetry,
    uniformity: Uniformity,
    base: IndexBase,
    dump: bool,
) -> Result<Assembled<K>>
where
    K: Lapack,
    V: SubdomainOperator<K>,
{
    let comm = v.communicator();
    let rank = topology.rank;
    let scatter = topology
        .scatter
        .as_ref()
        .ok_or_else(|| Error::Topology("rank belongs to no scatter group".into()))?;
    let split_size = scatter.size();

    let coordinator = topology.exclusion == Exclusion::Coordinator && topology.is_master();
    let local = if coordinator { 0 } else { v.basis().ncols() };
    let sparsity: &[usize] = if coordinator { &[] } else { v.sparsity() };
    let first = sparsity.partition_point(|&j| j < rank);

    // (a) neighbor dimension exchange; masters learn every dimension from
    // the header gather instead of posting receives
    let mut info_neighbor: Vec<usize> = vec![local; sparsity.len()];
    if uniformity != Uniformity::Uniform {
        for &j in sparsity {
            if !topology.is_master_rank(j) {
                comm.isend(local as u16, j, TAG_DIMENSION).wait();
            }
        }
        if !topology.is_master() {
            for _ in 0..sparsity.len() {
                let (idx, nu): (usize, u16) = comm.recv_any(sparsity, TAG_DIMENSION);
                info_neighbor[idx] = nu as usize;
            }
        }
    }

    let header = build_header(sparsity, first, local, &info_neighbor, symmetry);
    let headers = scatter.gather(header, 0);

    if scatter.rank() != 0 {
        let buffer = if local > 0 {
            compute_local_rows(v, comm, rank, sparsity, first, local, &info_neighbor, symmetry)?
        } else {
            Vec::new()
        };
        let pending = if buffer.is_empty() {
            None
        } else {
            let request = scatter.isend(buffer, 0, TAG_COEFFICIENTS);
            if topology.exclusion.active() {
                Some(PendingSend { request })
            } else {
                request.wait();
                None
            }
        };
        return Ok(Assembled {
            csr: None,
            numbering: None,
            pending,
            local,
        });
    }

    // master side
    let headers = headers.unwrap();
    let solver_comm = topology
        .solver
        .as_ref()
        .ok_or_else(|| Error::Topology("scatter root is not a master".into()))?;
    let group_nus: Vec<u16> = headers.iter().map(|h| h.nu).collect();
    let numbering = GlobalNumbering::build(topology, solver_comm, &group_nus, uniformity)?;

    for (idx, &j) in sparsity.iter().enumerate() {
        info_neighbor[idx] = numbering.nu_of(j);
    }

    let own = if local > 0 {
        compute_local_rows(v, comm, rank, sparsity, first, local, &info_neighbor, symmetry)?
    } else {
        Vec::new()
    };

    // payload sizes and offsets, member 0 being the master itself
    let mut sizes = vec![own.len()];
    sizes.extend(headers[1..].iter().map(|h| h.coefficients as usize));
    let mut offsets = vec![0usize; split_size];
    for k in 1..split_size {
        offsets[k] = offsets[k - 1] + sizes[k - 1];
    }
    let total: usize = sizes.iter().sum();

    let members: Vec<MemberLayout> = (0..split_size)
        .map(|k| {
            let world = scatter.world_rank(k);
            let columns = if k == 0 {
                own_columns(sparsity, first, &info_neighbor, symmetry)
            } else {
                headers[k].columns.iter().map(|&w| w as usize).collect()
            };
            MemberLayout {
                world,
                nu: if k == 0 { local } else { headers[k].nu as usize },
                columns,
            }
        })
        .collect();

    // header counts must agree with the layout the columns imply
    for (k, member) in members.iter().enumerate().skip(1) {
        if expected_size(member, &numbering, symmetry) != sizes[k] {
            return Err(Error::Protocol(format!(
                "slave {} announced {} coefficients, its columns imply {}",
                member.world,
                sizes[k],
                expected_size(member, &numbering, symmetry)
            )));
        }
    }

    let nrow = numbering.nrow;
    let baseoff = base.offset();
    let mut col_idx = vec![0i32; total];
    let mut row_cnt = vec![0i32; nrow + 1];

    // row emission is data-parallel over the group: every member writes a
    // disjoint slice of the column indices and of the per-row counts
    {
        let mut tasks = Vec::with_capacity(split_size);
        let mut j_rest: &mut [i32] = &mut col_idx;
        let mut c_rest: &mut [i32] = &mut row_cnt[1..];
        for (k, member) in members.iter().enumerate() {
            let (j_chunk, j_tail) = j_rest.split_at_mut(sizes[k]);
            let (c_chunk, c_tail) = c_rest.split_at_mut(member.nu);
            j_rest = j_tail;
            c_rest = c_tail;
            tasks.push((member, j_chunk, c_chunk));
        }
        tasks.into_par_iter().for_each(|(member, j_chunk, c_chunk)| {
            fill_member(member, &numbering, symmetry, baseoff, j_chunk, c_chunk);
        });
    }

    // coefficients: our own block in place, slave payloads as they land
    let mut values = vec![K::zero(); total];
    values[..own.len()].copy_from_slice(&own);
    let pending_slaves: Vec<usize> = (1..split_size).filter(|&k| sizes[k] > 0).collect();
    for _ in 0..pending_slaves.len() {
        let (i, payload): (usize, Vec<K>) = scatter.recv_any(&pending_slaves, TAG_COEFFICIENTS);
        let k = pending_slaves[i];
        if payload.len() != sizes[k] {
            return Err(Error::Protocol(format!(
                "slave {} sent {} coefficients, header announced {}",
                members[k].world,
                payload.len(),
                sizes[k]
            )));
        }
        values[offsets[k]..offsets[k] + payload.len()].copy_from_slice(&payload);
    }

    if dump {
        dump_slice(
            topology,
            solver_comm.rank(),
            symmetry,
            base,
            &numbering,
            &row_cnt,
            &col_idx,
            &values,
        );
    }

    // counts become a true prefix sum only now
    let mut row_ptr = row_cnt;
    row_ptr[0] = baseoff as i32;
    for i in 0..nrow {
        row_ptr[i + 1] += row_ptr[i];
    }

    let csr = CsrSlice {
        nrow,
        row_ptr,
        col_idx,
        values,
        loc2glob: [
            (numbering.offset + baseoff) as i32,
            (numbering.offset + nrow + baseoff) as i32 - 1,
        ],
        base,
        symmetry,
    };

    Ok(Assembled {
        csr: Some(csr),
        numbering: Some(numbering),
        pending: None,
        local,
    })
}

fn build_header(
    sparsity: &[usize],
    first: usize,
    local: usize,
    info_neighbor: &[usize],
    symmetry: Symmetry,
) -> BlockHeader {
    let range = match symmetry {
        Symmetry::Symmetric => first..sparsity.len(),
        Symmetry::General => 0..sparsity.len(),
    };
    let columns: Vec<u16> = range
        .clone()
        .filter(|&i| info_neighbor[i] > 0)
        .map(|i| sparsity[i] as u16)
        .collect();
    let coefficients = if local == 0 {
        0
    } else {
        let nb: usize = range
            .filter(|&i| info_neighbor[i] > 0)
            .map(|i| info_neighbor[i])
            .sum();
        match symmetry {
            Symmetry::Symmetric => local * (local + 1) / 2 + local * nb,
            Symmetry::General => local * (local + nb),
        }
    };
    BlockHeader {
        nu: local as u16,
        coefficients: coefficients as u32,
        columns,
    }
}

fn own_columns(
    sparsity: &[usize],
    first: usize,
    info_neighbor: &[usize],
    symmetry: Symmetry,
) -> Vec<usize> {
    let range = match symmetry {
        Symmetry::Symmetric => first..sparsity.len(),
        Symmetry::General => 0..sparsity.len(),
    };
    range
        .filter(|&i| info_neighbor[i] > 0)
        .map(|i| sparsity[i])
        .collect()
}

fn expected_size(member: &MemberLayout, numbering: &GlobalNumbering, symmetry: Symmetry) -> usize {
    if member.nu == 0 {
        return 0;
    }
    let nb: usize = member.columns.iter().map(|&w| numbering.nu_of(w)).sum();
    match symmetry {
        Symmetry::Symmetric => member.nu * (member.nu + 1) / 2 + member.nu * nb,
        Symmetry::General => member.nu * (member.nu + nb),
    }
}

/// Emit the column indices and per-row counts of one member's row block.
/// The value layout is fixed by the packing convention of
/// [`compute_local_rows`]: under symmetric storage the packed upper
/// triangle of the diagonal block leads each row, followed by the larger
/// neighbors ascending; otherwise all blocks appear in ascending world
/// rank order with the diagonal block in place.
fn fill_member(
    member: &MemberLayout,
    numbering: &GlobalNumbering,
    symmetry: Symmetry,
    baseoff: usize,
    j_chunk: &mut [i32],
    c_chunk: &mut [i32],
) {
    if member.nu == 0 {
        return;
    }
    let self_start = numbering.col_offset(member.world);
    let blocks: Vec<(usize, usize)> = member
        .columns
        .iter()
        .map(|&w| (numbering.col_offset(w), numbering.nu_of(w)))
        .collect();
    let mut cursor = 0;
    match symmetry {
        Symmetry::Symmetric => {
            for r in 0..member.nu {
                let mut width = 0;
                for c in (self_start + r)..(self_start + member.nu) {
                    j_chunk[cursor] = (c + baseoff) as i32;
                    cursor += 1;
                }
                width += member.nu - r;
                for &(start, nu) in &blocks {
                    for c in start..start + nu {
                        j_chunk[cursor] = (c + baseoff) as i32;
                        cursor += 1;
                    }
                    width += nu;
                }
                c_chunk[r] = width as i32;
            }
        }
        Symmetry::General => {
            let split = member
                .columns
                .partition_point(|&w| w < member.world);
            let mut ordered: Vec<(usize, usize)> = Vec::with_capacity(blocks.len() + 1);
            ordered.extend_from_slice(&blocks[..split]);
            ordered.push((self_start, member.nu));
            ordered.extend_from_slice(&blocks[split..]);
            let width: usize = ordered.iter().map(|&(_, nu)| nu).sum();
            for r in 0..member.nu {
                for &(start, nu) in &ordered {
                    for c in start..start + nu {
                        j_chunk[cursor] = (c + baseoff) as i32;
                        cursor += 1;
                    }
                }
                c_chunk[r] = width as i32;
            }
        }
    }
    debug_assert_eq!(cursor, j_chunk.len());
}

/// Exchange restricted bases with the neighbors and form this rank's row
/// block of E, packed row after row in the layout `fill_member` emits.
#[allow(clippy::too_many_arguments)]
fn compute_local_rows<K, V>(
    v: &V,
    comm: &Communicator,
    rank: usize,
    sparsity: &[usize],
    first: usize,
    local: usize,
    info_neighbor: &[usize],
    symmetry: Symmetry,
) -> Result<Vec<K>>
where
    K: Lapack,
    V: SubdomainOperator<K>,
{
    let z = v.basis();

    // ship our basis, restricted to the shared rows: under symmetric
    // storage only to smaller neighbors, whose row block needs it
    let send_upto = match symmetry {
        Symmetry::Symmetric => first,
        Symmetry::General => sparsity.len(),
    };
    for idx in 0..send_upto {
        if info_neighbor[idx] == 0 {
            continue;
        }
        let j = sparsity[idx];
        let restricted = z.select(Axis(0), v.overlap(j));
        comm.isend(to_col_major(&restricted.view()), j, TAG_BASIS).wait();
    }

    let w = v.apply(&z);

    // packed layout of this row block
    let recv_from = match symmetry {
        Symmetry::Symmetric => first..sparsity.len(),
        Symmetry::General => 0..sparsity.len(),
    };
    let coeff_nb: usize = recv_from.clone().map(|i| info_neighbor[i]).sum();
    let row_width = |r: usize| match symmetry {
        Symmetry::Symmetric => (local - r) + coeff_nb,
        Symmetry::General => local + coeff_nb,
    };
    let row_start = |r: usize| match symmetry {
        // rows 0..r take (local - k) + coeff_nb entries each
        Symmetry::Symmetric => r * coeff_nb + r * (2 * local + 1 - r) / 2,
        Symmetry::General => r * (local + coeff_nb),
    };
    let total = if local == 0 {
        0
    } else {
        row_start(local - 1) + row_width(local - 1)
    };
    let mut buffer = vec![K::zero(); total];

    // diagonal block
    match symmetry {
        Symmetry::General => {
            let before: usize = info_neighbor[..first].iter().sum();
            let zh: Array2<K> = conjugate(&z);
            let block = zh.dot(&w);
            for r in 0..local {
                for c in 0..local {
                    buffer[row_start(r) + before + c] = block[[r, c]];
                }
            }
        }
        Symmetry::Symmetric if coeff_nb >= local => {
            // wide rows: one gemm, then pack the upper triangle
            let zh: Array2<K> = conjugate(&z);
            let block = zh.dot(&w);
            for r in 0..local {
                for c in r..local {
                    buffer[row_start(r) + (c - r)] = block[[r, c]];
                }
            }
        }
        Symmetry::Symmetric => {
            // thin rows: one gemv per row, straight into the packed strip
            for r in 0..local {
                let zh: Array1<K> = z.column(r).mapv(|x| x.conj());
                let tail = w.slice(s![.., r..]);
                let mut y = Array1::<K>::zeros(local - r);
                gemv(K::one(), &tail.t(), &zh.view(), K::zero(), &mut y.view_mut());
                for (c, &val) in y.iter().enumerate() {
                    buffer[row_start(r) + c] = val;
                }
            }
        }
    }

    // neighbor blocks, as their bases arrive
    let targets: Vec<usize> = recv_from.filter(|&i| info_neighbor[i] > 0).collect();
    let srcs: Vec<usize> = targets.iter().map(|&i| sparsity[i]).collect();
    for _ in 0..targets.len() {
        let (t, payload): (usize, Vec<K>) = comm.recv_any(&srcs, TAG_BASIS);
        let idx = targets[t];
        let j = sparsity[idx];
        let nu_j = info_neighbor[idx];
        let overlap = v.overlap(j);
        if payload.len() != overlap.len() * nu_j {
            return Err(Error::Protocol(format!(
                "basis from rank {} carries {} coefficients, expected {}",
                j,
                payload.len(),
                overlap.len() * nu_j
            )));
        }
        let zj = Array2::from_shape_vec((overlap.len(), nu_j).f(), payload)
            .map_err(|e| Error::Protocol(format!("basis from rank {}: {}", j, e)))?;
        let w_ov = w.select(Axis(0), overlap);
        let wh: Array2<K> = conjugate(&w_ov);
        let block = wh.dot(&zj);

        // column position of this neighbor within a row
        let before: usize = match symmetry {
            Symmetry::Symmetric => info_neighbor[first..idx].iter().sum(),
            Symmetry::General => {
                let nb: usize = info_neighbor[..idx].iter().sum();
                if rank < j {
                    nb + local
                } else {
                    nb
                }
            }
        };
        let pos = |r: usize| -> usize {
            match symmetry {
                Symmetry::Symmetric => row_start(r) + (local - r) + before,
                Symmetry::General => row_start(r) + before,
            }
        };
        for r in 0..local {
            for c in 0..nu_j {
                buffer[pos(r) + c] = block[[r, c]];
            }
        }
    }

    Ok(buffer)
}

fn to_col_major<K: Lapack>(a: &ArrayView2<'_, K>) -> Vec<K> {
    a.t().iter().cloned().collect()
}

/// Plain-text dump of the assembled slice, one file per master, while the
/// row pointers are still per-row counts. Coordinate output for the whole
/// slice; this is a diagnostic encoding only.
#[allow(clippy::too_many_arguments)]
fn dump_slice<K: Lapack>(
    topology: &Topology,
    master_rank: usize,
    symmetry: Symmetry,
    base: IndexBase,
    numbering: &GlobalNumbering,
    row_cnt: &[i32],
    col_idx: &[i32],
    values: &[K],
) {
    let name = format!(
        "E_distributed_{}{}_{}_{}_{}.txt",
        if topology.exclusion == Exclusion::Coordinator {
            "excluded_"
        } else {
            ""
        },
        match symmetry {
            Symmetry::Symmetric => 'S',
            Symmetry::General => 'G',
        },
        match base {
            IndexBase::C => 'C',
            IndexBase::F => 'F',
        },
        match topology.mode {
            crate::topology::TopologyMode::Spread => 0,
            crate::topology::TopologyMode::MastersFirst => 1,
            crate::topology::TopologyMode::Triangular => 2,
        },
        master_rank,
    );
    let file = std::fs::File::create(&name);
    let mut file = match file {
        Ok(f) => f,
        Err(e) => {
            warn!("could not dump the coarse matrix to {}: {}", name, e);
            return;
        }
    };
    let mut acc = 0usize;
    for row in 0..numbering.nrow {
        let count = row_cnt[row + 1] as usize;
        for k in 0..count {
            if let Err(e) = writeln!(
                file,
                "({:4}, {:4}) = {} ({} -- {})",
                numbering.offset + row + base.offset(),
                col_idx[acc + k],
                values[acc + k],
                acc,
                acc + count
            ) {
                warn!("aborting the coarse matrix dump to {}: {}", name, e);
                return;
            }
        }
        acc += count;
    }
}
