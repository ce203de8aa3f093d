//! Global numbering of the coarse space.
//!
//! Rows of E are numbered so that every master owns a contiguous range:
//! scatter groups are concatenated in master order ("storage order").
//! For the Spread and Triangular topologies storage order coincides with
//! world order; for MastersFirst it does not, and the permutation is kept
//! explicitly: `idistribution` maps storage rows back to world rows for
//! the direct solver, and `storage_pos` drives every row/column offset
//! computation, whatever the per-rank dimensions are.

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::topology::{Exclusion, Topology};
use crate::types::Uniformity;

pub struct GlobalNumbering {
    /// ν per storage position (i.e. per world rank, permuted).
    pub info_world: Vec<u16>,
    /// World rank → storage position.
    pub storage_pos: Vec<usize>,
    /// Prefix sums of `info_world`; entry `sp` is the first global index
    /// of the block at storage position `sp`. Length P + 1.
    pub col_offsets: Vec<usize>,
    /// Storage row → world row, `None` when the orders coincide.
    pub idistribution: Option<Vec<i32>>,
    /// Global dimension of E.
    pub n: usize,
    /// Rows owned by each master, in master order.
    pub row_counts: Vec<usize>,
    /// First global row of this master's slice.
    pub offset: usize,
    /// Rows in this master's slice.
    pub nrow: usize,
    /// ν per member of this master's scatter group, group order.
    pub split_counts: Vec<i32>,
    pub displs_split: Vec<i32>,
    /// ν per member of the gather fabric, member order.
    pub gather_counts: Vec<i32>,
    pub displs: Vec<i32>,
    /// Common block size in the uniform modes.
    pub uniform: Option<usize>,
}

impl GlobalNumbering {
    /// Build the numbering on a master. `group_nus` holds the local
    /// dimensions of the scatter group, group order, as gathered from the
    /// slave headers.
    pub fn build(
        topology: &Topology,
        solver: &Communicator,
        group_nus: &[u16],
        uniformity: Uniformity,
    ) -> Result<GlobalNumbering> {
        let size = topology.size;
        let all_nus: Vec<Vec<u16>> = solver.allgather(group_nus.to_vec());
        let groups = topology.all_groups();

        let mut info_world = vec![0u16; size];
        let mut storage_pos = vec![0usize; size];
        let mut sp = 0;
        for (group, nus) in groups.iter().zip(&all_nus) {
            debug_assert_eq!(group.len(), nus.len());
            for (&world, &nu) in group.iter().zip(nus) {
                storage_pos[world] = sp;
                info_world[sp] = nu;
                sp += 1;
            }
        }

        let mut col_offsets = vec![0usize; size + 1];
        for i in 0..size {
            col_offsets[i + 1] = col_offsets[i] + info_world[i] as usize;
        }
        let n = col_offsets[size];
        if n == 0 {
            return Err(Error::Topology("empty coarse space".into()));
        }

        let identity = storage_pos.iter().enumerate().all(|(r, &p)| r == p);
        let idistribution = if identity {
            None
        } else {
            // world-order row offsets, then expand block by block
            let mut world_off = vec![0usize; size];
            let mut acc = 0;
            for r in 0..size {
                world_off[r] = acc;
                acc += info_world[storage_pos[r]] as usize;
            }
            let mut idist = Vec::with_capacity(n);
            for group in &groups {
                for &world in group {
                    let nu = info_world[storage_pos[world]] as usize;
                    idist.extend((0..nu).map(|k| (world_off[world] + k) as i32));
                }
            }
            Some(idist)
        };

        let row_counts: Vec<usize> = groups
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|&w| info_world[storage_pos[w]] as usize)
                    .sum()
            })
            .collect();

        let master_index = solver.rank();
        let offset: usize = row_counts[..master_index].iter().sum();
        let nrow = row_counts[master_index];

        let split_counts: Vec<i32> = group_nus.iter().map(|&nu| nu as i32).collect();
        let displs_split = prefix(&split_counts);

        let gather_members: Vec<usize> = match topology.exclusion {
            Exclusion::None => (0..size).collect(),
            _ => (0..size)
                .filter(|r| *r == 0 || !topology.is_master_rank(*r))
                .collect(),
        };
        let gather_counts: Vec<i32> = gather_members
            .iter()
            .map(|&w| info_world[storage_pos[w]] as i32)
            .collect();
        let displs = prefix(&gather_counts);

        // the common block size is the first nonzero ν: under exclusion the
        // masters legitimately report 0 even in the uniform modes
        let uniform = match uniformity {
            Uniformity::NonUniform => None,
            Uniformity::Uniform | Uniformity::UniformZero => {
                let nu = info_world.iter().find(|&&nu| nu != 0).copied();
                Some(nu.map(usize::from).ok_or_else(|| {
                    Error::Topology("every rank reported an empty coarse basis".into())
                })?)
            }
        };

        Ok(GlobalNumbering {
            info_world,
            storage_pos,
            col_offsets,
            idistribution,
            n,
            row_counts,
            offset,
            nrow,
            split_counts,
            displs_split,
            gather_counts,
            displs,
            uniform,
        })
    }

    /// First global column of the block owned by `world_rank`.
    pub fn col_offset(&self, world_rank: usize) -> usize {
        self.col_offsets[self.storage_pos[world_rank]]
    }

    /// Coarse dimension of `world_rank`.
    pub fn nu_of(&self, world_rank: usize) -> usize {
        self.info_world[self.storage_pos[world_rank]] as usize
    }
}

fn prefix(counts: &[i32]) -> Vec<i32> {
    let mut displs = vec![0i32; counts.len()];
    for i in 1..counts.len() {
        displs[i] = displs[i - 1] + counts[i - 1];
    }
    displs
}
