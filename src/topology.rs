//! Master placement and communicator construction.
//!
//! Given P ranks and a requested master count p, partitions the world
//! into one group per master and derives the three communicators the
//! coarse operator runs on: the masters subgroup (where the direct
//! solver lives), the per-group scatter fabric (master is always rank 0
//! of its group), and the gather fabric rooted at world rank 0.

use crate::comm::Communicator;
use crate::error::Result;
use tracing::warn;

/// Layout of master ranks among world ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyMode {
    /// Masters at `k * (P / p)`, each owning the following block.
    Spread,
    /// Masters are ranks `0..p`; workers grouped contiguously after them.
    MastersFirst,
    /// Masters placed by the area-equalizing recurrence, for workloads
    /// decreasing linearly with the rank index.
    Triangular,
}

/// Role master ranks play outside of solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Masters also contribute rows as ordinary workers.
    None,
    /// Masters stay out of the gather fabric (receive only).
    SkipGather,
    /// Masters contribute no rows at all, pure coordinators.
    Coordinator,
}

impl Exclusion {
    pub fn active(self) -> bool {
        !matches!(self, Exclusion::None)
    }
}

pub struct Topology {
    pub rank: usize,
    pub size: usize,
    /// Effective master count, after clamping.
    pub p: usize,
    pub mode: TopologyMode,
    pub exclusion: Exclusion,
    /// World ranks of the masters, ascending; `masters[0] == 0`.
    pub masters: Vec<usize>,
    /// World ranks of this rank's scatter group, ascending; the group's
    /// master comes first.
    pub group: Vec<usize>,
    pub(crate) world: Communicator,
    pub(crate) gather: Option<Communicator>,
    pub(crate) scatter: Option<Communicator>,
    /// Masters subgroup; `Some` exactly on master ranks.
    pub(crate) solver: Option<Communicator>,
}

impl Topology {
    pub fn new(
        world: &Communicator,
        p: usize,
        mode: TopologyMode,
        exclusion: Exclusion,
    ) -> Result<Topology> {
        let size = world.size();
        let rank = world.rank();
        let mut p = p.max(1);
        if p >= size {
            p = (size / 2).max(1);
            if rank == 0 && size > 1 {
                warn!(
                    "the number of master processes was set to a value >= the world size, \
                     reset to {}",
                    p
                );
            }
        }

        if p == 1 {
            let gather = Some(world.dup());
            let scatter = Some(world.dup());
            let solver = world.create(Some(&[0]));
            return Ok(Topology {
                rank,
                size,
                p,
                mode,
                exclusion,
                masters: vec![0],
                group: (0..size).collect(),
                world: world.clone(),
                gather,
                scatter,
                solver,
            });
        }

        let masters = Self::place_masters(size, p, mode);
        let group = Self::group_of(size, p, mode, &masters, rank);

        let solver = world.create(Some(&masters));
        let scatter = world.create(Some(&group));
        let gather = match exclusion {
            Exclusion::None => Some(world.dup()),
            _ => {
                let keep: Vec<usize> = (0..size)
                    .filter(|r| *r == 0 || !masters.contains(r))
                    .collect();
                world.create(Some(&keep))
            }
        };

        Ok(Topology {
            rank,
            size,
            p,
            mode,
            exclusion,
            masters,
            group,
            world: world.clone(),
            gather,
            scatter,
            solver,
        })
    }

    fn place_masters(size: usize, p: usize, mode: TopologyMode) -> Vec<usize> {
        match mode {
            TopologyMode::Spread => (0..p).map(|k| k * (size / p)).collect(),
            TopologyMode::MastersFirst => (0..p).collect(),
            TopologyMode::Triangular => {
                let mut ld = vec![0usize; p];
                let area = (size * size) as f64 / (2.0 * p as f64);
                for i in 1..p {
                    let prev = ld[i - 1] as f64;
                    let inner = (size * size) as f64 - 2.0 * size as f64 * prev - 2.0 * area
                        + prev * prev;
                    let next = (size as f64 - inner.max(1.0).sqrt() + 0.5) as usize;
                    // boundaries must stay strictly increasing and leave
                    // room for the remaining masters
                    ld[i] = next.clamp(ld[i - 1] + 1, size - (p - i));
                }
                ld
            }
        }
    }

    fn group_of(
        size: usize,
        p: usize,
        mode: TopologyMode,
        masters: &[usize],
        rank: usize,
    ) -> Vec<usize> {
        match mode {
            TopologyMode::Spread => {
                let m = size / p;
                let g = (rank / m).min(p - 1);
                let end = if g == p - 1 { size } else { (g + 1) * m };
                (g * m..end).collect()
            }
            TopologyMode::MastersFirst => {
                let wm = size / p - 1;
                let g = if rank < p {
                    rank
                } else {
                    ((rank - p) / wm).min(p - 1)
                };
                let start = p + g * wm;
                let end = if g == p - 1 { size } else { start + wm };
                let mut group = vec![g];
                group.extend(start..end);
                group
            }
            TopologyMode::Triangular => {
                let g = masters.partition_point(|&b| b <= rank) - 1;
                let end = if g == p - 1 { size } else { masters[g + 1] };
                (masters[g]..end).collect()
            }
        }
    }

    pub fn is_master(&self) -> bool {
        self.solver.is_some()
    }

    pub fn is_master_rank(&self, rank: usize) -> bool {
        self.masters.binary_search(&rank).is_ok()
    }

    /// Index of this rank in the master list, if it is one.
    pub fn master_index(&self) -> Option<usize> {
        self.masters.binary_search(&self.rank).ok()
    }

    /// Rank within the scatter group (0 = the group's master).
    pub fn split_rank(&self) -> usize {
        self.scatter.as_ref().map(|c| c.rank()).unwrap_or(0)
    }

    /// Size of the scatter group.
    pub fn split_size(&self) -> usize {
        self.scatter.as_ref().map(|c| c.size()).unwrap_or(1)
    }

    /// World ranks of the gather fabric, when this rank belongs to it.
    pub fn gather_members(&self) -> Option<&[usize]> {
        self.gather.as_ref().map(|c| c.members())
    }

    /// World ranks of every scatter group, in master order, each group's
    /// master first. Only meaningful on masters (uses the same closed
    /// forms every rank computes locally).
    pub fn all_groups(&self) -> Vec<Vec<usize>> {
        if self.p == 1 {
            return vec![(0..self.size).collect()];
        }
        self.masters
            .iter()
            .map(|&m| Self::group_of(self.size, self.p, self.mode, &self.masters, m))
            .collect()
    }
}
