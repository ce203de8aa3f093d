//! In-process SPMD transport.
//!
//! The coarse operator speaks MPI: point-to-point messages matched on
//! (source, communicator, tag) with per-pair FIFO ordering, blocking
//! collectives, and communicators carved out of a world group. No MPI
//! binding is used here; instead a [`Fabric`] hosts one mailbox per rank
//! and ranks run as OS threads within one process, which keeps every
//! distributed code path exercisable by ordinary `cargo test`.
//!
//! Transport-level failures (a peer panicking, a payload of the wrong
//! type) are fatal and abort the run, mirroring the error model of a real
//! message-passing layer.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

const TAG_BCAST: u16 = 0xFF01;
const TAG_GATHER: u16 = 0xFF02;
const TAG_SCATTER: u16 = 0xFF03;

struct Message {
    src: usize,
    ctx: u32,
    tag: u16,
    payload: Box<dyn Any + Send>,
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
    ready: Condvar,
}

/// Shared state connecting every rank of a run: one mailbox per rank and
/// a counter handing out communicator contexts.
pub struct Fabric {
    boxes: Vec<Mailbox>,
    next_ctx: AtomicU32,
}

impl Fabric {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Fabric {
            boxes: (0..size).map(|_| Mailbox::default()).collect(),
            next_ctx: AtomicU32::new(1),
        })
    }

    pub fn size(&self) -> usize {
        self.boxes.len()
    }

    fn alloc_ctx(&self) -> u32 {
        self.next_ctx.fetch_add(1, Ordering::Relaxed)
    }

    /// The world communicator as seen from `rank`.
    pub fn world(self: &Arc<Self>, rank: usize) -> Communicator {
        Communicator {
            fabric: Arc::clone(self),
            ctx: 0,
            members: Arc::new((0..self.size()).collect()),
            rank,
        }
    }

    /// Run `f` on `size` ranks, one thread each, collecting the per-rank
    /// results in rank order. A panicking rank aborts the whole run.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Communicator) -> R + Send + Sync,
    {
        let fabric = Fabric::new(size);
        thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let world = fabric.world(rank);
                    let f = &f;
                    s.spawn(move || f(world))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank panicked"))
                .collect()
        })
    }
}

/// Handle of a pending non-blocking operation.
///
/// Sends complete eagerly on this transport, but callers still hold the
/// handle until the point where a real message layer would require the
/// buffer to stay live.
#[must_use]
pub enum Request {
    Done,
}

impl Request {
    pub fn wait(self) {}

    pub fn wait_all(requests: impl IntoIterator<Item = Request>) {
        for r in requests {
            r.wait();
        }
    }
}

/// A group of ranks with its own message-matching context.
///
/// Ranks are local to the communicator; `members` maps them back to world
/// ranks and is kept ascending, so rank 0 is always the smallest world
/// rank of the group.
#[derive(Clone)]
pub struct Communicator {
    fabric: Arc<Fabric>,
    ctx: u32,
    members: Arc<Vec<usize>>,
    rank: usize,
}

impl Communicator {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// World ranks of the group, ascending.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn world_rank(&self, rank: usize) -> usize {
        self.members[rank]
    }

    /// Local rank of a world rank, if it belongs to this group.
    pub fn local_rank(&self, world: usize) -> Option<usize> {
        self.members.binary_search(&world).ok()
    }

    /// True when both communicators contain exactly the same world ranks.
    pub fn congruent(&self, other: &Communicator) -> bool {
        *self.members == *other.members
    }

    pub fn send<T: Send + 'static>(&self, value: T, dst: usize, tag: u16) {
        let mbox = &self.fabric.boxes[self.members[dst]];
        let mut queue = mbox.queue.lock().unwrap();
        queue.push_back(Message {
            src: self.members[self.rank],
            ctx: self.ctx,
            tag,
            payload: Box::new(value),
        });
        mbox.ready.notify_all();
    }

    pub fn isend<T: Send + 'static>(&self, value: T, dst: usize, tag: u16) -> Request {
        self.send(value, dst, tag);
        Request::Done
    }

    pub fn recv<T: 'static>(&self, src: usize, tag: u16) -> T {
        self.recv_any(&[src], tag).1
    }

    /// Wait until a message with `tag` arrives from any rank listed in
    /// `srcs`; returns the index into `srcs` together with the payload.
    /// The analogue of `MPI_Waitany` over posted receives.
    pub fn recv_any<T: 'static>(&self, srcs: &[usize], tag: u16) -> (usize, T) {
        let world: Vec<usize> = srcs.iter().map(|&r| self.members[r]).collect();
        let mbox = &self.fabric.boxes[self.members[self.rank]];
        let mut queue = mbox.queue.lock().unwrap();
        loop {
            let found = queue.iter().position(|m| {
                m.ctx == self.ctx && m.tag == tag && world.contains(&m.src)
            });
            if let Some(pos) = found {
                let msg = queue.remove(pos).unwrap();
                let idx = world.iter().position(|&w| w == msg.src).unwrap();
                let payload = msg
                    .payload
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("transport: payload type mismatch on tag {}", tag));
                return (idx, *payload);
            }
            queue = mbox.ready.wait(queue).unwrap();
        }
    }

    pub fn bcast<T: Clone + Send + 'static>(&self, value: &mut T, root: usize) {
        if self.rank == root {
            for r in 0..self.size() {
                if r != root {
                    self.send(value.clone(), r, TAG_BCAST);
                }
            }
        } else {
            *value = self.recv(root, TAG_BCAST);
        }
    }

    /// Gather one value per rank onto `root`, in rank order. Payloads may
    /// differ in size between ranks (the `Gatherv` case needs no separate
    /// entry point on this transport).
    pub fn gather<T: Send + 'static>(&self, value: T, root: usize) -> Option<Vec<T>> {
        if self.rank == root {
            let mut out: Vec<Option<T>> = (0..self.size()).map(|_| None).collect();
            out[root] = Some(value);
            for r in 0..self.size() {
                if r != root {
                    out[r] = Some(self.recv(r, TAG_GATHER));
                }
            }
            Some(out.into_iter().map(|v| v.unwrap()).collect())
        } else {
            self.send(value, root, TAG_GATHER);
            None
        }
    }

    /// Inverse of [`Communicator::gather`]: `root` provides one chunk per
    /// rank, every rank receives its own.
    pub fn scatter<T: Send + 'static>(&self, chunks: Option<Vec<T>>, root: usize) -> T {
        if self.rank == root {
            let chunks = chunks.expect("scatter: root must provide the chunks");
            assert_eq!(chunks.len(), self.size());
            let mut own = None;
            for (r, chunk) in chunks.into_iter().enumerate() {
                if r == root {
                    own = Some(chunk);
                } else {
                    self.send(chunk, r, TAG_SCATTER);
                }
            }
            own.unwrap()
        } else {
            self.recv(root, TAG_SCATTER)
        }
    }

    pub fn allgather<T: Clone + Send + 'static>(&self, value: T) -> Vec<T> {
        let mut gathered = self.gather(value, 0).unwrap_or_default();
        self.bcast(&mut gathered, 0);
        gathered
    }

    /// Element-wise reduction over all ranks; every rank receives the
    /// combined value.
    pub fn allreduce<T, F>(&self, value: T, combine: F) -> T
    where
        T: Clone + Send + 'static,
        F: Fn(T, T) -> T,
    {
        let mut result = value.clone();
        if let Some(all) = self.gather(value, 0) {
            result = all.into_iter().reduce(combine).unwrap();
        }
        self.bcast(&mut result, 0);
        result
    }

    pub fn barrier(&self) {
        let _ = self.allgather(());
    }

    /// Duplicate this communicator under a fresh context. Collective.
    pub fn dup(&self) -> Communicator {
        let members: Vec<usize> = (0..self.size()).collect();
        self.create(Some(&members)).unwrap()
    }

    /// Create a sub-communicator. Collective over `self`: every rank must
    /// call it, passing either its own (ascending) member list or `None`
    /// when it belongs to no group; disjoint groups may share one call.
    /// Returns the new communicator for members, `None` otherwise.
    pub fn create(&self, members: Option<&[usize]>) -> Option<Communicator> {
        let mut ctx = if self.rank == 0 {
            self.fabric.alloc_ctx()
        } else {
            0
        };
        self.bcast(&mut ctx, 0);
        let members = members?;
        debug_assert!(members.windows(2).all(|w| w[0] < w[1]));
        let world: Vec<usize> = members.iter().map(|&r| self.members[r]).collect();
        let me = self.members[self.rank];
        let rank = world.iter().position(|&w| w == me)?;
        Some(Communicator {
            fabric: Arc::clone(&self.fabric),
            ctx,
            members: Arc::new(world),
            rank,
        })
    }
}
