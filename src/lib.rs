//! `coarse-space` implements the distributed coarse operator of a
//! two-level overlapping Schwarz preconditioner: each process owns a
//! subdomain with a local basis Z of coarse vectors, the crate assembles
//! the Galerkin matrix E = Zᵀ A Z across processes onto a set of master
//! ranks, factors it through a pluggable direct solver, and applies E⁻¹
//! to distributed vectors during every preconditioner iteration.
//!
//! The dense kernels go through [LAPACK](http://www.netlib.org/lapack/)
//! using the bindings provided by
//! [blas-lapack-rs/lapack](https://github.com/blas-lapack-rs/lapack).
//!
//! Main pieces
//! -----------------------
//! - [lapack]: kernel façade for real and complex scalars
//! - [eigen]: the local generalized eigenproblem producing Z
//! - [comm]: the in-process SPMD transport the operator runs on
//! - [topology]: master placement and communicator construction
//! - [numbering]: global row/column numbering and gather layouts
//! - [assembly]: the distributed assembly pipeline
//! - [solver] / [dense]: the direct-solver seam and its LAPACK-backed
//!   reference implementation
//! - [operator]: construction and gather/solve/scatter orchestration
//!
//!  Utilities
//!  -----------
//!  - [Assertions for array](assert/index.html)
//!  - [Random matrix generators](generate/index.html)
//!  - [Scalar trait](types/trait.Scalar.html)

#![allow(
    clippy::module_inception,
    clippy::many_single_char_names,
    clippy::type_complexity
)]
#![deny(rustdoc::broken_intra_doc_links, rustdoc::private_intra_doc_links)]

pub mod assembly;
pub mod assert;
pub mod comm;
pub mod dense;
pub mod eigen;
pub mod error;
pub mod generate;
pub mod lapack;
pub mod norm;
pub mod numbering;
pub mod operator;
pub mod solver;
pub mod topology;
pub mod types;

pub use crate::assembly::{PendingSend, SubdomainOperator};
pub use crate::comm::{Communicator, Fabric, Request};
pub use crate::dense::DenseSolver;
pub use crate::eigen::Eigensolver;
pub use crate::error::{Error, Result};
pub use crate::generate::*;
pub use crate::lapack::Lapack;
pub use crate::norm::Norm;
pub use crate::numbering::GlobalNumbering;
pub use crate::operator::{ApplyRequests, CoarseOperator, CoarseParams};
pub use crate::solver::{CsrSlice, DirectSolver, Distribution};
pub use crate::topology::{Exclusion, Topology, TopologyMode};
pub use crate::types::*;
