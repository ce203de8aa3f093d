//! Define Errors

use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Master Error type of this crate
#[derive(Debug, Error)]
pub enum Error {
    /// A dense kernel reported a nonzero status
    #[error("LAPACK subroutine {op} failed: info = {info}")]
    Lapack { op: &'static str, info: i32 },

    /// The local generalized eigenproblem failed
    #[error("eigensolver failed during {stage}: info = {info}")]
    Eigen { stage: &'static str, info: i32 },

    /// Unrecoverable topology or parameter misconfiguration
    #[error("topology misconfiguration: {0}")]
    Topology(String),

    /// Header/payload disagreement between a slave and its master
    #[error("assembly protocol violation: {0}")]
    Protocol(String),

    /// The direct solver rejected the assembled matrix or a solve
    #[error("direct solver: {0}")]
    Solver(String),
}

pub(crate) fn lapack_result(op: &'static str, info: i32) -> Result<()> {
    if info == 0 {
        Ok(())
    } else {
        Err(Error::Lapack { op, info })
    }
}
