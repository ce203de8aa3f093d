//! Basic scalar types and their methods

pub use cauchy::Scalar;

pub use num_complex::Complex32 as c32;
pub use num_complex::Complex64 as c64;

/// Storage convention of the assembled coarse matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    /// Only blocks with `col >= row` (one entry per off-diagonal pair) are
    /// stored, the diagonal block as a packed upper triangle.
    Symmetric,
    /// Every block is stored.
    General,
}

/// Index base expected by the downstream direct solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBase {
    /// 0-based, `'C'`
    C,
    /// 1-based, `'F'`
    F,
}

impl IndexBase {
    pub fn offset(self) -> usize {
        match self {
            IndexBase::C => 0,
            IndexBase::F => 1,
        }
    }
}

/// Distribution of local coarse dimensions across subdomains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniformity {
    /// Every subdomain carries its own dimension; they are exchanged.
    NonUniform,
    /// Every subdomain carries the same known dimension.
    Uniform,
    /// All nonzero dimensions are equal, but some ranks (typically excluded
    /// masters) may carry none; the common value is detected at assembly.
    UniformZero,
}
