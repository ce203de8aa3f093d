//! Cholesky factorization and solve

use super::*;
use crate::error::*;

pub trait Cholesky_: Scalar {
    /// Wrapper of `*potrf`
    ///
    /// **Warning: Only the portion of `a` corresponding to `UPLO` is written.**
    fn potrf(uplo: UPLO, n: i32, a: &mut [Self], lda: i32) -> Result<()>;

    /// Wrapper of `*potrs`
    fn potrs(
        uplo: UPLO,
        n: i32,
        nrhs: i32,
        a: &[Self],
        lda: i32,
        b: &mut [Self],
        ldb: i32,
    ) -> Result<()>;
}

macro_rules! impl_cholesky {
    ($scalar:ty, $trf:path, $trs:path) => {
        impl Cholesky_ for $scalar {
            fn potrf(uplo: UPLO, n: i32, a: &mut [Self], lda: i32) -> Result<()> {
                let mut info = 0;
                unsafe {
                    $trf(uplo as u8, n, a, lda, &mut info);
                }
                lapack_result("potrf", info)
            }

            fn potrs(
                uplo: UPLO,
                n: i32,
                nrhs: i32,
                a: &[Self],
                lda: i32,
                b: &mut [Self],
                ldb: i32,
            ) -> Result<()> {
                let mut info = 0;
                unsafe {
                    $trs(uplo as u8, n, nrhs, a, lda, b, ldb, &mut info);
                }
                lapack_result("potrs", info)
            }
        }
    };
}

impl_cholesky!(f64, lapack::dpotrf, lapack::dpotrs);
impl_cholesky!(f32, lapack::spotrf, lapack::spotrs);
impl_cholesky!(c64, lapack::zpotrf, lapack::zpotrs);
impl_cholesky!(c32, lapack::cpotrf, lapack::cpotrs);
